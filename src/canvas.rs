use crate::types::{Pt, Size};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // Non-rendered metadata used for page-aware reporting. Ignored by the PDF renderer.
    Meta {
        key: String,
        value: String,
    },
    SetFontName(String),
    SetFontSize(Pt),
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
    },
    DrawImage {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub size: Size,
    pub commands: Vec<Command>,
}

impl Page {
    fn new(size: Size) -> Self {
        Self {
            size,
            commands: Vec::new(),
        }
    }

    /// Text of every string drawn on this page, in drawing order.
    pub fn text_runs(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().filter_map(|cmd| match cmd {
            Command::DrawString { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn image_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|cmd| matches!(cmd, Command::DrawImage { .. }))
            .count()
    }

    pub fn meta_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.commands.iter().filter_map(move |cmd| match cmd {
            Command::Meta { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub pages: Vec<Page>,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn text_runs(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().flat_map(|page| page.text_runs())
    }
}

#[derive(Debug, Clone, Default)]
struct FontState {
    font_name: Option<String>,
    font_size: Option<Pt>,
}

/// Records drawing commands page by page. Redundant font changes are dropped.
pub struct Canvas {
    default_size: Size,
    pages: Vec<Page>,
    current: Option<Page>,
    state: FontState,
}

impl Canvas {
    pub fn new(default_size: Size) -> Self {
        Self {
            default_size,
            pages: Vec::new(),
            current: None,
            state: FontState::default(),
        }
    }

    pub fn begin_page(&mut self, size: Size) {
        self.show_page();
        self.current = Some(Page::new(size));
    }

    /// Pages closed so far plus the open one.
    pub fn page_count(&self) -> usize {
        self.pages.len() + usize::from(self.current.is_some())
    }

    pub fn meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.page_mut().commands.push(Command::Meta {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn set_font_name(&mut self, name: &str) {
        if self.state.font_name.as_deref() == Some(name) {
            return;
        }
        self.state.font_name = Some(name.to_string());
        self.page_mut()
            .commands
            .push(Command::SetFontName(name.to_string()));
    }

    pub fn set_font_size(&mut self, size: Pt) {
        if self.state.font_size == Some(size) {
            return;
        }
        self.state.font_size = Some(size);
        self.page_mut().commands.push(Command::SetFontSize(size));
    }

    pub fn draw_string(&mut self, x: Pt, y: Pt, text: impl Into<String>) {
        self.page_mut().commands.push(Command::DrawString {
            x,
            y,
            text: text.into(),
        });
    }

    pub fn draw_image(
        &mut self,
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: impl Into<String>,
    ) {
        self.page_mut().commands.push(Command::DrawImage {
            x,
            y,
            width,
            height,
            resource_id: resource_id.into(),
        });
    }

    pub fn show_page(&mut self) {
        if let Some(page) = self.current.take() {
            self.pages.push(page);
        }
        self.state = FontState::default();
    }

    pub fn document(&self) -> Document {
        let mut pages = self.pages.clone();
        pages.extend(self.current.iter().cloned());
        Document { pages }
    }

    pub fn finish(mut self) -> Document {
        self.show_page();
        Document { pages: self.pages }
    }

    fn page_mut(&mut self) -> &mut Page {
        let default_size = self.default_size;
        self.current.get_or_insert_with(|| Page::new(default_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redundant_font_state_is_elided_within_a_page() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.begin_page(Size::a4());
        canvas.set_font_name("Helvetica");
        canvas.set_font_size(Pt::from_i32(11));
        canvas.draw_string(Pt::ZERO, Pt::ZERO, "a");
        canvas.set_font_name("Helvetica");
        canvas.set_font_size(Pt::from_i32(11));
        canvas.draw_string(Pt::ZERO, Pt::from_i32(14), "b");
        let doc = canvas.finish();
        assert_eq!(doc.pages[0].commands.len(), 4);
    }

    #[test]
    fn font_state_resets_on_new_page() {
        let mut canvas = Canvas::new(Size::a4());
        canvas.begin_page(Size::a4());
        canvas.set_font_name("Helvetica");
        canvas.begin_page(Size::letter());
        canvas.set_font_name("Helvetica");
        let doc = canvas.finish();
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.pages[1].size, Size::letter());
        assert_eq!(
            doc.pages[1].commands,
            vec![Command::SetFontName("Helvetica".to_string())]
        );
    }

    #[test]
    fn drawing_without_a_page_opens_one_at_default_size() {
        let mut canvas = Canvas::new(Size::letter());
        assert_eq!(canvas.page_count(), 0);
        canvas.draw_string(Pt::ZERO, Pt::ZERO, "x");
        canvas.meta("block", "TITLE");
        assert_eq!(canvas.page_count(), 1);
        let snapshot = canvas.document();
        let doc = canvas.finish();
        assert_eq!(snapshot, doc);
        assert_eq!(doc.pages[0].size, Size::letter());
        assert_eq!(doc.text_runs().collect::<Vec<_>>(), vec!["x"]);
        assert_eq!(doc.pages[0].meta_values("block").collect::<Vec<_>>(), vec!["TITLE"]);
    }
}
