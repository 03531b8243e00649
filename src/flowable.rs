use crate::builder::{FontHandle, ImageHandle};
use crate::geometry::PageGeometry;
use crate::types::Pt;
use std::iter::FusedIterator;
use std::str::SplitWhitespace;

/// Greedy word wrapping over whitespace-separated tokens.
///
/// A line keeps growing while `measure(line + " " + word) <= max_width`. A single word
/// wider than `max_width` is emitted alone and never split.
pub struct WrapLines<'a, F> {
    words: SplitWhitespace<'a>,
    pending: Option<&'a str>,
    measure: F,
    max_width: Pt,
}

pub fn wrap_text<F>(text: &str, max_width: Pt, measure: F) -> WrapLines<'_, F>
where
    F: Fn(&str) -> Pt,
{
    WrapLines {
        words: text.split_whitespace(),
        pending: None,
        measure,
        max_width,
    }
}

impl<F> Iterator for WrapLines<'_, F>
where
    F: Fn(&str) -> Pt,
{
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let first = self.pending.take().or_else(|| self.words.next())?;
        let mut line = first.to_string();
        for word in self.words.by_ref() {
            let candidate = format!("{line} {word}");
            if (self.measure)(&candidate) <= self.max_width {
                line = candidate;
            } else {
                self.pending = Some(word);
                break;
            }
        }
        Some(line)
    }
}

impl<F> FusedIterator for WrapLines<'_, F> where F: Fn(&str) -> Pt {}

/// Text wrapped with one face at one size.
#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    pub lines: Vec<String>,
    pub size: Pt,
}

impl Paragraph {
    pub fn wrap(text: &str, font: &FontHandle, size: Pt, max_width: Pt) -> Self {
        let lines = wrap_text(text, max_width, |candidate| {
            font.width_of_text_at_size(candidate, size)
        })
        .collect();
        Self { lines, size }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// One embedded image scaled into the content box, with the text lines drawn above it.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlock {
    pub image: ImageHandle,
    pub heading: Option<String>,
    pub caption: Option<String>,
    pub width: Pt,
    pub height: Pt,
}

impl ImageBlock {
    pub fn fit(image: ImageHandle, geometry: &PageGeometry) -> Self {
        let (width, height) = geometry.scale_policy.fit(
            image.width,
            image.height,
            geometry.usable_width(),
            geometry.max_image_height,
        );
        Self {
            image,
            heading: None,
            caption: None,
            width,
            height,
        }
    }

    pub fn with_heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = Some(heading.into());
        self
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn text_line_count(&self) -> i32 {
        i32::from(self.heading.is_some()) + i32::from(self.caption.is_some())
    }

    /// Heading and caption lines plus the scaled image.
    pub fn content_height(&self, line_gap: Pt) -> Pt {
        line_gap * self.text_line_count() + self.height
    }
}
