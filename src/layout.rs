use crate::assets::DecodedImage;
use crate::builder::{DocumentBuilder, FontHandle, ImageHandle};
use crate::cursor::LayoutCursor;
use crate::debug::DebugLogger;
use crate::error::ExportError;
use crate::flowable::{ImageBlock, Paragraph};
use crate::font::StandardFont;
use crate::geometry::PageGeometry;
use crate::metrics::{LayoutMetrics, PageMetrics};
use crate::record::{PATIENT_LABEL, REPORT_ID_LABEL, ReportRecord, TITLE_LABEL};
use crate::types::{Pt, Rect};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

pub const DEFAULT_HEADING: &str = "Radiology AI Assistant — Draft Report";
pub const STUDY_IMAGE_HEADING: &str = "STUDY IMAGE";
pub const STUDY_IMAGES_HEADING: &str = "STUDY IMAGES";
pub const DISCLAIMER_MARKER: &str = "DISCLAIMER";

pub fn timestamp_line(generated_at: &DateTime<Utc>) -> String {
    format!("Generated: {}", generated_at.format("%Y-%m-%d %H:%M UTC"))
}

/// What happens when the builder rejects resolved image bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedFailurePolicy {
    /// Fail the export with `ExportError::ImageEmbed`.
    #[default]
    Abort,
    /// Leave the image out and keep going.
    Skip,
}

#[derive(Clone)]
pub struct LayoutOptions {
    pub heading: String,
    pub generated_at: DateTime<Utc>,
    pub embed_failure: EmbedFailurePolicy,
    debug: Option<Arc<DebugLogger>>,
}

impl LayoutOptions {
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Self {
            heading: DEFAULT_HEADING.to_string(),
            generated_at,
            embed_failure: EmbedFailurePolicy::default(),
            debug: None,
        }
    }

    pub fn with_heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = heading.into();
        self
    }

    pub fn with_embed_failure(mut self, policy: EmbedFailurePolicy) -> Self {
        self.embed_failure = policy;
        self
    }

    pub fn with_debug(mut self, debug: Option<Arc<DebugLogger>>) -> Self {
        self.debug = debug;
        self
    }
}

/// Lays out `report` onto fresh pages of `builder`.
///
/// Order: heading, TITLE / PATIENT / REPORT ID, image blocks, non-empty sections,
/// timestamp, disclaimer. Images are embedded before the first page is drawn so the
/// `position/total` captions count exactly the images that end up on the page.
pub fn layout_report<B>(
    report: &ReportRecord,
    images: &[DecodedImage],
    geometry: &PageGeometry,
    options: &LayoutOptions,
    builder: &mut B,
) -> Result<LayoutMetrics, ExportError>
where
    B: DocumentBuilder + ?Sized,
{
    report.validate()?;
    geometry.validate()?;

    let debug = options.debug.as_deref();
    let faces = Faces {
        regular: builder.embed_font(StandardFont::Helvetica),
        bold: builder.embed_font(StandardFont::HelveticaBold),
        italic: builder.embed_font(StandardFont::HelveticaOblique),
    };

    let mut metrics = LayoutMetrics::default();
    let mut handles = Vec::with_capacity(images.len());
    for image in images {
        match builder.embed_image(image) {
            Ok(handle) => handles.push(handle),
            Err(source) => match options.embed_failure {
                EmbedFailurePolicy::Abort => {
                    return Err(ExportError::ImageEmbed {
                        position: image.position,
                        source,
                    });
                }
                EmbedFailurePolicy::Skip => {
                    tracing::warn!(
                        position = image.position,
                        source = %image.source,
                        error = %source,
                        "leaving out image the builder rejected"
                    );
                    if let Some(logger) = debug {
                        logger.event(
                            "layout.image_rejected",
                            json!({ "position": image.position, "error": source.to_string() }),
                        );
                        logger.increment("layout.image_rejected", 1);
                    }
                    metrics.images_rejected += 1;
                }
            },
        }
    }

    builder.add_page(geometry.page_size);
    let mut run = LayoutRun {
        builder,
        geometry,
        debug,
        cursor: LayoutCursor::new(geometry),
        faces,
        page: PageMetrics::new(1),
        metrics,
    };

    run.write_heading(&options.heading);

    run.write_block(TITLE_LABEL, report.display_title());
    run.write_block(PATIENT_LABEL, report.display_patient());
    run.write_block(REPORT_ID_LABEL, report.id.trim());

    run.write_images(handles);

    for section in &report.sections {
        match section.text() {
            Some(body) => {
                run.write_block(&section.label, body);
                run.metrics.sections_rendered += 1;
            }
            None => run.metrics.sections_skipped += 1,
        }
    }

    run.write_footer(&timestamp_line(&options.generated_at));

    if let Some(disclaimer) = report.disclaimer_text() {
        run.write_disclaimer(disclaimer);
    }

    Ok(run.finish())
}

struct Faces {
    regular: FontHandle,
    bold: FontHandle,
    italic: FontHandle,
}

#[derive(Clone, Copy)]
enum Face {
    Regular,
    Bold,
    Italic,
}

struct LayoutRun<'a, B: ?Sized> {
    builder: &'a mut B,
    geometry: &'a PageGeometry,
    debug: Option<&'a DebugLogger>,
    cursor: LayoutCursor,
    faces: Faces,
    page: PageMetrics,
    metrics: LayoutMetrics,
}

impl<B> LayoutRun<'_, B>
where
    B: DocumentBuilder + ?Sized,
{
    fn line_required(&self) -> Pt {
        self.geometry.text_threshold.max(self.geometry.line_gap)
    }

    fn ensure_space(&mut self, required: Pt, reason: &str) {
        if !self.cursor.needs_break(required) {
            return;
        }
        let remaining = self.cursor.remaining();
        let from_page = self.cursor.page_number();
        self.close_page();
        self.builder.add_page(self.geometry.page_size);
        self.cursor.next_page();
        let to_page = self.cursor.page_number();
        self.page = PageMetrics::new(to_page);
        self.metrics.page_breaks += 1;

        tracing::debug!(from_page, to_page, reason, "page break");
        if let Some(logger) = self.debug {
            logger.event(
                "layout.page_break",
                json!({
                    "reason": reason,
                    "from_page": from_page,
                    "to_page": to_page,
                    "remaining_milli": remaining.to_milli_i64(),
                    "required_milli": required.to_milli_i64(),
                }),
            );
            logger.increment("layout.page_break", 1);
        }
    }

    fn close_page(&mut self) {
        self.page.used_height = self.cursor.y() - self.geometry.content_top();
        self.metrics.pages.push(self.page.clone());
    }

    fn draw_line(&mut self, text: &str, face: Face, size: Pt, advance: Pt) {
        let font = match face {
            Face::Regular => &self.faces.regular,
            Face::Bold => &self.faces.bold,
            Face::Italic => &self.faces.italic,
        };
        self.builder
            .draw_text(text, self.geometry.margin, self.cursor.y(), font, size);
        self.cursor.advance(advance);
        self.page.text_lines += 1;
    }

    fn write_lines(&mut self, paragraph: &Paragraph, face: Face) {
        let required = self.line_required();
        for line in &paragraph.lines {
            self.ensure_space(required, "text");
            self.draw_line(line, face, paragraph.size, self.geometry.line_gap);
        }
    }

    /// Heading lines at title size, then the larger heading gap.
    fn write_heading(&mut self, heading: &str) {
        let geometry = self.geometry;
        let paragraph = Paragraph::wrap(
            heading,
            &self.faces.bold,
            geometry.title_size,
            geometry.usable_width(),
        );
        let count = paragraph.lines.len();
        for (index, line) in paragraph.lines.iter().enumerate() {
            let advance = if index + 1 == count {
                geometry.heading_gap
            } else {
                geometry.line_gap
            };
            self.draw_line(line, Face::Bold, geometry.title_size, advance);
        }
    }

    /// Bold label, wrapped value, trailing gap. The label never ends a page on its own.
    fn write_block(&mut self, label: &str, value: &str) {
        let geometry = self.geometry;
        let paragraph = Paragraph::wrap(
            value,
            &self.faces.regular,
            geometry.body_size,
            geometry.usable_width(),
        );
        if paragraph.is_empty() {
            return;
        }
        let label_lines = Paragraph::wrap(
            label,
            &self.faces.bold,
            geometry.body_size,
            geometry.usable_width(),
        );
        let label_height = geometry.line_gap * label_lines.lines.len().max(1) as i32;
        self.ensure_space(self.line_required() + label_height, "label");
        self.builder.annotate("block", label);
        self.write_lines(&label_lines, Face::Bold);
        self.write_lines(&paragraph, Face::Regular);
        self.cursor.advance(geometry.block_gap);
    }

    fn write_images(&mut self, handles: Vec<ImageHandle>) {
        let geometry = self.geometry;
        let total = handles.len();
        let heading = if total == 1 {
            STUDY_IMAGE_HEADING
        } else {
            STUDY_IMAGES_HEADING
        };
        for (index, handle) in handles.into_iter().enumerate() {
            let caption = format!("{}/{}", index + 1, total);
            let mut block = ImageBlock::fit(handle, geometry).with_caption(caption.as_str());
            if index == 0 {
                block = block.with_heading(heading);
            }
            let required = geometry
                .image_threshold
                .max(block.content_height(geometry.line_gap));
            self.ensure_space(required, "image");
            self.builder.annotate("image", &caption);

            if let Some(heading) = &block.heading {
                self.draw_line(heading, Face::Bold, geometry.body_size, geometry.line_gap);
            }
            if let Some(caption) = &block.caption {
                self.draw_line(caption, Face::Regular, geometry.body_size, geometry.line_gap);
            }
            self.builder.draw_image(
                &block.image,
                Rect {
                    x: geometry.margin,
                    y: self.cursor.y(),
                    width: block.width,
                    height: block.height,
                },
            );
            self.cursor.advance(block.height + geometry.image_gap);
            self.page.image_count += 1;
            self.metrics.images_rendered += 1;
        }
    }

    fn write_footer(&mut self, text: &str) {
        let geometry = self.geometry;
        self.ensure_space(geometry.footer_threshold.max(geometry.line_gap), "footer");
        self.builder.annotate("block", "GENERATED");
        self.draw_line(text, Face::Regular, geometry.footer_size, geometry.line_gap);
    }

    fn write_disclaimer(&mut self, text: &str) {
        let geometry = self.geometry;
        let paragraph = Paragraph::wrap(
            text,
            &self.faces.italic,
            geometry.body_size,
            geometry.usable_width(),
        );
        if paragraph.is_empty() {
            return;
        }
        self.ensure_space(self.line_required(), "text");
        self.builder.annotate("block", DISCLAIMER_MARKER);
        self.write_lines(&paragraph, Face::Italic);
    }

    fn finish(mut self) -> LayoutMetrics {
        self.close_page();
        let metrics = self.metrics;
        if let Some(logger) = self.debug {
            logger.event(
                "layout.summary",
                json!({
                    "pages": metrics.pages.len(),
                    "page_breaks": metrics.page_breaks,
                    "images": metrics.images_rendered,
                    "images_rejected": metrics.images_rejected,
                    "sections": metrics.sections_rendered,
                    "sections_skipped": metrics.sections_skipped,
                }),
            );
        }
        metrics
    }
}
