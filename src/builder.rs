use crate::assets::DecodedImage;
use crate::error::BuilderError;
use crate::font::{StandardFont, measure_text_width};
use crate::types::{Pt, Rect, Size};

/// A standard font registered with a builder. Measures text exactly as it will be encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontHandle {
    pub font: StandardFont,
    pub resource: String,
}

impl FontHandle {
    pub fn width_of_text_at_size(&self, text: &str, size: Pt) -> Pt {
        measure_text_width(self.font, size, text)
    }
}

/// An embedded raster. `width`/`height` are natural pixel dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    pub resource_id: String,
    pub width: u32,
    pub height: u32,
}

/// Low-level page drawing primitives the layout engine writes through.
///
/// Coordinates are in points with a top-left origin; `y` of a text run is the top of its
/// text box.
pub trait DocumentBuilder {
    fn add_page(&mut self, size: Size);

    fn page_count(&self) -> usize;

    fn embed_font(&mut self, font: StandardFont) -> FontHandle;

    fn draw_text(&mut self, text: &str, x: Pt, y: Pt, font: &FontHandle, size: Pt);

    /// Decodes `image` using its format hint. A hint that does not match the bytes is an error.
    fn embed_image(&mut self, image: &DecodedImage) -> Result<ImageHandle, BuilderError>;

    fn draw_image(&mut self, image: &ImageHandle, rect: Rect);

    /// Non-rendered marker on the current page.
    fn annotate(&mut self, _key: &str, _value: &str) {}

    fn save(self) -> Result<Vec<u8>, BuilderError>
    where
        Self: Sized;
}
