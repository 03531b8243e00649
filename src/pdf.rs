use crate::assets::{DecodedImage, ImageFormat};
use crate::builder::{DocumentBuilder, FontHandle, ImageHandle};
use crate::canvas::{Canvas, Command, Document, Page};
use crate::debug::DebugLogger;
use crate::error::BuilderError;
use crate::font::{StandardFont, winansi_code};
use crate::types::{Pt, Rect, Size};
use image::GenericImageView;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::io::{self, Write};
use std::sync::Arc;

const PRODUCER: &str = "draftreport";

const CATALOG_ID: usize = 1;
const PAGES_ID: usize = 2;
const INFO_ID: usize = 3;

struct ImageData {
    width: u32,
    height: u32,
    color_space: &'static str,
    filter: &'static str,
    data: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

struct EmbeddedImage {
    resource_id: String,
    image: ImageData,
}

impl EmbeddedImage {
    fn handle(&self) -> ImageHandle {
        ImageHandle {
            resource_id: self.resource_id.clone(),
            width: self.image.width,
            height: self.image.height,
        }
    }
}

/// Finished output: serialized bytes plus the recorded pages they were written from.
#[derive(Debug, Clone)]
pub struct RenderedPdf {
    pub bytes: Vec<u8>,
    pub document: Document,
}

/// `DocumentBuilder` that records onto a `Canvas` and serializes to PDF 1.7.
pub struct PdfBuilder {
    canvas: Canvas,
    fonts: BTreeSet<StandardFont>,
    images: Vec<EmbeddedImage>,
    image_ids: HashMap<[u8; 32], usize>,
    title: Option<String>,
    debug: Option<Arc<DebugLogger>>,
}

impl PdfBuilder {
    pub fn new(default_size: Size) -> Self {
        Self {
            canvas: Canvas::new(default_size),
            fonts: BTreeSet::new(),
            images: Vec::new(),
            image_ids: HashMap::new(),
            title: None,
            debug: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub(crate) fn with_debug(mut self, debug: Option<Arc<DebugLogger>>) -> Self {
        self.debug = debug;
        self
    }

    pub fn finish(self) -> Result<RenderedPdf, BuilderError> {
        let PdfBuilder {
            canvas,
            fonts,
            images,
            title,
            debug,
            ..
        } = self;
        let document = canvas.finish();
        if document.pages.is_empty() {
            return Err(BuilderError::NoPages);
        }
        let mut bytes = Vec::new();
        write_document(&mut bytes, &document, &fonts, &images, title.as_deref())?;
        if let Some(logger) = debug.as_deref() {
            logger.event(
                "pdf.serialized",
                serde_json::json!({
                    "pages": document.pages.len(),
                    "fonts": fonts.len(),
                    "images": images.len(),
                    "bytes": bytes.len(),
                }),
            );
        }
        Ok(RenderedPdf { bytes, document })
    }
}

impl DocumentBuilder for PdfBuilder {
    fn add_page(&mut self, size: Size) {
        self.canvas.begin_page(size);
    }

    fn page_count(&self) -> usize {
        self.canvas.page_count()
    }

    fn embed_font(&mut self, font: StandardFont) -> FontHandle {
        self.fonts.insert(font);
        FontHandle {
            font,
            resource: font_resource(font).to_string(),
        }
    }

    fn draw_text(&mut self, text: &str, x: Pt, y: Pt, font: &FontHandle, size: Pt) {
        self.fonts.insert(font.font);
        self.canvas.set_font_name(font.font.base_font_name());
        self.canvas.set_font_size(size);
        self.canvas.draw_string(x, y, text);
    }

    fn embed_image(&mut self, image: &DecodedImage) -> Result<ImageHandle, BuilderError> {
        let key = content_key(image.format, &image.bytes);
        if let Some(embedded) = self.image_ids.get(&key).and_then(|&idx| self.images.get(idx)) {
            if let Some(logger) = self.debug.as_deref() {
                logger.increment("pdf.image_reused", 1);
            }
            return Ok(embedded.handle());
        }

        let decoded = decode_image_bytes(&image.bytes, image.format)?;
        let embedded = EmbeddedImage {
            resource_id: format!("Im{}", self.images.len() + 1),
            image: decoded,
        };
        let handle = embedded.handle();
        if let Some(logger) = self.debug.as_deref() {
            logger.event(
                "pdf.image_embedded",
                serde_json::json!({
                    "resource": handle.resource_id,
                    "source": image.source,
                    "format": image.format.as_str(),
                    "width": handle.width,
                    "height": handle.height,
                }),
            );
            logger.increment("pdf.image_embedded", 1);
        }
        self.image_ids.insert(key, self.images.len());
        self.images.push(embedded);
        Ok(handle)
    }

    fn draw_image(&mut self, image: &ImageHandle, rect: Rect) {
        self.canvas.draw_image(
            rect.x,
            rect.y,
            rect.width,
            rect.height,
            image.resource_id.as_str(),
        );
    }

    fn annotate(&mut self, key: &str, value: &str) {
        self.canvas.meta(key, value);
    }

    fn save(self) -> Result<Vec<u8>, BuilderError> {
        self.finish().map(|rendered| rendered.bytes)
    }
}

fn font_resource(font: StandardFont) -> &'static str {
    match font {
        StandardFont::Helvetica => "F1",
        StandardFont::HelveticaBold => "F2",
        StandardFont::HelveticaOblique => "F3",
    }
}

fn content_key(format: ImageFormat, data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(format.as_str().as_bytes());
    hasher.update(data);
    hasher.finalize().into()
}

fn decode_image_bytes(data: &[u8], format: ImageFormat) -> Result<ImageData, BuilderError> {
    let decoded = image::load_from_memory_with_format(data, format.image_format()).map_err(
        |err| BuilderError::ImageDecode {
            format,
            message: err.to_string(),
        },
    )?;
    let (width, height) = decoded.dimensions();
    if width == 0 || height == 0 {
        return Err(BuilderError::EmptyImage);
    }

    // Only 1- and 3-component DCT streams pass through. CMYK/YCCK ones are
    // re-encoded from the decoder's RGB output.
    if format == ImageFormat::Jpeg {
        let color_space = match jpeg_component_count(data) {
            Some(1) => Some("/DeviceGray"),
            Some(3) => Some("/DeviceRGB"),
            _ => None,
        };
        if let Some(color_space) = color_space {
            return Ok(ImageData {
                width,
                height,
                color_space,
                filter: "/DCTDecode",
                data: data.to_vec(),
                alpha: None,
            });
        }
    }

    let rgba = decoded.to_rgba8();
    let mut rgb = Vec::with_capacity((width as usize) * (height as usize) * 3);
    let mut alpha = Vec::with_capacity((width as usize) * (height as usize));
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        if a != 255 {
            has_alpha = true;
        }
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }

    let alpha = if has_alpha {
        Some(flate_compress(&alpha)?)
    } else {
        None
    };
    Ok(ImageData {
        width,
        height,
        color_space: "/DeviceRGB",
        filter: "/FlateDecode",
        data: flate_compress(&rgb)?,
        alpha,
    })
}

/// Component count from the first SOF segment of a JPEG stream.
fn jpeg_component_count(data: &[u8]) -> Option<u8> {
    if !data.starts_with(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        if marker == 0x01 || (0xD0..=0xD7).contains(&marker) {
            pos += 2;
            continue;
        }
        let is_sof = (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            return data.get(pos + 9).copied();
        }
        if marker == 0xDA {
            return None;
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        pos += 2 + len;
    }
    None
}

fn flate_compress(data: &[u8]) -> io::Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn write_document<W: Write>(
    writer: &mut W,
    document: &Document,
    fonts: &BTreeSet<StandardFont>,
    images: &[EmbeddedImage],
    title: Option<&str>,
) -> io::Result<()> {
    let mut next_id = INFO_ID + 1;
    let mut font_ids = Vec::with_capacity(fonts.len());
    for font in fonts {
        font_ids.push((*font, next_id));
        next_id += 1;
    }
    // (smask id, image id) per embedded image.
    let mut image_ids = Vec::with_capacity(images.len());
    for embedded in images {
        let smask_id = embedded.image.alpha.as_ref().map(|_| {
            next_id += 1;
            next_id - 1
        });
        image_ids.push((smask_id, next_id));
        next_id += 1;
    }
    let image_obj_by_resource: HashMap<&str, usize> = images
        .iter()
        .zip(&image_ids)
        .map(|(embedded, (_, id))| (embedded.resource_id.as_str(), *id))
        .collect();
    let page_ids: Vec<(usize, usize)> = document
        .pages
        .iter()
        .map(|_| {
            next_id += 2;
            (next_id - 2, next_id - 1)
        })
        .collect();

    let mut offsets = vec![0usize; next_id];
    let mut offset = 0usize;
    write_bytes(writer, b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n", &mut offset)?;

    write_pdf_object(
        writer,
        &mut offset,
        &mut offsets,
        CATALOG_ID,
        &format!("<< /Type /Catalog /Pages {} 0 R >>", PAGES_ID),
    )?;
    let kids: Vec<String> = page_ids
        .iter()
        .map(|(page_id, _)| format!("{} 0 R", page_id))
        .collect();
    write_pdf_object(
        writer,
        &mut offset,
        &mut offsets,
        PAGES_ID,
        &format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            page_ids.len()
        ),
    )?;
    write_pdf_object(writer, &mut offset, &mut offsets, INFO_ID, &info_object(title))?;

    for (font, id) in &font_ids {
        write_pdf_object(writer, &mut offset, &mut offsets, *id, &font_object(*font))?;
    }

    for (embedded, (smask_id, image_id)) in images.iter().zip(&image_ids) {
        let image = &embedded.image;
        if let (Some(alpha), Some(mask_id)) = (image.alpha.as_ref(), smask_id) {
            let dict = format!(
                "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8 /Filter /FlateDecode /Length {} >>",
                image.width,
                image.height,
                alpha.len()
            );
            write_stream_object(writer, &mut offset, &mut offsets, *mask_id, &dict, alpha)?;
        }
        let smask = smask_id
            .map(|id| format!(" /SMask {} 0 R", id))
            .unwrap_or_default();
        let dict = format!(
            "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} /BitsPerComponent 8 /Filter {}{} /Length {} >>",
            image.width,
            image.height,
            image.color_space,
            image.filter,
            smask,
            image.data.len()
        );
        write_stream_object(writer, &mut offset, &mut offsets, *image_id, &dict, &image.data)?;
    }

    let font_dict = font_resources(&font_ids);
    for (page, (page_id, content_id)) in document.pages.iter().zip(&page_ids) {
        let used: BTreeSet<&str> = page
            .commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::DrawImage { resource_id, .. } => Some(resource_id.as_str()),
                _ => None,
            })
            .collect();
        let xobjects: Vec<String> = used
            .iter()
            .filter_map(|name| {
                image_obj_by_resource
                    .get(name)
                    .map(|id| format!("/{} {} 0 R", name, id))
            })
            .collect();
        let xobject_dict = if xobjects.is_empty() {
            String::new()
        } else {
            format!(" /XObject << {} >>", xobjects.join(" "))
        };
        write_pdf_object(
            writer,
            &mut offset,
            &mut offsets,
            *page_id,
            &format!(
                "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources << /Font {}{} >> /Contents {} 0 R >>",
                PAGES_ID,
                fmt_pt(page.size.width),
                fmt_pt(page.size.height),
                font_dict,
                xobject_dict,
                content_id
            ),
        )?;
        let content = render_page(page, &image_obj_by_resource);
        write_pdf_object(
            writer,
            &mut offset,
            &mut offsets,
            *content_id,
            &stream_object(&content),
        )?;
    }

    let xref_start = offset;
    write_str(writer, &format!("xref\n0 {}\n", next_id), &mut offset)?;
    write_str(writer, "0000000000 65535 f \n", &mut offset)?;
    for slot in offsets.iter().skip(1) {
        write_str(writer, &format!("{:010} 00000 n \n", slot), &mut offset)?;
    }
    write_str(
        writer,
        &format!(
            "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF",
            next_id, CATALOG_ID, INFO_ID, xref_start
        ),
        &mut offset,
    )?;
    Ok(())
}

fn render_page(page: &Page, images: &HashMap<&str, usize>) -> String {
    let mut out = String::new();
    let mut font = StandardFont::Helvetica;
    let mut font_size = Pt::from_i32(12);

    for cmd in &page.commands {
        match cmd {
            Command::Meta { .. } => {}
            Command::SetFontName(name) => {
                if let Some(named) = StandardFont::from_name(name) {
                    font = named;
                }
            }
            Command::SetFontSize(size) => font_size = *size,
            Command::DrawString { x, y, text } => {
                out.push_str("BT\n");
                out.push_str(&format!(
                    "/{} {} Tf\n",
                    font_resource(font),
                    fmt_pt(font_size)
                ));
                out.push_str(&format!(
                    "{} {} Td\n",
                    fmt_pt(*x),
                    fmt_pt(page.size.height - *y - font_size)
                ));
                out.push_str(&format!("({}) Tj\n", encode_winansi_pdf_string(text)));
                out.push_str("ET\n");
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                if !images.contains_key(resource_id.as_str()) {
                    continue;
                }
                let draw_y = page.size.height - *y - *height;
                out.push_str("q\n");
                out.push_str(&format!(
                    "{} 0 0 {} {} {} cm\n",
                    fmt_pt(*width),
                    fmt_pt(*height),
                    fmt_pt(*x),
                    fmt_pt(draw_y)
                ));
                out.push_str(&format!("/{} Do\n", resource_id));
                out.push_str("Q\n");
            }
        }
    }
    out
}

fn font_object(font: StandardFont) -> String {
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
        font.base_font_name()
    )
}

fn font_resources(fonts: &[(StandardFont, usize)]) -> String {
    let mut entries = Vec::new();
    for (font, font_id) in fonts {
        entries.push(format!("/{} {} 0 R", font_resource(*font), font_id));
    }
    format!("<< {} >>", entries.join(" "))
}

fn info_object(title: Option<&str>) -> String {
    let mut entries = vec![format!("/Producer ({})", PRODUCER)];
    if let Some(title) = title {
        entries.push(format!("/Title ({})", encode_winansi_pdf_string(title)));
    }
    format!("<< {} >>", entries.join(" "))
}

fn stream_object(content: &str) -> String {
    let length = content.len();
    format!("<< /Length {} >>\nstream\n{}\nendstream", length, content)
}

fn write_pdf_object<W: Write>(
    writer: &mut W,
    offset: &mut usize,
    offsets: &mut [usize],
    obj_id: usize,
    body: &str,
) -> io::Result<()> {
    if let Some(slot) = offsets.get_mut(obj_id) {
        *slot = *offset;
    }
    write_str(writer, &format!("{} 0 obj\n", obj_id), offset)?;
    write_bytes(writer, body.as_bytes(), offset)?;
    write_bytes(writer, b"\nendobj\n", offset)?;
    Ok(())
}

fn write_stream_object<W: Write>(
    writer: &mut W,
    offset: &mut usize,
    offsets: &mut [usize],
    obj_id: usize,
    dict: &str,
    data: &[u8],
) -> io::Result<()> {
    if let Some(slot) = offsets.get_mut(obj_id) {
        *slot = *offset;
    }
    write_str(writer, &format!("{} 0 obj\n{}\nstream\n", obj_id, dict), offset)?;
    write_bytes(writer, data, offset)?;
    write_bytes(writer, b"\nendstream\nendobj\n", offset)?;
    Ok(())
}

fn write_bytes<W: Write>(writer: &mut W, data: &[u8], offset: &mut usize) -> io::Result<()> {
    writer.write_all(data)?;
    *offset += data.len();
    Ok(())
}

fn write_str<W: Write>(writer: &mut W, data: &str, offset: &mut usize) -> io::Result<()> {
    write_bytes(writer, data.as_bytes(), offset)
}

/// Literal-string body for `text` under WinAnsiEncoding. Unmappable chars become `?`.
fn encode_winansi_pdf_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        let byte = winansi_code(ch).unwrap_or(b'?');
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b if !(0x20..0x7f).contains(&b) => out.push_str(&format!("\\{:03o}", b)),
            b => out.push(b as char),
        }
    }
    out
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}
