use lopdf::Document as LoDocument;
use std::collections::BTreeSet;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfInspectErrorCode {
    PdfParseFailed,
    PdfEncryptedUnsupported,
    PdfEmptyOrNoPages,
    PdfIoError,
}

impl PdfInspectErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdfInspectErrorCode::PdfParseFailed => "PDF_PARSE_FAILED",
            PdfInspectErrorCode::PdfEncryptedUnsupported => "PDF_ENCRYPTED_UNSUPPORTED",
            PdfInspectErrorCode::PdfEmptyOrNoPages => "PDF_EMPTY_OR_NO_PAGES",
            PdfInspectErrorCode::PdfIoError => "PDF_IO_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfInspectError {
    pub code: PdfInspectErrorCode,
    pub message: String,
}

impl std::fmt::Display for PdfInspectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for PdfInspectError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfInspectReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
    /// Image XObjects, soft masks included.
    pub image_count: usize,
    pub base_fonts: BTreeSet<String>,
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<PdfInspectReport, PdfInspectError> {
    let pdf = LoDocument::load_mem(bytes).map_err(|err| PdfInspectError {
        code: PdfInspectErrorCode::PdfParseFailed,
        message: err.to_string(),
    })?;

    let mut image_count = 0usize;
    let mut base_fonts = BTreeSet::new();
    for object in pdf.objects.values() {
        if let Ok(stream) = object.as_stream() {
            let subtype = stream.dict.get(b"Subtype").ok().and_then(|o| o.as_name().ok());
            if subtype == Some(b"Image".as_slice()) {
                image_count += 1;
            }
        } else if let Ok(dict) = object.as_dict() {
            let is_font = dict.get(b"Type").ok().and_then(|o| o.as_name().ok())
                == Some(b"Font".as_slice());
            if is_font {
                if let Some(name) = dict.get(b"BaseFont").ok().and_then(|o| o.as_name().ok()) {
                    base_fonts.insert(String::from_utf8_lossy(name).into_owned());
                }
            }
        }
    }

    Ok(PdfInspectReport {
        pdf_version: pdf.version.clone(),
        page_count: pdf.get_pages().len(),
        encrypted: pdf.is_encrypted(),
        file_size_bytes: bytes.len(),
        image_count,
        base_fonts,
    })
}

pub fn inspect_pdf_path(path: &Path) -> Result<PdfInspectReport, PdfInspectError> {
    let data = std::fs::read(path).map_err(|err| PdfInspectError {
        code: PdfInspectErrorCode::PdfIoError,
        message: err.to_string(),
    })?;
    inspect_pdf_bytes(&data)
}

/// A delivered report must open without a password and hold at least one page.
pub fn require_readable_report(report: &PdfInspectReport) -> Result<(), PdfInspectError> {
    if report.encrypted {
        return Err(PdfInspectError {
            code: PdfInspectErrorCode::PdfEncryptedUnsupported,
            message: "encrypted pdf output is not supported".to_string(),
        });
    }
    if report.page_count == 0 {
        return Err(PdfInspectError {
            code: PdfInspectErrorCode::PdfEmptyOrNoPages,
            message: "pdf has no pages".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DocumentBuilder;
    use crate::font::StandardFont;
    use crate::pdf::PdfBuilder;
    use crate::types::{Pt, Size};

    fn two_page_pdf_bytes() -> Vec<u8> {
        let mut builder = PdfBuilder::new(Size::a4());
        let regular = builder.embed_font(StandardFont::Helvetica);
        let italic = builder.embed_font(StandardFont::HelveticaOblique);
        builder.add_page(Size::a4());
        builder.draw_text("first", Pt::from_i32(40), Pt::from_i32(40), &regular, Pt::from_i32(11));
        builder.add_page(Size::a4());
        builder.draw_text("second", Pt::from_i32(40), Pt::from_i32(40), &italic, Pt::from_i32(11));
        builder.save().expect("save")
    }

    #[test]
    fn inspect_pdf_bytes_reads_version_pages_and_fonts() {
        let bytes = two_page_pdf_bytes();
        let report = inspect_pdf_bytes(&bytes).expect("inspect");
        assert_eq!(report.page_count, 2);
        assert_eq!(report.pdf_version, "1.7");
        assert!(!report.encrypted);
        assert_eq!(report.file_size_bytes, bytes.len());
        assert_eq!(report.image_count, 0);
        assert!(report.base_fonts.contains("Helvetica"));
        assert!(report.base_fonts.contains("Helvetica-Oblique"));
        require_readable_report(&report).expect("readable");
    }

    #[test]
    fn inspect_pdf_bytes_rejects_malformed_data() {
        let err = inspect_pdf_bytes(b"not a pdf").expect_err("invalid");
        assert_eq!(err.code, PdfInspectErrorCode::PdfParseFailed);
    }

    #[test]
    fn inspect_pdf_path_reports_io_error_for_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = inspect_pdf_path(&dir.path().join("missing.pdf")).expect_err("missing");
        assert_eq!(err.code, PdfInspectErrorCode::PdfIoError);
    }

    #[test]
    fn inspect_pdf_path_matches_bytes_report() {
        let bytes = two_page_pdf_bytes();
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, &bytes).expect("write");

        let from_path = inspect_pdf_path(&path).expect("inspect path");
        let from_bytes = inspect_pdf_bytes(&bytes).expect("inspect bytes");
        assert_eq!(from_path, from_bytes);
    }

    #[test]
    fn empty_reports_are_not_readable() {
        let report = PdfInspectReport {
            pdf_version: "1.7".to_string(),
            page_count: 0,
            encrypted: false,
            file_size_bytes: 0,
            image_count: 0,
            base_fonts: BTreeSet::new(),
        };
        let err = require_readable_report(&report).expect_err("must fail");
        assert_eq!(err.code, PdfInspectErrorCode::PdfEmptyOrNoPages);
    }
}
