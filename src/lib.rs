mod assets;
mod builder;
mod canvas;
mod config;
mod cursor;
mod debug;
mod delivery;
mod error;
mod flowable;
mod font;
mod geometry;
mod layout;
mod metrics;
mod pdf;
mod pdfinspect;
mod record;
mod store;
mod types;

pub use assets::{
    Asset, AssetBundle, AssetFetcher, DecodedImage, DefaultFetcher, FileFetcher, ImageFormat,
    ImageReference, ImageResolver, ResolvedImages, SkippedImage, collect_image_references,
    normalize_references,
};
#[cfg(feature = "http")]
pub use assets::HttpFetcher;
pub use builder::{DocumentBuilder, FontHandle, ImageHandle};
pub use canvas::{Canvas, Command, Document, Page};
pub use config::{ExportConfig, PagePreset};
pub use debug::{DEBUG_LOG_ENV, DebugLogger};
pub use delivery::{DirectoryDelivery, FileDelivery};
pub use error::{BuilderError, ExportError, FetchError, ImageAcquisitionError};
pub use flowable::{ImageBlock, Paragraph, WrapLines, wrap_text};
pub use font::{StandardFont, measure_text_width};
pub use geometry::{PageGeometry, ScalePolicy};
pub use layout::{
    DEFAULT_HEADING, DISCLAIMER_MARKER, EmbedFailurePolicy, LayoutOptions, STUDY_IMAGE_HEADING,
    STUDY_IMAGES_HEADING, layout_report, timestamp_line,
};
pub use metrics::{LayoutMetrics, PageMetrics};
pub use pdf::{PdfBuilder, RenderedPdf};
pub use pdfinspect::{
    PdfInspectError, PdfInspectErrorCode, PdfInspectReport, inspect_pdf_bytes, inspect_pdf_path,
    require_readable_report,
};
pub use record::{
    AI_NOTE, FINDINGS, IMPRESSION, LIMITATIONS, PATIENT_LABEL, PATIENT_PLACEHOLDER,
    RECOMMENDATIONS, REPORT_ID_LABEL, ReportRecord, ReportSection, SECTION_ORDER, SUMMARY, TAGS,
    TECHNIQUE, TITLE_LABEL, TITLE_PLACEHOLDER,
};
pub use store::{StoredReport, load_stored_reports};
pub use types::{Pt, Rect, Size};

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;

/// Turns report records into draft PDFs.
///
/// One exporter can serve many exports; each call resolves images, lays out and
/// serializes independently. Nothing is delivered unless serialization succeeded.
pub struct DraftExporter {
    geometry: PageGeometry,
    heading: String,
    sample_images: Vec<String>,
    fetcher: Box<dyn AssetFetcher + Send + Sync>,
    embed_failure: EmbedFailurePolicy,
    debug: Option<Arc<DebugLogger>>,
}

/// Output of a successful export.
#[derive(Debug)]
pub struct ExportedReport {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub document: Document,
    pub metrics: LayoutMetrics,
    /// References the resolver could not turn into bytes.
    pub skipped_images: Vec<SkippedImage>,
}

impl DraftExporter {
    pub fn builder() -> DraftExporterBuilder {
        DraftExporterBuilder::new()
    }

    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = self.debug.as_deref() {
            logger.emit_summary(context);
            logger.flush();
        }
    }

    /// Sample images first, then the record's own references. Unusable ones are skipped.
    pub fn resolve_images(&self, report: &ReportRecord) -> ResolvedImages {
        let references = report.image_references(&self.sample_images);
        ImageResolver::new(self.fetcher.as_ref())
            .with_debug(self.debug.clone())
            .resolve(references.as_slice())
    }

    pub fn export(&self, report: &ReportRecord) -> Result<ExportedReport, ExportError> {
        self.export_at(report, Utc::now())
    }

    /// Exports with a fixed generation time. Same inputs give the same bytes.
    pub fn export_at(
        &self,
        report: &ReportRecord,
        generated_at: DateTime<Utc>,
    ) -> Result<ExportedReport, ExportError> {
        let result = self.export_inner(report, generated_at);
        if let Err(err) = &result {
            tracing::error!(report = %report.id, error = %err, "draft export failed");
        }
        self.emit_debug_summary("export");
        result
    }

    fn export_inner(
        &self,
        report: &ReportRecord,
        generated_at: DateTime<Utc>,
    ) -> Result<ExportedReport, ExportError> {
        report.validate()?;
        let resolved = self.resolve_images(report);

        let options = LayoutOptions::new(generated_at)
            .with_heading(self.heading.clone())
            .with_embed_failure(self.embed_failure)
            .with_debug(self.debug.clone());
        let mut builder = PdfBuilder::new(self.geometry.page_size)
            .with_title(format!("Draft Report {}", report.id))
            .with_debug(self.debug.clone());
        let metrics = layout_report(
            report,
            &resolved.images,
            &self.geometry,
            &options,
            &mut builder,
        )?;
        let rendered = builder.finish().map_err(ExportError::Serialization)?;

        tracing::info!(
            report = %report.id,
            pages = metrics.page_count(),
            images = metrics.images_rendered,
            skipped = resolved.skipped.len(),
            bytes = rendered.bytes.len(),
            "draft report exported"
        );
        Ok(ExportedReport {
            bytes: rendered.bytes,
            file_name: suggested_file_name(report),
            document: rendered.document,
            metrics,
            skipped_images: resolved.skipped,
        })
    }

    /// Exports, then hands the bytes to `delivery`. Returns where the file landed.
    pub fn export_and_deliver(
        &self,
        report: &ReportRecord,
        delivery: &dyn FileDelivery,
    ) -> Result<(ExportedReport, PathBuf), ExportError> {
        let exported = self.export(report)?;
        let path = deliver(&exported, delivery)?;
        Ok((exported, path))
    }
}

fn deliver(exported: &ExportedReport, delivery: &dyn FileDelivery) -> Result<PathBuf, ExportError> {
    delivery
        .deliver(&exported.bytes, &exported.file_name)
        .map_err(|err| {
            tracing::error!(file = %exported.file_name, error = %err, "delivery failed");
            ExportError::Delivery(err)
        })
}

impl ExportedReport {
    pub fn page_count(&self) -> usize {
        self.document.page_count()
    }

    pub fn deliver(&self, delivery: &dyn FileDelivery) -> Result<PathBuf, ExportError> {
        deliver(self, delivery)
    }
}

/// `{patient}-{id}.pdf`, with the patient name reduced to `[A-Za-z0-9_-]`.
pub fn suggested_file_name(report: &ReportRecord) -> String {
    let patient = report
        .patient_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or("patient");
    format!("{}-{}.pdf", sanitize_file_component(patient), report.id.trim())
}

pub fn sanitize_file_component(raw: &str) -> String {
    raw.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

pub struct DraftExporterBuilder {
    geometry: PageGeometry,
    heading: String,
    sample_images: Vec<String>,
    asset_bundle: AssetBundle,
    asset_root: Option<PathBuf>,
    fetch_remote: bool,
    fetcher: Option<Box<dyn AssetFetcher + Send + Sync>>,
    embed_failure: EmbedFailurePolicy,
    debug_path: Option<PathBuf>,
}

impl Default for DraftExporterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DraftExporterBuilder {
    pub fn new() -> Self {
        Self {
            geometry: PageGeometry::default(),
            heading: DEFAULT_HEADING.to_string(),
            sample_images: Vec::new(),
            asset_bundle: AssetBundle::default(),
            asset_root: None,
            fetch_remote: cfg!(feature = "http"),
            fetcher: None,
            embed_failure: EmbedFailurePolicy::default(),
            debug_path: None,
        }
    }

    /// Starts from a parsed config file. Fields the file leaves out keep their defaults.
    pub fn from_config(config: &ExportConfig) -> Result<Self, ExportError> {
        let mut builder = Self::new()
            .geometry(config.geometry()?)
            .embed_failure(config.embed_failure());
        if let Some(heading) = &config.heading {
            builder = builder.heading(heading.clone());
        }
        for reference in &config.sample_images {
            builder = builder.sample_image(reference.clone());
        }
        if let Some(root) = &config.asset_root {
            builder = builder.asset_root(root.clone());
        }
        if let Some(remote) = config.fetch_remote {
            builder = builder.fetch_remote(remote);
        }
        if let Some(path) = &config.debug_log {
            builder = builder.debug_log(path.clone());
        }
        Ok(builder)
    }

    pub fn geometry(mut self, geometry: PageGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn page_size(mut self, size: Size) -> Self {
        self.geometry.page_size = size;
        self
    }

    pub fn margin(mut self, margin: Pt) -> Self {
        self.geometry.margin = margin;
        self
    }

    pub fn scale_policy(mut self, policy: ScalePolicy) -> Self {
        self.geometry.scale_policy = policy;
        self
    }

    pub fn heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = heading.into();
        self
    }

    /// Reference placed ahead of every record's own images.
    pub fn sample_image(mut self, reference: impl Into<String>) -> Self {
        self.sample_images.push(reference.into());
        self
    }

    pub fn asset(mut self, asset: Asset) -> Self {
        self.asset_bundle.add(asset);
        self
    }

    pub fn asset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.asset_root = Some(root.into());
        self
    }

    pub fn fetch_remote(mut self, enabled: bool) -> Self {
        self.fetch_remote = enabled;
        self
    }

    /// Replaces the bundle/file/http chain entirely.
    pub fn fetcher(mut self, fetcher: impl AssetFetcher + Send + Sync + 'static) -> Self {
        self.fetcher = Some(Box::new(fetcher));
        self
    }

    pub fn embed_failure(mut self, policy: EmbedFailurePolicy) -> Self {
        self.embed_failure = policy;
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<DraftExporter, ExportError> {
        self.geometry.validate()?;
        if self.heading.trim().is_empty() {
            return Err(ExportError::InvalidConfiguration(
                "heading must not be blank".to_string(),
            ));
        }
        let debug = match self.debug_path {
            Some(path) => Some(Arc::new(DebugLogger::new(path)?)),
            None => DebugLogger::from_env().map(Arc::new),
        };
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => {
                let files = match self.asset_root {
                    Some(root) => FileFetcher::with_root(root),
                    None => FileFetcher::new(),
                };
                let fetcher = DefaultFetcher::new(self.asset_bundle, files);
                let fetcher = with_remote(fetcher, self.fetch_remote)?;
                Box::new(fetcher)
            }
        };
        Ok(DraftExporter {
            geometry: self.geometry,
            heading: self.heading,
            sample_images: self.sample_images,
            fetcher,
            embed_failure: self.embed_failure,
            debug,
        })
    }
}

#[cfg(feature = "http")]
fn with_remote(fetcher: DefaultFetcher, enabled: bool) -> Result<DefaultFetcher, ExportError> {
    if !enabled {
        return Ok(fetcher);
    }
    let http =
        HttpFetcher::new().map_err(|err| ExportError::InvalidConfiguration(err.to_string()))?;
    Ok(fetcher.with_http(http))
}

#[cfg(not(feature = "http"))]
fn with_remote(fetcher: DefaultFetcher, enabled: bool) -> Result<DefaultFetcher, ExportError> {
    if enabled {
        return Err(ExportError::InvalidConfiguration(
            "remote images need the http feature".to_string(),
        ));
    }
    Ok(fetcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::io::{self, Cursor};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 6, 14, 30, 0).unwrap()
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([20, 40, 60, 255]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn data_url(bytes: &[u8]) -> String {
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    fn knee_report() -> ReportRecord {
        ReportRecord::new("r1")
            .with_title("ER-1288")
            .with_patient_name("Dana Q.")
            .with_section(SUMMARY, "Right knee, two views.")
            .with_section(IMPRESSION, "No acute osseous abnormality.")
            .with_disclaimer("AI-generated draft. Requires radiologist review.")
    }

    fn exporter(root: &std::path::Path) -> DraftExporter {
        DraftExporter::builder()
            .asset_root(root)
            .fetch_remote(false)
            .build()
            .unwrap()
    }

    #[derive(Default)]
    struct MemoryDelivery {
        delivered: RefCell<Vec<(String, usize)>>,
    }

    impl FileDelivery for MemoryDelivery {
        fn deliver(&self, bytes: &[u8], suggested_name: &str) -> io::Result<PathBuf> {
            self.delivered
                .borrow_mut()
                .push((suggested_name.to_string(), bytes.len()));
            Ok(PathBuf::from(suggested_name))
        }
    }

    struct FailingDelivery;

    impl FileDelivery for FailingDelivery {
        fn deliver(&self, _bytes: &[u8], _suggested_name: &str) -> io::Result<PathBuf> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        }
    }

    #[test]
    fn same_report_and_time_give_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let report = knee_report().with_image(data_url(&png_bytes(40, 30)));
        let exporter = exporter(dir.path());
        let first = exporter.export_at(&report, at()).unwrap();
        let second = exporter.export_at(&report, at()).unwrap();
        assert_eq!(first.bytes, second.bytes);
        assert!(first.bytes.starts_with(b"%PDF-1.7"));
    }

    #[test]
    fn unreachable_image_degrades_to_remaining_one() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scan.png"), png_bytes(64, 48)).unwrap();
        let report = knee_report()
            .with_image("/missing.png")
            .with_image("/scan.png");
        let exported = exporter(dir.path()).export_at(&report, at()).unwrap();

        assert_eq!(exported.skipped_images.len(), 1);
        assert_eq!(exported.skipped_images[0].reference, "/missing.png");
        assert_eq!(exported.metrics.images_rendered, 1);
        let runs: Vec<&str> = exported.document.text_runs().collect();
        assert!(runs.contains(&STUDY_IMAGE_HEADING));
        assert!(runs.contains(&"1/1"));
        assert!(!runs.contains(&"2/2"));
    }

    #[test]
    fn report_without_images_still_exports() {
        let dir = tempfile::tempdir().unwrap();
        let exported = exporter(dir.path()).export_at(&knee_report(), at()).unwrap();
        assert_eq!(exported.metrics.images_rendered, 0);
        assert!(exported.skipped_images.is_empty());
        let runs: Vec<&str> = exported.document.text_runs().collect();
        assert!(!runs.contains(&STUDY_IMAGE_HEADING));
        assert!(!runs.contains(&STUDY_IMAGES_HEADING));
        assert!(runs.contains(&"Generated: 2025-10-06 14:30 UTC"));
    }

    #[test]
    fn exported_pdf_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let report = knee_report()
            .with_image(data_url(&png_bytes(32, 32)))
            .with_legacy_image(data_url(&png_bytes(16, 8)));
        let exported = exporter(dir.path()).export_at(&report, at()).unwrap();
        let inspected = inspect_pdf_bytes(&exported.bytes).unwrap();
        require_readable_report(&inspected).unwrap();
        assert_eq!(inspected.page_count, exported.page_count());
        assert_eq!(inspected.image_count, 2);
        assert!(inspected.base_fonts.contains("Helvetica-Oblique"));
    }

    #[test]
    fn file_name_uses_sanitized_patient_and_id() {
        assert_eq!(suggested_file_name(&knee_report()), "Dana_Q_-r1.pdf");
        assert_eq!(suggested_file_name(&ReportRecord::new("r2")), "patient-r2.pdf");
        assert_eq!(sanitize_file_component("Ana María/ß"), "Ana_Mar_a__");
    }

    #[test]
    fn sample_images_come_first() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = DraftExporter::builder()
            .asset(Asset::new("/placeholder.png", png_bytes(10, 10)))
            .sample_image("/placeholder.png")
            .fetch_remote(false)
            .asset_root(dir.path())
            .build()
            .unwrap();
        let resolved = exporter.resolve_images(&knee_report().with_image("/placeholder.png"));
        assert_eq!(resolved.images.len(), 1);
        assert_eq!(resolved.images[0].position, 0);
        assert!(resolved.skipped.is_empty());
    }

    #[test]
    fn delivery_receives_bytes_under_suggested_name() {
        let dir = tempfile::tempdir().unwrap();
        let delivery = MemoryDelivery::default();
        let (exported, path) = exporter(dir.path())
            .export_and_deliver(&knee_report(), &delivery)
            .unwrap();
        assert_eq!(path, PathBuf::from("Dana_Q_-r1.pdf"));
        assert_eq!(
            delivery.delivered.borrow().as_slice(),
            &[("Dana_Q_-r1.pdf".to_string(), exported.bytes.len())]
        );
    }

    #[test]
    fn delivery_failure_is_reported_as_delivery_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = exporter(dir.path())
            .export_and_deliver(&knee_report(), &FailingDelivery)
            .unwrap_err();
        assert!(matches!(err, ExportError::Delivery(_)));
        assert_eq!(err.user_message(), "Couldn't save the PDF. Please try again.");
    }

    #[test]
    fn invalid_report_is_not_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let delivery = MemoryDelivery::default();
        let err = exporter(dir.path())
            .export_and_deliver(&ReportRecord::new(""), &delivery)
            .unwrap_err();
        assert!(matches!(err, ExportError::InvalidReport(_)));
        assert!(delivery.delivered.borrow().is_empty());

        let err = exporter(dir.path())
            .export_and_deliver(&ReportRecord::new("../r1"), &delivery)
            .unwrap_err();
        assert!(matches!(err, ExportError::InvalidReport(_)));
        assert!(delivery.delivered.borrow().is_empty());
    }

    #[test]
    fn builder_rejects_bad_geometry_and_blank_heading() {
        assert!(matches!(
            DraftExporter::builder().margin(Pt::from_i32(400)).build(),
            Err(ExportError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            DraftExporter::builder().heading("  ").build(),
            Err(ExportError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn config_feeds_builder() {
        let config =
            ExportConfig::from_json_str(r#"{"page":"letter","heading":"Draft","fetch_remote":false}"#)
                .unwrap();
        let exporter = DraftExporterBuilder::from_config(&config)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(exporter.geometry().page_size, Size::letter());
        let exported = exporter.export_at(&knee_report(), at()).unwrap();
        assert_eq!(exported.document.text_runs().next(), Some("Draft"));
    }

    #[test]
    fn debug_log_records_export_summary() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("debug.jsonl");
        let exporter = DraftExporter::builder()
            .fetch_remote(false)
            .debug_log(&log)
            .build()
            .unwrap();
        exporter
            .export_at(&knee_report().with_image("/nope.png"), at())
            .unwrap();
        let text = std::fs::read_to_string(&log).unwrap();
        assert!(text.contains("resolve.image_skipped"));
        assert!(text.contains("\"context\":\"export\""));
    }
}
