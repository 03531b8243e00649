use crate::debug::DebugLogger;
use crate::error::{FetchError, ImageAcquisitionError};
use base64::Engine;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Raster encodings the report can embed. `Png` is the lossless one, `Jpeg` the lossy default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
        }
    }

    pub fn from_media_type(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_ascii_lowercase();
        if raw.contains("png") {
            Some(ImageFormat::Png)
        } else if raw.contains("jpeg") || raw.contains("jpg") {
            Some(ImageFormat::Jpeg)
        } else {
            None
        }
    }

    pub fn from_location(location: &str) -> Option<Self> {
        let path = location
            .split(['?', '#'])
            .next()
            .unwrap_or(location)
            .to_ascii_lowercase();
        if path.ends_with(".png") {
            Some(ImageFormat::Png)
        } else if path.ends_with(".jpg") || path.ends_with(".jpeg") {
            Some(ImageFormat::Jpeg)
        } else {
            None
        }
    }

    pub(crate) fn image_format(self) -> image::ImageFormat {
        match self {
            ImageFormat::Png => image::ImageFormat::Png,
            ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageReference {
    /// A `data:` URI. `payload` is `None` when the URI has no `,` separator.
    Inline {
        media_type: String,
        base64: bool,
        payload: Option<String>,
    },
    /// A filesystem path, a site-relative asset path, or an http(s) URL.
    Location(String),
}

impl ImageReference {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let Some(rest) = raw.strip_prefix("data:") else {
            return Some(ImageReference::Location(raw.to_string()));
        };
        let (header, payload) = match rest.split_once(',') {
            Some((header, payload)) => (header, Some(payload.to_string())),
            None => (rest, None),
        };
        let mut params = header.split(';');
        let media_type = params.next().unwrap_or_default().trim().to_string();
        let base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));
        Some(ImageReference::Inline {
            media_type,
            base64,
            payload,
        })
    }

    /// Media type first, then the location suffix, then lossy by default.
    pub fn format_hint(&self) -> ImageFormat {
        let sniffed = match self {
            ImageReference::Inline { media_type, .. } => ImageFormat::from_media_type(media_type),
            ImageReference::Location(location) => ImageFormat::from_location(location),
        };
        sniffed.unwrap_or(ImageFormat::Jpeg)
    }

    pub fn describe(&self) -> String {
        match self {
            ImageReference::Inline {
                media_type,
                payload,
                ..
            } => format!(
                "data:{} ({} chars)",
                media_type,
                payload.as_ref().map(|p| p.len()).unwrap_or(0)
            ),
            ImageReference::Location(location) => location.clone(),
        }
    }
}

/// Raw encoded bytes ready to hand to a document builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Index in the deduplicated reference list.
    pub position: usize,
    pub source: String,
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct SkippedImage {
    pub position: usize,
    pub reference: String,
    pub error: ImageAcquisitionError,
}

#[derive(Debug, Default)]
pub struct ResolvedImages {
    pub images: Vec<DecodedImage>,
    pub skipped: Vec<SkippedImage>,
}

/// Drops blank entries and repeats, keeping first-seen order.
pub fn normalize_references<I, S>(references: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for reference in references {
        let reference = reference.as_ref().trim();
        if reference.is_empty() || !seen.insert(reference.to_string()) {
            continue;
        }
        out.push(reference.to_string());
    }
    out
}

/// Sample images, then the record's own list, then the legacy single-image field.
pub fn collect_image_references(
    defaults: &[String],
    images: &[String],
    legacy: Option<&str>,
) -> Vec<String> {
    normalize_references(
        defaults
            .iter()
            .map(String::as_str)
            .chain(images.iter().map(String::as_str))
            .chain(legacy),
    )
}

pub trait AssetFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError>;
}

impl<T: AssetFetcher + ?Sized> AssetFetcher for &T {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        (**self).fetch(location)
    }
}

impl<T: AssetFetcher + ?Sized> AssetFetcher for Box<T> {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        (**self).fetch(location)
    }
}

#[derive(Debug, Clone)]
pub struct Asset {
    pub name: String,
    pub data: Vec<u8>,
}

impl Asset {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// In-memory assets addressed by their exact location string.
#[derive(Debug, Clone, Default)]
pub struct AssetBundle {
    assets: Vec<Asset>,
}

impl AssetBundle {
    pub fn add(&mut self, asset: Asset) {
        if let Some(existing) = self.assets.iter_mut().find(|a| a.name == asset.name) {
            *existing = asset;
        } else {
            self.assets.push(asset);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Asset> {
        self.assets.iter().find(|asset| asset.name == name)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

impl AssetFetcher for AssetBundle {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        self.get(location)
            .map(|asset| asset.data.clone())
            .ok_or_else(|| FetchError::NotFound(location.to_string()))
    }
}

/// Reads local files. Site-relative paths (`/placeholder.jpg`) resolve under `root` when set.
#[derive(Debug, Clone, Default)]
pub struct FileFetcher {
    root: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn resolve_path(&self, location: &str) -> PathBuf {
        let location = location.strip_prefix("file://").unwrap_or(location);
        match &self.root {
            Some(root) => root.join(location.trim_start_matches('/')),
            None => Path::new(location).to_path_buf(),
        }
    }
}

impl AssetFetcher for FileFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        let path = self.resolve_path(location);
        std::fs::read(&path).map_err(|source| FetchError::Io {
            location: location.to_string(),
            source,
        })
    }
}

#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|err| FetchError::Http {
                location: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
impl AssetFetcher for HttpFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        let http_err = |err: reqwest::Error| FetchError::Http {
            location: location.to_string(),
            message: err.to_string(),
        };
        let response = self
            .client
            .get(location)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(http_err)?;
        let bytes = response.bytes().map_err(http_err)?;
        Ok(bytes.to_vec())
    }
}

fn is_remote(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Bundle first, then http(s) for URLs, then the filesystem.
#[derive(Debug, Clone, Default)]
pub struct DefaultFetcher {
    bundle: AssetBundle,
    files: FileFetcher,
    #[cfg(feature = "http")]
    http: Option<HttpFetcher>,
}

impl DefaultFetcher {
    pub fn new(bundle: AssetBundle, files: FileFetcher) -> Self {
        Self {
            bundle,
            files,
            #[cfg(feature = "http")]
            http: None,
        }
    }

    #[cfg(feature = "http")]
    pub fn with_http(mut self, http: HttpFetcher) -> Self {
        self.http = Some(http);
        self
    }
}

impl AssetFetcher for DefaultFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        if let Some(asset) = self.bundle.get(location) {
            return Ok(asset.data.clone());
        }
        if is_remote(location) {
            #[cfg(feature = "http")]
            if let Some(http) = &self.http {
                return http.fetch(location);
            }
            return Err(FetchError::Unsupported(location.to_string()));
        }
        self.files.fetch(location)
    }
}

pub struct ImageResolver<'a> {
    fetcher: &'a dyn AssetFetcher,
    debug: Option<Arc<DebugLogger>>,
}

impl<'a> ImageResolver<'a> {
    pub fn new(fetcher: &'a dyn AssetFetcher) -> Self {
        Self {
            fetcher,
            debug: None,
        }
    }

    pub(crate) fn with_debug(mut self, debug: Option<Arc<DebugLogger>>) -> Self {
        self.debug = debug;
        self
    }

    /// Acquires every reference in order. Failures are recorded and skipped, never raised.
    pub fn resolve<S: AsRef<str>>(&self, references: &[S]) -> ResolvedImages {
        let mut resolved = ResolvedImages::default();
        let references = normalize_references(references.iter().map(|r| r.as_ref()));
        for (position, raw) in references.iter().enumerate() {
            let Some(reference) = ImageReference::parse(raw) else {
                continue;
            };
            match self.acquire(&reference) {
                Ok(bytes) => resolved.images.push(DecodedImage {
                    position,
                    source: reference.describe(),
                    format: reference.format_hint(),
                    bytes,
                }),
                Err(error) => {
                    let description = reference.describe();
                    tracing::warn!(position, reference = %description, %error, "skipping report image");
                    if let Some(logger) = self.debug.as_deref() {
                        logger.event(
                            "resolve.image_skipped",
                            serde_json::json!({
                                "position": position,
                                "reference": description,
                                "error": error.to_string(),
                            }),
                        );
                        logger.increment("resolve.image_skipped", 1);
                    }
                    resolved.skipped.push(SkippedImage {
                        position,
                        reference: description,
                        error,
                    });
                }
            }
        }
        resolved
    }

    fn acquire(&self, reference: &ImageReference) -> Result<Vec<u8>, ImageAcquisitionError> {
        let bytes = match reference {
            ImageReference::Inline {
                payload: None, ..
            } => {
                return Err(ImageAcquisitionError::MalformedInline(
                    "missing ',' before payload".to_string(),
                ));
            }
            ImageReference::Inline {
                base64: true,
                payload: Some(payload),
                ..
            } => {
                let compact: String = payload.split_whitespace().collect();
                base64::engine::general_purpose::STANDARD.decode(compact)?
            }
            ImageReference::Inline {
                base64: false,
                payload: Some(payload),
                ..
            } => urlencoding::decode_binary(payload.as_bytes()).into_owned(),
            ImageReference::Location(location) => self.fetcher.fetch(location)?,
        };
        if bytes.is_empty() {
            return Err(ImageAcquisitionError::Empty);
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_uri(media: &str, bytes: &[u8]) -> String {
        format!(
            "data:{media};base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }

    #[test]
    fn format_hint_prefers_media_type_then_suffix_then_lossy() {
        let png = ImageReference::parse("data:image/png;base64,AAAA").unwrap();
        assert_eq!(png.format_hint(), ImageFormat::Png);
        let webp = ImageReference::parse("data:image/webp;base64,AAAA").unwrap();
        assert_eq!(webp.format_hint(), ImageFormat::Jpeg);
        let path = ImageReference::parse("/studies/chest.PNG?v=2").unwrap();
        assert_eq!(path.format_hint(), ImageFormat::Png);
        let plain = ImageReference::parse("/placeholder").unwrap();
        assert_eq!(plain.format_hint(), ImageFormat::Jpeg);
    }

    #[test]
    fn parse_rejects_blank_and_flags_missing_payload() {
        assert_eq!(ImageReference::parse("   "), None);
        let broken = ImageReference::parse("data:image/png;base64").unwrap();
        assert!(matches!(
            broken,
            ImageReference::Inline { payload: None, base64: true, .. }
        ));
    }

    #[test]
    fn collect_concatenates_defaults_images_and_legacy_without_repeats() {
        let defaults = vec!["/sample.jpg".to_string()];
        let images = vec![
            "a.png".to_string(),
            "".to_string(),
            "/sample.jpg".to_string(),
            "b.jpg".to_string(),
        ];
        let refs = collect_image_references(&defaults, &images, Some("a.png"));
        assert_eq!(refs, vec!["/sample.jpg", "a.png", "b.jpg"]);
    }

    #[test]
    fn resolve_keeps_order_and_skips_failures() {
        let mut bundle = AssetBundle::default();
        bundle.add(Asset::new("/one.jpg", vec![1, 2, 3]));
        bundle.add(Asset::new("/three.png", vec![7, 8]));
        let refs = vec![
            "/one.jpg".to_string(),
            "/missing.jpg".to_string(),
            "/three.png".to_string(),
            data_uri("image/png", &[9, 9, 9]),
        ];
        let resolver = ImageResolver::new(&bundle);
        let resolved = resolver.resolve(&refs);

        let positions: Vec<usize> = resolved.images.iter().map(|i| i.position).collect();
        assert_eq!(positions, vec![0, 2, 3]);
        assert_eq!(resolved.images[0].bytes, vec![1, 2, 3]);
        assert_eq!(resolved.images[1].format, ImageFormat::Png);
        assert_eq!(resolved.images[2].bytes, vec![9, 9, 9]);
        assert_eq!(resolved.skipped.len(), 1);
        assert_eq!(resolved.skipped[0].position, 1);
        assert!(matches!(
            resolved.skipped[0].error,
            ImageAcquisitionError::Fetch(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn invalid_base64_is_a_skipped_image_not_a_failure() {
        let bundle = AssetBundle::default();
        let resolved =
            ImageResolver::new(&bundle).resolve(&["data:image/png;base64,@@not-base64@@"]);
        assert!(resolved.images.is_empty());
        assert!(matches!(
            resolved.skipped[0].error,
            ImageAcquisitionError::Base64(_)
        ));
    }

    #[test]
    fn plain_inline_payload_is_percent_decoded() {
        let bundle = AssetBundle::default();
        let resolved = ImageResolver::new(&bundle).resolve(&["data:image/png,%89PNG%0D%0A"]);
        assert!(resolved.skipped.is_empty());
        assert_eq!(resolved.images[0].bytes, vec![0x89, b'P', b'N', b'G', b'\r', b'\n']);
        assert_eq!(resolved.images[0].format, ImageFormat::Png);
    }

    #[test]
    fn file_fetcher_resolves_site_paths_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("placeholder.jpg"), b"jpeg-bytes").unwrap();
        let fetcher = FileFetcher::with_root(dir.path());
        assert_eq!(fetcher.fetch("/placeholder.jpg").unwrap(), b"jpeg-bytes");
        assert!(matches!(
            fetcher.fetch("/absent.jpg"),
            Err(FetchError::Io { .. })
        ));
    }

    #[test]
    fn default_fetcher_prefers_bundle_and_refuses_urls_without_http() {
        let mut bundle = AssetBundle::default();
        bundle.add(Asset::new("https://cdn.example/x.png", vec![5]));
        let fetcher = DefaultFetcher::new(bundle, FileFetcher::new());
        assert_eq!(fetcher.fetch("https://cdn.example/x.png").unwrap(), vec![5]);
        assert!(matches!(
            fetcher.fetch("https://cdn.example/y.png"),
            Err(FetchError::Unsupported(_))
        ));
    }
}
