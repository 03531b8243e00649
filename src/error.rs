use crate::assets::ImageFormat;
use std::io;
use thiserror::Error;

/// Terminal failure of one export request. Nothing is delivered when this is returned.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("invalid report: {0}")]
    InvalidReport(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("image {position} could not be embedded")]
    ImageEmbed {
        position: usize,
        #[source]
        source: BuilderError,
    },
    #[error("document could not be serialized")]
    Serialization(#[source] BuilderError),
    #[error("document could not be delivered")]
    Delivery(#[source] io::Error),
    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl ExportError {
    /// Message safe to show to an end user; the technical cause stays in logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            ExportError::Delivery(_) => "Couldn't save the PDF. Please try again.",
            _ => "Couldn't export the PDF. Please try again.",
        }
    }
}

/// Failure of the document-building capability.
#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("cannot decode {format} image: {message}")]
    ImageDecode {
        format: ImageFormat,
        message: String,
    },
    #[error("image has zero width or height")]
    EmptyImage,
    #[error("document has no pages")]
    NoPages,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// A single image reference could not be turned into bytes. Never fatal.
#[derive(Debug, Error)]
pub enum ImageAcquisitionError {
    #[error("malformed inline image: {0}")]
    MalformedInline(String),
    #[error("inline image is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("image source is empty")]
    Empty,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to read {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to fetch {location}: {message}")]
    Http { location: String, message: String },
    #[error("no asset named {0}")]
    NotFound(String),
    #[error("unsupported image location: {0}")]
    Unsupported(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn embed_error_keeps_builder_cause() {
        let err = ExportError::ImageEmbed {
            position: 2,
            source: BuilderError::ImageDecode {
                format: ImageFormat::Png,
                message: "bad signature".to_string(),
            },
        };
        assert_eq!(err.to_string(), "image 2 could not be embedded");
        let cause = err.source().map(|s| s.to_string()).unwrap_or_default();
        assert_eq!(cause, "cannot decode png image: bad signature");
        assert_eq!(err.user_message(), "Couldn't export the PDF. Please try again.");
    }

    #[test]
    fn fetch_errors_are_transparent_through_acquisition() {
        let err: ImageAcquisitionError = FetchError::NotFound("/placeholder.jpg".into()).into();
        assert_eq!(err.to_string(), "no asset named /placeholder.jpg");
    }
}
