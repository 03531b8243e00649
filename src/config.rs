use crate::debug::DEBUG_LOG_ENV;
use crate::error::ExportError;
use crate::geometry::{PageGeometry, ScalePolicy};
use crate::layout::EmbedFailurePolicy;
use crate::types::{Pt, Size};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PagePreset {
    A4,
    Letter,
}

impl PagePreset {
    pub fn size(&self) -> Size {
        match self {
            PagePreset::A4 => Size::a4(),
            PagePreset::Letter => Size::letter(),
        }
    }
}

/// Export settings read from a JSON file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    pub page: Option<PagePreset>,
    pub page_width: Option<f32>,
    pub page_height: Option<f32>,
    pub margin: Option<f32>,
    pub body_size: Option<f32>,
    pub title_size: Option<f32>,
    pub footer_size: Option<f32>,
    pub line_gap: Option<f32>,
    pub text_threshold: Option<f32>,
    pub image_threshold: Option<f32>,
    pub footer_threshold: Option<f32>,
    pub max_image_height: Option<f32>,
    pub allow_upscale: Option<bool>,
    pub heading: Option<String>,
    pub sample_images: Vec<String>,
    pub asset_root: Option<PathBuf>,
    pub fetch_remote: Option<bool>,
    pub skip_unembeddable_images: Option<bool>,
    pub debug_log: Option<PathBuf>,
}

impl ExportConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ExportError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ExportError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Fills `debug_log` from `DRAFT_REPORT_DEBUG_LOG` when the file left it unset.
    pub fn with_env_overrides(self) -> Self {
        self.apply_env(|key| std::env::var(key).ok())
    }

    fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if self.debug_log.is_none() {
            self.debug_log = lookup(DEBUG_LOG_ENV)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from);
        }
        self
    }

    pub fn geometry(&self) -> Result<PageGeometry, ExportError> {
        let mut geometry = PageGeometry::default();
        if let Some(preset) = self.page {
            geometry.page_size = preset.size();
        }
        match (self.page_width, self.page_height) {
            (Some(width), Some(height)) => geometry.page_size = Size::new(width, height),
            (None, None) => {}
            _ => {
                return Err(ExportError::InvalidConfiguration(
                    "page_width and page_height must be given together".to_string(),
                ));
            }
        }
        let fields = [
            (self.margin, &mut geometry.margin),
            (self.body_size, &mut geometry.body_size),
            (self.title_size, &mut geometry.title_size),
            (self.footer_size, &mut geometry.footer_size),
            (self.line_gap, &mut geometry.line_gap),
            (self.text_threshold, &mut geometry.text_threshold),
            (self.image_threshold, &mut geometry.image_threshold),
            (self.footer_threshold, &mut geometry.footer_threshold),
            (self.max_image_height, &mut geometry.max_image_height),
        ];
        for (value, slot) in fields {
            if let Some(value) = value {
                *slot = Pt::from_f32(value);
            }
        }
        if let Some(allow) = self.allow_upscale {
            geometry.scale_policy = if allow {
                ScalePolicy::AllowUpscale
            } else {
                ScalePolicy::ClampToNatural
            };
        }
        geometry.validate()?;
        Ok(geometry)
    }

    pub fn embed_failure(&self) -> EmbedFailurePolicy {
        match self.skip_unembeddable_images {
            Some(true) => EmbedFailurePolicy::Skip,
            _ => EmbedFailurePolicy::Abort,
        }
    }
}
