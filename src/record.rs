use crate::assets::collect_image_references;
use crate::error::ExportError;
use serde::{Deserialize, Serialize};

pub const TITLE_LABEL: &str = "TITLE";
pub const PATIENT_LABEL: &str = "PATIENT";
pub const REPORT_ID_LABEL: &str = "REPORT ID";

pub const TITLE_PLACEHOLDER: &str = "-";
pub const PATIENT_PLACEHOLDER: &str = "Unknown";

pub const SUMMARY: &str = "SUMMARY";
pub const FINDINGS: &str = "FINDINGS";
pub const IMPRESSION: &str = "IMPRESSION";
pub const RECOMMENDATIONS: &str = "RECOMMENDATIONS";
pub const TECHNIQUE: &str = "TECHNIQUE";
pub const LIMITATIONS: &str = "LIMITATIONS";
pub const AI_NOTE: &str = "AI NOTE";
pub const TAGS: &str = "TAGS";

/// Declared order of the standard report sections.
pub const SECTION_ORDER: [&str; 8] = [
    SUMMARY,
    FINDINGS,
    IMPRESSION,
    RECOMMENDATIONS,
    TECHNIQUE,
    LIMITATIONS,
    AI_NOTE,
    TAGS,
];

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReportSection {
    pub label: String,
    #[serde(default)]
    pub body: Option<String>,
}

impl ReportSection {
    pub fn new(label: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            body: Some(body.into()),
        }
    }

    pub fn empty(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            body: None,
        }
    }

    /// Non-blank body text, if any.
    pub fn text(&self) -> Option<&str> {
        self.body.as_deref().filter(|body| !body.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.text().is_none()
    }
}

/// One draft report as handed to the exporter. Read-only for the whole export.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    /// Single-image field kept by older records; appended after `images`.
    #[serde(default)]
    pub image_data_url: Option<String>,
    #[serde(default)]
    pub sections: Vec<ReportSection>,
    #[serde(default)]
    pub disclaimer: Option<String>,
}

impl ReportRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_patient_name(mut self, name: impl Into<String>) -> Self {
        self.patient_name = Some(name.into());
        self
    }

    pub fn with_image(mut self, reference: impl Into<String>) -> Self {
        self.images.push(reference.into());
        self
    }

    pub fn with_legacy_image(mut self, reference: impl Into<String>) -> Self {
        self.image_data_url = Some(reference.into());
        self
    }

    pub fn with_section(mut self, label: impl Into<String>, body: impl Into<String>) -> Self {
        self.sections.push(ReportSection::new(label, body));
        self
    }

    pub fn with_disclaimer(mut self, disclaimer: impl Into<String>) -> Self {
        self.disclaimer = Some(disclaimer.into());
        self
    }

    pub fn validate(&self) -> Result<(), ExportError> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(ExportError::InvalidReport(
                "report has no identifier".to_string(),
            ));
        }
        // The id becomes part of the delivered file name.
        let path_like = id == "." || id == "..";
        if path_like || id.chars().any(|c| matches!(c, '/' | '\\') || c.is_control()) {
            return Err(ExportError::InvalidReport(format!(
                "report identifier {id:?} cannot be used in a file name"
            )));
        }
        Ok(())
    }

    pub fn display_title(&self) -> &str {
        non_blank(self.title.as_deref()).unwrap_or(TITLE_PLACEHOLDER)
    }

    pub fn display_patient(&self) -> &str {
        non_blank(self.patient_name.as_deref()).unwrap_or(PATIENT_PLACEHOLDER)
    }

    pub fn disclaimer_text(&self) -> Option<&str> {
        non_blank(self.disclaimer.as_deref())
    }

    /// Sections with a body, in record order.
    pub fn rendered_sections(&self) -> impl Iterator<Item = &ReportSection> {
        self.sections.iter().filter(|section| !section.is_empty())
    }

    /// `defaults`, then `images`, then the legacy field; deduplicated.
    pub fn image_references(&self, defaults: &[String]) -> Vec<String> {
        collect_image_references(defaults, &self.images, self.image_data_url.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
