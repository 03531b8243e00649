use crate::error::ExportError;
use crate::record::{
    AI_NOTE, FINDINGS, IMPRESSION, LIMITATIONS, RECOMMENDATIONS, ReportRecord, ReportSection,
    SUMMARY, TAGS, TECHNIQUE,
};
use serde::{Deserialize, Serialize};

/// A report as the data store persists it (camelCase JSON, every text field optional).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReport {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub image_data_url: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub findings: Option<String>,
    #[serde(default)]
    pub impression: Option<String>,
    #[serde(default)]
    pub recommendations: Option<String>,
    #[serde(default)]
    pub technique: Option<String>,
    #[serde(default)]
    pub limitations: Option<String>,
    #[serde(default)]
    pub ai_note: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub disclaimer: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<StoredReport>),
    One(Box<StoredReport>),
}

/// Parses either a single stored report or an array of them.
pub fn load_stored_reports(raw: &str) -> Result<Vec<StoredReport>, ExportError> {
    let parsed: OneOrMany = serde_json::from_str(raw)
        .map_err(|err| ExportError::InvalidReport(format!("cannot parse stored report: {err}")))?;
    Ok(match parsed {
        OneOrMany::Many(reports) => reports,
        OneOrMany::One(report) => vec![*report],
    })
}

impl StoredReport {
    /// Sections in the fixed declared order. Empty ones are kept so layout can skip them.
    pub fn sections(&self) -> Vec<ReportSection> {
        let tags = if self.tags.is_empty() {
            None
        } else {
            Some(self.tags.join(", "))
        };
        [
            (SUMMARY, self.summary.clone()),
            (FINDINGS, self.findings.clone()),
            (IMPRESSION, self.impression.clone()),
            (RECOMMENDATIONS, self.recommendations.clone()),
            (TECHNIQUE, self.technique.clone()),
            (LIMITATIONS, self.limitations.clone()),
            (AI_NOTE, self.ai_note.clone()),
            (TAGS, tags),
        ]
        .into_iter()
        .map(|(label, body)| ReportSection {
            label: label.to_string(),
            body,
        })
        .collect()
    }

    pub fn to_record(&self) -> ReportRecord {
        ReportRecord {
            id: self.id.clone(),
            title: self.title.clone(),
            patient_name: self.patient_name.clone(),
            images: self.images.clone(),
            image_data_url: self.image_data_url.clone(),
            sections: self.sections(),
            disclaimer: self.disclaimer.clone(),
        }
    }
}

impl From<StoredReport> for ReportRecord {
    fn from(stored: StoredReport) -> Self {
        stored.to_record()
    }
}
