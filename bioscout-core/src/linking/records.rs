//! Record types for the trial-to-publication linking pipeline.

use crate::sources::{DatasetRecord, RegistryRecord};
use serde::{Deserialize, Serialize};

/// How a publication candidate was matched to its trial.
pub const MATCH_TYPE_NCT_DIRECT: &str = "nct_direct";
pub const MATCH_TYPE_METADATA_HEURISTIC: &str = "metadata_heuristic";

/// A ranked candidate publication for one trial.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PublicationCandidate {
    pub pmid: String,
    pub doi: String,
    pub title: String,
    pub authors: String,
    pub year: String,
    /// Match confidence, 0-100.
    pub confidence: u8,
    pub match_reason: String,
    pub match_type: String,
}

/// Data-availability classification for one publication, ordered by
/// precedence: open access beats on-request beats restricted beats
/// not-stated.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DataAvailability {
    OpenAccess,
    OnRequest,
    Restricted,
    #[default]
    NotStated,
}

impl DataAvailability {
    /// Human-readable label used in reports and the final trial link.
    pub fn label(&self) -> &'static str {
        match self {
            DataAvailability::OpenAccess => "Open-access data available",
            DataAvailability::OnRequest => "Data available on request",
            DataAvailability::Restricted => "Restricted access data",
            DataAvailability::NotStated => "No data availability information found",
        }
    }

    /// Parse a reasoner-supplied type string, defaulting to not-stated.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "open_access" => DataAvailability::OpenAccess,
            "on_request" => DataAvailability::OnRequest,
            "restricted" => DataAvailability::Restricted,
            _ => DataAvailability::NotStated,
        }
    }

    /// The highest-precedence availability across a trial's publications.
    pub fn summarize<'a>(values: impl IntoIterator<Item = &'a DataAvailability>) -> Self {
        values
            .into_iter()
            .copied()
            .min()
            .unwrap_or(DataAvailability::NotStated)
    }
}

/// Full-text findings for one candidate publication.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FulltextRecord {
    pub pmid: String,
    pub doi: String,
    /// Whether the trial's NCT id appears verbatim in the full text.
    pub nct_mentioned: bool,
    pub fulltext_available: bool,
    pub availability: DataAvailability,
    pub statement_snippet: String,
    pub repository_urls: Vec<String>,
    pub repository_names: Vec<String>,
    pub supplementary_urls: Vec<String>,
    pub notes: String,
}

/// Everything gathered for one trial before validation. Created per NCT id
/// at orchestration start and enriched in place across the stages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialLinkRecord {
    pub nct_id: String,
    pub registry: RegistryRecord,
    pub pubmed_candidates: Vec<PublicationCandidate>,
    pub fulltext_data: Vec<FulltextRecord>,
    pub repository_hits: Vec<DatasetRecord>,
}

/// Confidence bucket for a validated publication link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
        }
    }
}

impl Default for ConfidenceTier {
    fn default() -> Self {
        ConfidenceTier::Low
    }
}

/// A validated publication attached to a trial.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkedPublication {
    pub pmid: String,
    pub title: String,
    pub authors: String,
    pub year: String,
    pub url: String,
    pub confidence_tier: ConfidenceTier,
    pub confidence_score: u8,
    pub match_reason: String,
}

/// The final per-trial linking result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialLink {
    pub nct_id: String,
    pub trial_title: String,
    pub trial_url: String,
    pub publications: Vec<LinkedPublication>,
    pub datasets: Vec<DatasetRecord>,
    /// Human-readable availability label (see [`DataAvailability::label`]).
    pub data_availability: String,
}

/// Validator output: the complete linking payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatedLinks {
    pub trial_links: Vec<TrialLink>,
    pub summary: String,
}
