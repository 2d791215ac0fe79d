//! External data-source contracts.
//!
//! The core crate never talks HTTP itself. Each registry or search API is
//! abstracted behind a trait here; `bioscout-tools` provides the reqwest
//! implementations. Search methods return a rendered markdown summary next to
//! the structured records because both forms feed downstream consumers: the
//! summary goes into `api_data` and reasoner contexts, the records into
//! citations and linking.

use crate::error::SourceError;
use crate::state::Citation;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A trial as returned by a registry condition search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrialSummary {
    pub nct_id: String,
    pub title: String,
    pub trial_url: String,
    pub status: String,
    pub phase: String,
}

/// One registry-declared reference on a trial record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryReference {
    pub pmid: String,
    pub citation: String,
    /// True when the registry marks the reference as results-linked.
    pub is_result: bool,
    pub reference_type: String,
}

/// Normalized metadata for a single trial, fetched by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryRecord {
    pub nct_id: String,
    pub brief_title: String,
    pub official_title: String,
    pub conditions: Vec<String>,
    pub interventions: Vec<String>,
    pub sponsor: String,
    pub pi_name: String,
    pub start_date: String,
    pub completion_date: String,
    pub status: String,
    pub phases: Vec<String>,
    pub enrollment: String,
    pub registry_pmids: Vec<RegistryReference>,
    pub trial_url: String,
}

impl RegistryRecord {
    /// The best available title for search and display.
    pub fn title(&self) -> &str {
        if self.brief_title.is_empty() {
            &self.official_title
        } else {
            &self.brief_title
        }
    }
}

/// Inputs for the heuristic trial-metadata publication search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataQuery {
    pub title: String,
    pub condition: String,
    pub pi_name: String,
    pub completion_year: String,
}

/// A dataset record from a data repository search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetRecord {
    pub source: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub doi: String,
    #[serde(default)]
    pub description: String,
}

/// Clinical trial registry (ClinicalTrials.gov v2 in production).
#[async_trait]
pub trait TrialRegistry: Send + Sync {
    /// Search trials by condition text. Returns a rendered summary plus the
    /// structured top results.
    async fn search_trials(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<(String, Vec<TrialSummary>), SourceError>;

    /// Fetch and normalize one trial record by NCT id.
    async fn enrich_trial(&self, nct_id: &str) -> Result<RegistryRecord, SourceError>;
}

/// Biomedical publication index (PubMed E-utilities in production).
#[async_trait]
pub trait PublicationIndex: Send + Sync {
    /// Free-text search, relevance sorted.
    async fn search_publications(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<(String, Vec<Citation>), SourceError>;

    /// High-precision search by trial id (secondary-identifier field).
    async fn search_by_trial_id(&self, nct_id: &str)
    -> Result<(String, Vec<Citation>), SourceError>;

    /// Heuristic search from trial metadata when no direct id link exists.
    async fn search_by_metadata(
        &self,
        query: &MetadataQuery,
    ) -> Result<(String, Vec<Citation>), SourceError>;
}

/// Academic literature graph (Semantic Scholar in production).
#[async_trait]
pub trait LiteratureIndex: Send + Sync {
    async fn search_papers(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<(String, Vec<Citation>), SourceError>;
}

/// Open-access full-text provider (Europe PMC in production).
#[async_trait]
pub trait FullTextSource: Send + Sync {
    /// Fetch plain-text full text for a publication, `None` when only
    /// closed-access or nothing at all is available.
    async fn fetch_fulltext(
        &self,
        pmid: &str,
        doi: &str,
    ) -> Result<Option<String>, SourceError>;
}

/// Clinical dataset repositories (Zenodo and Vivli in production).
#[async_trait]
pub trait DatasetRepositories: Send + Sync {
    async fn search_datasets(
        &self,
        nct_id: &str,
        trial_title: &str,
    ) -> Result<Vec<DatasetRecord>, SourceError>;
}
