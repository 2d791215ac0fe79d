//! PubMed linker: finds candidate publications for one trial.
//!
//! Two-phase search (high-precision trial-id lookup, heuristic metadata
//! escalation when that yields too little), then reasoner ranking with a
//! deterministic fallback scoring when the ranking fails to parse.

use crate::config::LinkingConfig;
use crate::error::SourceError;
use crate::heuristics::extract_year;
use crate::linking::records::{MATCH_TYPE_METADATA_HEURISTIC, PublicationCandidate};
use crate::prompts::AgentRole;
use crate::reasoner::{Reasoner, parse_structured};
use crate::sources::{MetadataQuery, PublicationIndex, RegistryRecord};
use crate::state::Citation;
use std::sync::Arc;
use tracing::warn;

pub struct PubmedLinker {
    publications: Arc<dyn PublicationIndex>,
    reasoner: Arc<dyn Reasoner>,
    precision_search_min: usize,
}

impl PubmedLinker {
    pub fn new(
        publications: Arc<dyn PublicationIndex>,
        reasoner: Arc<dyn Reasoner>,
        config: &LinkingConfig,
    ) -> Self {
        Self {
            publications,
            reasoner,
            precision_search_min: config.precision_search_min,
        }
    }

    /// Find and rank publications for an enriched trial record.
    pub async fn link_trial(&self, registry: &RegistryRecord) -> Vec<PublicationCandidate> {
        let nct_id = &registry.nct_id;
        if nct_id.is_empty() {
            return Vec::new();
        }

        // Phase 1: high-precision search by trial id.
        let (nct_summary, nct_citations) = self
            .search(self.publications.search_by_trial_id(nct_id).await, "trial-id");

        // Phase 2: heuristic metadata search, only when phase 1 is thin.
        let mut heuristic_summary = String::new();
        let mut heuristic_citations: Vec<Citation> = Vec::new();
        if nct_citations.len() < self.precision_search_min {
            let query = MetadataQuery {
                title: registry.title().to_string(),
                condition: registry.conditions.first().cloned().unwrap_or_default(),
                pi_name: registry.pi_name.clone(),
                completion_year: extract_year(&registry.completion_date).unwrap_or_default(),
            };
            let (summary, citations) = self.search(
                self.publications.search_by_metadata(&query).await,
                "metadata",
            );
            heuristic_summary = summary;
            heuristic_citations = citations;
        }

        let mut all_citations = nct_citations;
        all_citations.extend(heuristic_citations);
        if all_citations.is_empty() {
            return Vec::new();
        }

        let mut combined = format!("## Structured NCT Search Results\n{nct_summary}\n\n");
        if !heuristic_summary.is_empty() {
            combined.push_str(&format!(
                "## Heuristic Metadata Search Results\n{heuristic_summary}\n"
            ));
        }

        let trial_context = serde_json::json!({
            "nct_id": nct_id,
            "title": registry.brief_title,
            "official_title": registry.official_title,
            "conditions": registry.conditions,
            "pi_name": registry.pi_name,
            "sponsor": registry.sponsor,
            "completion_date": registry.completion_date,
            "status": registry.status,
        });
        let context = format!(
            "## Trial Metadata\n```json\n{}\n```\n\n## PubMed Search Results\n{combined}",
            serde_json::to_string_pretty(&trial_context).unwrap_or_default()
        );

        match self
            .reasoner
            .reason(AgentRole::PubmedLinker, &context, true)
            .await
        {
            Ok(response) => match Self::parse_candidates(&response) {
                Some(candidates) => candidates,
                None => {
                    warn!(%nct_id, "publication ranking unparsable, using raw scoring");
                    Self::fallback_candidates(nct_id, &all_citations)
                }
            },
            Err(err) => {
                warn!(%nct_id, error = %err, "publication ranking failed, using raw scoring");
                Self::fallback_candidates(nct_id, &all_citations)
            }
        }
    }

    fn search(
        &self,
        result: Result<(String, Vec<Citation>), SourceError>,
        phase: &str,
    ) -> (String, Vec<Citation>) {
        match result {
            Ok(found) => found,
            Err(err) => {
                warn!(%phase, error = %err, "publication search failed");
                (format!("**Publication search failed**: {err}"), Vec::new())
            }
        }
    }

    /// Accepts both a bare JSON array and an object with a "candidates" key.
    fn parse_candidates(response: &str) -> Option<Vec<PublicationCandidate>> {
        let value = parse_structured(response)?;
        let items = match &value {
            serde_json::Value::Array(items) => items.clone(),
            serde_json::Value::Object(map) => map.get("candidates")?.as_array()?.clone(),
            _ => return None,
        };
        let candidates: Vec<PublicationCandidate> = items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect();
        Some(candidates)
    }

    /// Raw citations with basic scoring when ranking is unavailable: a title
    /// carrying the trial id scores 40, anything else 25.
    fn fallback_candidates(nct_id: &str, citations: &[Citation]) -> Vec<PublicationCandidate> {
        let nct_upper = nct_id.to_uppercase();
        citations
            .iter()
            .take(5)
            .map(|c| PublicationCandidate {
                pmid: c.pmid.clone(),
                doi: c.doi.clone(),
                title: c.title.clone(),
                authors: c.authors.clone(),
                year: c.year.clone(),
                confidence: if c.title.to_uppercase().contains(&nct_upper) {
                    40
                } else {
                    25
                },
                match_reason: "Raw PubMed search result (ranking unavailable)".to_string(),
                match_type: MATCH_TYPE_METADATA_HEURISTIC.to_string(),
            })
            .collect()
    }
}
