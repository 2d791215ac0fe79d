//! Scout steps: clinical trials and academic literature.
//!
//! Each scout fetches raw data from its sources, stores the rendered text in
//! `api_data`, records structured citations, and logs a reasoner analysis of
//! the raw data. Source failures degrade to explanatory text so the pipeline
//! keeps moving; only a reasoner failure aborts.

use crate::config::BioscoutConfig;
use crate::error::PipelineError;
use crate::pipeline::PipelineStep;
use crate::prompts::AgentRole;
use crate::reasoner::Reasoner;
use crate::sources::{LiteratureIndex, PublicationIndex, TrialRegistry, TrialSummary};
use crate::state::{Citation, CitationKind, PipelineState, StateUpdate};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Fetches the clinical trial landscape and analyzes it.
pub struct TrialsScout {
    registry: Arc<dyn TrialRegistry>,
    reasoner: Arc<dyn Reasoner>,
    max_trials: usize,
}

impl TrialsScout {
    pub fn new(
        registry: Arc<dyn TrialRegistry>,
        reasoner: Arc<dyn Reasoner>,
        config: &BioscoutConfig,
    ) -> Self {
        Self {
            registry,
            reasoner,
            max_trials: config.pipeline.max_trials,
        }
    }

    fn trial_citations(trials: &[TrialSummary]) -> Vec<Citation> {
        trials
            .iter()
            .enumerate()
            .map(|(idx, trial)| Citation {
                id: format!("ct-{}", idx + 1),
                kind: CitationKind::ClinicalTrial,
                title: trial.title.clone(),
                authors: String::new(),
                year: String::new(),
                journal: String::new(),
                url: trial.trial_url.clone(),
                pmid: String::new(),
                doi: String::new(),
                nct_id: trial.nct_id.clone(),
                source_agent: AgentRole::TrialsScout.display_name().to_string(),
            })
            .collect()
    }
}

#[async_trait]
impl PipelineStep for TrialsScout {
    fn name(&self) -> &'static str {
        "fetch-trials"
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, PipelineError> {
        let query = state
            .search_criteria
            .as_ref()
            .map(|c| c.query_for("trials", &state.target))
            .unwrap_or(&state.target);

        let (raw_trials, trials) = match self.registry.search_trials(query, self.max_trials).await
        {
            Ok(result) => result,
            Err(err) => {
                warn!(%query, error = %err, "trial registry search failed");
                (
                    format!("**Clinical trial search failed for '{query}'**: {err}"),
                    Vec::new(),
                )
            }
        };

        let context = format!(
            "Target: {}\n\nClinical trial data:\n{raw_trials}",
            state.target
        );
        let analysis = self
            .reasoner
            .reason(AgentRole::TrialsScout, &context, false)
            .await
            .map_err(|source| PipelineError::ReasonerFailed {
                step: self.name().to_string(),
                source,
            })?;

        let mut update = StateUpdate::log_entry(AgentRole::TrialsScout, analysis);
        update.api_data = BTreeMap::from([("trials".to_string(), raw_trials)]);
        update.citations = Self::trial_citations(&trials);
        Ok(update)
    }
}

/// Fetches PubMed and Semantic Scholar literature concurrently and
/// analyzes the combined result.
pub struct LiteratureMiner {
    publications: Arc<dyn PublicationIndex>,
    literature: Arc<dyn LiteratureIndex>,
    reasoner: Arc<dyn Reasoner>,
    max_papers: usize,
}

impl LiteratureMiner {
    pub fn new(
        publications: Arc<dyn PublicationIndex>,
        literature: Arc<dyn LiteratureIndex>,
        reasoner: Arc<dyn Reasoner>,
        config: &BioscoutConfig,
    ) -> Self {
        Self {
            publications,
            literature,
            reasoner,
            max_papers: config.pipeline.max_papers,
        }
    }
}

#[async_trait]
impl PipelineStep for LiteratureMiner {
    fn name(&self) -> &'static str {
        "fetch-literature"
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, PipelineError> {
        let pubmed_query = state
            .search_criteria
            .as_ref()
            .map(|c| c.query_for("pubmed", &state.target))
            .unwrap_or(&state.target);
        let semantic_query = state
            .search_criteria
            .as_ref()
            .map(|c| c.query_for("semantic", &state.target))
            .unwrap_or(&state.target);

        let (pubmed_result, semantic_result) = tokio::join!(
            self.publications
                .search_publications(pubmed_query, self.max_papers),
            self.literature.search_papers(semantic_query, self.max_papers),
        );

        let (pubmed_text, mut citations) = match pubmed_result {
            Ok(result) => result,
            Err(err) => {
                warn!(query = %pubmed_query, error = %err, "publication search failed");
                (format!("**PubMed search failed**: {err}"), Vec::new())
            }
        };
        let (semantic_text, semantic_citations) = match semantic_result {
            Ok(result) => result,
            Err(err) => {
                warn!(query = %semantic_query, error = %err, "literature search failed");
                (
                    format!("**Semantic Scholar search failed**: {err}"),
                    Vec::new(),
                )
            }
        };
        citations.extend(semantic_citations);

        let combined = format!(
            "## PubMed Results\n{pubmed_text}\n\n## Semantic Scholar Results\n{semantic_text}"
        );

        let context = format!(
            "Target: {}\n\nAcademic literature data:\n{combined}",
            state.target
        );
        let analysis = self
            .reasoner
            .reason(AgentRole::LiteratureMiner, &context, false)
            .await
            .map_err(|source| PipelineError::ReasonerFailed {
                step: self.name().to_string(),
                source,
            })?;

        let mut update = StateUpdate::log_entry(AgentRole::LiteratureMiner, analysis);
        update.api_data = BTreeMap::from([
            ("pubmed".to_string(), pubmed_text),
            ("semantic".to_string(), semantic_text),
            ("papers".to_string(), combined),
        ]);
        update.citations = citations;
        Ok(update)
    }
}
