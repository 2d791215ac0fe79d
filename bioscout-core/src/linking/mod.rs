//! Trial-to-publication linking pipeline.
//!
//! Orchestrates registry enrichment, per-trial publication and dataset
//! discovery, bounded full-text extraction, and validation into the final
//! confidence-tiered payload. Stages run strictly in order; the work inside
//! each stage fans out and rejoins before the next stage starts.

pub mod fulltext;
pub mod pubmed_linker;
pub mod records;
pub mod validator;

pub use fulltext::FulltextExtractor;
pub use pubmed_linker::PubmedLinker;
pub use records::{
    ConfidenceTier, DataAvailability, FulltextRecord, LinkedPublication, PublicationCandidate,
    TrialLink, TrialLinkRecord, ValidatedLinks,
};
pub use validator::{LinkValidator, render_markdown};

use crate::config::BioscoutConfig;
use crate::error::PipelineError;
use crate::events::LinkingEvent;
use crate::reasoner::Reasoner;
use crate::sources::{
    DatasetRepositories, FullTextSource, PublicationIndex, RegistryRecord, TrialRegistry,
};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tracing::{info, warn};

/// External collaborators the linking pipeline needs.
#[derive(Clone)]
pub struct LinkingDeps {
    pub reasoner: Arc<dyn Reasoner>,
    pub registry: Arc<dyn TrialRegistry>,
    pub publications: Arc<dyn PublicationIndex>,
    pub fulltext: Arc<dyn FullTextSource>,
    pub repositories: Arc<dyn DatasetRepositories>,
}

/// The final outcome of a linking run.
#[derive(Debug, Clone)]
pub struct LinkingOutcome {
    pub validated: ValidatedLinks,
    /// Rendered tabular report.
    pub markdown: String,
    /// Enrichment calls that errored and were dropped from the valid set.
    pub dropped_trials: usize,
}

pub struct LinkingOrchestrator {
    registry: Arc<dyn TrialRegistry>,
    repositories: Arc<dyn DatasetRepositories>,
    linker: PubmedLinker,
    extractor: FulltextExtractor,
    validator: LinkValidator,
    max_trials: usize,
    fulltext_concurrency: usize,
}

impl LinkingOrchestrator {
    pub fn new(deps: LinkingDeps, config: &BioscoutConfig) -> Self {
        Self {
            registry: deps.registry,
            repositories: deps.repositories,
            linker: PubmedLinker::new(deps.publications, deps.reasoner.clone(), &config.linking),
            extractor: FulltextExtractor::new(deps.fulltext, deps.reasoner.clone(), &config.linking),
            validator: LinkValidator::new(deps.reasoner, &config.linking),
            max_trials: config.linking.max_trials,
            fulltext_concurrency: config.linking.fulltext_concurrency,
        }
    }

    /// Run the whole linking pipeline without a progress stream.
    pub async fn run(
        &self,
        target: &str,
        nct_ids: Option<Vec<String>>,
    ) -> Result<LinkingOutcome, PipelineError> {
        self.execute(target, nct_ids, None).await
    }

    /// Run the pipeline, emitting progress events. The stream always ends
    /// with `Done`; fatal failures produce a single terminal `Error` first.
    pub async fn run_streaming(
        &self,
        target: &str,
        nct_ids: Option<Vec<String>>,
        events: mpsc::Sender<LinkingEvent>,
    ) {
        match self.execute(target, nct_ids, Some(&events)).await {
            Ok(outcome) => {
                let _ = events
                    .send(LinkingEvent::Result {
                        message: outcome.markdown,
                    })
                    .await;
            }
            Err(err) => {
                let _ = events
                    .send(LinkingEvent::Error {
                        message: err.to_string(),
                    })
                    .await;
            }
        }
        let _ = events.send(LinkingEvent::Done).await;
    }

    async fn execute(
        &self,
        target: &str,
        nct_ids: Option<Vec<String>>,
        events: Option<&mpsc::Sender<LinkingEvent>>,
    ) -> Result<LinkingOutcome, PipelineError> {
        // Stage 1: determine the trial id set.
        let nct_ids = match nct_ids {
            Some(ids) => {
                let ids: Vec<String> = ids
                    .into_iter()
                    .filter(|id| !id.is_empty())
                    .take(self.max_trials)
                    .collect();
                emit(
                    events,
                    LinkingEvent::Status {
                        message: format!("Using {} trials from research results...", ids.len()),
                    },
                )
                .await;
                ids
            }
            None => {
                emit(
                    events,
                    LinkingEvent::Status {
                        message: format!("Searching trial registry for '{target}'..."),
                    },
                )
                .await;
                let trials = match self.registry.search_trials(target, self.max_trials).await {
                    Ok((_, trials)) => trials,
                    Err(err) => {
                        return Err(PipelineError::StepFailed {
                            step: "trial-search".to_string(),
                            message: format!("Failed to fetch trials: {err}"),
                        });
                    }
                };
                trials
                    .into_iter()
                    .map(|t| t.nct_id)
                    .filter(|id| !id.is_empty())
                    .take(self.max_trials)
                    .collect()
            }
        };

        if nct_ids.is_empty() {
            // Short-circuit: the caller gets one result and no enrichment
            // ever runs.
            let message = format!("No clinical trials found for '{target}'.");
            return Ok(LinkingOutcome {
                validated: ValidatedLinks {
                    trial_links: Vec::new(),
                    summary: message.clone(),
                },
                markdown: message,
                dropped_trials: 0,
            });
        }

        // Stage 2: registry enrichment fan-out. Errored records are dropped
        // from the valid set and counted, never aborting the run.
        emit(
            events,
            LinkingEvent::Agent {
                agent: "Registry Enricher".to_string(),
                message: format!("Enriching {} trial records...", nct_ids.len()),
            },
        )
        .await;

        let enrichments = join_all(
            nct_ids
                .iter()
                .map(|nct_id| self.registry.enrich_trial(nct_id)),
        )
        .await;
        let mut valid_records: Vec<RegistryRecord> = Vec::new();
        let mut dropped_trials = 0usize;
        for (nct_id, result) in nct_ids.iter().zip(enrichments) {
            match result {
                Ok(record) => valid_records.push(record),
                Err(err) => {
                    warn!(%nct_id, error = %err, "enrichment failed, dropping trial");
                    dropped_trials += 1;
                }
            }
        }

        let registry_refs: usize = valid_records.iter().map(|r| r.registry_pmids.len()).sum();
        emit(
            events,
            LinkingEvent::Agent {
                agent: "Registry Enricher".to_string(),
                message: format!(
                    "Enriched {}/{} trial records with {registry_refs} registry-linked references.",
                    valid_records.len(),
                    nct_ids.len()
                ),
            },
        )
        .await;

        // Stage 3: per-trial candidate discovery. Publication and dataset
        // searches run concurrently for each trial, and all trials fan out
        // together.
        emit(
            events,
            LinkingEvent::Status {
                message: "Searching for linked publications and datasets...".to_string(),
            },
        )
        .await;

        let discoveries = join_all(valid_records.iter().map(|registry| async move {
            let (candidates, repo_hits) = tokio::join!(
                self.linker.link_trial(registry),
                self.search_datasets(registry),
            );
            TrialLinkRecord {
                nct_id: registry.nct_id.clone(),
                registry: registry.clone(),
                pubmed_candidates: candidates,
                fulltext_data: Vec::new(),
                repository_hits: repo_hits,
            }
        }))
        .await;
        let mut trial_records = discoveries;

        let total_pubs: usize = trial_records.iter().map(|r| r.pubmed_candidates.len()).sum();
        let total_repos: usize = trial_records.iter().map(|r| r.repository_hits.len()).sum();
        emit(
            events,
            LinkingEvent::Agent {
                agent: "PubMed Linker".to_string(),
                message: format!(
                    "Found {total_pubs} candidate publications across {} trials. \
                     Repository search found {total_repos} dataset records.",
                    trial_records.len()
                ),
            },
        )
        .await;

        // Stage 4: full-text extraction, only when there is anything to
        // extract. A shared semaphore caps in-flight fetches globally.
        if total_pubs > 0 {
            emit(
                events,
                LinkingEvent::Status {
                    message: "Fetching full texts and extracting data availability...".to_string(),
                },
            )
            .await;

            let limiter = Arc::new(Semaphore::new(self.fulltext_concurrency));
            let extractions = join_all(trial_records.iter().map(|rec| {
                let limiter = limiter.clone();
                async move {
                    if rec.pubmed_candidates.is_empty() {
                        Vec::new()
                    } else {
                        self.extractor
                            .extract_batch(&rec.pubmed_candidates, &rec.nct_id, limiter)
                            .await
                    }
                }
            }))
            .await;
            for (record, fulltext_data) in trial_records.iter_mut().zip(extractions) {
                record.fulltext_data = fulltext_data;
            }

            let nct_mentions = trial_records
                .iter()
                .flat_map(|r| &r.fulltext_data)
                .filter(|ft| ft.nct_mentioned)
                .count();
            let texts_analysed = trial_records
                .iter()
                .flat_map(|r| &r.fulltext_data)
                .filter(|ft| ft.fulltext_available)
                .count();
            emit(
                events,
                LinkingEvent::Agent {
                    agent: "Full-Text Extractor".to_string(),
                    message: format!(
                        "Analysed {texts_analysed} publication full texts. \
                         Found {nct_mentions} publications mentioning trial NCT IDs in text."
                    ),
                },
            )
            .await;
        }

        // Stage 5: validation and aggregation.
        emit(
            events,
            LinkingEvent::Status {
                message: "Validating and aggregating trial-publication links...".to_string(),
            },
        )
        .await;
        let validated = self.validator.validate(&trial_records).await;
        let markdown = render_markdown(&validated);

        emit(
            events,
            LinkingEvent::Agent {
                agent: "Link Validator".to_string(),
                message: format!("Validation complete. {}", validated.summary),
            },
        )
        .await;

        info!(
            trials = validated.trial_links.len(),
            dropped = dropped_trials,
            "linking pipeline complete"
        );
        Ok(LinkingOutcome {
            validated,
            markdown,
            dropped_trials,
        })
    }

    async fn search_datasets(
        &self,
        registry: &RegistryRecord,
    ) -> Vec<crate::sources::DatasetRecord> {
        match self
            .repositories
            .search_datasets(&registry.nct_id, registry.title())
            .await
        {
            Ok(hits) => hits,
            Err(err) => {
                warn!(nct_id = %registry.nct_id, error = %err, "dataset search failed");
                Vec::new()
            }
        }
    }
}

async fn emit(events: Option<&mpsc::Sender<LinkingEvent>>, event: LinkingEvent) {
    if let Some(sender) = events {
        let _ = sender.send(event).await;
    }
}
