//! End-to-end research pipeline runs against stub data sources and a mock
//! reasoning gateway.

use async_trait::async_trait;
use bioscout_core::config::BioscoutConfig;
use bioscout_core::error::{PipelineError, SourceError};
use bioscout_core::events::PipelineEvent;
use bioscout_core::pipeline::{PipelineDeps, PipelineExecutor};
use bioscout_core::reasoner::MockReasoner;
use bioscout_core::sources::{
    LiteratureIndex, MetadataQuery, PublicationIndex, RegistryRecord, TrialRegistry, TrialSummary,
};
use bioscout_core::state::{Citation, CitationKind};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct StubRegistry {
    seen_queries: Mutex<Vec<String>>,
}

impl StubRegistry {
    fn new() -> Self {
        Self {
            seen_queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TrialRegistry for StubRegistry {
    async fn search_trials(
        &self,
        query: &str,
        _max_results: usize,
    ) -> Result<(String, Vec<TrialSummary>), SourceError> {
        self.seen_queries.lock().unwrap().push(query.to_string());
        Ok((
            format!("**1 total trials found for '{query}'**"),
            vec![TrialSummary {
                nct_id: "NCT01234567".into(),
                title: "A Phase 2 Study of Sotorasib".into(),
                trial_url: "https://clinicaltrials.gov/study/NCT01234567".into(),
                status: "COMPLETED".into(),
                phase: "PHASE2".into(),
            }],
        ))
    }

    async fn enrich_trial(&self, nct_id: &str) -> Result<RegistryRecord, SourceError> {
        Err(SourceError::NotFound { id: nct_id.into() })
    }
}

struct StubPublications;

#[async_trait]
impl PublicationIndex for StubPublications {
    async fn search_publications(
        &self,
        query: &str,
        _max_results: usize,
    ) -> Result<(String, Vec<Citation>), SourceError> {
        Ok((
            format!("**1 PubMed articles found for '{query}'**"),
            vec![Citation {
                id: "pm-1".into(),
                kind: CitationKind::Pubmed,
                title: "Sotorasib for lung cancers with KRAS p.G12C mutation".into(),
                authors: "Hong DS et al.".into(),
                year: "2021".into(),
                journal: "NEJM".into(),
                url: "https://pubmed.ncbi.nlm.nih.gov/32955176/".into(),
                pmid: "32955176".into(),
                doi: String::new(),
                nct_id: String::new(),
                source_agent: "Literature Miner".into(),
            }],
        ))
    }

    async fn search_by_trial_id(
        &self,
        _nct_id: &str,
    ) -> Result<(String, Vec<Citation>), SourceError> {
        Ok((String::new(), Vec::new()))
    }

    async fn search_by_metadata(
        &self,
        _query: &MetadataQuery,
    ) -> Result<(String, Vec<Citation>), SourceError> {
        Ok((String::new(), Vec::new()))
    }
}

struct StubLiterature;

#[async_trait]
impl LiteratureIndex for StubLiterature {
    async fn search_papers(
        &self,
        query: &str,
        _limit: usize,
    ) -> Result<(String, Vec<Citation>), SourceError> {
        Ok((
            format!("**1 Semantic Scholar papers found for '{query}'**"),
            vec![Citation {
                id: "ss-1".into(),
                kind: CitationKind::SemanticScholar,
                title: "KRAS G12C inhibition".into(),
                authors: String::new(),
                year: "2022".into(),
                journal: String::new(),
                url: String::new(),
                pmid: String::new(),
                doi: String::new(),
                nct_id: String::new(),
                source_agent: "Literature Miner".into(),
            }],
        ))
    }
}

fn executor_with(reasoner: MockReasoner, registry: Arc<StubRegistry>) -> PipelineExecutor {
    PipelineExecutor::new(
        PipelineDeps {
            reasoner: Arc::new(reasoner),
            registry,
            publications: Arc::new(StubPublications),
            literature: Arc::new(StubLiterature),
        },
        &BioscoutConfig::default(),
    )
}

#[tokio::test]
async fn full_run_populates_every_state_field() {
    init_tracing();
    let executor = executor_with(MockReasoner::new(), Arc::new(StubRegistry::new()));
    let state = executor.run("KRAS G12C").await.unwrap();

    assert!(!state.run_id.is_empty());
    assert_eq!(state.target, "KRAS G12C");
    assert!(!state.analysis.is_empty());
    assert!(!state.hypotheses.is_empty());
    assert!(!state.brief.is_empty());
    assert!(state.search_criteria.is_some());

    // One log entry per agent turn, in step-completion order.
    let agents: Vec<&str> = state.agents_log.iter().map(|e| e.agent.as_str()).collect();
    assert_eq!(
        agents,
        vec![
            "Target Analyzer",
            "Trials Scout",
            "Literature Miner",
            "Hypothesis Generator",
            "Advocate (R1)",
            "Skeptic (R1)",
            "Mediator (R1)",
            "Advocate (R2)",
            "Skeptic (R2)",
            "Mediator (R2)",
            "Synthesizer",
        ]
    );

    // Raw source text is retained per source, plus the combined view.
    for key in ["trials", "pubmed", "semantic", "papers"] {
        assert!(state.api_data.contains_key(key), "missing api_data[{key}]");
    }

    // Citations from both scouts, trial first.
    let ids: Vec<&str> = state.citations.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["ct-1", "pm-1", "ss-1"]);

    // The transcript carries every labeled round block.
    assert!(state.debate.transcript.contains("### Round 1/2 — Advocate"));
    assert!(state.debate.transcript.contains("### Round 1/2 — Skeptic"));
    assert!(state.debate.transcript.contains("### Round 2/2 — Mediator"));
    assert_eq!(state.debate.round, 2);
}

#[tokio::test]
async fn analyzer_criteria_drive_the_trial_search() {
    init_tracing();
    let reasoner = MockReasoner::new();
    reasoner.queue_response(
        r#"{"concepts": ["KRAS", "G12C"],
            "queries": {"trials": "KRAS G12C NSCLC", "pubmed": "KRAS G12C inhibitor"},
            "summary": "analysis"}"#,
    );
    let registry = Arc::new(StubRegistry::new());
    let executor = executor_with(reasoner, registry.clone());
    executor.run("KRAS G12C").await.unwrap();

    let seen = registry.seen_queries.lock().unwrap();
    assert_eq!(seen.as_slice(), ["KRAS G12C NSCLC"]);
}

#[tokio::test]
async fn streaming_emits_step_events_in_pipeline_order() {
    init_tracing();
    let executor = executor_with(MockReasoner::new(), Arc::new(StubRegistry::new()));
    let (tx, mut rx) = mpsc::channel(64);
    executor.run_streaming("KRAS G12C", tx).await;

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    // Status + StepComplete for each of the six steps, then Result, Done.
    assert_eq!(events.len(), 14);
    let steps: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::StepComplete { step, .. } => Some(step.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(
        steps,
        vec![
            "analyze",
            "fetch-trials",
            "fetch-literature",
            "generate-hypotheses",
            "debate",
            "synthesize",
        ]
    );
    match &events[12] {
        PipelineEvent::Result { brief, citations, .. } => {
            assert!(!brief.is_empty());
            assert_eq!(citations.len(), 3);
        }
        other => panic!("expected Result, got {other:?}"),
    }
    assert!(matches!(events[13], PipelineEvent::Done));
}

#[tokio::test]
async fn reasoner_failure_mid_run_is_fatal() {
    init_tracing();
    // Three queued responses cover analyze, fetch-trials, and
    // fetch-literature; the hypothesis step then hits the failing gateway.
    let reasoner = MockReasoner::failing();
    reasoner.queue_response("analysis");
    reasoner.queue_response("trial landscape");
    reasoner.queue_response("literature themes");

    let executor = executor_with(reasoner, Arc::new(StubRegistry::new()));
    let err = executor.run("KRAS G12C").await.unwrap_err();
    match err {
        PipelineError::ReasonerFailed { step, .. } => assert_eq!(step, "generate-hypotheses"),
        other => panic!("expected ReasonerFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn streaming_failure_ends_with_error_then_done() {
    init_tracing();
    let reasoner = MockReasoner::failing();
    reasoner.queue_response("analysis");
    reasoner.queue_response("trial landscape");
    reasoner.queue_response("literature themes");

    let executor = executor_with(reasoner, Arc::new(StubRegistry::new()));
    let (tx, mut rx) = mpsc::channel(64);
    executor.run_streaming("KRAS G12C", tx).await;

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    // Three completed steps, then the fourth step's status, error, done.
    assert_eq!(events.len(), 9);
    assert!(matches!(events[7], PipelineEvent::Error { .. }));
    assert!(matches!(events[8], PipelineEvent::Done));
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, PipelineEvent::Result { .. }))
    );
}
