//! Research pipeline executor.
//!
//! Runs a fixed total order of steps (analyze -> fetch-trials ->
//! fetch-literature -> generate-hypotheses -> debate -> synthesize), merging
//! each step's partial update into the shared [`PipelineState`]. Steps are
//! opaque to the executor; the only per-step granularity exposed to callers
//! is the [`PipelineEvent::StepComplete`] stream.

pub mod analyzer;
pub mod debate;
pub mod hypothesis;
pub mod scouts;
pub mod synthesizer;

pub use analyzer::TargetAnalyzer;
pub use debate::Debate;
pub use hypothesis::HypothesisGenerator;
pub use scouts::{LiteratureMiner, TrialsScout};
pub use synthesizer::Synthesizer;

use crate::config::BioscoutConfig;
use crate::error::PipelineError;
use crate::events::PipelineEvent;
use crate::reasoner::Reasoner;
use crate::sources::{LiteratureIndex, PublicationIndex, TrialRegistry};
use crate::state::{PipelineState, StateUpdate};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One step of the research pipeline.
///
/// Steps read the shared state and return a partial update; they never
/// mutate the state directly. A returned error aborts the whole run.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, PipelineError>;
}

/// External collaborators the standard pipeline needs.
#[derive(Clone)]
pub struct PipelineDeps {
    pub reasoner: Arc<dyn Reasoner>,
    pub registry: Arc<dyn TrialRegistry>,
    pub publications: Arc<dyn PublicationIndex>,
    pub literature: Arc<dyn LiteratureIndex>,
}

/// Executes the pipeline steps in order on a single control task.
///
/// Steps suspend only while awaiting external calls; no two steps ever
/// interleave on the same state, so the state needs no locking.
pub struct PipelineExecutor {
    steps: Vec<Box<dyn PipelineStep>>,
    max_rounds: usize,
}

impl PipelineExecutor {
    /// The standard six-step research pipeline.
    pub fn new(deps: PipelineDeps, config: &BioscoutConfig) -> Self {
        let steps: Vec<Box<dyn PipelineStep>> = vec![
            Box::new(TargetAnalyzer::new(deps.reasoner.clone(), config)),
            Box::new(TrialsScout::new(
                deps.registry.clone(),
                deps.reasoner.clone(),
                config,
            )),
            Box::new(LiteratureMiner::new(
                deps.publications.clone(),
                deps.literature.clone(),
                deps.reasoner.clone(),
                config,
            )),
            Box::new(HypothesisGenerator::new(deps.reasoner.clone(), config)),
            Box::new(Debate::new(deps.reasoner.clone(), config)),
            Box::new(Synthesizer::new(deps.reasoner, config)),
        ];
        Self {
            steps,
            max_rounds: config.debate.max_rounds,
        }
    }

    /// Build an executor from an explicit step sequence.
    pub fn from_steps(steps: Vec<Box<dyn PipelineStep>>, max_rounds: usize) -> Self {
        Self { steps, max_rounds }
    }

    /// Run the pipeline to completion and return the final state.
    pub async fn run(&self, target: &str) -> Result<PipelineState, PipelineError> {
        let mut state = PipelineState::new(target, self.max_rounds);
        for step in &self.steps {
            let started = Instant::now();
            let update = step.run(&state).await?;
            info!(
                step = step.name(),
                duration_ms = started.elapsed().as_millis() as u64,
                "pipeline step complete"
            );
            state.apply(update);
        }
        Ok(state)
    }

    /// Run the pipeline, streaming one event per step over the channel.
    ///
    /// Emits `Status` before each step, `StepComplete` after it, then a
    /// terminal `Result` (success) or `Error` (fatal step failure), always
    /// followed by `Done`. Send failures mean the consumer hung up; the run
    /// stops quietly in that case.
    pub async fn run_streaming(&self, target: &str, events: mpsc::Sender<PipelineEvent>) {
        let mut state = PipelineState::new(target, self.max_rounds);

        for step in &self.steps {
            let status = PipelineEvent::Status {
                message: format!("Running step '{}'...", step.name()),
            };
            if events.send(status).await.is_err() {
                return;
            }

            let started = Instant::now();
            match step.run(&state).await {
                Ok(update) => {
                    state.apply(update.clone());
                    let event = PipelineEvent::StepComplete {
                        step: step.name().to_string(),
                        duration_ms: started.elapsed().as_millis() as u64,
                        update,
                    };
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    warn!(step = step.name(), error = %err, "pipeline step failed, aborting run");
                    let _ = events
                        .send(PipelineEvent::Error {
                            message: err.to_string(),
                        })
                        .await;
                    let _ = events.send(PipelineEvent::Done).await;
                    return;
                }
            }
        }

        let result = PipelineEvent::Result {
            brief: state.brief.clone(),
            hypotheses: state.hypotheses.clone(),
            debate_transcript: state.debate.transcript.clone(),
            agents_log: state.agents_log.clone(),
            citations: state.citations.clone(),
        };
        let _ = events.send(result).await;
        let _ = events.send(PipelineEvent::Done).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AgentLogEntry;

    struct LogStep {
        step_name: &'static str,
    }

    #[async_trait]
    impl PipelineStep for LogStep {
        fn name(&self) -> &'static str {
            self.step_name
        }

        async fn run(&self, _state: &PipelineState) -> Result<StateUpdate, PipelineError> {
            Ok(StateUpdate {
                agents_log: vec![AgentLogEntry::new(self.step_name, "output")],
                ..Default::default()
            })
        }
    }

    struct FailStep;

    #[async_trait]
    impl PipelineStep for FailStep {
        fn name(&self) -> &'static str {
            "boom"
        }

        async fn run(&self, _state: &PipelineState) -> Result<StateUpdate, PipelineError> {
            Err(PipelineError::StepFailed {
                step: "boom".into(),
                message: "defect".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_run_applies_updates_in_step_order() {
        let executor = PipelineExecutor::from_steps(
            vec![
                Box::new(LogStep { step_name: "one" }),
                Box::new(LogStep { step_name: "two" }),
                Box::new(LogStep { step_name: "three" }),
            ],
            2,
        );
        let state = executor.run("KRAS G12C").await.unwrap();
        let agents: Vec<&str> = state.agents_log.iter().map(|e| e.agent.as_str()).collect();
        assert_eq!(agents, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_step_failure_aborts_run() {
        let executor = PipelineExecutor::from_steps(
            vec![
                Box::new(LogStep { step_name: "one" }),
                Box::new(FailStep),
                Box::new(LogStep { step_name: "never" }),
            ],
            2,
        );
        let err = executor.run("TP53").await.unwrap_err();
        assert!(matches!(err, PipelineError::StepFailed { .. }));
    }

    #[tokio::test]
    async fn test_streaming_emits_step_complete_then_result_then_done() {
        let executor = PipelineExecutor::from_steps(
            vec![
                Box::new(LogStep { step_name: "one" }),
                Box::new(LogStep { step_name: "two" }),
            ],
            2,
        );
        let (tx, mut rx) = mpsc::channel(32);
        executor.run_streaming("EGFR", tx).await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        // Status/StepComplete per step, then Result, then Done.
        assert_eq!(events.len(), 6);
        assert!(matches!(events[0], PipelineEvent::Status { .. }));
        assert!(matches!(events[1], PipelineEvent::StepComplete { .. }));
        assert!(matches!(events[4], PipelineEvent::Result { .. }));
        assert!(matches!(events[5], PipelineEvent::Done));
    }

    #[tokio::test]
    async fn test_streaming_failure_emits_error_and_done_without_result() {
        let executor = PipelineExecutor::from_steps(vec![Box::new(FailStep)], 2);
        let (tx, mut rx) = mpsc::channel(32);
        executor.run_streaming("EGFR", tx).await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(matches!(events[0], PipelineEvent::Status { .. }));
        assert!(matches!(events[1], PipelineEvent::Error { .. }));
        assert!(matches!(events[2], PipelineEvent::Done));
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, PipelineEvent::Result { .. }))
        );
    }
}
