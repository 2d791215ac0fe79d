//! Multi-round debate step.
//!
//! Runs `max_rounds` full Advocate -> Skeptic -> Mediator rounds over the
//! generated hypotheses. The entire loop returns one atomic update, so a
//! caller resuming mid-pipeline always sees whole-round boundaries.

use crate::config::BioscoutConfig;
use crate::error::PipelineError;
use crate::pipeline::PipelineStep;
use crate::prompts::AgentRole;
use crate::reasoner::Reasoner;
use crate::state::{AgentLogEntry, DebateState, PipelineState, StateUpdate};
use async_trait::async_trait;
use std::sync::Arc;

pub struct Debate {
    reasoner: Arc<dyn Reasoner>,
    max_rounds: usize,
}

impl Debate {
    pub fn new(reasoner: Arc<dyn Reasoner>, config: &BioscoutConfig) -> Self {
        Self {
            reasoner,
            max_rounds: config.debate.max_rounds,
        }
    }

    async fn speak(
        &self,
        role: AgentRole,
        context: &str,
        step: &str,
    ) -> Result<String, PipelineError> {
        self.reasoner
            .reason(role, context, false)
            .await
            .map_err(|source| PipelineError::ReasonerFailed {
                step: step.to_string(),
                source,
            })
    }
}

#[async_trait]
impl PipelineStep for Debate {
    fn name(&self) -> &'static str {
        "debate"
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, PipelineError> {
        let max_rounds = if state.debate.max_rounds > 0 {
            state.debate.max_rounds
        } else {
            self.max_rounds
        };
        let mut transcript = state.debate.transcript.clone();
        let hypotheses = &state.hypotheses;
        let mut log_entries: Vec<AgentLogEntry> = Vec::new();

        for round in state.debate.round..max_rounds {
            let round_label = format!("Round {}/{max_rounds}", round + 1);

            let advocate_context = format!(
                "Hypotheses:\n{hypotheses}\n\nDebate history:\n{transcript}\n\nThis is {round_label}."
            );
            let advocate = self
                .speak(AgentRole::Advocate, &advocate_context, self.name())
                .await?;
            transcript.push_str(&format!("\n\n### {round_label} — Advocate\n{advocate}"));
            log_entries.push(AgentLogEntry::new(
                format!("Advocate (R{})", round + 1),
                advocate,
            ));

            let skeptic_context = format!(
                "Hypotheses:\n{hypotheses}\n\nDebate history:\n{transcript}\n\nThis is {round_label}."
            );
            let skeptic = self
                .speak(AgentRole::Skeptic, &skeptic_context, self.name())
                .await?;
            transcript.push_str(&format!("\n\n### {round_label} — Skeptic\n{skeptic}"));
            log_entries.push(AgentLogEntry::new(
                format!("Skeptic (R{})", round + 1),
                skeptic,
            ));

            let mediator_context =
                format!("Hypotheses:\n{hypotheses}\n\nFull debate so far:\n{transcript}");
            let mediator = self
                .speak(AgentRole::Mediator, &mediator_context, self.name())
                .await?;
            transcript.push_str(&format!("\n\n### {round_label} — Mediator\n{mediator}"));
            log_entries.push(AgentLogEntry::new(
                format!("Mediator (R{})", round + 1),
                mediator,
            ));
        }

        Ok(StateUpdate {
            debate: Some(DebateState {
                round: max_rounds,
                max_rounds,
                transcript,
            }),
            agents_log: log_entries,
            ..Default::default()
        })
    }
}
