//! Hypothesis generator step.

use crate::config::BioscoutConfig;
use crate::error::PipelineError;
use crate::pipeline::PipelineStep;
use crate::prompts::AgentRole;
use crate::reasoner::Reasoner;
use crate::state::{PipelineState, StateUpdate};
use async_trait::async_trait;
use std::sync::Arc;

/// Generates testable hypotheses from everything gathered so far. Prior
/// agent outputs are fed back in as context, so the step must run after the
/// scouts.
pub struct HypothesisGenerator {
    reasoner: Arc<dyn Reasoner>,
    excerpt_chars: usize,
}

impl HypothesisGenerator {
    pub fn new(reasoner: Arc<dyn Reasoner>, config: &BioscoutConfig) -> Self {
        Self {
            reasoner,
            excerpt_chars: config.pipeline.excerpt_chars,
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut end = max_chars;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[async_trait]
impl PipelineStep for HypothesisGenerator {
    fn name(&self) -> &'static str {
        "generate-hypotheses"
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, PipelineError> {
        let previous_insights = state
            .agents_log
            .iter()
            .map(|entry| format!("### {}\n{}", entry.agent, entry.content))
            .collect::<Vec<_>>()
            .join("\n\n");

        let trials = state.api_data.get("trials").map_or("N/A", String::as_str);
        let pubmed = state.api_data.get("pubmed").map_or("N/A", String::as_str);

        let context = format!(
            "Target: {}\n\n\
             ## Target Analysis\n{}\n\n\
             ## Agent Insights\n{previous_insights}\n\n\
             ## Raw Trial Data (summary)\n{}\n\n\
             ## Raw Literature Data (summary)\n{}",
            state.target,
            state.analysis,
            truncate(trials, self.excerpt_chars),
            truncate(pubmed, self.excerpt_chars),
        );

        let hypotheses = self
            .reasoner
            .reason(AgentRole::HypothesisGenerator, &context, false)
            .await
            .map_err(|source| PipelineError::ReasonerFailed {
                step: self.name().to_string(),
                source,
            })?;

        let mut update = StateUpdate::log_entry(AgentRole::HypothesisGenerator, &hypotheses);
        update.hypotheses = Some(hypotheses);
        Ok(update)
    }
}
