//! Final brief synthesis step.

use crate::config::BioscoutConfig;
use crate::error::PipelineError;
use crate::pipeline::PipelineStep;
use crate::prompts::AgentRole;
use crate::reasoner::Reasoner;
use crate::state::{PipelineState, StateUpdate};
use async_trait::async_trait;
use std::sync::Arc;

/// Combines the whole pipeline output into the executive research brief.
pub struct Synthesizer {
    reasoner: Arc<dyn Reasoner>,
    excerpt_chars: usize,
}

impl Synthesizer {
    pub fn new(reasoner: Arc<dyn Reasoner>, config: &BioscoutConfig) -> Self {
        Self {
            reasoner,
            excerpt_chars: config.pipeline.excerpt_chars,
        }
    }

    fn excerpt<'a>(&self, text: &'a str) -> &'a str {
        if text.len() <= self.excerpt_chars {
            return text;
        }
        let mut end = self.excerpt_chars;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        &text[..end]
    }
}

#[async_trait]
impl PipelineStep for Synthesizer {
    fn name(&self) -> &'static str {
        "synthesize"
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, PipelineError> {
        let trials = state.api_data.get("trials").map_or("N/A", String::as_str);
        let pubmed = state.api_data.get("pubmed").map_or("N/A", String::as_str);
        let semantic = state.api_data.get("semantic").map_or("N/A", String::as_str);

        let full_context = format!(
            "# Research Target: {}\n\n\
             ## Target Analysis\n{}\n\n\
             ## Clinical Trial Data\n{trials}\n\n\
             ## PubMed Literature\n{}\n\n\
             ## Semantic Scholar Literature\n{}\n\n\
             ## Generated Hypotheses\n{}\n\n\
             ## Debate Transcript\n{}",
            state.target,
            state.analysis,
            self.excerpt(pubmed),
            self.excerpt(semantic),
            state.hypotheses,
            state.debate.transcript,
        );

        let brief = self
            .reasoner
            .reason(AgentRole::Synthesizer, &full_context, false)
            .await
            .map_err(|source| PipelineError::ReasonerFailed {
                step: self.name().to_string(),
                source,
            })?;

        let mut update = StateUpdate::log_entry(AgentRole::Synthesizer, &brief);
        update.brief = Some(brief);
        Ok(update)
    }
}
