//! Progress events emitted by the pipeline executor and linking orchestrator.
//!
//! Events are observational: consumers (a transport layer, a CLI) render them
//! but never feed them back into control flow. They serialize with a stable
//! snake_case `type` tag.

use crate::state::{AgentLogEntry, Citation, StateUpdate};
use serde::{Deserialize, Serialize};

/// Event stream produced by [`crate::pipeline::PipelineExecutor::run_streaming`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A human-readable progress line.
    Status { message: String },
    /// A step finished; carries its partial update and wall-clock duration.
    StepComplete {
        step: String,
        duration_ms: u64,
        update: StateUpdate,
    },
    /// The final structured payload of a successful run.
    Result {
        brief: String,
        hypotheses: String,
        debate_transcript: String,
        agents_log: Vec<AgentLogEntry>,
        citations: Vec<Citation>,
    },
    /// A fatal step failure. Terminal; no partial brief is emitted.
    Error { message: String },
    /// Stream end marker, sent exactly once after Result or Error.
    Done,
}

/// Event stream produced by the linking orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkingEvent {
    /// A stage-level progress line (counts processed, counts found).
    Status { message: String },
    /// An agent started or finished work on one trial.
    Agent { agent: String, message: String },
    /// A result message (including the "No clinical trials found" outcome).
    Result { message: String },
    /// A fatal orchestrator failure. Terminal.
    Error { message: String },
    /// Stream end marker.
    Done,
}
