//! Pipeline state model.
//!
//! [`PipelineState`] is the single accumulator threaded through the research
//! pipeline. Each step returns a [`StateUpdate`] (a partial update), and
//! [`PipelineState::apply`] merges it with field-specific semantics:
//!
//! - scalar fields (`analysis`, `hypotheses`, `brief`, `debate`,
//!   `search_criteria`, `clarification`) overwrite;
//! - collection fields (`agents_log`, `citations`) concatenate in
//!   step-completion order;
//! - `api_data` shallow-merges by source key.
//!
//! The state is always fully populated (empty defaults), so downstream steps
//! can read any field without presence checks.

use crate::prompts::AgentRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One agent's contribution to the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLogEntry {
    /// Agent name, e.g. "Advocate (R1)".
    pub agent: String,
    /// The agent's output text.
    pub content: String,
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
}

impl AgentLogEntry {
    pub fn new(agent: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The kind of source a citation was discovered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    ClinicalTrial,
    Pubmed,
    SemanticScholar,
}

/// A structured citation record, written once at discovery time.
///
/// Ids are source-scoped ("pm-3", "ss-1", "ct-2"). Producers never
/// deduplicate; the consumer rendering the final report does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub id: String,
    pub kind: CitationKind,
    pub title: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub journal: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub pmid: String,
    #[serde(default)]
    pub doi: String,
    #[serde(default)]
    pub nct_id: String,
    /// Name of the agent that discovered this citation.
    pub source_agent: String,
}

/// Optional filters the Analyzer derives from the target.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intervention: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

/// Structured query specification produced once by the Analyzer and
/// consumed read-only by the scouts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// Distinct biological concepts extracted from the target.
    pub concepts: Vec<String>,
    /// Optional structured filters.
    #[serde(default)]
    pub filters: SearchFilters,
    /// Per-source query strings, keyed by source name ("trials", "pubmed",
    /// "semantic").
    pub queries: BTreeMap<String, String>,
}

impl SearchCriteria {
    /// The query for a named source, falling back to the given default.
    pub fn query_for<'a>(&'a self, source: &str, default: &'a str) -> &'a str {
        self.queries
            .get(source)
            .map(String::as_str)
            .filter(|q| !q.is_empty())
            .unwrap_or(default)
    }
}

/// Tracks the multi-round advocate/skeptic/mediator debate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebateState {
    /// Completed debate rounds. Monotonically increases.
    pub round: usize,
    /// Total debate rounds to run, fixed for the run.
    pub max_rounds: usize,
    /// Accumulated debate transcript. Append-only.
    pub transcript: String,
}

/// The main pipeline state, threaded through every step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique id for this run, assigned at creation.
    #[serde(default)]
    pub run_id: String,
    /// The user's research target (e.g. "KRAS G12C"). Immutable input.
    pub target: String,
    /// Optional refinement text supplied alongside the target.
    #[serde(default)]
    pub clarification: Option<String>,
    /// Structured query plan produced by the Analyzer.
    #[serde(default)]
    pub search_criteria: Option<SearchCriteria>,
    /// Target analyzer output.
    #[serde(default)]
    pub analysis: String,
    /// Raw formatted text from external sources, keyed by source name.
    #[serde(default)]
    pub api_data: BTreeMap<String, String>,
    /// Generated hypotheses text.
    #[serde(default)]
    pub hypotheses: String,
    /// Debate tracking.
    #[serde(default)]
    pub debate: DebateState,
    /// Final synthesized markdown brief. Written once.
    #[serde(default)]
    pub brief: String,
    /// Ordered conversation log of all agents. Append-only.
    #[serde(default)]
    pub agents_log: Vec<AgentLogEntry>,
    /// Structured citations discovered across all steps. Append-only.
    #[serde(default)]
    pub citations: Vec<Citation>,
}

impl PipelineState {
    /// Create an initial state with only the target (and optional
    /// clarification) populated.
    pub fn new(target: impl Into<String>, max_rounds: usize) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            target: target.into(),
            debate: DebateState {
                round: 0,
                max_rounds,
                transcript: String::new(),
            },
            ..Default::default()
        }
    }

    /// Apply a partial update using the per-field merge rules.
    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(clarification) = update.clarification {
            self.clarification = Some(clarification);
        }
        if let Some(criteria) = update.search_criteria {
            self.search_criteria = Some(criteria);
        }
        if let Some(analysis) = update.analysis {
            self.analysis = analysis;
        }
        if let Some(hypotheses) = update.hypotheses {
            self.hypotheses = hypotheses;
        }
        if let Some(debate) = update.debate {
            self.debate = debate;
        }
        if let Some(brief) = update.brief {
            self.brief = brief;
        }
        // Shallow merge by key: later steps overwrite per-source entries.
        for (source, text) in update.api_data {
            self.api_data.insert(source, text);
        }
        self.agents_log.extend(update.agents_log);
        self.citations.extend(update.citations);
    }
}

/// A partial state update produced by one pipeline step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_criteria: Option<SearchCriteria>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub api_data: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypotheses: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debate: Option<DebateState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brief: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents_log: Vec<AgentLogEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
}

impl StateUpdate {
    /// An update carrying a single agent log entry.
    pub fn log_entry(role: AgentRole, content: impl Into<String>) -> Self {
        Self {
            agents_log: vec![AgentLogEntry::new(role.display_name(), content)],
            ..Default::default()
        }
    }
}
