//! Role instructions for the reasoning gateway.
//!
//! Instructions are an injected configuration resource, not language-level
//! constants: every reasoner call names an [`AgentRole`], and the
//! [`PromptLibrary`] maps that role to its instruction text. The built-in
//! library ships usable defaults; callers may replace any entry at
//! construction time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The reasoning roles used across the research and linking pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Analyzer,
    TrialsScout,
    LiteratureMiner,
    HypothesisGenerator,
    Advocate,
    Skeptic,
    Mediator,
    Synthesizer,
    PubmedLinker,
    FulltextExtractor,
    LinkValidator,
}

impl AgentRole {
    /// Human-readable agent name, used in log entries and progress events.
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentRole::Analyzer => "Target Analyzer",
            AgentRole::TrialsScout => "Trials Scout",
            AgentRole::LiteratureMiner => "Literature Miner",
            AgentRole::HypothesisGenerator => "Hypothesis Generator",
            AgentRole::Advocate => "Advocate",
            AgentRole::Skeptic => "Skeptic",
            AgentRole::Mediator => "Mediator",
            AgentRole::Synthesizer => "Synthesizer",
            AgentRole::PubmedLinker => "PubMed Linker",
            AgentRole::FulltextExtractor => "Full-Text Extractor",
            AgentRole::LinkValidator => "Link Validator",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Mapping from reasoning role to instruction text.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    instructions: HashMap<AgentRole, String>,
}

impl PromptLibrary {
    /// Build a library from explicit role instructions.
    pub fn new(instructions: HashMap<AgentRole, String>) -> Self {
        Self { instructions }
    }

    /// The built-in instruction set.
    pub fn builtin() -> Self {
        let mut instructions = HashMap::new();
        instructions.insert(AgentRole::Analyzer, ANALYZER.to_string());
        instructions.insert(AgentRole::TrialsScout, TRIALS_SCOUT.to_string());
        instructions.insert(AgentRole::LiteratureMiner, LITERATURE_MINER.to_string());
        instructions.insert(
            AgentRole::HypothesisGenerator,
            HYPOTHESIS_GENERATOR.to_string(),
        );
        instructions.insert(AgentRole::Advocate, ADVOCATE.to_string());
        instructions.insert(AgentRole::Skeptic, SKEPTIC.to_string());
        instructions.insert(AgentRole::Mediator, MEDIATOR.to_string());
        instructions.insert(AgentRole::Synthesizer, SYNTHESIZER.to_string());
        instructions.insert(AgentRole::PubmedLinker, PUBMED_LINKER.to_string());
        instructions.insert(AgentRole::FulltextExtractor, FULLTEXT_EXTRACTOR.to_string());
        instructions.insert(AgentRole::LinkValidator, LINK_VALIDATOR.to_string());
        Self { instructions }
    }

    /// Look up the instruction text for a role.
    pub fn instruction(&self, role: AgentRole) -> Option<&str> {
        self.instructions.get(&role).map(String::as_str)
    }

    /// Replace the instruction for a single role.
    pub fn set(&mut self, role: AgentRole, instruction: impl Into<String>) {
        self.instructions.insert(role, instruction.into());
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

const ANALYZER: &str = "You are a biotech target analysis expert. Given a research target (drug, \
gene, mutation, disease, or pathway), extract the key biological context and produce structured \
search criteria. Return a JSON object with keys: \"concepts\" (list of the distinct biological \
concepts in the target), \"condition\" (primary disease or null), \"intervention\" (drug or \
modality or null), \"queries\" (object mapping the source names \"trials\", \"pubmed\" and \
\"semantic\" to one focused query string each), and \"summary\" (4 concise bullet points covering \
gene/target, mutation/variant, disease association, and therapeutic relevance). Do not speculate \
beyond what the input provides.";

const TRIALS_SCOUT: &str = "You are a clinical trials analyst specializing in drug development. \
You have been given raw clinical trial data retrieved from a public registry for a specific \
target. Summarize the active landscape (trial counts, dominant phases), key signals, sponsor \
patterns, and gaps. Keep to 200 words maximum and cite trial identifiers (NCT numbers) when \
available.";

const LITERATURE_MINER: &str = "You are a biotech literature analyst. You have been given \
abstracts and paper summaries for a specific research target. Extract mechanisms of action, \
resistance pathways, safety signals, and novel findings. Keep to 200 words and cite paper titles \
or authors when possible.";

const HYPOTHESIS_GENERATOR: &str = "You are a creative biotech researcher generating testable \
hypotheses from a target analysis, clinical trial landscape data, and literature insights. \
Generate exactly 3 specific, novel hypotheses. Each must be testable, connect at least two data \
sources, and suggest a mechanism or actionable direction. Format each as 'Hypothesis N: [Title]' \
followed by a 1-2 sentence rationale grounded in the data.";

const ADVOCATE: &str = "You are a biotech research advocate. Argue that the hypotheses ARE \
supported by the available evidence: identify the strongest supporting evidence from trials and \
literature, and address concerns raised by the skeptic in previous rounds. Be persuasive but \
grounded; only cite evidence present in the data. Write exactly one paragraph (100 words max).";

const SKEPTIC: &str = "You are a rigorous biotech research skeptic. Identify weaknesses and gaps \
in the hypotheses: missing evidence, conflicting data, logical leaps, and the additional \
experiments or data that would be needed. Be constructive rather than dismissive. Write exactly \
one paragraph (100 words max).";

const MEDIATOR: &str = "You are a neutral scientific mediator. Synthesize the advocate and \
skeptic positions: note where they agree and disagree, rate the current evidence strength for \
each hypothesis as Strong, Moderate, or Weak, and flag which disputes are semantic versus \
substantive. Maximum 3 sentences.";

const SYNTHESIZER: &str = "You are a senior biotech analyst writing an executive research brief. \
Given the full pipeline output (target analysis, trial data, literature, hypotheses, and debate \
transcript), produce a structured markdown report with sections: Target Overview, Clinical \
Trials Summary, Literature Insights, Hypotheses & Evidence Assessment, Key Takeaways, Key Risks \
& Gaps, Recommended Next Steps, and References. Use actual data from the pipeline; do not \
fabricate numbers.";

const PUBMED_LINKER: &str = "You are a clinical evidence curator linking a clinical trial to its \
publications. Given trial metadata and raw publication search results, rank the candidate \
publications by how likely each reports results of this specific trial. Return a JSON array (or \
an object with a \"candidates\" key) where each element has: \"pmid\", \"doi\", \"title\", \
\"authors\", \"year\", \"confidence\" (integer 0-100), \"match_reason\" (one sentence), and \
\"match_type\" (one of \"nct_direct\", \"metadata_heuristic\"). Exclude clearly unrelated papers.";

const FULLTEXT_EXTRACTOR: &str = "You are a data-availability analyst. Given rule-based \
extraction results and a full-text excerpt of a publication, classify how the underlying data \
can be accessed. Return a JSON object with keys: \"availability_type\" (one of \"open_access\", \
\"on_request\", \"restricted\", \"not_stated\"), \"statement_snippet\" (the key sentence), \
\"repository_names\", \"repository_urls\", \"supplementary_urls\" (string arrays), and \"notes\".";

const LINK_VALIDATOR: &str = "You are an evidence-linking validator. Given per-trial linking \
records (registry metadata, ranked publication candidates, full-text findings, dataset hits), \
deduplicate publications across sources, assign each a confidence tier (\"high\", \"medium\", \
\"low\") and score, associate datasets with their trials, and summarize. Return a JSON object \
with keys \"trial_links\" (array of objects with \"nct_id\", \"trial_title\", \"trial_url\", \
\"publications\", \"datasets\", \"data_availability\") and \"summary\" (one paragraph). A \
publication whose full text mentions the trial id verbatim is always high confidence.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_all_roles() {
        let lib = PromptLibrary::builtin();
        for role in [
            AgentRole::Analyzer,
            AgentRole::TrialsScout,
            AgentRole::LiteratureMiner,
            AgentRole::HypothesisGenerator,
            AgentRole::Advocate,
            AgentRole::Skeptic,
            AgentRole::Mediator,
            AgentRole::Synthesizer,
            AgentRole::PubmedLinker,
            AgentRole::FulltextExtractor,
            AgentRole::LinkValidator,
        ] {
            assert!(lib.instruction(role).is_some(), "missing role {role:?}");
        }
    }

    #[test]
    fn test_set_overrides_instruction() {
        let mut lib = PromptLibrary::builtin();
        lib.set(AgentRole::Skeptic, "challenge everything");
        assert_eq!(lib.instruction(AgentRole::Skeptic), Some("challenge everything"));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(AgentRole::PubmedLinker.to_string(), "PubMed Linker");
        assert_eq!(AgentRole::Analyzer.to_string(), "Target Analyzer");
    }
}
