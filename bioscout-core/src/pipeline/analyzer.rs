//! Target analyzer, the first pipeline step.
//!
//! Parses the free-text research target into structured biological context
//! and produces the search criteria every downstream scout reads. The
//! reasoner is asked for structured output; when that fails to parse, a
//! deterministic target split supplies the criteria instead.

use crate::config::BioscoutConfig;
use crate::error::PipelineError;
use crate::heuristics::parse_target;
use crate::pipeline::PipelineStep;
use crate::prompts::AgentRole;
use crate::reasoner::{Reasoner, parse_structured};
use crate::state::{PipelineState, SearchCriteria, SearchFilters, StateUpdate};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

pub struct TargetAnalyzer {
    reasoner: Arc<dyn Reasoner>,
}

impl TargetAnalyzer {
    pub fn new(reasoner: Arc<dyn Reasoner>, _config: &BioscoutConfig) -> Self {
        Self { reasoner }
    }

    /// Criteria derived without the reasoner: gene and mutation become the
    /// concepts, and every source gets the raw target as its query.
    fn fallback_criteria(target: &str) -> SearchCriteria {
        let (gene, mutation) = parse_target(target);
        let mut concepts = vec![gene];
        if let Some(m) = mutation {
            concepts.push(m);
        }
        SearchCriteria {
            concepts,
            filters: SearchFilters::default(),
            queries: BTreeMap::from([
                ("trials".to_string(), target.to_string()),
                ("pubmed".to_string(), target.to_string()),
                ("semantic".to_string(), target.to_string()),
            ]),
        }
    }

    fn criteria_from_json(value: &serde_json::Value, target: &str) -> Option<SearchCriteria> {
        let concepts: Vec<String> = value
            .get("concepts")?
            .as_array()?
            .iter()
            .filter_map(|c| c.as_str().map(str::to_string))
            .collect();

        let mut queries = BTreeMap::new();
        if let Some(obj) = value.get("queries").and_then(|q| q.as_object()) {
            for (source, query) in obj {
                if let Some(q) = query.as_str() {
                    queries.insert(source.clone(), q.to_string());
                }
            }
        }
        for source in ["trials", "pubmed", "semantic"] {
            queries
                .entry(source.to_string())
                .or_insert_with(|| target.to_string());
        }

        Some(SearchCriteria {
            concepts,
            filters: SearchFilters {
                condition: value
                    .get("condition")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                intervention: value
                    .get("intervention")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                phase: None,
            },
            queries,
        })
    }

    fn analysis_from_json(value: &serde_json::Value, raw: &str) -> String {
        match value.get("summary") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|i| i.as_str())
                .map(|line| format!("- {line}"))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => raw.to_string(),
        }
    }
}

#[async_trait]
impl PipelineStep for TargetAnalyzer {
    fn name(&self) -> &'static str {
        "analyze"
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, PipelineError> {
        let target = &state.target;
        let (gene, mutation) = parse_target(target);

        let mut context = format!(
            "Analyze this biotech research target: {target}\n\
             Gene/Target: {gene}\n\
             Mutation/Variant: {}",
            mutation.as_deref().unwrap_or("none specified")
        );
        if let Some(clarification) = &state.clarification {
            context.push_str(&format!("\nUser clarification: {clarification}"));
        }

        let response = self
            .reasoner
            .reason(AgentRole::Analyzer, &context, true)
            .await
            .map_err(|source| PipelineError::ReasonerFailed {
                step: self.name().to_string(),
                source,
            })?;

        let (analysis, criteria) = match parse_structured(&response) {
            Some(value) => {
                let criteria = Self::criteria_from_json(&value, target)
                    .unwrap_or_else(|| Self::fallback_criteria(target));
                (Self::analysis_from_json(&value, &response), criteria)
            }
            None => {
                warn!(target_text = %target, "analyzer returned unparsable criteria, using target split");
                (response.clone(), Self::fallback_criteria(target))
            }
        };

        let mut update = StateUpdate::log_entry(AgentRole::Analyzer, &analysis);
        update.analysis = Some(analysis);
        update.search_criteria = Some(criteria);
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoner::MockReasoner;

    fn analyzer_with(mock: MockReasoner) -> TargetAnalyzer {
        TargetAnalyzer::new(Arc::new(mock), &BioscoutConfig::default())
    }

    #[tokio::test]
    async fn test_structured_response_produces_criteria() {
        let mock = MockReasoner::new();
        mock.queue_response(
            r#"{"concepts": ["KRAS", "G12C"], "condition": "NSCLC", "intervention": "sotorasib",
                "queries": {"trials": "KRAS G12C NSCLC", "pubmed": "KRAS G12C inhibitor"},
                "summary": ["KRAS is a GTPase", "G12C is targetable"]}"#,
        );
        let analyzer = analyzer_with(mock);
        let state = PipelineState::new("KRAS G12C", 2);

        let update = analyzer.run(&state).await.unwrap();
        let criteria = update.search_criteria.unwrap();
        assert_eq!(criteria.concepts, vec!["KRAS", "G12C"]);
        assert_eq!(criteria.filters.condition.as_deref(), Some("NSCLC"));
        assert_eq!(criteria.queries["trials"], "KRAS G12C NSCLC");
        // Missing source keys are backfilled with the raw target.
        assert_eq!(criteria.queries["semantic"], "KRAS G12C");
        assert!(update.analysis.unwrap().contains("- KRAS is a GTPase"));
        assert_eq!(update.agents_log.len(), 1);
        assert_eq!(update.agents_log[0].agent, "Target Analyzer");
    }

    #[tokio::test]
    async fn test_unparsable_response_falls_back_to_target_split() {
        let analyzer = analyzer_with(MockReasoner::with_response("free text, not JSON"));
        let state = PipelineState::new("KRAS G12C", 2);

        let update = analyzer.run(&state).await.unwrap();
        let criteria = update.search_criteria.unwrap();
        assert_eq!(criteria.concepts, vec!["KRAS", "G12C"]);
        assert_eq!(criteria.queries["pubmed"], "KRAS G12C");
        assert_eq!(update.analysis.as_deref(), Some("free text, not JSON"));
    }

    #[tokio::test]
    async fn test_reasoner_failure_is_fatal() {
        let analyzer = analyzer_with(MockReasoner::failing());
        let state = PipelineState::new("TP53", 2);
        let err = analyzer.run(&state).await.unwrap_err();
        assert!(matches!(err, PipelineError::ReasonerFailed { .. }));
    }
}
