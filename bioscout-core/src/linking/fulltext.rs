//! Full-text data-availability extractor.
//!
//! Fetches open-access full text, scans it with rule-based patterns, and asks
//! the reasoner to classify the availability statement only when the scan
//! actually found something. Any reasoner failure falls back to a verdict
//! derived from the scan alone.

use crate::config::LinkingConfig;
use crate::heuristics::{fulltext_mentions_nct, scan_for_data_availability};
use crate::linking::records::{DataAvailability, FulltextRecord, PublicationCandidate};
use crate::prompts::AgentRole;
use crate::reasoner::{Reasoner, parse_structured};
use crate::sources::FullTextSource;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::warn;

const FULLTEXT_EXCERPT_CHARS: usize = 3000;

pub struct FulltextExtractor {
    fulltext: Arc<dyn FullTextSource>,
    reasoner: Arc<dyn Reasoner>,
    top_candidates: usize,
}

impl FulltextExtractor {
    pub fn new(
        fulltext: Arc<dyn FullTextSource>,
        reasoner: Arc<dyn Reasoner>,
        config: &LinkingConfig,
    ) -> Self {
        Self {
            fulltext,
            reasoner,
            top_candidates: config.fulltext_top_candidates,
        }
    }

    /// Extract availability data for the top candidates of one trial.
    ///
    /// The shared semaphore bounds in-flight extractions across all trials;
    /// excess work queues behind it. Every extraction is awaited before the
    /// batch returns.
    pub async fn extract_batch(
        &self,
        candidates: &[PublicationCandidate],
        nct_id: &str,
        limiter: Arc<Semaphore>,
    ) -> Vec<FulltextRecord> {
        let tasks = candidates.iter().take(self.top_candidates).map(|candidate| {
            let limiter = limiter.clone();
            async move {
                // Semaphore is never closed, so acquire cannot fail.
                let _permit = limiter.acquire().await.expect("semaphore closed");
                self.extract_one(&candidate.pmid, &candidate.doi, nct_id).await
            }
        });
        join_all(tasks).await
    }

    async fn extract_one(&self, pmid: &str, doi: &str, nct_id: &str) -> FulltextRecord {
        let mut record = FulltextRecord {
            pmid: pmid.to_string(),
            doi: doi.to_string(),
            ..Default::default()
        };

        let fulltext = match self.fulltext.fetch_fulltext(pmid, doi).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                record.notes = "Full text not available (abstract-only or closed access)".into();
                return record;
            }
            Err(err) => {
                warn!(%pmid, error = %err, "full-text fetch failed");
                record.notes = format!("Full-text fetch failed: {err}");
                return record;
            }
        };

        record.fulltext_available = true;
        record.nct_mentioned = fulltext_mentions_nct(&fulltext, nct_id);

        let scan = scan_for_data_availability(&fulltext);
        record.repository_urls = scan.urls.clone();
        record.repository_names = scan.repositories.clone();

        if !scan.found_anything() {
            record.availability = DataAvailability::NotStated;
            return record;
        }

        let excerpt = excerpt(&fulltext, FULLTEXT_EXCERPT_CHARS);
        let context = format!(
            "## Publication: PMID {pmid}\n\n\
             ## Extracted Data-Availability Information\n\
             - Has data section: {}\n\
             - Detected repositories: {:?}\n\
             - Extracted URLs: {:?}\n\
             - Statement snippet: {}\n\n\
             ## Full Text Excerpt\n{excerpt}\n",
            scan.has_data_section, scan.repositories, scan.urls, scan.statement,
        );

        match self
            .reasoner
            .reason(AgentRole::FulltextExtractor, &context, true)
            .await
        {
            Ok(response) => match parse_structured(&response) {
                Some(value) => {
                    record.availability = value
                        .get("availability_type")
                        .and_then(|v| v.as_str())
                        .map(DataAvailability::parse)
                        .unwrap_or_default();
                    record.statement_snippet = string_field(&value, "statement_snippet");
                    record.notes = string_field(&value, "notes");
                    record.supplementary_urls = string_list(&value, "supplementary_urls");
                    merge_unique(&mut record.repository_urls, string_list(&value, "repository_urls"));
                    merge_unique(
                        &mut record.repository_names,
                        string_list(&value, "repository_names"),
                    );
                }
                None => {
                    warn!(%pmid, "availability classification unparsable, using scan verdict");
                    apply_scan_verdict(&mut record, &scan.repositories, &scan.statement);
                }
            },
            Err(err) => {
                warn!(%pmid, error = %err, "availability classification failed, using scan verdict");
                apply_scan_verdict(&mut record, &scan.repositories, &scan.statement);
            }
        }

        record
    }
}

/// Rule-based verdict: a detected repository implies openly deposited data.
fn apply_scan_verdict(record: &mut FulltextRecord, repositories: &[String], statement: &str) {
    record.availability = if repositories.is_empty() {
        DataAvailability::NotStated
    } else {
        DataAvailability::OpenAccess
    };
    record.statement_snippet = excerpt(statement, 200).to_string();
}

fn excerpt(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut end = max_chars;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn string_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn string_list(value: &serde_json::Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn merge_unique(target: &mut Vec<String>, extra: Vec<String>) {
    for item in extra {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::reasoner::MockReasoner;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFulltext {
        text: Option<String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl StubFulltext {
        fn with_text(text: &str) -> Self {
            Self {
                text: Some(text.to_string()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn unavailable() -> Self {
            Self {
                text: None,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FullTextSource for StubFulltext {
        async fn fetch_fulltext(
            &self,
            _pmid: &str,
            _doi: &str,
        ) -> Result<Option<String>, SourceError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(self.text.clone())
        }
    }

    fn candidates(n: usize) -> Vec<PublicationCandidate> {
        (0..n)
            .map(|i| PublicationCandidate {
                pmid: format!("{}", 1000 + i),
                ..Default::default()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_missing_fulltext_yields_not_stated() {
        let extractor = FulltextExtractor::new(
            Arc::new(StubFulltext::unavailable()),
            Arc::new(MockReasoner::new()),
            &LinkingConfig::default(),
        );
        let records = extractor
            .extract_batch(&candidates(1), "NCT01234567", Arc::new(Semaphore::new(3)))
            .await;
        assert_eq!(records.len(), 1);
        assert!(!records[0].fulltext_available);
        assert_eq!(records[0].availability, DataAvailability::NotStated);
        assert!(records[0].notes.contains("not available"));
    }

    #[tokio::test]
    async fn test_nct_mention_and_classification() {
        let text = "This report of NCT01234567 includes a Data availability section: \
                    data are deposited in Zenodo at https://zenodo.org/record/99.";
        let extractor = FulltextExtractor::new(
            Arc::new(StubFulltext::with_text(text)),
            Arc::new(MockReasoner::with_response(
                r#"{"availability_type": "on_request",
                    "statement_snippet": "data are deposited",
                    "repository_names": ["Zenodo"], "repository_urls": [],
                    "supplementary_urls": [], "notes": ""}"#,
            )),
            &LinkingConfig::default(),
        );
        let records = extractor
            .extract_batch(&candidates(1), "NCT01234567", Arc::new(Semaphore::new(3)))
            .await;
        assert!(records[0].nct_mentioned);
        assert!(records[0].fulltext_available);
        assert_eq!(records[0].availability, DataAvailability::OnRequest);
        // Rule-based and reasoner repository names merge without duplicates.
        assert_eq!(records[0].repository_names, vec!["Zenodo".to_string()]);
    }

    #[tokio::test]
    async fn test_reasoner_failure_falls_back_to_scan_verdict() {
        let text = "Data availability: raw counts are on Figshare.";
        let extractor = FulltextExtractor::new(
            Arc::new(StubFulltext::with_text(text)),
            Arc::new(MockReasoner::failing()),
            &LinkingConfig::default(),
        );
        let records = extractor
            .extract_batch(&candidates(1), "NCT01234567", Arc::new(Semaphore::new(3)))
            .await;
        assert_eq!(records[0].availability, DataAvailability::OpenAccess);
        assert!(records[0].statement_snippet.contains("Data availability"));
    }

    #[tokio::test]
    async fn test_no_data_section_skips_reasoner() {
        let text = "Plain methods text with no relevant sections at all.";
        // A failing reasoner proves the classification call never happens.
        let extractor = FulltextExtractor::new(
            Arc::new(StubFulltext::with_text(text)),
            Arc::new(MockReasoner::failing()),
            &LinkingConfig::default(),
        );
        let records = extractor
            .extract_batch(&candidates(1), "NCT01234567", Arc::new(Semaphore::new(3)))
            .await;
        assert_eq!(records[0].availability, DataAvailability::NotStated);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded_by_semaphore() {
        let source = Arc::new(StubFulltext::with_text("no data sections here"));
        let mut config = LinkingConfig::default();
        config.fulltext_top_candidates = 6;
        let extractor = FulltextExtractor::new(
            source.clone(),
            Arc::new(MockReasoner::new()),
            &config,
        );
        let limiter = Arc::new(Semaphore::new(2));
        let records = extractor
            .extract_batch(&candidates(6), "NCT01234567", limiter)
            .await;
        assert_eq!(records.len(), 6);
        assert!(source.max_in_flight.load(Ordering::SeqCst) <= 2);
    }
}
