//! Semantic Scholar Graph API client.
//!
//! Implements [`LiteratureIndex`]. The public endpoint rate-limits
//! aggressively, so each search retries up to five times with a linear
//! backoff on HTTP 429 before giving up with a rate-limit error.

use async_trait::async_trait;
use bioscout_core::config::ApiConfig;
use bioscout_core::error::SourceError;
use bioscout_core::prompts::AgentRole;
use bioscout_core::sources::LiteratureIndex;
use bioscout_core::state::{Citation, CitationKind};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const SEARCH_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search";
const FIELDS: &str = "title,abstract,year,authors,venue,url,externalIds,citationCount";
const SOURCE: &str = "semantic_scholar";
const MAX_ATTEMPTS: u32 = 5;

const TITLE_CHARS: usize = 150;
const ABSTRACT_CHARS: usize = 300;

pub struct SemanticScholarClient {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl SemanticScholarClient {
    pub fn new(config: &ApiConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| SourceError::Request {
                source_name: SOURCE.to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            api_key: config.semantic_scholar_key.clone(),
        })
    }

    async fn search_with_backoff(&self, query: &str, limit: usize) -> Result<Value, SourceError> {
        let limit = limit.to_string();
        for attempt in 0..MAX_ATTEMPTS {
            let mut request = self.client.get(SEARCH_URL).query(&[
                ("query", query),
                ("limit", limit.as_str()),
                ("fields", FIELDS),
            ]);
            if let Some(key) = &self.api_key {
                request = request.header("x-api-key", key);
            }

            let response = request.send().await.map_err(request_error)?;
            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let backoff = Duration::from_secs_f64(1.0 * f64::from(attempt + 1));
                warn!(%query, attempt, "semantic scholar rate limited, backing off");
                tokio::time::sleep(backoff).await;
                continue;
            }

            return response
                .error_for_status()
                .map_err(request_error)?
                .json()
                .await
                .map_err(|e| SourceError::MalformedPayload {
                    source_name: SOURCE.to_string(),
                    message: e.to_string(),
                });
        }
        Err(SourceError::RateLimited {
            source_name: SOURCE.to_string(),
        })
    }
}

#[async_trait]
impl LiteratureIndex for SemanticScholarClient {
    async fn search_papers(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<(String, Vec<Citation>), SourceError> {
        debug!(%query, limit, "semantic scholar search");
        let data = self.search_with_backoff(query, limit).await?;
        let papers = data
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if papers.is_empty() {
            return Ok((
                format!("**No Semantic Scholar papers found for '{query}'.**"),
                Vec::new(),
            ));
        }

        let mut summary = format!(
            "**{} Semantic Scholar papers found for '{query}'**:\n\n",
            papers.len()
        );
        let mut citations = Vec::new();
        for (idx, paper) in papers.iter().enumerate() {
            let citation = paper_citation(paper, idx + 1);
            summary.push_str(&render_paper(paper, &citation));
            citations.push(citation);
        }
        Ok((summary, citations))
    }
}

fn paper_citation(paper: &Value, index: usize) -> Citation {
    Citation {
        id: format!("ss-{index}"),
        kind: CitationKind::SemanticScholar,
        title: text(paper, "title"),
        authors: format_authors(paper),
        year: paper
            .get("year")
            .and_then(Value::as_i64)
            .map(|y| y.to_string())
            .unwrap_or_default(),
        journal: text(paper, "venue"),
        url: best_link(paper),
        pmid: paper
            .pointer("/externalIds/PubMed")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        doi: paper
            .pointer("/externalIds/DOI")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        nct_id: String::new(),
        source_agent: AgentRole::LiteratureMiner.display_name().to_string(),
    }
}

fn render_paper(paper: &Value, citation: &Citation) -> String {
    let cites = paper
        .get("citationCount")
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let mut line = format!("- **{}**\n", clip(&citation.title, TITLE_CHARS));
    line.push_str(&format!(
        "  {} ({}) | {} | {} citations\n",
        na(&citation.authors),
        na(&citation.year),
        na(&citation.journal),
        cites,
    ));
    if !citation.url.is_empty() {
        line.push_str(&format!("  {}\n", citation.url));
    }
    let abstract_text = text(paper, "abstract");
    if !abstract_text.is_empty() {
        line.push_str(&format!("  {}\n", clip(&abstract_text, ABSTRACT_CHARS)));
    }
    line.push('\n');
    line
}

/// Prefer a resolvable DOI link, then arXiv, then whatever the API gives.
fn best_link(paper: &Value) -> String {
    if let Some(doi) = paper.pointer("/externalIds/DOI").and_then(Value::as_str) {
        return format!("https://doi.org/{doi}");
    }
    if let Some(arxiv) = paper.pointer("/externalIds/ArXiv").and_then(Value::as_str) {
        return format!("https://arxiv.org/abs/{arxiv}");
    }
    text(paper, "url")
}

fn format_authors(paper: &Value) -> String {
    let names: Vec<&str> = paper
        .get("authors")
        .and_then(Value::as_array)
        .map(|authors| {
            authors
                .iter()
                .filter_map(|a| a.get("name").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if names.is_empty() {
        return String::new();
    }
    if names.len() > 3 {
        format!("{} et al.", names[..3].join(", "))
    } else {
        names.join(", ")
    }
}

fn text(paper: &Value, key: &str) -> String {
    paper
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let clipped: String = text.chars().take(max_chars).collect();
    format!("{}...", clipped.trim_end())
}

fn na(text: &str) -> &str {
    if text.is_empty() { "N/A" } else { text }
}

fn request_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout {
            source_name: SOURCE.to_string(),
            timeout_secs: 0,
        }
    } else {
        SourceError::Request {
            source_name: SOURCE.to_string(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paper() -> Value {
        json!({
            "title": "Adagrasib in advanced solid tumors",
            "abstract": "A multicenter study.",
            "year": 2022,
            "venue": "NEJM",
            "url": "https://www.semanticscholar.org/paper/abc",
            "citationCount": 210,
            "authors": [
                {"name": "A One"}, {"name": "B Two"},
                {"name": "C Three"}, {"name": "D Four"}
            ],
            "externalIds": {"DOI": "10.1056/NEJMoa2204619", "PubMed": "35658005"}
        })
    }

    #[test]
    fn test_paper_citation_prefers_doi_link() {
        let citation = paper_citation(&paper(), 1);
        assert_eq!(citation.id, "ss-1");
        assert_eq!(citation.kind, CitationKind::SemanticScholar);
        assert_eq!(citation.url, "https://doi.org/10.1056/NEJMoa2204619");
        assert_eq!(citation.pmid, "35658005");
        assert_eq!(citation.year, "2022");
        assert_eq!(citation.authors, "A One, B Two, C Three et al.");
    }

    #[test]
    fn test_best_link_fallbacks() {
        let arxiv_only = json!({"externalIds": {"ArXiv": "2207.00001"}, "url": "x"});
        assert_eq!(best_link(&arxiv_only), "https://arxiv.org/abs/2207.00001");

        let url_only = json!({"url": "https://example.org/p"});
        assert_eq!(best_link(&url_only), "https://example.org/p");

        assert_eq!(best_link(&json!({})), "");
    }

    #[test]
    fn test_render_paper_includes_citation_count() {
        let p = paper();
        let rendered = render_paper(&p, &paper_citation(&p, 1));
        assert!(rendered.contains("210 citations"));
        assert!(rendered.contains("Adagrasib"));
    }
}
