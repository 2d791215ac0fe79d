//! Europe PMC full-text client.
//!
//! Implements [`FullTextSource`]. Resolves a PMID or DOI to a PMC id through
//! the search endpoint, then pulls the open-access full-text XML and strips
//! it to plain text. When no full text exists the abstract from the search
//! hit is returned instead, and any transport failure degrades to `None`
//! so the caller records "not available" rather than aborting a batch.

use async_trait::async_trait;
use bioscout_core::config::ApiConfig;
use bioscout_core::error::SourceError;
use bioscout_core::sources::FullTextSource;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

const SEARCH_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest/search";
const FULLTEXT_URL_BASE: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest";
const SOURCE: &str = "europe_pmc";

// Full-text documents are large; give them extra headroom over the
// configured per-request timeout.
const FULLTEXT_EXTRA_SECS: u64 = 5;

static XML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

pub struct EuropePmcClient {
    client: reqwest::Client,
    fulltext_timeout: Duration,
}

impl EuropePmcClient {
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
            fulltext_timeout: Duration::from_secs(config.timeout_secs + FULLTEXT_EXTRA_SECS),
        })
    }

    /// Look up the search hit for a publication: `(pmcid, abstract)`.
    async fn lookup(&self, pmid: &str, doi: &str) -> Option<(String, String)> {
        let query = if !pmid.is_empty() {
            format!("EXT_ID:{pmid} AND SRC:MED")
        } else if !doi.is_empty() {
            format!("DOI:\"{doi}\"")
        } else {
            return None;
        };

        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("query", query.as_str()),
                ("format", "json"),
                ("pageSize", "1"),
            ])
            .send()
            .await;

        let data: Value = match response {
            Ok(resp) => match resp.error_for_status() {
                Ok(resp) => match resp.json().await {
                    Ok(data) => data,
                    Err(err) => {
                        warn!(%pmid, error = %err, "europe pmc search payload unreadable");
                        return None;
                    }
                },
                Err(err) => {
                    warn!(%pmid, error = %err, "europe pmc search failed");
                    return None;
                }
            },
            Err(err) => {
                warn!(%pmid, error = %err, "europe pmc search request failed");
                return None;
            }
        };

        let hit = data.pointer("/resultList/result/0")?;
        let pmcid = hit
            .get("pmcid")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let abstract_text = hit
            .get("abstractText")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some((pmcid, abstract_text))
    }

    async fn fetch_fulltext_xml(&self, pmcid: &str) -> Option<String> {
        let url = format!("{FULLTEXT_URL_BASE}/{pmcid}/fullTextXML");
        let response = self
            .client
            .get(&url)
            .timeout(self.fulltext_timeout)
            .send()
            .await;
        match response {
            Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
            Ok(resp) => {
                debug!(%pmcid, status = %resp.status(), "no full-text XML");
                None
            }
            Err(err) => {
                warn!(%pmcid, error = %err, "full-text fetch failed");
                None
            }
        }
    }
}

#[async_trait]
impl FullTextSource for EuropePmcClient {
    async fn fetch_fulltext(&self, pmid: &str, doi: &str) -> Result<Option<String>, SourceError> {
        let Some((pmcid, abstract_text)) = self.lookup(pmid, doi).await else {
            return Ok(None);
        };

        if !pmcid.is_empty() {
            if let Some(xml) = self.fetch_fulltext_xml(&pmcid).await {
                let text = strip_to_text(&xml);
                if !text.is_empty() {
                    return Ok(Some(text));
                }
            }
        }

        // Abstract-only fallback still lets the scan find availability
        // statements that journals put in the abstract.
        let abstract_plain = strip_to_text(&abstract_text);
        if abstract_plain.is_empty() {
            Ok(None)
        } else {
            Ok(Some(abstract_plain))
        }
    }
}

/// Flatten XML or HTML-ish markup to whitespace-normalized plain text.
fn strip_to_text(markup: &str) -> String {
    let without_tags = XML_TAG_RE.replace_all(markup, " ");
    without_tags.split_whitespace().collect::<Vec<_>>().join(" ")
}
