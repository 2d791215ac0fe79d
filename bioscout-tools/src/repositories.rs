//! Clinical dataset repository search across Zenodo and Vivli.
//!
//! Implements [`DatasetRepositories`]. Both repositories are queried with at
//! most two terms per trial (the NCT id and a truncated title), results are
//! deduplicated by URL, and either repository failing only drops its own
//! results. Neither API needs authentication for search.

use async_trait::async_trait;
use bioscout_core::config::ApiConfig;
use bioscout_core::error::SourceError;
use bioscout_core::sources::{DatasetRecord, DatasetRepositories};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const ZENODO_URL: &str = "https://zenodo.org/api/records";
const VIVLI_URL: &str = "https://search.vivli.org/api/search";
const SOURCE: &str = "repositories";

const MAX_RESULTS_PER_QUERY: usize = 5;
const TITLE_QUERY_CHARS: usize = 60;

pub struct RepositoryClient {
    client: reqwest::Client,
}

impl RepositoryClient {
    pub fn new(config: &ApiConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| SourceError::Request {
                source_name: SOURCE.to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }

    async fn search_zenodo(&self, query: &str) -> Vec<DatasetRecord> {
        let size = MAX_RESULTS_PER_QUERY.to_string();
        let response = self
            .client
            .get(ZENODO_URL)
            .query(&[
                ("q", query),
                ("size", size.as_str()),
                ("type", "dataset"),
                ("sort", "bestmatch"),
            ])
            .send()
            .await;

        let data: Value = match fetch_json(response, "zenodo", query).await {
            Some(data) => data,
            None => return Vec::new(),
        };

        data.pointer("/hits/hits")
            .and_then(Value::as_array)
            .map(|hits| {
                hits.iter()
                    .filter_map(|hit| {
                        let title = hit
                            .pointer("/metadata/title")
                            .and_then(Value::as_str)?
                            .to_string();
                        let url = hit
                            .pointer("/links/self_html")
                            .or_else(|| hit.pointer("/links/html"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        if url.is_empty() {
                            return None;
                        }
                        Some(DatasetRecord {
                            source: "Zenodo".to_string(),
                            title,
                            url,
                            doi: hit
                                .get("doi")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            description: hit
                                .pointer("/metadata/description")
                                .and_then(Value::as_str)
                                .map(|d| flatten(d, 200))
                                .unwrap_or_default(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn search_vivli(&self, query: &str) -> Vec<DatasetRecord> {
        let size = MAX_RESULTS_PER_QUERY.to_string();
        let response = self
            .client
            .get(VIVLI_URL)
            .query(&[("searchTerm", query), ("size", size.as_str())])
            .send()
            .await;

        let data: Value = match fetch_json(response, "vivli", query).await {
            Some(data) => data,
            None => return Vec::new(),
        };

        data.get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .filter_map(|result| {
                        let title = result
                            .get("studyTitle")
                            .or_else(|| result.get("title"))
                            .and_then(Value::as_str)?
                            .to_string();
                        let id = result
                            .get("id")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        if id.is_empty() {
                            return None;
                        }
                        Some(DatasetRecord {
                            source: "Vivli".to_string(),
                            title,
                            url: format!("https://search.vivli.org/doiLanding/studies/{id}/true"),
                            doi: result
                                .get("doi")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            description: String::new(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl DatasetRepositories for RepositoryClient {
    async fn search_datasets(
        &self,
        nct_id: &str,
        trial_title: &str,
    ) -> Result<Vec<DatasetRecord>, SourceError> {
        let queries = build_queries(nct_id, trial_title);
        debug!(%nct_id, query_count = queries.len(), "repository search");

        let mut records: Vec<DatasetRecord> = Vec::new();
        for query in &queries {
            let (zenodo, vivli) =
                tokio::join!(self.search_zenodo(query), self.search_vivli(query));
            for record in zenodo.into_iter().chain(vivli) {
                if !records.iter().any(|r| r.url == record.url) {
                    records.push(record);
                }
            }
        }

        records.truncate(MAX_RESULTS_PER_QUERY * 2);
        Ok(records)
    }
}

/// At most two queries per trial: the NCT id, then a truncated title.
fn build_queries(nct_id: &str, trial_title: &str) -> Vec<String> {
    let mut queries = Vec::new();
    if !nct_id.is_empty() {
        queries.push(nct_id.to_string());
    }
    let title: String = trial_title.chars().take(TITLE_QUERY_CHARS).collect();
    let title = title.trim().to_string();
    if !title.is_empty() && title != nct_id {
        queries.push(title);
    }
    queries.truncate(2);
    queries
}

async fn fetch_json(
    response: Result<reqwest::Response, reqwest::Error>,
    repo: &str,
    query: &str,
) -> Option<Value> {
    match response {
        Ok(resp) => match resp.error_for_status() {
            Ok(resp) => match resp.json().await {
                Ok(data) => Some(data),
                Err(err) => {
                    warn!(%repo, %query, error = %err, "repository payload unreadable");
                    None
                }
            },
            Err(err) => {
                warn!(%repo, %query, error = %err, "repository search failed");
                None
            }
        },
        Err(err) => {
            warn!(%repo, %query, error = %err, "repository request failed");
            None
        }
    }
}

/// Collapse HTML-ish description markup into a short plain-text snippet.
fn flatten(text: &str, max_chars: usize) -> String {
    let mut plain = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => plain.push(c),
            _ => {}
        }
    }
    let collapsed = plain.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let clipped: String = collapsed.chars().take(max_chars).collect();
    format!("{}...", clipped.trim_end())
}
