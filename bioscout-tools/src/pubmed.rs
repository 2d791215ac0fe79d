//! PubMed E-utilities client.
//!
//! Implements [`PublicationIndex`] over the two-step NCBI flow: `esearch`
//! (JSON) resolves a term to PMIDs, `efetch` (XML) returns the article
//! records. The XML is parsed with lightweight tag scanning rather than a
//! full parser; PubMed's efetch output is regular enough for that.
//!
//! Three search modes feed different consumers:
//! - free-text relevance search for the literature step,
//! - secondary-identifier (`[si]`) search for high-precision trial linking,
//! - heuristic metadata search when a trial has no direct id link.

use async_trait::async_trait;
use bioscout_core::config::ApiConfig;
use bioscout_core::error::SourceError;
use bioscout_core::prompts::AgentRole;
use bioscout_core::sources::{MetadataQuery, PublicationIndex};
use bioscout_core::state::{Citation, CitationKind};
use serde_json::Value;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";
const SOURCE: &str = "pubmed";

const TITLE_CHARS: usize = 150;
const ABSTRACT_CHARS: usize = 300;
const JOURNAL_CHARS: usize = 60;

pub struct PubmedClient {
    client: reqwest::Client,
    api_key: Option<String>,
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl PubmedClient {
    pub fn new(config: &ApiConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| SourceError::Request {
                source_name: SOURCE.to_string(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        // NCBI allows 3 requests/second without an API key, 10/second with.
        let min_interval = if config.ncbi_api_key.is_some() {
            Duration::from_millis(110)
        } else {
            Duration::from_millis(350)
        };
        Ok(Self {
            client,
            api_key: config.ncbi_api_key.clone(),
            last_request: Mutex::new(None),
            min_interval,
        })
    }

    async fn rate_limit(&self) {
        let wait = {
            let guard = self.last_request.lock().unwrap_or_else(|e| e.into_inner());
            guard
                .map(|last| self.min_interval.saturating_sub(last.elapsed()))
                .unwrap_or(Duration::ZERO)
            // Guard dropped here, before the await.
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        let mut guard = self.last_request.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(Instant::now());
    }

    async fn esearch(&self, term: &str, retmax: usize) -> Result<Vec<String>, SourceError> {
        self.rate_limit().await;
        let retmax = retmax.to_string();
        let mut params = vec![
            ("db", "pubmed"),
            ("term", term),
            ("retmax", retmax.as_str()),
            ("retmode", "json"),
            ("sort", "relevance"),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key));
        }

        let data: Value = self
            .client
            .get(ESEARCH_URL)
            .query(&params)
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?
            .json()
            .await
            .map_err(|e| SourceError::MalformedPayload {
                source_name: SOURCE.to_string(),
                message: e.to_string(),
            })?;

        let ids = data
            .pointer("/esearchresult/idlist")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    async fn efetch(&self, pmids: &[String]) -> Result<String, SourceError> {
        self.rate_limit().await;
        let ids = pmids.join(",");
        let mut params = vec![
            ("db", "pubmed"),
            ("id", ids.as_str()),
            ("retmode", "xml"),
            ("rettype", "abstract"),
        ];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key));
        }

        self.client
            .get(EFETCH_URL)
            .query(&params)
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?
            .text()
            .await
            .map_err(|e| SourceError::MalformedPayload {
                source_name: SOURCE.to_string(),
                message: e.to_string(),
            })
    }

    async fn run_search(
        &self,
        term: &str,
        retmax: usize,
        source_agent: &str,
    ) -> Result<(String, Vec<Citation>), SourceError> {
        debug!(%term, retmax, "pubmed search");
        let pmids = self.esearch(term, retmax).await?;
        if pmids.is_empty() {
            return Ok((
                format!("**No PubMed articles found for '{term}'.**"),
                Vec::new(),
            ));
        }

        let xml = self.efetch(&pmids).await?;
        let articles = parse_articles(&xml);

        let mut summary = format!(
            "**{} PubMed articles found for '{term}'**:\n\n",
            articles.len()
        );
        let mut citations = Vec::new();
        for (idx, article) in articles.iter().enumerate() {
            summary.push_str(&article.render());
            citations.push(article.to_citation(idx + 1, source_agent));
        }
        Ok((summary, citations))
    }
}

#[async_trait]
impl PublicationIndex for PubmedClient {
    async fn search_publications(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<(String, Vec<Citation>), SourceError> {
        self.run_search(
            query,
            max_results,
            AgentRole::LiteratureMiner.display_name(),
        )
        .await
    }

    async fn search_by_trial_id(
        &self,
        nct_id: &str,
    ) -> Result<(String, Vec<Citation>), SourceError> {
        // The [si] field holds registry ids; the bare term catches articles
        // that only mention the id in title or abstract.
        let term = format!("\"{nct_id}\"[si] OR \"{nct_id}\"");
        self.run_search(&term, 10, AgentRole::PubmedLinker.display_name())
            .await
    }

    async fn search_by_metadata(
        &self,
        query: &MetadataQuery,
    ) -> Result<(String, Vec<Citation>), SourceError> {
        let term = build_metadata_term(query);
        if term.is_empty() {
            return Ok(("**No usable trial metadata to search with.**".into(), Vec::new()));
        }
        self.run_search(&term, 10, AgentRole::PubmedLinker.display_name())
            .await
    }
}

/// Build the heuristic publication query from trial metadata.
fn build_metadata_term(query: &MetadataQuery) -> String {
    let mut parts = Vec::new();

    let words: Vec<String> = query
        .title
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .take(6)
        .map(|w| format!("\"{w}\""))
        .collect();
    if !words.is_empty() {
        parts.push(words.join(" "));
    }

    if !query.condition.is_empty() {
        parts.push(format!("\"{}\"", query.condition));
    }

    if let Some(surname) = pi_surname(&query.pi_name) {
        parts.push(format!("{surname}[Author]"));
    }

    if parts.is_empty() {
        return String::new();
    }

    parts.push("(\"clinical trial\"[pt] OR \"randomized controlled trial\"[pt])".to_string());

    if let Ok(year) = query.completion_year.parse::<i32>() {
        parts.push(format!("{}:{}[dp]", year - 2, year + 2));
    }

    parts.join(" AND ")
}

/// Surname of a principal investigator, dropping credentials ("Jane Roe, MD").
fn pi_surname(pi_name: &str) -> Option<&str> {
    pi_name
        .split(',')
        .next()
        .and_then(|name| name.split_whitespace().last())
        .filter(|s| s.len() > 1)
}

// ── XML Parsing ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Article {
    pmid: String,
    title: String,
    abstract_text: String,
    journal: String,
    year: String,
    authors: String,
    doi: String,
}

impl Article {
    fn render(&self) -> String {
        let mut line = format!("- **{}**\n", clip(&self.title, TITLE_CHARS));
        line.push_str(&format!(
            "  {} ({}) | {}\n",
            na(&self.authors),
            na(&self.year),
            na(&clip(&self.journal, JOURNAL_CHARS)),
        ));
        line.push_str(&format!("  PMID: {}", na(&self.pmid)));
        if !self.doi.is_empty() {
            line.push_str(&format!(" | DOI: {}", self.doi));
        }
        line.push('\n');
        if !self.abstract_text.is_empty() {
            line.push_str(&format!("  {}\n", clip(&self.abstract_text, ABSTRACT_CHARS)));
        }
        line.push('\n');
        line
    }

    fn to_citation(&self, index: usize, source_agent: &str) -> Citation {
        Citation {
            id: format!("pm-{index}"),
            kind: CitationKind::Pubmed,
            title: self.title.clone(),
            authors: self.authors.clone(),
            year: self.year.clone(),
            journal: self.journal.clone(),
            url: format!("https://pubmed.ncbi.nlm.nih.gov/{}/", self.pmid),
            pmid: self.pmid.clone(),
            doi: self.doi.clone(),
            nct_id: String::new(),
            source_agent: source_agent.to_string(),
        }
    }
}

fn parse_articles(xml: &str) -> Vec<Article> {
    tag_blocks(xml, "PubmedArticle")
        .into_iter()
        .map(|block| parse_article(&block))
        .collect()
}

fn parse_article(block: &str) -> Article {
    let abstract_text = tag_blocks(block, "AbstractText")
        .iter()
        .map(|t| normalize_whitespace(&strip_tags(t)))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    // Scope the year to PubDate; the record carries other <Year> elements
    // (DateCompleted, DateRevised) that are not the publication year.
    let year = tag_blocks_raw(block, "PubDate")
        .first()
        .and_then(|pub_date| {
            extract_tag_text(pub_date, "Year").or_else(|| {
                extract_tag_text(pub_date, "MedlineDate")
                    .as_deref()
                    .and_then(extract_year_digits)
            })
        })
        .unwrap_or_default();

    Article {
        pmid: extract_tag_text(block, "PMID").unwrap_or_default(),
        title: extract_tag_text(block, "ArticleTitle")
            .map(|t| normalize_whitespace(&strip_tags(&t)))
            .unwrap_or_default(),
        abstract_text,
        journal: extract_tag_text(block, "Title").unwrap_or_default(),
        year,
        authors: format_authors(block),
        doi: extract_article_id(block, "doi").unwrap_or_default(),
    }
}

/// First three authors as "Lastname AB", with "et al." when truncated.
fn format_authors(block: &str) -> String {
    let authors: Vec<String> = tag_blocks(block, "Author")
        .iter()
        .filter_map(|author| {
            let last = extract_tag_text(author, "LastName")?;
            match extract_tag_text(author, "Initials") {
                Some(initials) => Some(format!("{last} {initials}")),
                None => Some(last),
            }
        })
        .collect();
    if authors.is_empty() {
        return String::new();
    }
    if authors.len() > 3 {
        format!("{} et al.", authors[..3].join(", "))
    } else {
        authors.join(", ")
    }
}

/// Inner text of every `<ArticleId IdType="...">` matching `id_type`.
fn extract_article_id(block: &str, id_type: &str) -> Option<String> {
    let marker = format!("IdType=\"{id_type}\"");
    for id_block in tag_blocks_raw(block, "ArticleId") {
        if let Some(attr_end) = id_block.find('>') {
            if id_block[..attr_end].contains(&marker) {
                let text = &id_block[attr_end + 1..];
                let text = text.strip_suffix("</ArticleId>").unwrap_or(text);
                return Some(text.trim().to_string());
            }
        }
    }
    None
}

/// Inner text of the first `<tag>` occurrence, with nested markup stripped.
fn extract_tag_text(xml: &str, tag: &str) -> Option<String> {
    let block = tag_blocks_raw(xml, tag).into_iter().next()?;
    let start = block.find('>')? + 1;
    let close = format!("</{tag}>");
    let end = block.rfind(&close)?;
    if end < start {
        return None;
    }
    let text = normalize_whitespace(&strip_tags(&block[start..end]));
    if text.is_empty() { None } else { Some(text) }
}

/// Inner text of every `<tag>` occurrence.
fn tag_blocks(xml: &str, tag: &str) -> Vec<String> {
    let close = format!("</{tag}>");
    tag_blocks_raw(xml, tag)
        .into_iter()
        .filter_map(|block| {
            let start = block.find('>')? + 1;
            let end = block.rfind(&close)?;
            if end < start {
                return None;
            }
            Some(block[start..end].to_string())
        })
        .collect()
}

/// Raw `<tag ...> ... </tag>` slices, including the tags themselves. Only
/// matches exact tag names, not prefixes.
fn tag_blocks_raw<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut blocks = Vec::new();
    let mut cursor = 0;
    while let Some(found) = xml[cursor..].find(&open) {
        let start = cursor + found;
        let after = &xml[start + open.len()..];
        // Reject prefix matches like <PMIDList> when looking for <PMID>.
        if !after.starts_with('>') && !after.starts_with(' ') && !after.starts_with('/') {
            cursor = start + open.len();
            continue;
        }
        match xml[start..].find(&close) {
            Some(rel_end) => {
                let end = start + rel_end + close.len();
                blocks.push(&xml[start..end]);
                cursor = end;
            }
            None => break,
        }
    }
    blocks
}

fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First four-digit run in a MedlineDate like "2019 Nov-Dec".
fn extract_year_digits(text: &str) -> Option<String> {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|chunk| chunk.len() == 4)
        .map(str::to_string)
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
