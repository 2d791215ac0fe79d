//! Link validator and aggregator.
//!
//! Consolidates the per-trial linking records into the final confidence-tiered
//! payload. The primary path hands a compact JSON projection of every record
//! to the reasoner; the deterministic fallback reproduces the same contract
//! from the raw records and is also used when there is nothing to rank.

use crate::config::LinkingConfig;
use crate::linking::records::{
    ConfidenceTier, DataAvailability, LinkedPublication, TrialLink, TrialLinkRecord,
    ValidatedLinks,
};
use crate::prompts::AgentRole;
use crate::reasoner::{Reasoner, parse_structured};
use std::sync::Arc;
use tracing::warn;

pub struct LinkValidator {
    reasoner: Arc<dyn Reasoner>,
    high_confidence: u8,
    medium_confidence: u8,
    fulltext_confirm_floor: u8,
}

impl LinkValidator {
    pub fn new(reasoner: Arc<dyn Reasoner>, config: &LinkingConfig) -> Self {
        Self {
            reasoner,
            high_confidence: config.high_confidence,
            medium_confidence: config.medium_confidence,
            fulltext_confirm_floor: config.fulltext_confirm_floor,
        }
    }

    /// Validate and aggregate all trial records into the final payload.
    pub async fn validate(&self, records: &[TrialLinkRecord]) -> ValidatedLinks {
        if records.is_empty() {
            return ValidatedLinks {
                trial_links: Vec::new(),
                summary: "No trials to validate.".to_string(),
            };
        }

        let projections: Vec<String> = records
            .iter()
            .map(|rec| serde_json::to_string_pretty(rec).unwrap_or_default())
            .collect();
        let context = format!(
            "## Trial Linking Data ({} trials)\n\n{}\n\n\
             Validate, deduplicate, assign confidence tiers, and produce the final JSON.",
            records.len(),
            projections.join("\n\n---\n\n"),
        );

        match self
            .reasoner
            .reason(AgentRole::LinkValidator, &context, true)
            .await
        {
            Ok(response) => match Self::parse_validated(&response) {
                Some(validated) => validated,
                None => {
                    warn!("link validation unparsable, using deterministic fallback");
                    self.fallback(records)
                }
            },
            Err(err) => {
                warn!(error = %err, "link validation failed, using deterministic fallback");
                self.fallback(records)
            }
        }
    }

    /// Accept the response only when the parsed shape carries `trial_links`.
    fn parse_validated(response: &str) -> Option<ValidatedLinks> {
        let value = parse_structured(response)?;
        value.get("trial_links")?;
        serde_json::from_value(value).ok()
    }

    /// Deterministic aggregation from the raw records: same input, same
    /// output, no reasoner involved.
    pub fn fallback(&self, records: &[TrialLinkRecord]) -> ValidatedLinks {
        let trial_links: Vec<TrialLink> = records.iter().map(|rec| self.link_trial(rec)).collect();
        let total_pubs: usize = trial_links.iter().map(|t| t.publications.len()).sum();
        ValidatedLinks {
            summary: format!(
                "Found {total_pubs} publications across {} trials.",
                trial_links.len()
            ),
            trial_links,
        }
    }

    fn tier_for(&self, score: u8) -> ConfidenceTier {
        if score >= self.high_confidence {
            ConfidenceTier::High
        } else if score >= self.medium_confidence {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    fn link_trial(&self, rec: &TrialLinkRecord) -> TrialLink {
        let mut publications: Vec<LinkedPublication> = rec
            .pubmed_candidates
            .iter()
            .take(3)
            .map(|c| LinkedPublication {
                pmid: c.pmid.clone(),
                title: c.title.clone(),
                authors: c.authors.clone(),
                year: c.year.clone(),
                url: format!("https://pubmed.ncbi.nlm.nih.gov/{}/", c.pmid),
                confidence_tier: self.tier_for(c.confidence),
                confidence_score: c.confidence,
                match_reason: if c.match_reason.is_empty() {
                    "PubMed search match".to_string()
                } else {
                    c.match_reason.clone()
                },
            })
            .collect();

        // Verbatim trial-id mention in full text forces the high tier with a
        // score floor, regardless of the prior numeric score.
        for publication in &mut publications {
            let confirmed = rec
                .fulltext_data
                .iter()
                .any(|ft| ft.pmid == publication.pmid && ft.nct_mentioned);
            if confirmed {
                publication.confidence_tier = ConfidenceTier::High;
                publication.confidence_score =
                    publication.confidence_score.max(self.fulltext_confirm_floor);
                publication
                    .match_reason
                    .push_str(" (NCT ID confirmed in full text)");
            }
        }

        let availabilities: Vec<DataAvailability> =
            rec.fulltext_data.iter().map(|ft| ft.availability).collect();
        let data_availability = DataAvailability::summarize(availabilities.iter())
            .label()
            .to_string();

        let trial_url = if rec.registry.trial_url.is_empty() {
            format!("https://clinicaltrials.gov/study/{}", rec.nct_id)
        } else {
            rec.registry.trial_url.clone()
        };

        TrialLink {
            nct_id: rec.nct_id.clone(),
            trial_title: rec.registry.brief_title.clone(),
            trial_url,
            publications,
            datasets: rec.repository_hits.clone(),
            data_availability,
        }
    }
}

/// Render the validated links as a markdown tabular report.
pub fn render_markdown(validated: &ValidatedLinks) -> String {
    let trial_links = &validated.trial_links;
    if trial_links.is_empty() {
        return "### Clinical Trial Publication Links\n\nNo trial-publication links were found.\n"
            .to_string();
    }

    let total_pubs: usize = trial_links.iter().map(|t| t.publications.len()).sum();
    let total_datasets: usize = trial_links.iter().map(|t| t.datasets.len()).sum();
    let high_conf = trial_links
        .iter()
        .flat_map(|t| &t.publications)
        .filter(|p| p.confidence_tier == ConfidenceTier::High)
        .count();

    let mut md = String::from("### Clinical Trial Publication Links\n\n");
    md.push_str(&format!("{}\n\n", validated.summary));
    md.push_str(&format!(
        "**{} trials analysed** · **{total_pubs} publications found** · \
         **{high_conf} high-confidence matches** · **{total_datasets} datasets identified**\n\n",
        trial_links.len()
    ));

    md.push_str("| NCT ID | Clinical Trial | Publication | Confidence | Data |\n");
    md.push_str("|--------|---------------|-------------|------------|------|\n");

    for trial in trial_links {
        let nct_cell = if trial.trial_url.is_empty() {
            trial.nct_id.clone()
        } else {
            format!("[{}]({})", trial.nct_id, trial.trial_url)
        };
        let title = clip(&trial.trial_title, 60);

        if trial.publications.is_empty() {
            md.push_str(&format!(
                "| {nct_cell} | {title} | No publications found | — | {} |\n",
                trial.data_availability
            ));
            continue;
        }

        for publication in &trial.publications {
            let pub_cell = if !publication.title.is_empty() && !publication.url.is_empty() {
                format!("[{}]({})", clip(&publication.title, 80), publication.url)
            } else if !publication.pmid.is_empty() {
                format!("PMID: {}", publication.pmid)
            } else {
                clip(&publication.title, 80).to_string()
            };
            let tier = publication.confidence_tier.as_str();
            let marker = match publication.confidence_tier {
                ConfidenceTier::High => "🟢",
                ConfidenceTier::Medium => "🟡",
                ConfidenceTier::Low => "🔴",
            };
            md.push_str(&format!(
                "| {nct_cell} | {title} | {pub_cell} | {marker} {} ({}%) | {} |\n",
                capitalize(tier),
                publication.confidence_score,
                trial.data_availability
            ));
        }
    }

    let all_datasets: Vec<(&str, &crate::sources::DatasetRecord)> = trial_links
        .iter()
        .flat_map(|t| t.datasets.iter().map(move |d| (t.nct_id.as_str(), d)))
        .collect();
    if !all_datasets.is_empty() {
        md.push_str("\n### Associated Datasets\n\n");
        md.push_str("| NCT ID | Dataset | Source |\n");
        md.push_str("|--------|---------|--------|\n");
        for (nct, dataset) in all_datasets {
            let cell = if dataset.url.is_empty() {
                clip(&dataset.title, 80).to_string()
            } else {
                format!("[{}]({})", clip(&dataset.title, 80), dataset.url)
            };
            md.push_str(&format!("| {nct} | {cell} | {} |\n", dataset.source));
        }
    }

    md
}

fn clip(text: &str, max_chars: usize) -> &str {
    if text.len() <= max_chars {
        return text;
    }
    let mut end = max_chars;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
