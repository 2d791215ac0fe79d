//! Best-effort text heuristics.
//!
//! Isolated pure functions for the rule-based text parsing the pipelines
//! rely on: target splitting, the data-availability section scan, and year
//! extraction. These intentionally stay simple pattern matchers rather than
//! growing into a parser layer.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<gene>[A-Z0-9a-z][A-Za-z0-9-]+)(?:\s+(?P<mutation>.+))?$").unwrap()
});

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)https?://[^\s<>"')}\]]+"#).unwrap());

static DATA_SECTION_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"data\s*availab",
        r"data\s*sharing",
        r"data\s*access",
        r"supplementary\s*material",
        r"supplementary\s*data",
        r"code\s*availab",
        r"data\s*and\s*code",
        r"accession\s*number",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Repository name patterns recognized in data-availability text.
static REPOSITORY_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)dryad", "Dryad"),
        (r"(?i)figshare", "Figshare"),
        (r"(?i)zenodo", "Zenodo"),
        (r"(?i)vivli", "Vivli"),
        (r"(?i)clinicalstudydatarequest", "ClinicalStudyDataRequest"),
        (r"(?i)immport", "ImmPort"),
        (r"(?i)dbgap", "dbGaP"),
        (r"(?i)github\.com", "GitHub"),
        (r"(?i)gitlab\.com", "GitLab"),
        (r"(?i)synapse\.org", "Synapse"),
        (r"(?i)dataverse", "Dataverse"),
        (r"(?i)osf\.io", "OSF"),
        (r"(?i)datashare\.nida", "NIDA Data Share"),
        (r"(?i)accessclinicaldata", "AccessClinicalData@NIAID"),
        (r"(?i)ncbi\.nlm\.nih\.gov/geo", "GEO"),
        (r"(?i)ncbi\.nlm\.nih\.gov/sra", "SRA"),
        (r"(?i)ebi\.ac\.uk/arrayexpress", "ArrayExpress"),
    ]
    .iter()
    .map(|(p, name)| (Regex::new(p).unwrap(), *name))
    .collect()
});

// URLs that never point at data.
const SKIP_URL_FRAGMENTS: &[&str] = &[
    "creativecommons.org",
    "doi.org/10.1",
    "crossref.org",
    "orcid.org",
];

/// Best-effort split of a research target into (gene, mutation).
///
/// "KRAS G12C" splits into ("KRAS", Some("G12C")); a single token stays
/// whole with no mutation.
pub fn parse_target(target: &str) -> (String, Option<String>) {
    let trimmed = target.trim();
    if let Some(caps) = TARGET_RE.captures(trimmed) {
        let gene = caps.name("gene").map_or(trimmed, |m| m.as_str());
        let mutation = caps.name("mutation").map(|m| m.as_str().to_string());
        return (gene.to_string(), mutation);
    }
    (trimmed.to_string(), None)
}

/// Result of the rule-based data-availability scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AvailabilityScan {
    /// URLs extracted from the data sections (or whole text when no section
    /// was found), capped at 20.
    pub urls: Vec<String>,
    /// Detected repository names, in pattern order.
    pub repositories: Vec<String>,
    /// Snippet of the first data-availability section, up to 500 chars.
    pub statement: String,
    /// Whether any data-availability section heading was found.
    pub has_data_section: bool,
}

impl AvailabilityScan {
    /// Whether the scan found anything worth interpreting further.
    pub fn found_anything(&self) -> bool {
        self.has_data_section || !self.repositories.is_empty()
    }
}

/// Scan publication full text for data-availability sections, repository
/// mentions, and URLs.
pub fn scan_for_data_availability(fulltext: &str) -> AvailabilityScan {
    if fulltext.is_empty() {
        return AvailabilityScan::default();
    }

    let text_lower = fulltext.to_lowercase();

    // Collect windows around each section heading match.
    let mut sections: Vec<&str> = Vec::new();
    for re in DATA_SECTION_RES.iter() {
        for m in re.find_iter(&text_lower) {
            let start = m.start().saturating_sub(50);
            let end = (m.end() + 1000).min(fulltext.len());
            let start = floor_char_boundary(fulltext, start);
            let end = floor_char_boundary(fulltext, end);
            sections.push(&fulltext[start..end]);
        }
    }

    let has_data_section = !sections.is_empty();
    let search_text = if has_data_section {
        sections.join(" ")
    } else {
        fulltext.to_string()
    };

    let mut urls: Vec<String> = Vec::new();
    for m in URL_RE.find_iter(&search_text) {
        let url = m.as_str().to_string();
        let lower = url.to_lowercase();
        if SKIP_URL_FRAGMENTS.iter().any(|skip| lower.contains(skip)) {
            continue;
        }
        if !urls.contains(&url) {
            urls.push(url);
        }
        if urls.len() >= 20 {
            break;
        }
    }

    let mut repositories: Vec<String> = Vec::new();
    for (re, name) in REPOSITORY_PATTERNS.iter() {
        if re.is_match(&search_text) && !repositories.iter().any(|r| r == name) {
            repositories.push((*name).to_string());
        }
    }

    let statement = sections
        .first()
        .map(|s| {
            let trimmed = s.trim();
            let cut = floor_char_boundary(trimmed, 500.min(trimmed.len()));
            if trimmed.len() > 500 {
                format!("{}...", &trimmed[..cut])
            } else {
                trimmed.to_string()
            }
        })
        .unwrap_or_default();

    AvailabilityScan {
        urls,
        repositories,
        statement,
        has_data_section,
    }
}

/// Whether the full text mentions the given trial id, case-insensitively.
pub fn fulltext_mentions_nct(fulltext: &str, nct_id: &str) -> bool {
    if fulltext.is_empty() || nct_id.is_empty() {
        return false;
    }
    fulltext.to_uppercase().contains(&nct_id.to_uppercase())
}

/// Extract a 4-digit year from a registry date string like "2021-06" or
/// "June 2021".
pub fn extract_year(date: &str) -> Option<String> {
    date.split(|c: char| !c.is_ascii_digit())
        .find(|part| part.len() == 4)
        .map(str::to_string)
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_gene_and_mutation() {
        assert_eq!(parse_target("KRAS G12C"), ("KRAS".into(), Some("G12C".into())));
        assert_eq!(parse_target("TP53"), ("TP53".into(), None));
        assert_eq!(
            parse_target("  BRAF V600E melanoma  "),
            ("BRAF".into(), Some("V600E melanoma".into()))
        );
    }

    #[test]
    fn test_scan_finds_section_and_repository() {
        let text = "Methods were standard. Data availability: all sequencing data \
                    have been deposited in Zenodo at https://zenodo.org/record/123456 \
                    and code is at https://github.com/lab/analysis.";
        let scan = scan_for_data_availability(text);
        assert!(scan.has_data_section);
        assert!(scan.found_anything());
        assert!(scan.repositories.contains(&"Zenodo".to_string()));
        assert!(scan.repositories.contains(&"GitHub".to_string()));
        assert!(scan.urls.iter().any(|u| u.contains("zenodo.org")));
        assert!(scan.statement.contains("Data availability"));
    }

    #[test]
    fn test_scan_skips_license_urls() {
        let text = "Data sharing statement: see https://creativecommons.org/licenses/by/4.0/ \
                    for the license.";
        let scan = scan_for_data_availability(text);
        assert!(scan.has_data_section);
        assert!(scan.urls.is_empty());
    }

    #[test]
    fn test_scan_empty_text() {
        let scan = scan_for_data_availability("");
        assert!(!scan.found_anything());
        assert!(scan.urls.is_empty());
        assert!(scan.statement.is_empty());
    }

    #[test]
    fn test_fulltext_mentions_nct_case_insensitive() {
        assert!(fulltext_mentions_nct(
            "This trial (nct01234567) enrolled 40 patients.",
            "NCT01234567"
        ));
        assert!(!fulltext_mentions_nct("No trial id here.", "NCT01234567"));
        assert!(!fulltext_mentions_nct("", "NCT01234567"));
    }

    #[test]
    fn test_extract_year() {
        assert_eq!(extract_year("2021-06-30"), Some("2021".into()));
        assert_eq!(extract_year("June 2019"), Some("2019".into()));
        assert_eq!(extract_year(""), None);
        assert_eq!(extract_year("ongoing"), None);
    }
}
