//! ClinicalTrials.gov API v2 client.
//!
//! Implements [`TrialRegistry`]: condition search for the research pipeline
//! and per-trial enrichment for the linking pipeline. The v2 payload is
//! navigated tolerantly with JSON pointers; missing modules yield empty
//! fields rather than errors.

use async_trait::async_trait;
use bioscout_core::config::ApiConfig;
use bioscout_core::error::SourceError;
use bioscout_core::sources::{RegistryRecord, RegistryReference, TrialRegistry, TrialSummary};
use serde_json::Value;
use std::time::Duration;

const CT_STUDIES_URL: &str = "https://clinicaltrials.gov/api/v2/studies";
const SOURCE: &str = "clinical_trials";

pub struct ClinicalTrialsClient {
    client: reqwest::Client,
}

impl ClinicalTrialsClient {
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
}

#[async_trait]
impl TrialRegistry for ClinicalTrialsClient {
    async fn search_trials(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<(String, Vec<TrialSummary>), SourceError> {
        let page_size = max_results.to_string();
        let response = self
            .client
            .get(CT_STUDIES_URL)
            .query(&[("query.cond", query), ("pageSize", page_size.as_str())])
            .send()
            .await
            .map_err(|e| request_error(e))?;

        let data: Value = response
            .error_for_status()
            .map_err(|e| request_error(e))?
            .json()
            .await
            .map_err(|e| SourceError::MalformedPayload {
                source_name: SOURCE.to_string(),
                message: e.to_string(),
            })?;

        let studies = data
            .get("studies")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if studies.is_empty() {
            return Ok((
                format!("**No clinical trials found for '{query}'.** Try a broader search term."),
                Vec::new(),
            ));
        }

        let total = data
            .get("totalCount")
            .and_then(Value::as_u64)
            .unwrap_or(studies.len() as u64);
        let mut summary = format!(
            "**{total} total trials found for '{query}'** (showing top {}):\n\n",
            studies.len()
        );
        let mut trials = Vec::new();

        for study in &studies {
            let nct_id = pointer_text(study, "/protocolSection/identificationModule/nctId");
            let title = pointer_text(study, "/protocolSection/identificationModule/briefTitle");
            let status = pointer_text(study, "/protocolSection/statusModule/overallStatus");
            let phases = string_list(study, "/protocolSection/designModule/phases").join(", ");
            let enrollment =
                pointer_text(study, "/protocolSection/designModule/enrollmentInfo/count");
            let sponsor = pointer_text(
                study,
                "/protocolSection/sponsorCollaboratorsModule/leadSponsor/name",
            );
            let conditions = string_list(study, "/protocolSection/conditionsModule/conditions");
            let trial_url = if nct_id.is_empty() {
                String::new()
            } else {
                format!("https://clinicaltrials.gov/study/{nct_id}")
            };

            summary.push_str(&format!(
                "- **{}** (`{}`)\n  Status: {} | Phase: {} | N={}\n  Sponsor: {}\n  Conditions: {}\n\n",
                or_na(&title),
                or_na(&nct_id),
                or_na(&status),
                if phases.is_empty() { "N/A" } else { phases.as_str() },
                or_na(&enrollment),
                or_na(&sponsor),
                if conditions.is_empty() {
                    "N/A".to_string()
                } else {
                    conditions[..conditions.len().min(3)].join(", ")
                },
            ));

            trials.push(TrialSummary {
                nct_id,
                title,
                trial_url,
                status,
                phase: phases,
            });
        }

        Ok((summary, trials))
    }

    async fn enrich_trial(&self, nct_id: &str) -> Result<RegistryRecord, SourceError> {
        let url = format!("{CT_STUDIES_URL}/{nct_id}");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| request_error(e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound {
                id: nct_id.to_string(),
            });
        }

        let study: Value = response
            .error_for_status()
            .map_err(|e| request_error(e))?
            .json()
            .await
            .map_err(|e| SourceError::MalformedPayload {
                source_name: SOURCE.to_string(),
                message: e.to_string(),
            })?;

        Ok(normalize_study(nct_id, &study))
    }
}

/// Normalize a full v2 study payload into a compact registry record.
fn normalize_study(nct_id: &str, study: &Value) -> RegistryRecord {
    let mut conditions = string_list(study, "/protocolSection/conditionsModule/conditions");
    conditions.truncate(5);

    let mut interventions: Vec<String> = study
        .pointer("/protocolSection/armsInterventionsModule/interventions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    interventions.truncate(5);

    let pi_name = study
        .pointer("/protocolSection/contactsLocationsModule/overallOfficials/0/name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let registry_pmids = study
        .pointer("/protocolSection/referencesModule/references")
        .and_then(Value::as_array)
        .map(|refs| {
            refs.iter()
                .filter_map(|reference| {
                    let pmid = pointer_text(reference, "/pmid");
                    let citation = pointer_text(reference, "/citation");
                    if pmid.is_empty() && citation.is_empty() {
                        return None;
                    }
                    let reference_type = pointer_text(reference, "/type");
                    let is_result = reference_type.to_uppercase().contains("RESULT")
                        || reference
                            .get("isResultsReference")
                            .and_then(Value::as_bool)
                            .unwrap_or(false);
                    Some(RegistryReference {
                        pmid,
                        citation,
                        is_result,
                        reference_type,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    RegistryRecord {
        nct_id: nct_id.to_string(),
        brief_title: pointer_text(study, "/protocolSection/identificationModule/briefTitle"),
        official_title: pointer_text(study, "/protocolSection/identificationModule/officialTitle"),
        conditions,
        interventions,
        sponsor: pointer_text(
            study,
            "/protocolSection/sponsorCollaboratorsModule/leadSponsor/name",
        ),
        pi_name,
        start_date: pointer_text(study, "/protocolSection/statusModule/startDateStruct/date"),
        completion_date: pointer_text(
            study,
            "/protocolSection/statusModule/completionDateStruct/date",
        ),
        status: pointer_text(study, "/protocolSection/statusModule/overallStatus"),
        phases: string_list(study, "/protocolSection/designModule/phases"),
        enrollment: pointer_text(study, "/protocolSection/designModule/enrollmentInfo/count"),
        registry_pmids,
        trial_url: format!("https://clinicaltrials.gov/study/{nct_id}"),
    }
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

/// Text at a JSON pointer, flattened to a single trimmed line. Numbers are
/// rendered too, since v2 mixes string and numeric fields.
fn pointer_text(value: &Value, pointer: &str) -> String {
    match value.pointer(pointer) {
        Some(Value::String(s)) => s.replace('\n', " ").trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn string_list(value: &Value, pointer: &str) -> Vec<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn or_na(text: &str) -> &str {
    if text.is_empty() { "N/A" } else { text }
}
