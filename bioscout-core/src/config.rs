//! Configuration system for BioScout.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment. Configuration is loaded from `bioscout.toml` in the working
//! directory, then overlaid with `BIOSCOUT_`-prefixed environment variables.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for the BioScout pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BioscoutConfig {
    pub pipeline: PipelineConfig,
    pub debate: DebateConfig,
    pub linking: LinkingConfig,
    pub api: ApiConfig,
}

/// Configuration for the main research pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum trials to carry forward from the trials scout.
    pub max_trials: usize,
    /// Maximum papers to request per literature source.
    pub max_papers: usize,
    /// Truncation applied to raw source excerpts fed back to the reasoner.
    pub excerpt_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_trials: 10,
            max_papers: 8,
            excerpt_chars: 800,
        }
    }
}

/// Configuration for the advocate/skeptic/mediator debate loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateConfig {
    /// Number of full advocate -> skeptic -> mediator rounds.
    pub max_rounds: usize,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self { max_rounds: 2 }
    }
}

/// Configuration for the trial-to-publication linking pipeline.
///
/// The confidence thresholds are carried here rather than hard-coded at use
/// sites: their values were inherited from manual tuning, not derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkingConfig {
    /// Maximum trials processed per linking run.
    pub max_trials: usize,
    /// Minimum numeric score for the "high" confidence tier.
    pub high_confidence: u8,
    /// Minimum numeric score for the "medium" confidence tier.
    pub medium_confidence: u8,
    /// Score floor applied when full text confirms the trial id verbatim.
    pub fulltext_confirm_floor: u8,
    /// Precision-search hit count below which the heuristic metadata
    /// search is also run.
    pub precision_search_min: usize,
    /// Publication candidates per trial handed to full-text extraction.
    pub fulltext_top_candidates: usize,
    /// Ceiling on simultaneous in-flight full-text extractions.
    pub fulltext_concurrency: usize,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            max_trials: 10,
            high_confidence: 70,
            medium_confidence: 50,
            fulltext_confirm_floor: 80,
            precision_search_min: 3,
            fulltext_top_candidates: 3,
            fulltext_concurrency: 3,
        }
    }
}

/// Configuration for external API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Per-request timeout for external data sources, in seconds.
    pub timeout_secs: u64,
    /// Connect timeout for external data sources, in seconds.
    pub connect_timeout_secs: u64,
    /// Optional NCBI API key (raises E-utilities rate limits).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ncbi_api_key: Option<String>,
    /// Optional Semantic Scholar API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_scholar_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            connect_timeout_secs: 10,
            ncbi_api_key: None,
            semantic_scholar_key: None,
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `BIOSCOUT_`)
/// 2. Workspace config (`<dir>/bioscout.toml`)
/// 3. Built-in defaults
pub fn load_config(workspace: Option<&Path>) -> Result<BioscoutConfig, Box<figment::Error>> {
    let _ = dotenvy::dotenv();

    let mut figment = Figment::from(Serialized::defaults(BioscoutConfig::default()));

    if let Some(ws) = workspace {
        let ws_config = ws.join("bioscout.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (BIOSCOUT_LINKING__HIGH_CONFIDENCE, etc.)
    figment = figment.merge(Env::prefixed("BIOSCOUT_").split("__"));

    figment.extract().map_err(Box::new)
}
