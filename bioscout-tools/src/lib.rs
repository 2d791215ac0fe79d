//! # BioScout Tools
//!
//! reqwest-backed implementations of the `bioscout-core` data-source traits:
//! ClinicalTrials.gov, PubMed E-utilities, Semantic Scholar, Europe PMC, and
//! the Zenodo/Vivli dataset repositories. All clients share the timeout
//! settings from [`ApiConfig`] and degrade gracefully where the upstream
//! pipeline expects it.

pub mod clinical_trials;
pub mod europe_pmc;
pub mod pubmed;
pub mod repositories;
pub mod semantic_scholar;

pub use clinical_trials::ClinicalTrialsClient;
pub use europe_pmc::EuropePmcClient;
pub use pubmed::PubmedClient;
pub use repositories::RepositoryClient;
pub use semantic_scholar::SemanticScholarClient;

use bioscout_core::config::ApiConfig;
use bioscout_core::error::SourceError;
use bioscout_core::sources::{
    DatasetRepositories, FullTextSource, LiteratureIndex, PublicationIndex, TrialRegistry,
};
use std::sync::Arc;

/// The full set of production data-source clients, ready to plug into
/// `PipelineDeps` and `LinkingDeps`.
pub struct Clients {
    pub registry: Arc<dyn TrialRegistry>,
    pub publications: Arc<dyn PublicationIndex>,
    pub literature: Arc<dyn LiteratureIndex>,
    pub fulltext: Arc<dyn FullTextSource>,
    pub repositories: Arc<dyn DatasetRepositories>,
}

/// Build every production client from one API configuration.
pub fn build_clients(config: &ApiConfig) -> Result<Clients, SourceError> {
    Ok(Clients {
        registry: Arc::new(ClinicalTrialsClient::new(config)?),
        publications: Arc::new(PubmedClient::new(config)?),
        literature: Arc::new(SemanticScholarClient::new(config)?),
        fulltext: Arc::new(EuropePmcClient::new(config)?),
        repositories: Arc::new(RepositoryClient::new(config)?),
    })
}
