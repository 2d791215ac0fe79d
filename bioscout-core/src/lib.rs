//! # BioScout Core
//!
//! Core library for the BioScout biomedical research pipeline.
//! Provides the pipeline executor and state model, the multi-round debate
//! loop, the trial-to-publication linking orchestrator, the reasoning-gateway
//! abstraction, data-source contracts, configuration, and error types.

pub mod config;
pub mod error;
pub mod events;
pub mod heuristics;
pub mod linking;
pub mod pipeline;
pub mod prompts;
pub mod reasoner;
pub mod sources;
pub mod state;

// Re-export commonly used types at the crate root.
pub use config::{ApiConfig, BioscoutConfig, DebateConfig, LinkingConfig, PipelineConfig, load_config};
pub use error::{BioscoutError, ConfigError, PipelineError, ReasonerError, Result, SourceError};
pub use events::{LinkingEvent, PipelineEvent};
pub use linking::{
    ConfidenceTier, DataAvailability, LinkingDeps, LinkingOrchestrator, LinkingOutcome, TrialLink,
    TrialLinkRecord, ValidatedLinks,
};
pub use pipeline::{PipelineDeps, PipelineExecutor, PipelineStep};
pub use prompts::{AgentRole, PromptLibrary};
pub use reasoner::{MockReasoner, Reasoner};
pub use sources::{
    DatasetRecord, DatasetRepositories, FullTextSource, LiteratureIndex, MetadataQuery,
    PublicationIndex, RegistryRecord, TrialRegistry, TrialSummary,
};
pub use state::{AgentLogEntry, Citation, CitationKind, PipelineState, SearchCriteria, StateUpdate};
