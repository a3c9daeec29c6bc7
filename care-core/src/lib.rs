//! Care Recommendation & Multi-Provider Validation Engine
//!
//! Turns a subject's running history of self-reported scores and their
//! conversational input into:
//! - one validated reply, chosen across several AI providers
//! - at most one feature recommendation, rate-limited per subject
//! - a safety verdict that can short-circuit everything else
//! - badge progression updates
//!
//! # Pipeline
//!
//! ```text
//! EmergencyClassifier → ConnectivityAdapter → ConsensusValidator
//!                     → DirectiveRecommender → BadgeProgression
//! ```
//!
//! [`SupervisorOrchestrator`] composes the pipeline. Storage is reached
//! through the [`CareStore`] seam for reads; every write leaves as a
//! [`CareEvent`] on the [`EventBus`].
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use care_core::{
//!     ConnectivityLevel, EngineConfig, EventBus, MemoryStore, ProviderRegistry,
//!     SupervisorOrchestrator,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = EngineConfig::load("engine.toml")?;
//! let registry = ProviderRegistry::from_config(
//!     &config.providers,
//!     &config.consensus.circuit_breaker,
//!     config.consensus.deadline(),
//! )?;
//! let engine = SupervisorOrchestrator::new(
//!     config,
//!     Arc::new(registry),
//!     Arc::new(MemoryStore::new()),
//!     EventBus::new().shared(),
//! );
//! let outcome = engine
//!     .handle_subject_message("s1", "Skipped my walk today", ConnectivityLevel::Full, &CancellationToken::new())
//!     .await?;
//! println!("{}", outcome.reply_text);
//! # Ok(())
//! # }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod badge;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod consensus;
pub mod error;
pub mod events;
pub mod model;
pub mod orchestrator;
pub mod provider;
pub mod recommend;
pub mod safety;
pub mod store;

// Re-export key model types
pub use model::{
    latest_scores, BadgeEvidence, BadgeLevel, BadgeState, Category, ConnectivityLevel, Directive,
    FeatureId, InvalidScore, Recommendation, ScoreRecord, ScoreSubmission,
};

// Re-export configuration
pub use config::{ConfigError, ConfigResult, EngineConfig};

// Re-export engine components
pub use badge::{BadgeProgression, BadgeUpdate};
pub use connectivity::{ConnectivityAdapter, ConnectivityPolicy, QualityTier};
pub use consensus::{ConsensusError, ConsensusResult, ConsensusValidator, ValidationResult};
pub use recommend::{CooldownLedger, DirectiveRecommender, FeatureTable, RecommendationDecision};
pub use safety::{EmergencyClassifier, EmergencyKind, SafetyVerdict, Severity};

// Re-export provider types
pub use provider::{
    ChatCompletionsProvider, ProviderClient, ProviderContext, ProviderError, ProviderRegistry,
    ProviderReply, ProviderResult, SharedProvider,
};

// Re-export orchestration and collaborator seams
pub use clock::{Clock, FixedClock, SharedClock, SystemClock};
pub use error::{EngineError, EngineResult};
pub use events::{CareEvent, EventBus, EventFilter, SharedEventBus, SideEffect};
pub use orchestrator::{MessageOutcome, SubmissionOutcome, SupervisorOrchestrator, UsageOutcome};
pub use store::{CareStore, MemoryStore, SharedStore, StoreError, StoreResult};
