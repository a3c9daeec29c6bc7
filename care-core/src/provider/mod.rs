//! Text-generation provider capability
//!
//! Every external AI provider is wrapped behind [`ProviderClient`]. The
//! consensus validator only ever sees this trait; concrete clients are
//! registered once at startup in a read-only [`ProviderRegistry`].

pub mod chat;
pub mod registry;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use chat::ChatCompletionsProvider;
pub use registry::{CircuitBreaker, CircuitState, ProviderRegistry};

/// Errors from a single provider call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Response parse error: {0}")]
    ParseError(String),

    #[error("Provider returned an empty response")]
    EmptyResponse,

    #[error("API key not configured: {0}")]
    MissingApiKey(String),

    #[error("Cancelled")]
    Cancelled,
}

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Shared reference to a provider
pub type SharedProvider = Arc<dyn ProviderClient>;

/// Structured context passed alongside the prompt
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderContext {
    /// System instructions
    pub system: String,
    /// Output budget
    pub max_tokens: u32,
    /// Free-form key/value hints (subject summary, active categories, ...)
    pub attributes: BTreeMap<String, String>,
}

impl ProviderContext {
    pub fn new(system: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: system.into(),
            max_tokens,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A completion from one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderReply {
    pub provider_id: String,
    pub text: String,
}

/// Uniform capability over one external text-generation provider.
///
/// Implementations enforce their own timeout; the validator additionally
/// bounds every call by the shared deadline.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Stable identifier used in results and logs
    fn id(&self) -> &str;

    /// The provider's own request timeout
    fn timeout(&self) -> Duration;

    /// Generate a completion for `prompt`
    async fn generate(
        &self,
        prompt: &str,
        context: &ProviderContext,
    ) -> ProviderResult<ProviderReply>;
}
