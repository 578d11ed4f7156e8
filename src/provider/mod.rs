//! Bibliographic provider capability.
//!
//! Providers are unreliable third-party services: lookups degrade to "no
//! knowledge of this book" and transient failures are retried with bounded
//! backoff by [`RetryingProvider`].

mod client;
mod retry;

pub use client::HttpBookProvider;
pub use retry::{RetryPolicy, RetryingProvider};

use serde::Deserialize;
use thiserror::Error;

/// Errors from a provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned status {0}")]
    Status(u16),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("provider does not support free-text search")]
    SearchUnsupported,
}

impl ProviderError {
    /// Whether retrying the same call can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_) => true,
            ProviderError::Status(code) => *code >= 500 || *code == 429,
            _ => false,
        }
    }
}

/// A bibliographic record as returned by a provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderBook {
    pub id: String,
    pub title: String,
    pub author: String,
    pub isbn: Option<String>,
    pub language: Option<String>,
}

/// One free-text search result.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
}

/// External bibliographic lookup capability.
pub trait BookProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch a record by provider id. `Ok(None)` means the provider has no
    /// knowledge of this id.
    fn fetch_by_id(&self, id: &str) -> Result<Option<ProviderBook>, ProviderError>;

    /// Not all providers expose free-text search.
    fn supports_search(&self) -> bool;

    fn search(&self, query: &str) -> Result<Vec<SearchHit>, ProviderError>;
}
