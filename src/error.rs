//! Typed errors for the fetch and merge steps.
//!
//! Everything else propagates as `anyhow::Error`; these enums exist so callers can tell a
//! retryable provider hiccup from an exhausted fetch, and a bad merge reply from an I/O
//! failure.

use thiserror::Error;

/// Errors raised by a search provider for a single attempt.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Rate limits, timeouts, 5xx responses. Worth retrying.
    #[error("transient search error: {0}")]
    Transient(String),

    /// Bad credentials, malformed responses, 4xx other than 429. Retrying will not help.
    #[error("search provider error: {0}")]
    Fatal(String),
}

impl SearchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SearchError::Transient(_))
    }
}

/// Errors surfaced by the content fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Every attempt failed with a transient error.
    #[error("exceeded maximum retries ({attempts}) fetching related content: {last_error}")]
    ExhaustedRetries { attempts: usize, last_error: String },

    /// The provider failed in a way that was not retried.
    #[error(transparent)]
    Provider(#[from] SearchError),
}

/// Why a model merge reply could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeParseError {
    #[error("merge reply contains no JSON object")]
    NoJsonObject,

    #[error("merge reply is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("merge reply has an unexpected shape: {0}")]
    UnexpectedShape(String),
}
