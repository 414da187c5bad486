//! Error types and retry classification for dispatch and fetching.
//!
//! This module provides:
//! - [`FetchError`]: the main error enum for all fetch operations
//! - [`ProviderErrorKind`]: classification of remote provider failures
//! - [`RetryClass`] / [`RetryPolicy`]: retry behavior for the extract stage
//! - [`ErrorResponse`]: the serializable wire shape consumed by callers

mod retry;

pub use retry::{RetryClass, RetryPolicy};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a remote provider failure.
///
/// Determines whether an extract attempt is worth retrying: rate limits
/// and transport hiccups are transient, auth and not-found are not.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Missing, invalid, or expired credentials (HTTP 401/403).
    Auth,
    /// The provider rate limited the request (HTTP 429).
    RateLimit,
    /// The provider does not know the requested symbol or range.
    NotFound,
    /// Network or protocol failure talking to the provider.
    Transport,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProviderErrorKind::Auth => "auth",
            ProviderErrorKind::RateLimit => "rate_limit",
            ProviderErrorKind::NotFound => "not_found",
            ProviderErrorKind::Transport => "transport",
        };
        write!(f, "{}", label)
    }
}

/// Errors that can occur while dispatching a fetch request.
///
/// Each variant maps onto exactly one wire [`ErrorKind`], and carries the
/// provider attribution the caller needs to tell a source outage apart
/// from a local mistake or a fetcher defect.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Bad, missing, or incompatible caller input.
    /// Local, never retried, never triggers provider fallback.
    #[error("Validation error: {message}")]
    Validation {
        /// Summary of the failure.
        message: String,
        /// Every offending field with its reason, not just the first.
        field_errors: BTreeMap<String, String>,
    },

    /// A remote failure attributed to one provider.
    /// Retried per [`RetryPolicy`] when transient, then eligible for
    /// fallback if the dispatcher has fallback enabled.
    #[error("Provider error: {provider} - {kind}: {message}")]
    Provider {
        /// The provider that failed.
        provider: String,
        /// Failure classification.
        kind: ProviderErrorKind,
        /// The error message from the provider.
        message: String,
    },

    /// The provider payload failed to validate against the standard output
    /// schema. This signals a fetcher implementation defect, so it is never
    /// retried and never triggers fallback - the next provider in the chain
    /// is not at fault.
    #[error("Schema error: {provider} - {message}")]
    Schema {
        /// The provider whose fetcher produced the invalid record.
        provider: String,
        /// Description of the schema violation.
        message: String,
    },

    /// The dispatch-level deadline was exceeded. Distinct from
    /// [`FetchError::Provider`] even when the cause is a slow provider.
    #[error("Timeout: dispatch exceeded {budget_ms} ms budget")]
    Timeout {
        /// The caller-supplied budget that expired.
        budget_ms: u64,
    },

    /// Zero records were produced and the request ran in strict mode.
    #[error("Empty result: {message}")]
    EmptyResult {
        /// Description of what came back empty.
        message: String,
    },

    /// Anything that does not fit the taxonomy above.
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl FetchError {
    /// Build a validation error with a single field failure.
    pub fn validation_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let field = field.into();
        let reason = reason.into();
        let mut field_errors = BTreeMap::new();
        field_errors.insert(field.clone(), reason.clone());
        FetchError::Validation {
            message: format!("{}: {}", field, reason),
            field_errors,
        }
    }

    /// Build a validation error without field attribution.
    pub fn validation(message: impl Into<String>) -> Self {
        FetchError::Validation {
            message: message.into(),
            field_errors: BTreeMap::new(),
        }
    }

    /// Build a provider error.
    pub fn provider(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        FetchError::Provider {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    /// Build a schema error attributed to `provider`.
    pub fn schema(provider: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Schema {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a remote provider failure, the only class
    /// that provider fallback ever reacts to.
    pub fn is_provider(&self) -> bool {
        matches!(self, FetchError::Provider { .. })
    }

    /// Returns the retry classification for this error.
    ///
    /// - [`RetryClass::Never`]: terminal, don't retry
    /// - [`RetryClass::WithBackoff`]: retry the same provider with backoff
    /// - [`RetryClass::NextProvider`]: the same provider cannot succeed,
    ///   but another one might
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Validation { .. }
            | Self::Schema { .. }
            | Self::Timeout { .. }
            | Self::EmptyResult { .. }
            | Self::Unexpected(_) => RetryClass::Never,

            Self::Provider { kind, .. } => match kind {
                ProviderErrorKind::RateLimit | ProviderErrorKind::Transport => {
                    RetryClass::WithBackoff
                }
                ProviderErrorKind::Auth | ProviderErrorKind::NotFound => RetryClass::NextProvider,
            },
        }
    }
}

/// Wire-level error category.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    ProviderError,
    SchemaError,
    Timeout,
    EmptyResult,
    Unexpected,
}

/// Serializable error shape returned across the API boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error category.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Per-field validation failures, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<BTreeMap<String, String>>,
    /// The provider the failure is attributed to, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl From<&FetchError> for ErrorResponse {
    fn from(error: &FetchError) -> Self {
        let (kind, field_errors, provider) = match error {
            FetchError::Validation { field_errors, .. } => {
                let fields = if field_errors.is_empty() {
                    None
                } else {
                    Some(field_errors.clone())
                };
                (ErrorKind::Validation, fields, None)
            }
            FetchError::Provider { provider, .. } => {
                (ErrorKind::ProviderError, None, Some(provider.clone()))
            }
            FetchError::Schema { provider, .. } => {
                (ErrorKind::SchemaError, None, Some(provider.clone()))
            }
            FetchError::Timeout { .. } => (ErrorKind::Timeout, None, None),
            FetchError::EmptyResult { .. } => (ErrorKind::EmptyResult, None, None),
            FetchError::Unexpected(_) => (ErrorKind::Unexpected, None, None),
        };
        ErrorResponse {
            kind,
            message: error.to_string(),
            field_errors,
            provider,
        }
    }
}
