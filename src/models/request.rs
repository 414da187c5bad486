//! Wire request shape consumed from the CLI/API boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::types::{Domain, RawParams};

/// One fetch request as handed over by the thin entry-point layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Which standard schema the caller wants.
    pub domain: Domain,

    /// Raw, untyped parameters; validated by the selected fetcher.
    #[serde(default)]
    pub params: RawParams,

    /// Explicitly requested provider. When set, credential gaps fail the
    /// request instead of falling through to another provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Symbols to fan out over. Each target is dispatched as its own task
    /// with `params.symbol` replaced, and results are merged in this order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_targets: Option<Vec<String>>,

    /// Wall-clock budget for the whole dispatch, not per retry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Strict mode turns an empty result into an error instead of a warning.
    #[serde(default)]
    pub strict: bool,
}

impl FetchRequest {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            params: RawParams::new(),
            provider: None,
            batch_targets: None,
            timeout_ms: None,
            strict: false,
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = Some(provider.to_string());
        self
    }

    pub fn with_batch_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.batch_targets = Some(targets.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}
