//! Immutable, process-scoped credential store.
//!
//! Built once at process init from the (out-of-scope) secrets loader and
//! passed read-only through the dispatch call chain. Values are never
//! logged: the `Debug` impl prints key names only.

use std::collections::HashMap;
use std::fmt;

/// Per-provider credential slices, keyed by provider id.
#[derive(Clone, Default)]
pub struct Credentials {
    by_provider: HashMap<String, HashMap<String, String>>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one credential value. Builder-style, used at process init only.
    pub fn with(mut self, provider: &str, key: &str, value: impl Into<String>) -> Self {
        self.by_provider
            .entry(provider.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
        self
    }

    /// Look up one credential value for a provider.
    pub fn get(&self, provider: &str, key: &str) -> Option<&str> {
        self.by_provider
            .get(provider)
            .and_then(|slice| slice.get(key))
            .map(|value| value.as_str())
            .filter(|value| !value.is_empty())
    }

    /// Required keys the store cannot satisfy for a provider.
    /// Empty values count as missing.
    pub fn missing_keys(
        &self,
        provider: &str,
        required: &[&'static str],
    ) -> Vec<&'static str> {
        required
            .iter()
            .filter(|key| self.get(provider, key).is_none())
            .copied()
            .collect()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (provider, slice) in &self.by_provider {
            let mut keys: Vec<&str> = slice.keys().map(|k| k.as_str()).collect();
            keys.sort_unstable();
            map.entry(provider, &keys);
        }
        map.finish()
    }
}
