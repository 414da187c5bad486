//! Process-wide table of registered fetchers.
//!
//! Built once at process start through [`ProviderRegistryBuilder`];
//! append-only during construction, read-only for the process lifetime.
//! Safe under unsynchronized concurrent read because entries are never
//! removed or mutated after `build`.

use std::collections::HashMap;
use std::sync::Arc;

use log::{info, warn};
use thiserror::Error;

use crate::errors::FetchError;
use crate::fetcher::credentials::Credentials;
use crate::fetcher::traits::{DynFetcher, Fetcher};
use crate::models::Domain;

/// Registration-time configuration errors.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Registering the same (provider, domain) pair twice is a
    /// configuration bug, not something to silently ignore.
    #[error("provider '{provider}' is already registered for domain {domain}")]
    Duplicate { provider: String, domain: Domain },

    /// The configured default provider was never registered for the domain.
    #[error("default provider '{provider}' is not registered for domain {domain}")]
    UnknownDefault { provider: String, domain: Domain },
}

/// One registered (provider, domain) capability.
pub struct ProviderEntry {
    provider_id: &'static str,
    required_credentials: &'static [&'static str],
    fetcher: Arc<dyn DynFetcher>,
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("provider_id", &self.provider_id)
            .field("required_credentials", &self.required_credentials)
            .finish_non_exhaustive()
    }
}

impl ProviderEntry {
    pub fn provider_id(&self) -> &'static str {
        self.provider_id
    }

    pub fn required_credentials(&self) -> &'static [&'static str] {
        self.required_credentials
    }

    pub fn fetcher(&self) -> &Arc<dyn DynFetcher> {
        &self.fetcher
    }
}

/// Builder for [`ProviderRegistry`]. Registration order is preserved and
/// becomes the fallback order for each domain.
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    entries: HashMap<Domain, Vec<ProviderEntry>>,
    defaults: HashMap<Domain, String>,
}

impl ProviderRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fetcher for its (provider, domain) pair.
    pub fn register<F>(mut self, fetcher: F) -> Result<Self, RegistryError>
    where
        F: Fetcher + 'static,
    {
        let domain = Fetcher::domain(&fetcher);
        let provider_id = Fetcher::provider_id(&fetcher);
        let required_credentials = Fetcher::required_credentials(&fetcher);
        let entries = self.entries.entry(domain).or_default();
        if entries.iter().any(|entry| entry.provider_id == provider_id) {
            return Err(RegistryError::Duplicate {
                provider: provider_id.to_string(),
                domain,
            });
        }
        info!("registered provider '{}' for domain {}", provider_id, domain);
        entries.push(ProviderEntry {
            provider_id,
            required_credentials,
            fetcher: Arc::new(fetcher),
        });
        Ok(self)
    }

    /// Configure the default provider for a domain.
    pub fn default_provider(mut self, domain: Domain, provider: &str) -> Self {
        self.defaults.insert(domain, provider.to_string());
        self
    }

    pub fn build(self) -> Result<ProviderRegistry, RegistryError> {
        for (domain, provider) in &self.defaults {
            let known = self
                .entries
                .get(domain)
                .is_some_and(|entries| entries.iter().any(|e| e.provider_id == provider));
            if !known {
                return Err(RegistryError::UnknownDefault {
                    provider: provider.clone(),
                    domain: *domain,
                });
            }
        }
        Ok(ProviderRegistry {
            entries: self.entries,
            defaults: self.defaults,
        })
    }
}

/// Immutable registry mapping each domain to its ordered provider entries.
pub struct ProviderRegistry {
    entries: HashMap<Domain, Vec<ProviderEntry>>,
    defaults: HashMap<Domain, String>,
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::new()
    }

    /// All entries registered for a domain, in registration order.
    pub fn providers_for(&self, domain: Domain) -> &[ProviderEntry] {
        self.entries.get(&domain).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolve the ordered provider chain for one request.
    ///
    /// Precedence when `explicit` is `None`:
    /// 1. the configured default provider for the domain, if its
    ///    credentials are satisfied (otherwise it is skipped with a warn);
    /// 2. the first registered provider whose credentials are satisfied.
    ///
    /// An explicit provider with unmet credential requirements fails
    /// immediately with a validation error naming the missing keys; it
    /// never falls through to another provider. The returned chain starts
    /// with the selected provider followed by the remaining eligible
    /// providers in registration order (consumed only when fallback is
    /// enabled).
    pub fn resolve(
        &self,
        domain: Domain,
        explicit: Option<&str>,
        credentials: &Credentials,
    ) -> Result<Vec<&ProviderEntry>, FetchError> {
        let entries = self.providers_for(domain);
        if entries.is_empty() {
            return Err(FetchError::validation(format!(
                "no providers registered for domain {}",
                domain
            )));
        }

        if let Some(name) = explicit {
            let selected = entries
                .iter()
                .find(|entry| entry.provider_id.eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    FetchError::validation_field(
                        "provider",
                        format!("'{}' is not registered for domain {}", name, domain),
                    )
                })?;
            let missing = credentials.missing_keys(selected.provider_id, selected.required_credentials);
            if !missing.is_empty() {
                return Err(FetchError::validation_field(
                    "provider",
                    format!(
                        "provider '{}' is missing required credentials: {}",
                        selected.provider_id,
                        missing.join(", ")
                    ),
                ));
            }
            let mut chain = vec![selected];
            chain.extend(entries.iter().filter(|entry| {
                entry.provider_id != selected.provider_id
                    && credentials
                        .missing_keys(entry.provider_id, entry.required_credentials)
                        .is_empty()
            }));
            return Ok(chain);
        }

        let mut chain: Vec<&ProviderEntry> = entries
            .iter()
            .filter(|entry| {
                let missing =
                    credentials.missing_keys(entry.provider_id, entry.required_credentials);
                if missing.is_empty() {
                    true
                } else {
                    warn!(
                        "provider '{}' skipped for domain {}: missing credentials {}",
                        entry.provider_id,
                        domain,
                        missing.join(", ")
                    );
                    false
                }
            })
            .collect();

        if chain.is_empty() {
            return Err(FetchError::validation(format!(
                "no provider for domain {} has its credential requirements satisfied",
                domain
            )));
        }

        if let Some(default) = self.defaults.get(&domain) {
            if let Some(position) = chain
                .iter()
                .position(|entry| entry.provider_id == default.as_str())
            {
                let selected = chain.remove(position);
                chain.insert(0, selected);
            } else {
                warn!(
                    "default provider '{}' for domain {} is missing credentials; using first eligible provider",
                    default, domain
                );
            }
        }

        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::events::EventSink;
    use crate::errors::RetryPolicy;
    use crate::models::{EquityBar, EquityHistoricalParams, RawParams, RawPayload};
    use async_trait::async_trait;

    struct StubFetcher {
        id: &'static str,
        keys: &'static [&'static str],
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        type Query = EquityHistoricalParams;
        type Record = EquityBar;

        fn provider_id(&self) -> &'static str {
            self.id
        }

        fn domain(&self) -> Domain {
            Domain::EquityHistorical
        }

        fn required_credentials(&self) -> &'static [&'static str] {
            self.keys
        }

        fn transform_query(&self, params: &RawParams) -> Result<Self::Query, FetchError> {
            EquityHistoricalParams::from_raw(params)
        }

        async fn extract(
            &self,
            _query: &Self::Query,
            _credentials: &Credentials,
        ) -> Result<RawPayload, FetchError> {
            Ok(serde_json::Value::Null)
        }

        fn transform_data(
            &self,
            _query: &Self::Query,
            _payload: RawPayload,
        ) -> Result<Vec<Self::Record>, FetchError> {
            Ok(Vec::new())
        }
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::builder()
            .register(StubFetcher {
                id: "FIRST",
                keys: &["api_key"],
            })
            .unwrap()
            .register(StubFetcher {
                id: "SECOND",
                keys: &[],
            })
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_duplicate_registration_is_an_error() {
        let result = ProviderRegistry::builder()
            .register(StubFetcher {
                id: "FIRST",
                keys: &[],
            })
            .unwrap()
            .register(StubFetcher {
                id: "FIRST",
                keys: &[],
            });
        assert!(matches!(result, Err(RegistryError::Duplicate { .. })));
    }

    #[test]
    fn test_unknown_default_is_an_error() {
        let result = ProviderRegistry::builder()
            .register(StubFetcher {
                id: "FIRST",
                keys: &[],
            })
            .unwrap()
            .default_provider(Domain::EquityHistorical, "GHOST")
            .build();
        assert!(matches!(result, Err(RegistryError::UnknownDefault { .. })));
    }

    #[test]
    fn test_explicit_provider_with_missing_credentials_fails_fast() {
        let registry = registry();
        let error = registry
            .resolve(Domain::EquityHistorical, Some("FIRST"), &Credentials::new())
            .unwrap_err();
        match error {
            FetchError::Validation { field_errors, .. } => {
                let reason = field_errors.get("provider").unwrap();
                assert!(reason.contains("api_key"), "missing key not named: {}", reason);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_first_credentialed_provider_is_selected() {
        let registry = registry();
        // FIRST lacks credentials, so SECOND leads the chain.
        let chain = registry
            .resolve(Domain::EquityHistorical, None, &Credentials::new())
            .unwrap();
        assert_eq!(chain[0].provider_id(), "SECOND");
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_registration_order_is_preserved_when_credentialed() {
        let registry = registry();
        let credentials = Credentials::new().with("FIRST", "api_key", "k");
        let chain = registry
            .resolve(Domain::EquityHistorical, None, &credentials)
            .unwrap();
        let ids: Vec<_> = chain.iter().map(|e| e.provider_id()).collect();
        assert_eq!(ids, vec!["FIRST", "SECOND"]);
    }

    #[test]
    fn test_configured_default_leads_the_chain() {
        let registry = ProviderRegistry::builder()
            .register(StubFetcher {
                id: "FIRST",
                keys: &[],
            })
            .unwrap()
            .register(StubFetcher {
                id: "SECOND",
                keys: &[],
            })
            .unwrap()
            .default_provider(Domain::EquityHistorical, "SECOND")
            .build()
            .unwrap();
        let chain = registry
            .resolve(Domain::EquityHistorical, None, &Credentials::new())
            .unwrap();
        let ids: Vec<_> = chain.iter().map(|e| e.provider_id()).collect();
        assert_eq!(ids, vec!["SECOND", "FIRST"]);
    }

    #[test]
    fn test_unregistered_domain_is_a_validation_error() {
        let registry = registry();
        let error = registry
            .resolve(Domain::OptionsChain, None, &Credentials::new())
            .unwrap_err();
        assert!(matches!(error, FetchError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_registered_fetcher_is_runnable_through_the_entry() {
        let registry = registry();
        let chain = registry
            .resolve(Domain::EquityHistorical, Some("SECOND"), &Credentials::new())
            .unwrap();
        let params: RawParams = serde_json::json!({"symbol": "AAPL"})
            .as_object()
            .cloned()
            .unwrap();
        let outcome = chain[0]
            .fetcher()
            .run(
                &params,
                &Credentials::new(),
                &RetryPolicy::default(),
                &EventSink::disabled(),
            )
            .await
            .unwrap();
        assert!(outcome.records.is_empty());
    }
}
