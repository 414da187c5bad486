//! Per-attempt fetch lifecycle.
//!
//! Drives one fetcher through its state machine:
//!
//! ```text
//! Init -> Validating -> Extracting -> Transforming -> Done
//!             |             |              |
//!             +-------------+--------------+--> Failed
//! ```
//!
//! Retries are confined to the extract stage and never re-invoke
//! `transform_query`; no `transform_data` runs on a failed or cancelled
//! extract.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::dispatch::events::{DispatchEvent, EventSink};
use crate::errors::{FetchError, RetryClass, RetryPolicy};
use crate::fetcher::credentials::Credentials;
use crate::fetcher::traits::Fetcher;
use crate::models::{DataRecord, RawParams, RawPayload, StandardRecord};

/// Lifecycle state of one fetch attempt. `Done` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchState {
    Init,
    Validating,
    Extracting,
    Transforming,
    Done,
    Failed,
}

/// The successful output of one attempt: validated, domain-erased records
/// plus the warnings collected while validating them.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<DataRecord>,
    pub warnings: Vec<String>,
}

pub(crate) async fn run_fetch<F>(
    fetcher: &F,
    params: &RawParams,
    credentials: &Credentials,
    policy: &RetryPolicy,
    events: &EventSink,
) -> Result<FetchOutcome, FetchError>
where
    F: Fetcher + ?Sized,
{
    let provider = Fetcher::provider_id(fetcher);
    let domain = Fetcher::domain(fetcher);
    events.emit(DispatchEvent::AttemptStarted { provider, domain });

    // Validating
    let query = match fetcher.transform_query(params) {
        Ok(query) => query,
        Err(error) => {
            events.emit(DispatchEvent::AttemptFailed {
                provider,
                domain,
                state: FetchState::Validating,
                message: error.to_string(),
            });
            return Err(error);
        }
    };

    // Extracting, with bounded backoff on transient remote failures.
    let payload = match extract_with_retry(fetcher, &query, credentials, policy, events).await {
        Ok(payload) => payload,
        Err(error) => {
            events.emit(DispatchEvent::AttemptFailed {
                provider,
                domain,
                state: FetchState::Extracting,
                message: error.to_string(),
            });
            return Err(error);
        }
    };

    // Transforming
    let records = match fetcher.transform_data(&query, payload) {
        Ok(records) => records,
        Err(error) => {
            events.emit(DispatchEvent::AttemptFailed {
                provider,
                domain,
                state: FetchState::Transforming,
                message: error.to_string(),
            });
            return Err(error);
        }
    };

    // Every provider record must type-check against the standard schema
    // before it is accepted. A violation is a fetcher defect.
    let mut outcome = FetchOutcome {
        records: Vec::with_capacity(records.len()),
        warnings: Vec::new(),
    };
    for record in records {
        if let Err(message) = record.validate() {
            warn!("schema violation from '{}': {}", provider, message);
            let error = FetchError::schema(provider, message);
            events.emit(DispatchEvent::AttemptFailed {
                provider,
                domain,
                state: FetchState::Transforming,
                message: error.to_string(),
            });
            return Err(error);
        }
        for field in record.missing_optional_fields() {
            let warning = format!("missing optional field: {}", field);
            if !outcome.warnings.contains(&warning) {
                outcome.warnings.push(warning);
            }
        }
        outcome.records.push(record.into());
    }

    debug!(
        "fetched {} {} records from '{}'",
        outcome.records.len(),
        domain,
        provider
    );
    events.emit(DispatchEvent::AttemptSucceeded {
        provider,
        domain,
        records: outcome.records.len(),
    });
    Ok(outcome)
}

async fn extract_with_retry<F>(
    fetcher: &F,
    query: &F::Query,
    credentials: &Credentials,
    policy: &RetryPolicy,
    events: &EventSink,
) -> Result<RawPayload, FetchError>
where
    F: Fetcher + ?Sized,
{
    let provider = Fetcher::provider_id(fetcher);
    let mut attempt = 1u32;
    loop {
        match fetcher.extract(query, credentials).await {
            Ok(payload) => return Ok(payload),
            Err(error) => {
                let transient = error.retry_class() == RetryClass::WithBackoff;
                if !transient || attempt >= policy.max_attempts.max(1) {
                    return Err(error);
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    "extract attempt {} against '{}' failed: {}; retrying in {:?}",
                    attempt, provider, error, delay
                );
                events.emit(DispatchEvent::AttemptRetried {
                    provider,
                    attempt,
                    delay,
                });
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderErrorKind;
    use crate::models::{EquityBar, EquityHistoricalParams, Domain};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Fails extract with a configurable error until `succeed_after`
    /// attempts have been made, then returns an empty payload.
    struct FlakyFetcher {
        kind: ProviderErrorKind,
        succeed_after: u32,
        query_calls: Arc<AtomicU32>,
        extract_calls: Arc<AtomicU32>,
        invalid_record: bool,
    }

    impl FlakyFetcher {
        fn new(kind: ProviderErrorKind, succeed_after: u32) -> Self {
            Self {
                kind,
                succeed_after,
                query_calls: Arc::new(AtomicU32::new(0)),
                extract_calls: Arc::new(AtomicU32::new(0)),
                invalid_record: false,
            }
        }
    }

    #[async_trait]
    impl Fetcher for FlakyFetcher {
        type Query = EquityHistoricalParams;
        type Record = EquityBar;

        fn provider_id(&self) -> &'static str {
            "FLAKY"
        }

        fn domain(&self) -> Domain {
            Domain::EquityHistorical
        }

        fn transform_query(&self, params: &RawParams) -> Result<Self::Query, FetchError> {
            self.query_calls.fetch_add(1, Ordering::SeqCst);
            EquityHistoricalParams::from_raw(params)
        }

        async fn extract(
            &self,
            _query: &Self::Query,
            _credentials: &Credentials,
        ) -> Result<RawPayload, FetchError> {
            let call = self.extract_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_after {
                Ok(json!({}))
            } else {
                Err(FetchError::provider("FLAKY", self.kind, "boom"))
            }
        }

        fn transform_data(
            &self,
            query: &Self::Query,
            _payload: RawPayload,
        ) -> Result<Vec<Self::Record>, FetchError> {
            let close = if self.invalid_record { dec!(-1) } else { dec!(100) };
            Ok(vec![EquityBar {
                symbol: query.symbol.clone(),
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                open: None,
                high: None,
                low: None,
                close,
                adj_close: None,
                volume: None,
            }])
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(2),
        }
    }

    fn raw_symbol(symbol: &str) -> RawParams {
        json!({"symbol": symbol}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_once_per_policy() {
        let fetcher = FlakyFetcher::new(ProviderErrorKind::RateLimit, 3);
        let outcome = run_fetch(
            &fetcher,
            &raw_symbol("AAPL"),
            &Credentials::new(),
            &fast_policy(3),
            &EventSink::disabled(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(fetcher.extract_calls.load(Ordering::SeqCst), 3);
        // transform_query ran exactly once; retries never re-validate.
        assert_eq!(fetcher.query_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_are_capped() {
        let fetcher = FlakyFetcher::new(ProviderErrorKind::Transport, 10);
        let error = run_fetch(
            &fetcher,
            &raw_symbol("AAPL"),
            &Credentials::new(),
            &fast_policy(2),
            &EventSink::disabled(),
        )
        .await
        .unwrap_err();
        assert!(error.is_provider());
        assert_eq!(fetcher.extract_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let fetcher = FlakyFetcher::new(ProviderErrorKind::Auth, 10);
        let error = run_fetch(
            &fetcher,
            &raw_symbol("AAPL"),
            &Credentials::new(),
            &fast_policy(5),
            &EventSink::disabled(),
        )
        .await
        .unwrap_err();
        assert!(error.is_provider());
        assert_eq!(fetcher.extract_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_record_surfaces_as_schema_error() {
        let mut fetcher = FlakyFetcher::new(ProviderErrorKind::Transport, 1);
        fetcher.invalid_record = true;
        let error = run_fetch(
            &fetcher,
            &raw_symbol("AAPL"),
            &Credentials::new(),
            &fast_policy(1),
            &EventSink::disabled(),
        )
        .await
        .unwrap_err();
        match error {
            FetchError::Schema { provider, .. } => assert_eq!(provider, "FLAKY"),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_optional_fields_become_warnings() {
        let fetcher = FlakyFetcher::new(ProviderErrorKind::Transport, 1);
        let outcome = run_fetch(
            &fetcher,
            &raw_symbol("AAPL"),
            &Credentials::new(),
            &fast_policy(1),
            &EventSink::disabled(),
        )
        .await
        .unwrap();
        assert!(outcome
            .warnings
            .contains(&"missing optional field: high".to_string()));
    }
}
