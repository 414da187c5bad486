//! Request dispatch: provider resolution, fallback, batching, timeouts.
//!
//! The dispatcher is the single entry point for fetching data. It resolves
//! the provider chain for the request's domain, runs the selected fetcher
//! through the attempt lifecycle, and packages records and warnings into a
//! [`ResultContainer`]. Fallback to the next provider in the chain is
//! opt-in and reacts only to remote provider failures; validation and
//! schema errors surface immediately.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use log::warn;
use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::dispatch::events::EventSink;
use crate::errors::{FetchError, ProviderErrorKind, RetryPolicy};
use crate::fetcher::credentials::Credentials;
use crate::fetcher::runner::FetchOutcome;
use crate::models::{DataRecord, FetchRequest, RawParams, ResultContainer};
use crate::registry::{ProviderEntry, ProviderRegistry};

/// Upper bound on concurrently in-flight batch targets unless overridden.
const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Configures and builds a [`Dispatcher`].
pub struct DispatcherBuilder {
    registry: ProviderRegistry,
    credentials: Credentials,
    retry_policy: RetryPolicy,
    max_concurrency: usize,
    fallback: bool,
    events: EventSink,
}

impl DispatcherBuilder {
    fn new(registry: ProviderRegistry, credentials: Credentials) -> Self {
        Self {
            registry,
            credentials,
            retry_policy: RetryPolicy::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            fallback: false,
            events: EventSink::disabled(),
        }
    }

    /// Retry policy applied to every extract stage.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Cap on concurrently in-flight batch targets. Values below 1 are
    /// treated as 1.
    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Enable falling back to the next credentialed provider in the chain
    /// when one fails with a remote provider error. Off by default.
    pub fn fallback(mut self, enabled: bool) -> Self {
        self.fallback = enabled;
        self
    }

    /// Attach an observability event sink.
    pub fn events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            registry: Arc::new(self.registry),
            credentials: Arc::new(self.credentials),
            retry_policy: self.retry_policy,
            max_concurrency: self.max_concurrency,
            fallback: self.fallback,
            events: self.events,
        }
    }
}

/// Shared, immutable dispatch front end. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ProviderRegistry>,
    credentials: Arc<Credentials>,
    retry_policy: RetryPolicy,
    max_concurrency: usize,
    fallback: bool,
    events: EventSink,
}

impl Dispatcher {
    pub fn builder(registry: ProviderRegistry, credentials: Credentials) -> DispatcherBuilder {
        DispatcherBuilder::new(registry, credentials)
    }

    /// Dispatch one request end to end.
    ///
    /// When `timeout_ms` is set the whole dispatch, retries and fan-out
    /// included, runs under a single wall-clock budget; expiry drops all
    /// in-flight work and returns [`FetchError::Timeout`].
    pub async fn dispatch(&self, request: FetchRequest) -> Result<ResultContainer, FetchError> {
        match request.timeout_ms {
            Some(budget_ms) => {
                let budget = Duration::from_millis(budget_ms);
                match timeout(budget, self.dispatch_inner(&request)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            "dispatch for domain {} exceeded {} ms budget",
                            request.domain, budget_ms
                        );
                        Err(FetchError::Timeout { budget_ms })
                    }
                }
            }
            None => self.dispatch_inner(&request).await,
        }
    }

    async fn dispatch_inner(&self, request: &FetchRequest) -> Result<ResultContainer, FetchError> {
        let chain =
            self.registry
                .resolve(request.domain, request.provider.as_deref(), &self.credentials)?;

        match request.batch_targets.as_deref() {
            Some([]) => Err(FetchError::validation_field(
                "batch_targets",
                "must contain at least one symbol",
            )),
            Some(targets) => self.dispatch_batch(request, &chain, targets).await,
            None => {
                let (provider_used, outcome) = self.run_chain(&chain, &request.params).await?;
                self.finish(request, outcome.records, provider_used, outcome.warnings, None)
            }
        }
    }

    /// Fan one request out over `targets`, bounded by `max_concurrency`.
    ///
    /// Targets run as independent sub-requests with `params.symbol`
    /// replaced; results are merged back in the caller's target order
    /// regardless of completion order. A failed target is omitted with a
    /// warning and never aborts its siblings.
    async fn dispatch_batch(
        &self,
        request: &FetchRequest,
        chain: &[&ProviderEntry],
        targets: &[String],
    ) -> Result<ResultContainer, FetchError> {
        let results: Vec<(String, Result<(String, FetchOutcome), FetchError>)> =
            stream::iter(targets.iter().map(|target| {
                let target = target.clone();
                let mut params = request.params.clone();
                params.insert("symbol".to_string(), Value::String(target.clone()));
                async move {
                    let result = self.run_chain(chain, &params).await;
                    (target, result)
                }
            }))
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut data = Vec::new();
        let mut warnings = Vec::new();
        let mut provider_used: Option<String> = None;
        let mut failed = 0usize;
        for (target, result) in results {
            match result {
                Ok((provider, outcome)) => {
                    if provider_used.is_none() {
                        provider_used = Some(provider);
                    }
                    warnings.extend(
                        outcome
                            .warnings
                            .into_iter()
                            .map(|warning| format!("{}: {}", target, warning)),
                    );
                    data.extend(outcome.records);
                }
                Err(error) => {
                    failed += 1;
                    warn!("batch target '{}' failed: {}", target, error);
                    warnings.push(format!("target '{}' failed and was omitted: {}", target, error));
                }
            }
        }
        if failed > 0 {
            warnings.push(format!(
                "{} of {} batch targets failed and were omitted",
                failed,
                targets.len()
            ));
        }

        let provider_used =
            provider_used.unwrap_or_else(|| chain[0].provider_id().to_string());
        self.finish(request, data, provider_used, warnings, Some((targets.len(), failed)))
    }

    /// Run the provider chain for one set of params.
    ///
    /// Without fallback only the head of the chain is attempted. With
    /// fallback, a remote provider failure moves on to the next entry;
    /// any other error class is the request's fault (or a fetcher defect)
    /// and surfaces immediately.
    async fn run_chain(
        &self,
        chain: &[&ProviderEntry],
        params: &RawParams,
    ) -> Result<(String, FetchOutcome), FetchError> {
        let attempts = if self.fallback { chain } else { &chain[..1] };
        let mut warnings: Vec<String> = Vec::new();
        let mut failures: Vec<(String, FetchError)> = Vec::new();
        for entry in attempts {
            match entry
                .fetcher()
                .run(params, &self.credentials, &self.retry_policy, &self.events)
                .await
            {
                Ok(mut outcome) => {
                    warnings.append(&mut outcome.warnings);
                    outcome.warnings = warnings;
                    return Ok((entry.provider_id().to_string(), outcome));
                }
                Err(error) if self.fallback && error.is_provider() => {
                    warn!(
                        "provider '{}' failed, trying next in chain: {}",
                        entry.provider_id(),
                        error
                    );
                    warnings.push(format!("provider '{}' failed: {}", entry.provider_id(), error));
                    failures.push((entry.provider_id().to_string(), error));
                }
                Err(error) => return Err(error),
            }
        }

        if failures.len() == 1 {
            if let Some((_, error)) = failures.pop() {
                return Err(error);
            }
        }
        let providers: Vec<&str> = failures.iter().map(|(id, _)| id.as_str()).collect();
        let detail: Vec<String> = failures
            .iter()
            .map(|(id, error)| format!("{}: {}", id, error))
            .collect();
        let kind = match failures.last() {
            Some((_, FetchError::Provider { kind, .. })) => *kind,
            _ => ProviderErrorKind::Transport,
        };
        Err(FetchError::provider(
            providers.join(", "),
            kind,
            format!("all eligible providers failed ({})", detail.join("; ")),
        ))
    }

    fn finish(
        &self,
        request: &FetchRequest,
        data: Vec<DataRecord>,
        provider_used: String,
        mut warnings: Vec<String>,
        batch: Option<(usize, usize)>,
    ) -> Result<ResultContainer, FetchError> {
        if data.is_empty() {
            if request.strict {
                return Err(FetchError::EmptyResult {
                    message: format!("no records returned for domain {}", request.domain),
                });
            }
            warnings.push("empty result: no records returned".to_string());
        }

        let mut metadata = Map::new();
        metadata.insert("domain".to_string(), Value::from(request.domain.as_str()));
        metadata.insert("record_count".to_string(), Value::from(data.len()));
        if let Some((total, failed)) = batch {
            metadata.insert("batch_total".to_string(), Value::from(total));
            metadata.insert("batch_failed".to_string(), Value::from(failed));
        }

        Ok(ResultContainer {
            data,
            provider_used,
            warnings,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::events::DispatchEvent;
    use crate::fetcher::traits::Fetcher;
    use crate::models::{Domain, EquityBar, EquityHistoricalParams, RawPayload};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Clone, Copy)]
    enum Mode {
        /// Return `n` bars immediately.
        Bars(usize),
        /// Always fail extract with the given kind.
        Fail(ProviderErrorKind),
        /// Sleep per symbol before returning one bar, slowest first in
        /// alphabetical order so completion order inverts input order.
        Staggered,
        /// Sleep the given millis before returning one bar.
        Slow(u64),
        /// Produce a record that violates the standard schema.
        BadRecord,
    }

    struct MockFetcher {
        id: &'static str,
        mode: Mode,
        transformed: Arc<AtomicBool>,
    }

    impl MockFetcher {
        fn new(id: &'static str, mode: Mode) -> Self {
            Self {
                id,
                mode,
                transformed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl Fetcher for MockFetcher {
        type Query = EquityHistoricalParams;
        type Record = EquityBar;

        fn provider_id(&self) -> &'static str {
            self.id
        }

        fn domain(&self) -> Domain {
            Domain::EquityHistorical
        }

        fn transform_query(&self, params: &RawParams) -> Result<Self::Query, FetchError> {
            EquityHistoricalParams::from_raw(params)
        }

        async fn extract(
            &self,
            query: &Self::Query,
            _credentials: &Credentials,
        ) -> Result<RawPayload, FetchError> {
            match self.mode {
                Mode::Fail(kind) => Err(FetchError::provider(self.id, kind, "mock failure")),
                Mode::Staggered => {
                    let millis = match query.symbol.as_str() {
                        "AAPL" => 60,
                        "MSFT" => 30,
                        _ => 5,
                    };
                    tokio::time::sleep(Duration::from_millis(millis)).await;
                    Ok(json!({}))
                }
                Mode::Slow(millis) => {
                    tokio::time::sleep(Duration::from_millis(millis)).await;
                    Ok(json!({}))
                }
                Mode::Bars(_) | Mode::BadRecord => Ok(json!({})),
            }
        }

        fn transform_data(
            &self,
            query: &Self::Query,
            _payload: RawPayload,
        ) -> Result<Vec<Self::Record>, FetchError> {
            self.transformed.store(true, Ordering::SeqCst);
            let count = match self.mode {
                Mode::Bars(n) => n,
                _ => 1,
            };
            let close = match self.mode {
                Mode::BadRecord => dec!(-5),
                _ => dec!(100),
            };
            Ok((0..count)
                .map(|day| EquityBar {
                    symbol: query.symbol.clone(),
                    date: NaiveDate::from_ymd_opt(2024, 1, 2 + day as u32).unwrap(),
                    open: Some(dec!(99)),
                    high: Some(dec!(101)),
                    low: Some(dec!(98)),
                    close,
                    adj_close: Some(close),
                    volume: Some(dec!(1000)),
                })
                .collect())
        }
    }

    fn dispatcher(fetchers: Vec<MockFetcher>) -> Dispatcher {
        let mut builder = ProviderRegistry::builder();
        for fetcher in fetchers {
            builder = builder.register(fetcher).unwrap();
        }
        Dispatcher::builder(builder.build().unwrap(), Credentials::new())
            .retry_policy(RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            })
            .build()
    }

    fn fallback_dispatcher(fetchers: Vec<MockFetcher>) -> Dispatcher {
        let mut builder = ProviderRegistry::builder();
        for fetcher in fetchers {
            builder = builder.register(fetcher).unwrap();
        }
        Dispatcher::builder(builder.build().unwrap(), Credentials::new())
            .retry_policy(RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            })
            .fallback(true)
            .build()
    }

    fn equity_request(symbol: &str) -> FetchRequest {
        FetchRequest::new(Domain::EquityHistorical).with_param("symbol", symbol)
    }

    #[tokio::test]
    async fn test_single_provider_success() {
        let dispatcher = dispatcher(vec![MockFetcher::new("ONLY", Mode::Bars(3))]);
        let result = dispatcher.dispatch(equity_request("AAPL")).await.unwrap();
        assert_eq!(result.provider_used, "ONLY");
        assert_eq!(result.data.len(), 3);
        assert_eq!(result.metadata.get("record_count").unwrap(), 3);
    }

    #[tokio::test]
    async fn test_fallback_disabled_propagates_first_failure() {
        let dispatcher = dispatcher(vec![
            MockFetcher::new("BROKEN", Mode::Fail(ProviderErrorKind::Transport)),
            MockFetcher::new("HEALTHY", Mode::Bars(1)),
        ]);
        let error = dispatcher.dispatch(equity_request("AAPL")).await.unwrap_err();
        match error {
            FetchError::Provider { provider, .. } => assert_eq!(provider, "BROKEN"),
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fallback_moves_to_next_provider_and_warns() {
        let dispatcher = fallback_dispatcher(vec![
            MockFetcher::new("BROKEN", Mode::Fail(ProviderErrorKind::NotFound)),
            MockFetcher::new("HEALTHY", Mode::Bars(2)),
        ]);
        let result = dispatcher.dispatch(equity_request("AAPL")).await.unwrap();
        assert_eq!(result.provider_used, "HEALTHY");
        assert_eq!(result.data.len(), 2);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("provider 'BROKEN' failed")));
    }

    #[tokio::test]
    async fn test_all_providers_failing_aggregates_the_errors() {
        let dispatcher = fallback_dispatcher(vec![
            MockFetcher::new("FIRST", Mode::Fail(ProviderErrorKind::Transport)),
            MockFetcher::new("SECOND", Mode::Fail(ProviderErrorKind::NotFound)),
        ]);
        let error = dispatcher.dispatch(equity_request("AAPL")).await.unwrap_err();
        match error {
            FetchError::Provider { provider, message, .. } => {
                assert_eq!(provider, "FIRST, SECOND");
                assert!(message.contains("all eligible providers failed"));
                assert!(message.contains("FIRST"));
                assert!(message.contains("SECOND"));
            }
            other => panic!("expected provider error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_schema_error_never_falls_back() {
        let dispatcher = fallback_dispatcher(vec![
            MockFetcher::new("DEFECTIVE", Mode::BadRecord),
            MockFetcher::new("HEALTHY", Mode::Bars(1)),
        ]);
        let error = dispatcher.dispatch(equity_request("AAPL")).await.unwrap_err();
        match error {
            FetchError::Schema { provider, .. } => assert_eq!(provider, "DEFECTIVE"),
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_validation_error_never_falls_back() {
        let dispatcher = fallback_dispatcher(vec![
            MockFetcher::new("A", Mode::Bars(1)),
            MockFetcher::new("B", Mode::Bars(1)),
        ]);
        let request = FetchRequest::new(Domain::EquityHistorical); // no symbol
        let error = dispatcher.dispatch(request).await.unwrap_err();
        assert!(matches!(error, FetchError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_batch_results_keep_target_order() {
        // AAPL is slowest and MSFT second slowest, so completion order is
        // the reverse of the requested order.
        let dispatcher = dispatcher(vec![MockFetcher::new("STAGGERED", Mode::Staggered)]);
        let request = FetchRequest::new(Domain::EquityHistorical)
            .with_batch_targets(["AAPL", "MSFT", "GOOGL"]);
        let result = dispatcher.dispatch(request).await.unwrap();
        let symbols: Vec<&str> = result
            .data
            .iter()
            .map(|record| match record {
                DataRecord::EquityBar(bar) => bar.symbol.as_str(),
                other => panic!("expected equity bar, got {:?}", other),
            })
            .collect();
        assert_eq!(symbols, vec!["AAPL", "MSFT", "GOOGL"]);
        assert_eq!(result.metadata.get("batch_total").unwrap(), 3);
        assert_eq!(result.metadata.get("batch_failed").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_batch_isolates_failed_targets() {
        // An empty symbol fails validation inside the fetcher; the other
        // targets still come back.
        let dispatcher = dispatcher(vec![MockFetcher::new("ONLY", Mode::Bars(1))]);
        let request = FetchRequest::new(Domain::EquityHistorical)
            .with_batch_targets(["AAPL", "  ", "GOOGL"]);
        let result = dispatcher.dispatch(request).await.unwrap();
        assert_eq!(result.data.len(), 2);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("failed and was omitted")));
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("1 of 3 batch targets failed")));
        assert_eq!(result.metadata.get("batch_failed").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_targets_is_a_validation_error() {
        let dispatcher = dispatcher(vec![MockFetcher::new("ONLY", Mode::Bars(1))]);
        let request =
            FetchRequest::new(Domain::EquityHistorical).with_batch_targets(Vec::<String>::new());
        let error = dispatcher.dispatch(request).await.unwrap_err();
        match error {
            FetchError::Validation { field_errors, .. } => {
                assert!(field_errors.contains_key("batch_targets"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_cancels_inflight_work() {
        let fetcher = MockFetcher::new("SLOW", Mode::Slow(500));
        let transformed = fetcher.transformed.clone();
        let dispatcher = dispatcher(vec![fetcher]);
        let request = equity_request("AAPL").with_timeout_ms(50);
        let started = std::time::Instant::now();
        let error = dispatcher.dispatch(request).await.unwrap_err();
        assert!(matches!(error, FetchError::Timeout { budget_ms: 50 }));
        assert!(started.elapsed() < Duration::from_millis(400));
        // The extract future was dropped; transform_data never ran.
        assert!(!transformed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_strict_empty_result_is_an_error() {
        let dispatcher = dispatcher(vec![MockFetcher::new("EMPTY", Mode::Bars(0))]);
        let error = dispatcher
            .dispatch(equity_request("AAPL").strict())
            .await
            .unwrap_err();
        assert!(matches!(error, FetchError::EmptyResult { .. }));
    }

    #[tokio::test]
    async fn test_lenient_empty_result_warns() {
        let dispatcher = dispatcher(vec![MockFetcher::new("EMPTY", Mode::Bars(0))]);
        let result = dispatcher.dispatch(equity_request("AAPL")).await.unwrap();
        assert!(result.data.is_empty());
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("empty result")));
    }

    #[tokio::test]
    async fn test_dispatch_emits_lifecycle_events() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let registry = ProviderRegistry::builder()
            .register(MockFetcher::new("ONLY", Mode::Bars(1)))
            .unwrap()
            .build()
            .unwrap();
        let dispatcher = Dispatcher::builder(registry, Credentials::new())
            .events(EventSink::new(tx))
            .build();
        dispatcher.dispatch(equity_request("AAPL")).await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            DispatchEvent::AttemptStarted { provider: "ONLY", .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            DispatchEvent::AttemptSucceeded { records: 1, .. }
        ));
    }
}
