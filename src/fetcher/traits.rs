//! The fetcher contract: one three-stage pipeline per (provider, domain) pair.

use std::fmt;

use async_trait::async_trait;

use crate::dispatch::events::EventSink;
use crate::errors::{FetchError, RetryPolicy};
use crate::fetcher::credentials::Credentials;
use crate::fetcher::runner::{run_fetch, FetchOutcome};
use crate::models::{DataRecord, Domain, RawParams, RawPayload, StandardRecord};

/// A stateless capability bundle bound to one (provider, domain) pair.
///
/// Implementations hold no per-request state and are safe to invoke
/// concurrently and repeatedly. The three stages have a strict
/// locality-of-effect contract:
///
/// 1. [`transform_query`](Fetcher::transform_query) - synchronous, pure,
///    deterministic. Validates and normalizes caller input into the
///    provider's query type. Fails fast, no I/O.
/// 2. [`extract`](Fetcher::extract) - asynchronous; the only stage allowed
///    to perform network I/O or depend on wall-clock time. Returns the raw,
///    untyped vendor payload. Failures are classified via
///    [`ProviderErrorKind`](crate::errors::ProviderErrorKind).
/// 3. [`transform_data`](Fetcher::transform_data) - synchronous, pure. Maps
///    vendor field names and units onto the standard schema, filling `None`
///    for fields the provider does not supply. No I/O.
///
/// The determinism of stages 1 and 3 is what makes fetchers unit-testable
/// against recorded payloads without a network dependency.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Provider-specific query type. Must be a structural superset of the
    /// domain's standard query params (embed them, never retype them).
    type Query: fmt::Debug + Send + Sync;

    /// Provider-specific record type. Must validate against the standard
    /// schema before it is accepted into a result container.
    type Record: StandardRecord + Into<DataRecord> + Send;

    /// Unique provider identifier, e.g. "MARKETDATA_APP".
    fn provider_id(&self) -> &'static str;

    /// The domain this fetcher serves.
    fn domain(&self) -> Domain;

    /// Credential keys that must be present for this provider.
    fn required_credentials(&self) -> &'static [&'static str] {
        &[]
    }

    /// Stage 1: validate and normalize raw caller input.
    fn transform_query(&self, params: &RawParams) -> Result<Self::Query, FetchError>;

    /// Stage 2: perform the remote call and return the raw payload.
    async fn extract(
        &self,
        query: &Self::Query,
        credentials: &Credentials,
    ) -> Result<RawPayload, FetchError>;

    /// Stage 3: map the raw payload onto provider records.
    fn transform_data(
        &self,
        query: &Self::Query,
        payload: RawPayload,
    ) -> Result<Vec<Self::Record>, FetchError>;
}

/// Object-safe, domain-erased view of a [`Fetcher`], as stored in the
/// provider registry and driven by the dispatcher.
#[async_trait]
pub trait DynFetcher: Send + Sync {
    fn provider_id(&self) -> &'static str;

    fn domain(&self) -> Domain;

    fn required_credentials(&self) -> &'static [&'static str];

    /// Run the full attempt lifecycle: validate, extract with bounded
    /// retries, transform, and schema-check every record.
    async fn run(
        &self,
        params: &RawParams,
        credentials: &Credentials,
        policy: &RetryPolicy,
        events: &EventSink,
    ) -> Result<FetchOutcome, FetchError>;
}

#[async_trait]
impl<F> DynFetcher for F
where
    F: Fetcher,
{
    fn provider_id(&self) -> &'static str {
        Fetcher::provider_id(self)
    }

    fn domain(&self) -> Domain {
        Fetcher::domain(self)
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        Fetcher::required_credentials(self)
    }

    async fn run(
        &self,
        params: &RawParams,
        credentials: &Credentials,
        policy: &RetryPolicy,
        events: &EventSink,
    ) -> Result<FetchOutcome, FetchError> {
        run_fetch(self, params, credentials, policy, events).await
    }
}
