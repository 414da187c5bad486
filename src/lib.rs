//! Marketbridge
//!
//! This crate provides provider-agnostic financial data fetching with a
//! standardized output schema per data domain.
//!
//! # Overview
//!
//! Marketbridge supports:
//! - Multiple data domains: equity historical prices, option chains
//! - Multiple providers: MarketData.app, Alpha Vantage
//! - Opt-in fallback across the provider chain
//! - Batched fan-out with bounded concurrency and order-preserving merge
//!
//! # Architecture
//!
//! ```text
//! +------------------+     +------------------+
//! |   FetchRequest   | --> |    Dispatcher    |  (timeout, batching, fallback)
//! +------------------+     +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          | ProviderRegistry |  (domain -> ordered fetchers)
//!                          +------------------+
//!                                  |
//!                                  v
//!                          +------------------+
//!                          |     Fetcher      |  (transform_query -> extract
//!                          +------------------+   -> transform_data)
//!                                  |
//!                                  v
//!                          +------------------+
//!                          | ResultContainer  |  (standard records + warnings)
//!                          +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`FetchRequest`] - One wire-shaped fetch request
//! - [`Fetcher`] - The three-stage provider integration contract
//! - [`ProviderRegistry`] - Append-only table of (provider, domain) fetchers
//! - [`Dispatcher`] - Request front end: resolution, fallback, batching
//! - [`ResultContainer`] - Records, provider attribution, warnings
//! - [`FetchError`] / [`ErrorResponse`] - Error taxonomy and wire shape

pub mod dispatch;
pub mod errors;
pub mod fetcher;
pub mod models;
pub mod provider;
pub mod registry;

// Re-export the error taxonomy
pub use errors::{ErrorKind, ErrorResponse, FetchError, ProviderErrorKind, RetryClass, RetryPolicy};

// Re-export the model types
pub use models::{
    DataRecord, Domain, EquityBar, EquityHistoricalParams, FetchRequest, OptionContract,
    OptionType, OptionsChainParams, RawParams, RawPayload, ResultContainer, StandardRecord,
};

// Re-export the fetcher contract
pub use fetcher::{Credentials, DynFetcher, FetchOutcome, FetchState, Fetcher};

// Re-export registry types
pub use registry::{ProviderEntry, ProviderRegistry, ProviderRegistryBuilder, RegistryError};

// Re-export dispatch types
pub use dispatch::{DispatchEvent, Dispatcher, DispatcherBuilder, EventSink};

// Re-export the built-in fetchers
pub use provider::{
    standard_registry, AlphaVantageEquityFetcher, MarketDataAppEquityFetcher,
    MarketDataAppOptionsFetcher,
};
