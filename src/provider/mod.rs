//! Built-in provider fetchers.

pub mod alpha_vantage;
pub mod marketdata_app;

pub use alpha_vantage::AlphaVantageEquityFetcher;
pub use marketdata_app::{MarketDataAppEquityFetcher, MarketDataAppOptionsFetcher};

use crate::registry::{ProviderRegistry, RegistryError};

/// Build a registry with every built-in fetcher registered.
/// MarketData.app is the default for both domains it serves.
pub fn standard_registry() -> Result<ProviderRegistry, RegistryError> {
    use crate::models::Domain;

    ProviderRegistry::builder()
        .register(MarketDataAppEquityFetcher::new())?
        .register(MarketDataAppOptionsFetcher::new())?
        .register(AlphaVantageEquityFetcher::new())?
        .default_provider(Domain::EquityHistorical, "MARKETDATA_APP")
        .default_provider(Domain::OptionsChain, "MARKETDATA_APP")
        .build()
}
