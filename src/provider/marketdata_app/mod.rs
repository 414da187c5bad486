//! MarketData.app fetchers.
//!
//! Fetches US equity candles and option chains from the MarketData.app API
//! with Bearer token authentication.
//!
//! # API Endpoints
//!
//! - Historical candles: `https://api.marketdata.app/v1/stocks/candles/D/{symbol}?from={start_date}&to={end_date}`
//! - Option chain: `https://api.marketdata.app/v1/options/chain/{underlying}/`
//!
//! # Response Format
//!
//! The API returns parallel arrays with a status field `s` indicating
//! success ("ok"), an empty window ("no_data"), or a request error
//! ("error" plus `errmsg`).

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use log::warn;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::errors::{FetchError, ProviderErrorKind};
use crate::fetcher::{Credentials, Fetcher};
use crate::models::{
    Domain, EquityBar, EquityHistoricalParams, OptionContract, OptionType, OptionsChainParams,
    RawParams, RawPayload,
};

const BASE_URL: &str = "https://api.marketdata.app/v1";
const PROVIDER_ID: &str = "MARKETDATA_APP";
const API_KEY: &str = "api_key";

/// Default HTTP request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Days of history requested when the caller gives no start date.
const DEFAULT_LOOKBACK_DAYS: i64 = 365;

/// Response from the candles endpoint.
#[derive(Debug, Deserialize)]
struct CandlesResponse {
    /// Status: "ok", "no_data", or "error"
    s: String,
    /// Open prices
    #[serde(default)]
    o: Option<Vec<f64>>,
    /// High prices
    #[serde(default)]
    h: Option<Vec<f64>>,
    /// Low prices
    #[serde(default)]
    l: Option<Vec<f64>>,
    /// Close prices
    #[serde(default)]
    c: Option<Vec<f64>>,
    /// Volume
    #[serde(default)]
    v: Option<Vec<f64>>,
    /// Unix timestamps
    #[serde(default)]
    t: Option<Vec<i64>>,
}

/// Response from the option chain endpoint. Quote-side arrays may hold
/// nulls for illiquid contracts.
#[derive(Debug, Deserialize)]
struct ChainResponse {
    s: String,
    #[serde(default, rename = "optionSymbol")]
    option_symbol: Option<Vec<String>>,
    #[serde(default)]
    underlying: Option<Vec<String>>,
    /// Unix timestamps of contract expirations
    #[serde(default)]
    expiration: Option<Vec<i64>>,
    /// "call" or "put"
    #[serde(default)]
    side: Option<Vec<String>>,
    #[serde(default)]
    strike: Option<Vec<f64>>,
    #[serde(default)]
    bid: Option<Vec<Option<f64>>>,
    #[serde(default)]
    ask: Option<Vec<Option<f64>>>,
    #[serde(default)]
    last: Option<Vec<Option<f64>>>,
    #[serde(default)]
    volume: Option<Vec<Option<f64>>>,
    #[serde(default, rename = "openInterest")]
    open_interest: Option<Vec<Option<f64>>>,
    #[serde(default)]
    iv: Option<Vec<Option<f64>>>,
}

/// Fetch a URL with Bearer token authentication and classify failures.
async fn fetch_json(client: &Client, url: &str, api_key: &str) -> Result<RawPayload, FetchError> {
    let response = client
        .get(url)
        .bearer_auth(api_key)
        .send()
        .await
        .map_err(|e| FetchError::provider(PROVIDER_ID, ProviderErrorKind::Transport, e.to_string()))?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::provider(
            PROVIDER_ID,
            ProviderErrorKind::RateLimit,
            "HTTP 429",
        ));
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(FetchError::provider(
            PROVIDER_ID,
            ProviderErrorKind::Auth,
            format!("HTTP {}", status),
        ));
    }
    if status == StatusCode::NOT_FOUND {
        return Err(FetchError::provider(
            PROVIDER_ID,
            ProviderErrorKind::NotFound,
            "HTTP 404",
        ));
    }
    if !status.is_success() {
        return Err(FetchError::provider(
            PROVIDER_ID,
            ProviderErrorKind::Transport,
            format!("HTTP error: {}", status),
        ));
    }

    response.json().await.map_err(|e| {
        FetchError::provider(
            PROVIDER_ID,
            ProviderErrorKind::Transport,
            format!("failed to parse response: {}", e),
        )
    })
}

/// In-band request failure reported through the `s` status field.
/// "no_data" is not an error; it maps to an empty result downstream.
fn payload_error(payload: &RawPayload) -> Option<FetchError> {
    match payload.get("s").and_then(Value::as_str) {
        Some("error") => {
            let message = payload
                .get("errmsg")
                .and_then(Value::as_str)
                .unwrap_or("unspecified error")
                .to_string();
            Some(FetchError::provider(
                PROVIDER_ID,
                ProviderErrorKind::NotFound,
                message,
            ))
        }
        _ => None,
    }
}

fn build_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn api_key_for(credentials: &Credentials) -> Result<&str, FetchError> {
    credentials.get(PROVIDER_ID, API_KEY).ok_or_else(|| {
        FetchError::provider(
            PROVIDER_ID,
            ProviderErrorKind::Auth,
            "missing credential 'api_key'",
        )
    })
}

fn date_from_unix(timestamp: i64) -> Option<NaiveDate> {
    Utc.timestamp_opt(timestamp, 0).single().map(|dt| dt.date_naive())
}

/// Equity historical prices from the candles endpoint.
pub struct MarketDataAppEquityFetcher {
    client: Client,
}

impl MarketDataAppEquityFetcher {
    pub fn new() -> Self {
        Self {
            client: build_client(),
        }
    }
}

impl Default for MarketDataAppEquityFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for MarketDataAppEquityFetcher {
    type Query = EquityHistoricalParams;
    type Record = EquityBar;

    fn provider_id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn domain(&self) -> Domain {
        Domain::EquityHistorical
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        &[API_KEY]
    }

    fn transform_query(&self, params: &RawParams) -> Result<Self::Query, FetchError> {
        EquityHistoricalParams::from_raw(params)
    }

    async fn extract(
        &self,
        query: &Self::Query,
        credentials: &Credentials,
    ) -> Result<RawPayload, FetchError> {
        let api_key = api_key_for(credentials)?;
        // Date window defaults are applied here, not in transform_query,
        // which must stay deterministic.
        let to = query.end_date.unwrap_or_else(|| Utc::now().date_naive());
        let from = query
            .start_date
            .unwrap_or_else(|| to - chrono::Duration::days(DEFAULT_LOOKBACK_DAYS));
        let url = format!(
            "{}/stocks/candles/D/{}?from={}&to={}",
            BASE_URL,
            query.symbol,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let payload = fetch_json(&self.client, &url, api_key).await?;
        if let Some(error) = payload_error(&payload) {
            return Err(error);
        }
        Ok(payload)
    }

    fn transform_data(
        &self,
        query: &Self::Query,
        payload: RawPayload,
    ) -> Result<Vec<Self::Record>, FetchError> {
        let candles: CandlesResponse = serde_json::from_value(payload)
            .map_err(|e| FetchError::schema(PROVIDER_ID, format!("unexpected candles payload: {}", e)))?;
        if candles.s != "ok" {
            return Ok(Vec::new());
        }

        let closes = candles.c.unwrap_or_default();
        let opens = candles.o.unwrap_or_default();
        let highs = candles.h.unwrap_or_default();
        let lows = candles.l.unwrap_or_default();
        let volumes = candles.v.unwrap_or_default();
        let timestamps = candles.t.unwrap_or_default();

        let mut bars = Vec::with_capacity(closes.len());
        for (i, close) in closes.iter().enumerate() {
            let close = match Decimal::from_f64_retain(*close) {
                Some(d) => d,
                None => {
                    warn!("skipping bar at index {}: unconvertible close {}", i, close);
                    continue;
                }
            };
            let date = match timestamps.get(i).copied().and_then(date_from_unix) {
                Some(date) => date,
                None => {
                    warn!("skipping bar at index {}: missing or invalid timestamp", i);
                    continue;
                }
            };
            bars.push(EquityBar {
                symbol: query.symbol.clone(),
                date,
                open: opens.get(i).and_then(|v| Decimal::from_f64_retain(*v)),
                high: highs.get(i).and_then(|v| Decimal::from_f64_retain(*v)),
                low: lows.get(i).and_then(|v| Decimal::from_f64_retain(*v)),
                close,
                adj_close: None,
                volume: volumes.get(i).and_then(|v| Decimal::from_f64_retain(*v)),
            });
        }

        bars.sort_by_key(|bar| bar.date);
        if let Some(limit) = query.limit {
            bars.truncate(limit as usize);
        }
        Ok(bars)
    }
}

/// Option chains from the chain endpoint.
pub struct MarketDataAppOptionsFetcher {
    client: Client,
}

impl MarketDataAppOptionsFetcher {
    pub fn new() -> Self {
        Self {
            client: build_client(),
        }
    }
}

impl Default for MarketDataAppOptionsFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for MarketDataAppOptionsFetcher {
    type Query = OptionsChainParams;
    type Record = OptionContract;

    fn provider_id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn domain(&self) -> Domain {
        Domain::OptionsChain
    }

    fn required_credentials(&self) -> &'static [&'static str] {
        &[API_KEY]
    }

    fn transform_query(&self, params: &RawParams) -> Result<Self::Query, FetchError> {
        OptionsChainParams::from_raw(params)
    }

    async fn extract(
        &self,
        query: &Self::Query,
        credentials: &Credentials,
    ) -> Result<RawPayload, FetchError> {
        let api_key = api_key_for(credentials)?;
        let mut url = format!("{}/options/chain/{}/", BASE_URL, query.symbol);
        let mut separator = '?';
        if let Some(expiration) = query.expiration {
            url.push_str(&format!(
                "{}expiration={}",
                separator,
                expiration.format("%Y-%m-%d")
            ));
            separator = '&';
        }
        if let Some(option_type) = query.option_type {
            url.push_str(&format!("{}side={}", separator, option_type));
        }

        let payload = fetch_json(&self.client, &url, api_key).await?;
        if let Some(error) = payload_error(&payload) {
            return Err(error);
        }
        Ok(payload)
    }

    fn transform_data(
        &self,
        query: &Self::Query,
        payload: RawPayload,
    ) -> Result<Vec<Self::Record>, FetchError> {
        let chain: ChainResponse = serde_json::from_value(payload)
            .map_err(|e| FetchError::schema(PROVIDER_ID, format!("unexpected chain payload: {}", e)))?;
        if chain.s != "ok" {
            return Ok(Vec::new());
        }

        let contract_symbols = chain.option_symbol.unwrap_or_default();
        let underlyings = chain.underlying.unwrap_or_default();
        let expirations = chain.expiration.unwrap_or_default();
        let sides = chain.side.unwrap_or_default();
        let strikes = chain.strike.unwrap_or_default();
        let bids = chain.bid.unwrap_or_default();
        let asks = chain.ask.unwrap_or_default();
        let lasts = chain.last.unwrap_or_default();
        let volumes = chain.volume.unwrap_or_default();
        let open_interests = chain.open_interest.unwrap_or_default();
        let ivs = chain.iv.unwrap_or_default();

        let mut contracts = Vec::with_capacity(contract_symbols.len());
        for (i, contract_symbol) in contract_symbols.iter().enumerate() {
            let expiration = match expirations.get(i).copied().and_then(date_from_unix) {
                Some(date) => date,
                None => {
                    warn!("skipping contract '{}': missing or invalid expiration", contract_symbol);
                    continue;
                }
            };
            let option_type = match sides.get(i).map(String::as_str) {
                Some("call") => OptionType::Call,
                Some("put") => OptionType::Put,
                other => {
                    warn!("skipping contract '{}': unknown side {:?}", contract_symbol, other);
                    continue;
                }
            };
            let strike = match strikes.get(i).and_then(|v| Decimal::from_f64_retain(*v)) {
                Some(strike) => strike,
                None => {
                    warn!("skipping contract '{}': missing strike", contract_symbol);
                    continue;
                }
            };
            let optional = |values: &[Option<f64>]| {
                values
                    .get(i)
                    .copied()
                    .flatten()
                    .and_then(Decimal::from_f64_retain)
            };
            contracts.push(OptionContract {
                contract_symbol: contract_symbol.clone(),
                underlying: underlyings
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| query.symbol.clone()),
                expiration,
                strike,
                option_type,
                bid: optional(&bids),
                ask: optional(&asks),
                last_price: optional(&lasts),
                volume: optional(&volumes),
                open_interest: optional(&open_interests),
                implied_volatility: optional(&ivs),
            });
        }
        Ok(contracts)
    }
}
