//! Alpha Vantage fetcher.
//!
//! Fetches daily adjusted equity prices from the Alpha Vantage API.
//!
//! # API Endpoint
//!
//! `https://www.alphavantage.co/query?function=TIME_SERIES_DAILY_ADJUSTED&symbol={symbol}&outputsize={size}&apikey={key}`
//!
//! # Response Format
//!
//! A keyed object of `date -> numbered string fields`. Request failures
//! come back as HTTP 200 with an "Error Message" key; throttling comes
//! back as a "Note" or "Information" key.

use async_trait::async_trait;
use chrono::NaiveDate;
use log::warn;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde_json::Value;
use std::time::Duration;

use crate::errors::{FetchError, ProviderErrorKind};
use crate::fetcher::{Credentials, Fetcher};
use crate::models::{Domain, EquityBar, EquityHistoricalParams, RawParams, RawPayload};

const BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER_ID: &str = "ALPHA_VANTAGE";
const API_KEY: &str = "api_key";
const SERIES_KEY: &str = "Time Series (Daily)";

/// Default HTTP request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Query for the daily adjusted series.
///
/// `output_size` is derived from the requested window alone so the same
/// params always produce the same query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlphaVantageEquityQuery {
    pub params: EquityHistoricalParams,
    /// "compact" (latest 100 bars) or "full" (20+ years).
    pub output_size: &'static str,
}

/// In-band failure reported through well-known top-level keys.
fn payload_error(payload: &RawPayload) -> Option<FetchError> {
    if let Some(message) = payload.get("Error Message").and_then(Value::as_str) {
        return Some(FetchError::provider(
            PROVIDER_ID,
            ProviderErrorKind::NotFound,
            message,
        ));
    }
    for key in ["Note", "Information"] {
        if let Some(message) = payload.get(key).and_then(Value::as_str) {
            return Some(FetchError::provider(
                PROVIDER_ID,
                ProviderErrorKind::RateLimit,
                message,
            ));
        }
    }
    None
}

fn decimal_field(entry: &Value, key: &str) -> Option<Decimal> {
    entry.get(key)?.as_str()?.parse().ok()
}

/// Daily adjusted equity prices.
pub struct AlphaVantageEquityFetcher {
    client: Client,
}

impl AlphaVantageEquityFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

impl Default for AlphaVantageEquityFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for AlphaVantageEquityFetcher {
    type Query = AlphaVantageEquityQuery;
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
        let params = EquityHistoricalParams::from_raw(params)?;
        // Compact only covers the latest 100 bars; any explicit start date
        // needs the full series.
        let output_size = if params.start_date.is_some() {
            "full"
        } else {
            "compact"
        };
        Ok(AlphaVantageEquityQuery {
            params,
            output_size,
        })
    }

    async fn extract(
        &self,
        query: &Self::Query,
        credentials: &Credentials,
    ) -> Result<RawPayload, FetchError> {
        let api_key = credentials.get(PROVIDER_ID, API_KEY).ok_or_else(|| {
            FetchError::provider(
                PROVIDER_ID,
                ProviderErrorKind::Auth,
                "missing credential 'api_key'",
            )
        })?;
        let url = format!(
            "{}?function=TIME_SERIES_DAILY_ADJUSTED&symbol={}&outputsize={}&apikey={}",
            BASE_URL, query.params.symbol, query.output_size, api_key
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            FetchError::provider(PROVIDER_ID, ProviderErrorKind::Transport, e.to_string())
        })?;

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
        if !status.is_success() {
            return Err(FetchError::provider(
                PROVIDER_ID,
                ProviderErrorKind::Transport,
                format!("HTTP error: {}", status),
            ));
        }

        let payload: RawPayload = response.json().await.map_err(|e| {
            FetchError::provider(
                PROVIDER_ID,
                ProviderErrorKind::Transport,
                format!("failed to parse response: {}", e),
            )
        })?;
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
        let series = payload
            .get(SERIES_KEY)
            .and_then(Value::as_object)
            .ok_or_else(|| {
                FetchError::schema(PROVIDER_ID, format!("payload is missing '{}'", SERIES_KEY))
            })?;

        let mut bars = Vec::with_capacity(series.len());
        for (date_str, entry) in series {
            let date = match NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
                Ok(date) => date,
                Err(_) => {
                    warn!("skipping bar '{}': not an ISO date", date_str);
                    continue;
                }
            };
            if query.params.start_date.is_some_and(|start| date < start)
                || query.params.end_date.is_some_and(|end| date > end)
            {
                continue;
            }
            let close = match decimal_field(entry, "4. close") {
                Some(close) => close,
                None => {
                    warn!("skipping bar '{}': missing close", date_str);
                    continue;
                }
            };
            bars.push(EquityBar {
                symbol: query.params.symbol.clone(),
                date,
                open: decimal_field(entry, "1. open"),
                high: decimal_field(entry, "2. high"),
                low: decimal_field(entry, "3. low"),
                close,
                adj_close: decimal_field(entry, "5. adjusted close"),
                volume: decimal_field(entry, "6. volume"),
            });
        }

        bars.sort_by_key(|bar| bar.date);
        if let Some(limit) = query.params.limit {
            bars.truncate(limit as usize);
        }
        Ok(bars)
    }
}
