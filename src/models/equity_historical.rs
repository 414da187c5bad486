//! Standard schemas for the equity historical prices domain.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::FetchError;
use crate::models::raw_params::ParamReader;
use crate::models::record::StandardRecord;
use crate::models::types::RawParams;

/// Standard query parameters for equity historical prices.
///
/// Immutable once constructed. Provider-specific query types embed this
/// struct and add their own fields on top; they never omit or retype a
/// standard field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityHistoricalParams {
    /// Canonical (uppercased) ticker symbol.
    pub symbol: String,
    /// Inclusive start of the date range.
    pub start_date: Option<NaiveDate>,
    /// Inclusive end of the date range.
    pub end_date: Option<NaiveDate>,
    /// Maximum number of records to return, oldest first.
    pub limit: Option<u32>,
}

impl EquityHistoricalParams {
    /// Validate and coerce raw caller parameters.
    ///
    /// Pure and deterministic; reports every offending field at once.
    pub fn from_raw(params: &RawParams) -> Result<Self, FetchError> {
        let mut reader = ParamReader::new(params);
        let symbol = reader.require_symbol("symbol");
        let start_date = reader.date("start_date");
        let end_date = reader.date("end_date");
        let limit = reader.unsigned("limit");
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                reader.reject("start_date", "must not be after end_date");
            }
        }
        if limit == Some(0) {
            reader.reject("limit", "must be at least 1");
        }
        let symbol = reader.finish_with(symbol)?;
        Ok(Self {
            symbol,
            start_date,
            end_date,
            limit,
        })
    }
}

/// Standard data record: one bar per trading day.
///
/// `date` and `close` are required; the remaining fields are optional and
/// serialize as explicit nulls when a provider does not supply them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityBar {
    /// Canonical ticker symbol the bar belongs to.
    pub symbol: String,
    pub date: NaiveDate,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Decimal,
    pub adj_close: Option<Decimal>,
    pub volume: Option<Decimal>,
}

impl StandardRecord for EquityBar {
    fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty() {
            return Err("symbol must not be empty".to_string());
        }
        if self.close <= Decimal::ZERO {
            return Err(format!(
                "close must be positive, got {} on {}",
                self.close, self.date
            ));
        }
        for (name, price) in [("open", self.open), ("high", self.high), ("low", self.low)] {
            if let Some(p) = price {
                if p <= Decimal::ZERO {
                    return Err(format!("{} must be positive, got {} on {}", name, p, self.date));
                }
            }
        }
        if let (Some(high), Some(low)) = (self.high, self.low) {
            if high < low {
                return Err(format!(
                    "high {} is below low {} on {}",
                    high, low, self.date
                ));
            }
        }
        if let Some(volume) = self.volume {
            if volume < Decimal::ZERO {
                return Err(format!("volume must not be negative on {}", self.date));
            }
        }
        Ok(())
    }

    fn missing_optional_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.open.is_none() {
            missing.push("open");
        }
        if self.high.is_none() {
            missing.push("high");
        }
        if self.low.is_none() {
            missing.push("low");
        }
        if self.adj_close.is_none() {
            missing.push("adj_close");
        }
        if self.volume.is_none() {
            missing.push("volume");
        }
        missing
    }
}
