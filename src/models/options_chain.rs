//! Standard schemas for the options chain domain.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::FetchError;
use crate::models::raw_params::ParamReader;
use crate::models::record::StandardRecord;
use crate::models::types::RawParams;

/// Call or put side of an option contract.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Call => write!(f, "call"),
            OptionType::Put => write!(f, "put"),
        }
    }
}

/// Standard query parameters for an options chain request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionsChainParams {
    /// Canonical (uppercased) underlying ticker symbol.
    pub symbol: String,
    /// Restrict the chain to a single expiration date.
    pub expiration: Option<NaiveDate>,
    /// Restrict the chain to calls or puts.
    pub option_type: Option<OptionType>,
}

impl OptionsChainParams {
    /// Validate and coerce raw caller parameters.
    pub fn from_raw(params: &RawParams) -> Result<Self, FetchError> {
        let mut reader = ParamReader::new(params);
        let symbol = reader.require_symbol("symbol");
        let expiration = reader.date("expiration");
        let option_type = reader
            .one_of("option_type", &["call", "put"])
            .map(|side| match side.as_str() {
                "call" => OptionType::Call,
                _ => OptionType::Put,
            });
        let symbol = reader.finish_with(symbol)?;
        Ok(Self {
            symbol,
            expiration,
            option_type,
        })
    }
}

/// Standard data record: one listed option contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionContract {
    /// OCC-style contract symbol (e.g. "AAPL240621C00190000").
    pub contract_symbol: String,
    /// Canonical underlying ticker symbol.
    pub underlying: String,
    pub expiration: NaiveDate,
    pub strike: Decimal,
    pub option_type: OptionType,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub last_price: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub open_interest: Option<Decimal>,
    pub implied_volatility: Option<Decimal>,
}

impl StandardRecord for OptionContract {
    fn validate(&self) -> Result<(), String> {
        if self.contract_symbol.trim().is_empty() {
            return Err("contract_symbol must not be empty".to_string());
        }
        if self.strike <= Decimal::ZERO {
            return Err(format!(
                "strike must be positive, got {} for {}",
                self.strike, self.contract_symbol
            ));
        }
        if let (Some(bid), Some(ask)) = (self.bid, self.ask) {
            if bid > ask {
                return Err(format!(
                    "bid {} exceeds ask {} for {}",
                    bid, ask, self.contract_symbol
                ));
            }
        }
        Ok(())
    }

    fn missing_optional_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.bid.is_none() {
            missing.push("bid");
        }
        if self.ask.is_none() {
            missing.push("ask");
        }
        if self.last_price.is_none() {
            missing.push("last_price");
        }
        if self.volume.is_none() {
            missing.push("volume");
        }
        if self.open_interest.is_none() {
            missing.push("open_interest");
        }
        if self.implied_volatility.is_none() {
            missing.push("implied_volatility");
        }
        missing
    }
}
