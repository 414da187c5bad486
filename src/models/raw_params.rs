//! Field-scoped coercion of untyped caller parameters.
//!
//! [`ParamReader`] walks a [`RawParams`] map, coercing each field into its
//! typed form and accumulating every offending field before failing, so a
//! caller sees all of their mistakes in one round trip instead of one at a
//! time. Coercions are explicit and total for the supported types; malformed
//! input is always a validation failure, never a silent default.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::errors::FetchError;
use crate::models::types::RawParams;

/// Accumulating reader over an untyped parameter map.
pub struct ParamReader<'a> {
    params: &'a RawParams,
    errors: BTreeMap<String, String>,
}

impl<'a> ParamReader<'a> {
    pub fn new(params: &'a RawParams) -> Self {
        Self {
            params,
            errors: BTreeMap::new(),
        }
    }

    /// Record a failure against `field` without reading it.
    /// Used for cross-field rules like date-range ordering.
    pub fn reject(&mut self, field: &str, reason: impl Into<String>) {
        self.errors.insert(field.to_string(), reason.into());
    }

    /// Required ticker symbol: trimmed and uppercased to canonical form.
    pub fn require_symbol(&mut self, field: &str) -> Option<String> {
        match self.params.get(field) {
            Some(Value::String(s)) => {
                let canonical = s.trim().to_ascii_uppercase();
                if canonical.is_empty() {
                    self.reject(field, "must be a non-empty ticker symbol");
                    None
                } else {
                    Some(canonical)
                }
            }
            Some(other) => {
                self.reject(field, format!("expected a string, got {}", type_name(other)));
                None
            }
            None => {
                self.reject(field, "is required");
                None
            }
        }
    }

    /// Optional ISO-8601 (`YYYY-MM-DD`) date.
    pub fn date(&mut self, field: &str) -> Option<NaiveDate> {
        match self.params.get(field) {
            Some(Value::String(s)) => match NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    self.reject(field, format!("'{}' is not an ISO date (YYYY-MM-DD)", s));
                    None
                }
            },
            Some(Value::Null) | None => None,
            Some(other) => {
                self.reject(
                    field,
                    format!("expected an ISO date string, got {}", type_name(other)),
                );
                None
            }
        }
    }

    /// Optional decimal, accepted as a JSON number or a numeric string.
    pub fn decimal(&mut self, field: &str) -> Option<Decimal> {
        match self.params.get(field) {
            Some(Value::Number(n)) => match n.to_string().parse::<Decimal>() {
                Ok(d) => Some(d),
                Err(_) => {
                    self.reject(field, format!("'{}' is not a representable decimal", n));
                    None
                }
            },
            Some(Value::String(s)) => match s.trim().parse::<Decimal>() {
                Ok(d) => Some(d),
                Err(_) => {
                    self.reject(field, format!("'{}' is not a decimal number", s));
                    None
                }
            },
            Some(Value::Null) | None => None,
            Some(other) => {
                self.reject(field, format!("expected a number, got {}", type_name(other)));
                None
            }
        }
    }

    /// Optional unsigned integer.
    pub fn unsigned(&mut self, field: &str) -> Option<u32> {
        match self.params.get(field) {
            Some(Value::Number(n)) => match n.as_u64() {
                Some(v) if v <= u32::MAX as u64 => Some(v as u32),
                _ => {
                    self.reject(field, format!("'{}' is not a non-negative integer", n));
                    None
                }
            },
            Some(Value::String(s)) => match s.trim().parse::<u32>() {
                Ok(v) => Some(v),
                Err(_) => {
                    self.reject(field, format!("'{}' is not a non-negative integer", s));
                    None
                }
            },
            Some(Value::Null) | None => None,
            Some(other) => {
                self.reject(
                    field,
                    format!("expected an integer, got {}", type_name(other)),
                );
                None
            }
        }
    }

    /// Optional string constrained to a fixed set of lowercase values.
    pub fn one_of(&mut self, field: &str, allowed: &[&str]) -> Option<String> {
        match self.params.get(field) {
            Some(Value::String(s)) => {
                let folded = s.trim().to_ascii_lowercase();
                if allowed.contains(&folded.as_str()) {
                    Some(folded)
                } else {
                    self.reject(
                        field,
                        format!("'{}' is not one of [{}]", s, allowed.join(", ")),
                    );
                    None
                }
            }
            Some(Value::Null) | None => None,
            Some(other) => {
                self.reject(field, format!("expected a string, got {}", type_name(other)));
                None
            }
        }
    }

    /// Optional free-form string.
    pub fn string(&mut self, field: &str) -> Option<String> {
        match self.params.get(field) {
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(Value::Null) | None => None,
            Some(other) => {
                self.reject(field, format!("expected a string, got {}", type_name(other)));
                None
            }
        }
    }

    /// Finish validation, returning the accumulated field errors if any.
    pub fn finish(self) -> Result<(), FetchError> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let summary = self
            .errors
            .iter()
            .map(|(field, reason)| format!("{}: {}", field, reason))
            .collect::<Vec<_>>()
            .join("; ");
        Err(FetchError::Validation {
            message: summary,
            field_errors: self.errors,
        })
    }

    /// Finish validation and unwrap a required value read earlier.
    ///
    /// If the required value is absent its failure was already recorded,
    /// so the error path always reports through `finish`.
    pub fn finish_with<T>(self, required: Option<T>) -> Result<T, FetchError> {
        self.finish()?;
        required.ok_or_else(|| {
            FetchError::Unexpected("required parameter missing after validation".to_string())
        })
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
