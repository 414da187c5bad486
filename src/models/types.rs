use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Raw, untyped provider payload as returned by the extract stage.
pub type RawPayload = serde_json::Value;

/// Untyped caller parameters, as received from the API boundary.
pub type RawParams = serde_json::Map<String, serde_json::Value>;

/// A named category of financial data with a fixed standard schema.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Domain {
    /// Daily historical prices for an equity.
    EquityHistorical,
    /// The option contracts listed on an underlying.
    OptionsChain,
}

impl Domain {
    /// Canonical wire name of the domain.
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::EquityHistorical => "EquityHistorical",
            Domain::OptionsChain => "OptionsChain",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    /// Accepts the canonical name in any common casing
    /// ("EquityHistorical", "equity_historical", "equityhistorical").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "equityhistorical" => Ok(Domain::EquityHistorical),
            "optionschain" => Ok(Domain::OptionsChain),
            _ => Err(format!("unknown domain '{}'", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_from_str_accepts_casings() {
        assert_eq!(
            "EquityHistorical".parse::<Domain>().unwrap(),
            Domain::EquityHistorical
        );
        assert_eq!(
            "equity_historical".parse::<Domain>().unwrap(),
            Domain::EquityHistorical
        );
        assert_eq!(
            "options_chain".parse::<Domain>().unwrap(),
            Domain::OptionsChain
        );
        assert!("futures_curve".parse::<Domain>().is_err());
    }

    #[test]
    fn test_domain_wire_name() {
        let json = serde_json::to_string(&Domain::EquityHistorical).unwrap();
        assert_eq!(json, "\"EquityHistorical\"");
    }
}
