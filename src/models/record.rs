//! Domain-erased standard data record.

use serde::{Deserialize, Serialize};

use crate::models::equity_historical::EquityBar;
use crate::models::options_chain::OptionContract;
use crate::models::types::Domain;

/// Contract every standard (and provider) data record must satisfy before
/// it is accepted into a result container.
pub trait StandardRecord {
    /// Check the record against the standard schema's invariants.
    /// A failure here is a fetcher implementation defect, not a user error.
    fn validate(&self) -> Result<(), String>;

    /// Names of optional standard fields this record does not populate.
    /// Reported to the caller as warnings.
    fn missing_optional_fields(&self) -> Vec<&'static str>;
}

/// One standard data record, erased over the domain so registry and
/// dispatcher stay domain-generic. Serializes flat (untagged): the wire
/// shape is the record itself, and a result container only ever holds
/// records of a single domain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataRecord {
    OptionContract(OptionContract),
    EquityBar(EquityBar),
}

impl DataRecord {
    /// The domain this record belongs to.
    pub fn domain(&self) -> Domain {
        match self {
            DataRecord::EquityBar(_) => Domain::EquityHistorical,
            DataRecord::OptionContract(_) => Domain::OptionsChain,
        }
    }
}

impl StandardRecord for DataRecord {
    fn validate(&self) -> Result<(), String> {
        match self {
            DataRecord::EquityBar(bar) => bar.validate(),
            DataRecord::OptionContract(contract) => contract.validate(),
        }
    }

    fn missing_optional_fields(&self) -> Vec<&'static str> {
        match self {
            DataRecord::EquityBar(bar) => bar.missing_optional_fields(),
            DataRecord::OptionContract(contract) => contract.missing_optional_fields(),
        }
    }
}

impl From<EquityBar> for DataRecord {
    fn from(bar: EquityBar) -> Self {
        DataRecord::EquityBar(bar)
    }
}

impl From<OptionContract> for DataRecord {
    fn from(contract: OptionContract) -> Self {
        DataRecord::OptionContract(contract)
    }
}
