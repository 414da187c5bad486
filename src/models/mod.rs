//! Standard schemas, wire shapes, and parameter coercion.

pub mod equity_historical;
pub mod options_chain;
pub mod raw_params;
pub mod record;
pub mod request;
pub mod result;
pub mod types;

pub use equity_historical::{EquityBar, EquityHistoricalParams};
pub use options_chain::{OptionContract, OptionType, OptionsChainParams};
pub use raw_params::ParamReader;
pub use record::{DataRecord, StandardRecord};
pub use request::FetchRequest;
pub use result::ResultContainer;
pub use types::{Domain, RawParams, RawPayload};
