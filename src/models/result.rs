//! Per-request result container, also the wire response shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::record::DataRecord;

/// The output of one dispatch: validated records in the caller's requested
/// order, the identity of the provider that produced them, and structured
/// warnings. Created fresh per request and never mutated after construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultContainer {
    /// Ordered, homogeneous standard data records.
    pub data: Vec<DataRecord>,

    /// The provider that fulfilled the request (the first fulfilling
    /// provider, for batched requests).
    pub provider_used: String,

    /// Ordered human-readable warnings: missing optional fields, omitted
    /// batch targets, fallback attempts.
    pub warnings: Vec<String>,

    /// Free-form request metadata (domain, record count, batch stats).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}
