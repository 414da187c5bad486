//! Fetcher contract, attempt lifecycle, and the credential store.

pub mod credentials;
pub mod runner;
pub mod traits;

pub use credentials::Credentials;
pub use runner::{FetchOutcome, FetchState};
pub use traits::{DynFetcher, Fetcher};
