//! Provider registry and request-time provider resolution.

pub mod provider_registry;

pub use provider_registry::{
    ProviderEntry, ProviderRegistry, ProviderRegistryBuilder, RegistryError,
};
