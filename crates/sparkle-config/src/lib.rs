//! Persisted per-application updater state.

mod configuration;
mod error;
mod snapshot;
mod store;

pub use configuration::Configuration;
pub use error::ConfigError;
pub use snapshot::SavedConfiguration;
pub use store::{ConfigurationStore, JsonConfigurationStore, MemoryConfigurationStore};
