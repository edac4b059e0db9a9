//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{
    load_config, AdmissionSection, Config, ConfigError, CountdownsSection, LoggingSection,
    StoreBackend, StoreSection, ThresholdsSection,
};
