//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config.toml structure.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub thresholds: ThresholdsSection,
    pub countdowns: CountdownsSection,
    pub store: StoreSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub admission: AdmissionSection,
}

/// Price thresholds driving the decision logic
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ThresholdsSection {
    /// Price above which a position is opened without waiting
    pub buy_immediate: f64,
    /// Price above which a buy countdown is armed
    pub buy_countdown: f64,
    /// Price below which a position is closed without waiting
    pub sell_immediate: f64,
    /// Price below which a sell countdown is armed
    pub sell_countdown: f64,
}

/// Initial countdown durations
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CountdownsSection {
    /// Seconds a target must survive before a buy matures
    pub initial_buy_secs: i64,
    /// Seconds armed on a position when the price dips into the sell band
    pub initial_sell_secs: i64,
}

/// Countdown store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

/// Store configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// Backend kind: "memory" or "sqlite"
    pub backend: StoreBackend,
    /// Database file path for the sqlite backend
    #[serde(default)]
    pub path: String,
}

impl StoreSection {
    /// Get the database path with environment variable override.
    /// Checks COUNTDOWN_DB_PATH first, falls back to the config value.
    /// `~` is expanded to the home directory.
    pub fn resolved_path(&self) -> String {
        let raw = std::env::var("COUNTDOWN_DB_PATH").unwrap_or_else(|_| self.path.clone());
        shellexpand::tilde(&raw).to_string()
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log to file (in addition to stdout)
    pub log_to_file: bool,
    /// Log file path
    pub log_file: String,
}

/// Market admission section (optional)
#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct AdmissionSection {
    /// Minimum market age in seconds before a ticker may be tracked (0 disables)
    #[serde(default)]
    pub min_age_secs: i64,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Threshold ordering: the immediate level must be the more extreme one
        if self.thresholds.buy_immediate <= self.thresholds.buy_countdown {
            return Err(ConfigError::ValidationError(format!(
                "buy_immediate ({}) must be greater than buy_countdown ({})",
                self.thresholds.buy_immediate, self.thresholds.buy_countdown
            )));
        }

        if self.thresholds.sell_immediate >= self.thresholds.sell_countdown {
            return Err(ConfigError::ValidationError(format!(
                "sell_immediate ({}) must be less than sell_countdown ({})",
                self.thresholds.sell_immediate, self.thresholds.sell_countdown
            )));
        }

        if self.countdowns.initial_buy_secs <= 0 {
            return Err(ConfigError::ValidationError(format!(
                "initial_buy_secs must be > 0, got {}",
                self.countdowns.initial_buy_secs
            )));
        }

        if self.countdowns.initial_sell_secs <= 0 {
            return Err(ConfigError::ValidationError(format!(
                "initial_sell_secs must be > 0, got {}",
                self.countdowns.initial_sell_secs
            )));
        }

        if self.store.backend == StoreBackend::Sqlite && self.store.path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "store.path is required for the sqlite backend".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Unknown log level: {}",
                    other
                )));
            }
        }

        if self.admission.min_age_secs < 0 {
            return Err(ConfigError::ValidationError(format!(
                "min_age_secs must be >= 0, got {}",
                self.admission.min_age_secs
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_toml() -> String {
        r#"
            [thresholds]
            buy_immediate = 155.0
            buy_countdown = 150.0
            sell_immediate = 160.0
            sell_countdown = 165.0

            [countdowns]
            initial_buy_secs = 60
            initial_sell_secs = 300

            [store]
            backend = "memory"

            [logging]
            level = "info"
            log_to_file = false
            log_file = "countdown-trader.log"
        "#
        .to_string()
    }

    #[test]
    fn test_parse_valid_config() {
        let config: Config = toml::from_str(&base_toml()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.thresholds.buy_immediate, 155.0);
        assert_eq!(config.countdowns.initial_buy_secs, 60);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.admission.min_age_secs, 0);
    }

    #[test]
    fn test_inverted_buy_thresholds_rejected() {
        let toml_str = base_toml().replace("buy_immediate = 155.0", "buy_immediate = 140.0");
        let config: Config = toml::from_str(&toml_str).unwrap();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_inverted_sell_thresholds_rejected() {
        let toml_str = base_toml().replace("sell_countdown = 165.0", "sell_countdown = 155.0");
        let config: Config = toml::from_str(&toml_str).unwrap();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_zero_countdown_rejected() {
        let toml_str = base_toml().replace("initial_buy_secs = 60", "initial_buy_secs = 0");
        let config: Config = toml::from_str(&toml_str).unwrap();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sqlite_backend_requires_path() {
        let toml_str = base_toml().replace("backend = \"memory\"", "backend = \"sqlite\"");
        let config: Config = toml::from_str(&toml_str).unwrap();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sqlite_backend_with_path() {
        let toml_str = base_toml().replace(
            "backend = \"memory\"",
            "backend = \"sqlite\"\npath = \"trading.db\"",
        );
        let config: Config = toml::from_str(&toml_str).unwrap();

        config.validate().unwrap();
        assert_eq!(config.store.resolved_path(), "trading.db");
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let toml_str = base_toml().replace("level = \"info\"", "level = \"loud\"");
        let config: Config = toml::from_str(&toml_str).unwrap();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_admission_section() {
        let toml_str = format!("{}\n[admission]\nmin_age_secs = 3600\n", base_toml());
        let config: Config = toml::from_str(&toml_str).unwrap();

        config.validate().unwrap();
        assert_eq!(config.admission.min_age_secs, 3600);
    }
}
