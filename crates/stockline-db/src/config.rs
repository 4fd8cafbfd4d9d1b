//! # Application Configuration
//!
//! Layered configuration for the database, document numbering and the
//! ledger's conflict retry.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STOCKLINE_DB_PATH=/var/lib/stockline/stockline.db                  │
//! │     STOCKLINE_SALES_PREFIX=TRX                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/stockline/stockline.toml (Linux)                         │
//! │     ~/Library/Application Support/com.stockline.stockline/... (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/stockline/stockline.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [numbering]
//! sales_prefix = "TRX"
//! purchase_prefix = "PO"
//!
//! [ledger]
//! conflict_retries = 5
//! initial_backoff_ms = 20
//! max_backoff_ms = 500
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use stockline_core::validation::validate_document_prefix;
use stockline_core::{DEFAULT_PURCHASE_PREFIX, DEFAULT_SALES_PREFIX};

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;
use crate::retry::RetryPolicy;

// =============================================================================
// Sections
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Database file. Defaults to `stockline.db` in the platform data dir.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "stockline", "stockline")
        .map(|dirs| dirs.data_dir().join("stockline.db"))
        .unwrap_or_else(|| PathBuf::from("stockline.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

/// `[numbering]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumberingSettings {
    #[serde(default = "default_sales_prefix")]
    pub sales_prefix: String,

    #[serde(default = "default_purchase_prefix")]
    pub purchase_prefix: String,
}

fn default_sales_prefix() -> String {
    DEFAULT_SALES_PREFIX.to_string()
}

fn default_purchase_prefix() -> String {
    DEFAULT_PURCHASE_PREFIX.to_string()
}

impl Default for NumberingSettings {
    fn default() -> Self {
        NumberingSettings {
            sales_prefix: default_sales_prefix(),
            purchase_prefix: default_purchase_prefix(),
        }
    }
}

/// `[ledger]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Retries after a write conflict before it is returned to the caller.
    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_conflict_retries() -> u32 {
    5
}

fn default_initial_backoff() -> u64 {
    20
}

fn default_max_backoff() -> u64 {
    500
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            conflict_retries: default_conflict_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub numbering: NumberingSettings,

    #[serde(default)]
    pub ledger: LedgerSettings,
}

impl AppConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (stockline.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns the defaults if loading fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> DbResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| DbError::InvalidConfig("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DbResult<()> {
        if self.database.max_connections == 0 {
            return Err(DbError::InvalidConfig(
                "max_connections must be greater than 0".into(),
            ));
        }

        validate_document_prefix(&self.numbering.sales_prefix)?;
        validate_document_prefix(&self.numbering.purchase_prefix)?;

        if self.numbering.sales_prefix == self.numbering.purchase_prefix {
            return Err(DbError::InvalidConfig(
                "sales_prefix and purchase_prefix must differ".into(),
            ));
        }

        if self.ledger.initial_backoff_ms > self.ledger.max_backoff_ms {
            return Err(DbError::InvalidConfig(
                "initial_backoff_ms must not exceed max_backoff_ms".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("STOCKLINE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("STOCKLINE_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid STOCKLINE_MAX_CONNECTIONS"),
            }
        }

        if let Ok(prefix) = std::env::var("STOCKLINE_SALES_PREFIX") {
            self.numbering.sales_prefix = prefix;
        }

        if let Ok(prefix) = std::env::var("STOCKLINE_PURCHASE_PREFIX") {
            self.numbering.purchase_prefix = prefix;
        }

        if let Ok(retries) = std::env::var("STOCKLINE_CONFLICT_RETRIES") {
            match retries.parse::<u32>() {
                Ok(n) => self.ledger.conflict_retries = n,
                Err(_) => warn!(value = %retries, "Ignoring invalid STOCKLINE_CONFLICT_RETRIES"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "stockline", "stockline")
            .map(|dirs| dirs.config_dir().join("stockline.toml"))
    }

    /// Retry policy for write conflicts.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.ledger.conflict_retries,
            initial_backoff: Duration::from_millis(self.ledger.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.ledger.max_backoff_ms),
        }
    }

    /// Builds the database configuration.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database.path.clone())
            .max_connections(self.database.max_connections)
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
            .retry_policy(self.retry_policy())
            .sales_prefix(self.numbering.sales_prefix.clone())
            .purchase_prefix(self.numbering.purchase_prefix.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.numbering.sales_prefix, "TRX");
        assert_eq!(config.numbering.purchase_prefix, "PO");
        assert_eq!(config.ledger.conflict_retries, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [numbering]
            sales_prefix = "POS2"

            [ledger]
            conflict_retries = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.numbering.sales_prefix, "POS2");
        assert_eq!(config.numbering.purchase_prefix, "PO");
        assert_eq!(config.ledger.conflict_retries, 2);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();

        config.numbering.sales_prefix = "trx".to_string();
        assert!(config.validate().is_err());

        config.numbering.sales_prefix = "PO".to_string();
        assert!(config.validate().is_err());

        config.numbering.sales_prefix = "TRX".to_string();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        config.database.max_connections = 1;
        config.ledger.initial_backoff_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_db_config_carries_settings() {
        let mut config = AppConfig::default();
        config.database.path = PathBuf::from("/tmp/shop.db");
        config.ledger.conflict_retries = 9;
        config.numbering.purchase_prefix = "PUR".to_string();

        let db = config.db_config();
        assert_eq!(db.database_path, PathBuf::from("/tmp/shop.db"));
        assert_eq!(db.retry.max_retries, 9);
        assert_eq!(db.purchase_prefix, "PUR");
        assert_eq!(db.busy_timeout, Duration::from_millis(5_000));
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&AppConfig::default()).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[numbering]"));
        assert!(toml_str.contains("[ledger]"));
    }
}
