//! # AFIP Configuration
//!
//! Endpoints, timeouts and storage locations for the fiscal integration.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MOSTRADOR_AFIP_ENV=production                                      │
//! │     MOSTRADOR_DB_PATH=/var/lib/mostrador/fiscal.db                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/mostrador/afip.toml (Linux)                              │
//! │     ~/Library/Application Support/ar.mostrador.fiscal/afip.toml        │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     testing environment, 30s timeout, 24h ticket window                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [afip]
//! environment = "testing"          # testing | production
//! http_timeout_secs = 30
//! max_retries = 3
//!
//! [storage]
//! database_path = "/var/lib/mostrador/fiscal.db"
//! credentials_dir = "/var/lib/mostrador/credentials"
//! ```

use chrono::Duration as ChronoDuration;
use mostrador_core::Environment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{AfipError, AfipResult};

// =============================================================================
// Endpoints
// =============================================================================

pub const WSAA_TESTING_URL: &str = "https://wsaahomo.afip.gov.ar/ws/services/LoginCms";
pub const WSAA_PRODUCTION_URL: &str = "https://wsaa.afip.gov.ar/ws/services/LoginCms";
pub const WSFE_TESTING_URL: &str = "https://wswhomo.afip.gov.ar/wsfev1/service.asmx";
pub const WSFE_PRODUCTION_URL: &str = "https://servicios1.afip.gov.ar/wsfev1/service.asmx";

/// WSAA service name for electronic invoicing.
pub const WSFE_SERVICE: &str = "wsfe";

// =============================================================================
// AFIP Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AfipSettings {
    /// Homologation or production hosts.
    #[serde(default)]
    pub environment: Environment,

    /// Overrides the WSAA endpoint for the environment.
    #[serde(default)]
    pub wsaa_url: Option<String>,

    /// Overrides the WSFEv1 endpoint for the environment.
    #[serde(default)]
    pub wsfe_url: Option<String>,

    /// Per-request timeout (seconds).
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    /// Extra attempts after a transient transport failure.
    /// 0 disables retries.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff duration (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Requested login ticket lifetime (hours). WSAA caps it at 24.
    #[serde(default = "default_ticket_validity")]
    pub ticket_validity_hours: i64,

    /// `generationTime` is backdated by this much to absorb clock drift.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_minutes: i64,

    /// A cached ticket is reused while more than this remains.
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_minutes: i64,
}

fn default_http_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    10
}
fn default_ticket_validity() -> i64 {
    24
}
fn default_clock_skew() -> i64 {
    10
}
fn default_refresh_margin() -> i64 {
    10
}

impl Default for AfipSettings {
    fn default() -> Self {
        AfipSettings {
            environment: Environment::default(),
            wsaa_url: None,
            wsfe_url: None,
            http_timeout_secs: default_http_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            ticket_validity_hours: default_ticket_validity(),
            clock_skew_minutes: default_clock_skew(),
            refresh_margin_minutes: default_refresh_margin(),
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Directory holding uploaded certificates and private keys.
    #[serde(default = "default_credentials_dir")]
    pub credentials_dir: PathBuf,

    /// Passphrase for encrypted private keys. Environment only.
    #[serde(skip)]
    pub key_passphrase: Option<String>,
}

fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("ar", "mostrador", "fiscal")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_database_path() -> PathBuf {
    data_dir().join("fiscal.db")
}

fn default_credentials_dir() -> PathBuf {
    data_dir().join("credentials")
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            database_path: default_database_path(),
            credentials_dir: default_credentials_dir(),
            key_passphrase: None,
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AfipConfig {
    #[serde(default)]
    pub afip: AfipSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl AfipConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (afip.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> AfipResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading AFIP config from file");
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

    /// Configuration for tests: defaults with explicit storage paths.
    pub fn with_storage(database_path: impl Into<PathBuf>, credentials_dir: impl Into<PathBuf>) -> Self {
        AfipConfig {
            afip: AfipSettings::default(),
            storage: StorageSettings {
                database_path: database_path.into(),
                credentials_dir: credentials_dir.into(),
                key_passphrase: None,
            },
        }
    }

    pub fn validate(&self) -> AfipResult<()> {
        for url in [&self.afip.wsaa_url, &self.afip.wsfe_url].into_iter().flatten() {
            let parsed = url::Url::parse(url)?;
            if parsed.scheme() != "https" && parsed.scheme() != "http" {
                return Err(AfipError::Config(format!(
                    "endpoint must be http(s), got: {}",
                    url
                )));
            }
        }

        if self.afip.http_timeout_secs == 0 {
            return Err(AfipError::Config("http_timeout_secs must be greater than 0".into()));
        }

        if !(1..=24).contains(&self.afip.ticket_validity_hours) {
            return Err(AfipError::Config(
                "ticket_validity_hours must be between 1 and 24".into(),
            ));
        }

        if self.afip.clock_skew_minutes < 0 || self.afip.refresh_margin_minutes < 0 {
            return Err(AfipError::Config(
                "clock_skew_minutes and refresh_margin_minutes must not be negative".into(),
            ));
        }

        if self.afip.refresh_margin_minutes >= self.afip.ticket_validity_hours * 60 {
            return Err(AfipError::Config(
                "refresh_margin_minutes must be shorter than the ticket validity".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(env) = std::env::var("MOSTRADOR_AFIP_ENV") {
            match env.parse() {
                Ok(parsed) => {
                    debug!(environment = %env, "Overriding AFIP environment from environment");
                    self.afip.environment = parsed;
                }
                Err(_) => warn!(environment = %env, "Unknown AFIP environment in environment"),
            }
        }

        if let Ok(url) = std::env::var("MOSTRADOR_WSAA_URL") {
            debug!(url = %url, "Overriding WSAA URL from environment");
            self.afip.wsaa_url = Some(url);
        }

        if let Ok(url) = std::env::var("MOSTRADOR_WSFE_URL") {
            debug!(url = %url, "Overriding WSFE URL from environment");
            self.afip.wsfe_url = Some(url);
        }

        if let Ok(timeout) = std::env::var("MOSTRADOR_HTTP_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse::<u64>() {
                self.afip.http_timeout_secs = secs;
            }
        }

        if let Ok(path) = std::env::var("MOSTRADOR_DB_PATH") {
            self.storage.database_path = PathBuf::from(path);
        }

        if let Ok(dir) = std::env::var("MOSTRADOR_CREDENTIALS_DIR") {
            self.storage.credentials_dir = PathBuf::from(dir);
        }

        if let Ok(passphrase) = std::env::var("MOSTRADOR_KEY_PASSPHRASE") {
            self.storage.key_passphrase = Some(passphrase);
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("ar", "mostrador", "fiscal")
            .map(|dirs| dirs.config_dir().join("afip.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn wsaa_url(&self) -> &str {
        match (&self.afip.wsaa_url, self.afip.environment) {
            (Some(url), _) => url,
            (None, Environment::Production) => WSAA_PRODUCTION_URL,
            (None, Environment::Testing) => WSAA_TESTING_URL,
        }
    }

    pub fn wsfe_url(&self) -> &str {
        match (&self.afip.wsfe_url, self.afip.environment) {
            (Some(url), _) => url,
            (None, Environment::Production) => WSFE_PRODUCTION_URL,
            (None, Environment::Testing) => WSFE_TESTING_URL,
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.afip.http_timeout_secs)
    }

    pub fn ticket_validity(&self) -> ChronoDuration {
        ChronoDuration::hours(self.afip.ticket_validity_hours)
    }

    pub fn clock_skew(&self) -> ChronoDuration {
        ChronoDuration::minutes(self.afip.clock_skew_minutes)
    }

    pub fn refresh_margin(&self) -> ChronoDuration {
        ChronoDuration::minutes(self.afip.refresh_margin_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AfipConfig::default();
        assert_eq!(config.afip.environment, Environment::Testing);
        assert_eq!(config.wsaa_url(), WSAA_TESTING_URL);
        assert_eq!(config.wsfe_url(), WSFE_TESTING_URL);
        assert_eq!(config.ticket_validity(), ChronoDuration::hours(24));
        assert_eq!(config.refresh_margin(), ChronoDuration::minutes(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_production_endpoints() {
        let mut config = AfipConfig::default();
        config.afip.environment = Environment::Production;
        assert_eq!(config.wsaa_url(), WSAA_PRODUCTION_URL);
        assert_eq!(config.wsfe_url(), WSFE_PRODUCTION_URL);

        config.afip.wsfe_url = Some("http://localhost:8080/wsfe".into());
        assert_eq!(config.wsfe_url(), "http://localhost:8080/wsfe");
    }

    #[test]
    fn test_config_validation() {
        let mut config = AfipConfig::default();

        config.afip.wsaa_url = Some("ftp://wsaa".into());
        assert!(config.validate().is_err());

        config.afip.wsaa_url = Some("not a url".into());
        assert!(config.validate().is_err());

        config.afip.wsaa_url = None;
        config.afip.ticket_validity_hours = 48;
        assert!(config.validate().is_err());

        config.afip.ticket_validity_hours = 1;
        config.afip.refresh_margin_minutes = 60;
        assert!(config.validate().is_err());

        config.afip.refresh_margin_minutes = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_parsing() {
        let config: AfipConfig = toml::from_str(
            r#"
            [afip]
            environment = "production"
            max_retries = 0

            [storage]
            database_path = "/tmp/fiscal.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.afip.environment, Environment::Production);
        assert_eq!(config.afip.max_retries, 0);
        assert_eq!(config.afip.http_timeout_secs, 30);
        assert_eq!(config.storage.database_path, PathBuf::from("/tmp/fiscal.db"));
        assert!(config.storage.key_passphrase.is_none());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = AfipConfig::load(Some(PathBuf::from("/nonexistent/afip.toml"))).unwrap();
        assert_eq!(config.afip.ticket_validity_hours, 24);
    }
}
