//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the
//! tide-config.toml file. It provides a centralized way to configure the
//! Admiralty API endpoint, the tidal station, response caching and decoder
//! behaviour.
//!
//! ```toml
//! [api]
//! base_url = "https://admiraltyapi.azure-api.net/uktidalapi/api/V1/Stations/"
//! subscription_key = "..."
//! validate_certificate = false
//! # ca_certificate = "/etc/admiralty/ca.pem"
//! timeout_secs = 30
//!
//! [station]
//! id = "0113"
//! name = "Newlyn"
//! days = 3
//!
//! [cache]
//! enabled = true
//! dir = "/tmp"
//! ttl_minutes = 30
//!
//! [decoder]
//! partial_records = "retain-stale"
//! ```

use crate::decoder::PartialRecordPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Default configuration file, relative to the working directory.
pub const CONFIG_FILE: &str = "tide-config.toml";

/// Environment variable that overrides `api.subscription_key`.
pub const API_KEY_ENV: &str = "ADMIRALTY_API_KEY";

/// Longest forecast horizon the API serves, in days.
pub const MAX_FORECAST_DAYS: u8 = 7;

/// Errors from validating or saving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("forecast horizon must be 1..=7 days, got {0}")]
    Days(u8),

    #[error("station id must not be empty")]
    StationId,

    #[error("certificate validation is enabled but no certificate_sha256 is set")]
    MissingFingerprint,

    #[error("config serialization: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("config IO: {0}")]
    Io(#[from] std::io::Error),
}

/// Application configuration loaded from tide-config.toml
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Admiralty API connection settings
    pub api: ApiConfig,
    /// Tidal station to forecast
    pub station: StationConfig,
    /// On-disk response cache
    pub cache: CacheConfig,
    /// Decoder behaviour
    pub decoder: DecoderConfig,
}

/// Admiralty API connection settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Stations endpoint; the station id and `/TidalEvents` are appended
    pub base_url: String,
    /// Value for the `Ocp-Apim-Subscription-Key` header
    pub subscription_key: String,
    /// Pin the server's leaf certificate to `certificate_sha256`
    pub validate_certificate: bool,
    /// Hex SHA-256 fingerprint of the expected leaf certificate (DER)
    pub certificate_sha256: Option<String>,
    /// Extra PEM root to trust, for private deployments and proxies
    pub ca_certificate: Option<PathBuf>,
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
}

/// Tidal station configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StationConfig {
    /// Admiralty station identifier (e.g. "0113" for Newlyn)
    pub id: String,
    /// Human-readable station name for display
    pub name: String,
    /// Forecast horizon in days (1-7)
    pub days: u8,
}

/// On-disk response cache configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Directory for cached response bodies
    pub dir: PathBuf,
    /// Cache TTL in minutes
    pub ttl_minutes: u64,
}

/// Decoder configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// How records with missing fields are filled
    pub partial_records: PartialRecordPolicy,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: "https://admiraltyapi.azure-api.net/uktidalapi/api/V1/Stations/".to_string(),
            subscription_key: String::new(),
            validate_certificate: false,
            certificate_sha256: None,
            ca_certificate: None,
            timeout_secs: 30,
        }
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        StationConfig {
            id: "0113".to_string(),
            name: "Newlyn".to_string(),
            days: 3,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            dir: PathBuf::from("/tmp"), // cleared on reboot
            ttl_minutes: 30,
        }
    }
}

impl Config {
    /// Read [`CONFIG_FILE`] from the working directory.
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_FILE)
    }

    /// Read `path`, then apply the [`API_KEY_ENV`] override.
    ///
    /// A missing or unparsable file is logged and replaced by
    /// [`Config::default`]; the client can always start.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let mut config = match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!(station = %config.station.name, path = %path.display(), "loaded configuration");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "invalid config file format, using defaults");
                    Self::default()
                }
            },
            Err(_) => {
                info!(path = %path.display(), "no config file found, using defaults");
                Self::default()
            }
        };
        config.apply_env();
        config
    }

    /// Take the subscription key from the environment when it is set.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.api.subscription_key = key.trim().to_string();
            }
        }
    }

    /// Check the values the API and client cannot recover from.
    ///
    /// # Errors
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_FORECAST_DAYS).contains(&self.station.days) {
            return Err(ConfigError::Days(self.station.days));
        }
        if self.station.id.trim().is_empty() {
            return Err(ConfigError::StationId);
        }
        if self.api.validate_certificate && self.api.certificate_sha256.is_none() {
            return Err(ConfigError::MissingFingerprint);
        }
        Ok(())
    }

    /// Save current configuration to `path`
    ///
    /// # Errors
    /// Fails if the configuration cannot be serialized or written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path.as_ref(), contents)?;
        info!(path = %path.as_ref().display(), "configuration saved");
        Ok(())
    }
}
