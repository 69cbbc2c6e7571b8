//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section has defaults, so a missing file or section still yields a
//! working configuration. Secrets (the dashboard password) are referenced
//! by env-var name in the config and resolved at runtime.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::storage::DEFAULT_CATEGORIES;
use crate::types::CasaError;

/// Env var that overrides `storage.database_url`.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// When set, logs are emitted as JSON lines.
pub const LOG_JSON_ENV: &str = "CASA_LOG_JSON";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub household: HouseholdConfig,
    pub storage: StorageConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HouseholdConfig {
    /// Name seeded for party A on an empty database.
    pub party_a_name: String,
    pub party_b_name: String,
    /// Party A's weight used by quick entry when the note has no split.
    pub default_split_a: f64,
    pub default_categories: Vec<String>,
    /// How many months the month picker offers.
    pub months_listed: usize,
}

impl Default for HouseholdConfig {
    fn default() -> Self {
        Self {
            party_a_name: "Thiago".to_string(),
            party_b_name: "Marina".to_string(),
            default_split_a: 0.5,
            default_categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            months_listed: 12,
        }
    }
}

impl HouseholdConfig {
    pub fn default_split(&self) -> (f64, f64) {
        (self.default_split_a, 1.0 - self.default_split_a)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://casa_split.db".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub host: String,
    pub port: u16,
    /// Name of the env var holding the shared password. Unset disables the gate.
    pub password_env: Option<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
            password_env: Some("CASA_PASSWORD".to_string()),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), CasaError> {
        let h = &self.household;
        if h.party_a_name.trim().is_empty() || h.party_b_name.trim().is_empty() {
            return Err(CasaError::Config("party names must not be empty".into()));
        }
        if h.party_a_name == h.party_b_name {
            return Err(CasaError::Config("the two parties need distinct names".into()));
        }
        if !(0.0..=1.0).contains(&h.default_split_a) {
            return Err(CasaError::Config(format!(
                "default_split_a must be between 0 and 1, got {}",
                h.default_split_a
            )));
        }
        Ok(())
    }

    /// Database URL, with `DATABASE_URL` taking precedence over the file.
    pub fn database_url(&self) -> String {
        std::env::var(DATABASE_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| self.storage.database_url.clone())
    }

    /// Resolve the dashboard password, if one is configured and set.
    pub fn dashboard_password(&self) -> Option<SecretString> {
        let env = self.dashboard.password_env.as_deref()?;
        Self::resolve_env(env)
            .ok()
            .filter(|p| !p.is_empty())
            .map(SecretString::new)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
