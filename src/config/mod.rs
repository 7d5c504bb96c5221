//! Configuration management
//!
//! This module handles loading and parsing configuration for the schema tool.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults, so running the
//! tool without any config file targets a local MongoDB server.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Service account seeded by `ensure-schema`
    #[serde(default)]
    pub account: AccountConfig,
    /// Parameters of the group-members diagnostic query
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    /// Index cleanup configuration
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Store driver (mongodb or memory)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Connection URI
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Name of the application database
    #[serde(default = "default_database_name")]
    pub name: String,
    /// Connection and server selection timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
            name: default_database_name(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_database_url() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database_name() -> String {
    "e_cam_service".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

/// Store driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// MongoDB server (default)
    #[default]
    Mongodb,
    /// In-process store, nothing is persisted
    Memory,
}

/// Service account configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default = "default_account_username")]
    pub username: String,
    #[serde(default = "default_account_password")]
    pub password: String,
    /// Built-in role granted on the application database
    #[serde(default = "default_account_role")]
    pub role: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            username: default_account_username(),
            password: default_account_password(),
            role: default_account_role(),
        }
    }
}

fn default_account_username() -> String {
    "e_cam_user".to_string()
}

fn default_account_password() -> String {
    "e_cam_password".to_string()
}

fn default_account_role() -> String {
    "readWrite".to_string()
}

/// Diagnostic query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// Permission group looked up by the report
    #[serde(default = "default_group_id")]
    pub group_id: i64,
    /// Tenant the lookup is scoped to
    #[serde(default = "default_tenant_id")]
    pub tenant_id: String,
    /// Maximum number of sample records printed
    #[serde(default = "default_sample_limit")]
    pub sample_limit: i64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            group_id: default_group_id(),
            tenant_id: default_tenant_id(),
            sample_limit: default_sample_limit(),
        }
    }
}

fn default_group_id() -> i64 {
    1
}

fn default_tenant_id() -> String {
    "tenant-001".to_string()
}

fn default_sample_limit() -> i64 {
    5
}

/// Index cleanup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Collections whose secondary indexes are dropped by `drop-indexes`
    #[serde(default = "default_cleanup_collections")]
    pub collections: Vec<String>,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            collections: default_cleanup_collections(),
        }
    }
}

fn default_cleanup_collections() -> Vec<String> {
    [
        "cloud_iam_users",
        "cloud_permission_groups",
        "cloud_sync_tasks",
        "cloud_audit_logs",
        "cloud_policy_templates",
        "tenants",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - ECAM_DATABASE_DRIVER
    /// - ECAM_DATABASE_URL
    /// - ECAM_DATABASE_NAME
    /// - ECAM_DATABASE_CONNECT_TIMEOUT_SECS
    /// - ECAM_ACCOUNT_USERNAME
    /// - ECAM_ACCOUNT_PASSWORD
    /// - ECAM_ACCOUNT_ROLE
    /// - ECAM_DIAGNOSTICS_GROUP_ID
    /// - ECAM_DIAGNOSTICS_TENANT_ID
    /// - ECAM_DIAGNOSTICS_SAMPLE_LIMIT
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values no command can work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.name must not be empty".to_string(),
            ));
        }
        if self.account.username.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "account.username must not be empty".to_string(),
            ));
        }
        if self.database.connect_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "database.connect_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.diagnostics.sample_limit <= 0 {
            return Err(ConfigError::ValidationError(format!(
                "diagnostics.sample_limit must be positive, got {}",
                self.diagnostics.sample_limit
            )));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(driver) = std::env::var("ECAM_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "mongodb" => self.database.driver = DatabaseDriver::Mongodb,
                "memory" => self.database.driver = DatabaseDriver::Memory,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("ECAM_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(name) = std::env::var("ECAM_DATABASE_NAME") {
            self.database.name = name;
        }
        if let Ok(timeout) = std::env::var("ECAM_DATABASE_CONNECT_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                self.database.connect_timeout_secs = timeout;
            }
        }

        if let Ok(username) = std::env::var("ECAM_ACCOUNT_USERNAME") {
            self.account.username = username;
        }
        if let Ok(password) = std::env::var("ECAM_ACCOUNT_PASSWORD") {
            self.account.password = password;
        }
        if let Ok(role) = std::env::var("ECAM_ACCOUNT_ROLE") {
            self.account.role = role;
        }

        if let Ok(group_id) = std::env::var("ECAM_DIAGNOSTICS_GROUP_ID") {
            if let Ok(group_id) = group_id.parse::<i64>() {
                self.diagnostics.group_id = group_id;
            }
        }
        if let Ok(tenant_id) = std::env::var("ECAM_DIAGNOSTICS_TENANT_ID") {
            self.diagnostics.tenant_id = tenant_id;
        }
        if let Ok(limit) = std::env::var("ECAM_DIAGNOSTICS_SAMPLE_LIMIT") {
            if let Ok(limit) = limit.parse::<i64>() {
                self.diagnostics.sample_limit = limit;
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_VARS: &[&str] = &[
    "ECAM_DATABASE_DRIVER",
    "ECAM_DATABASE_URL",
    "ECAM_DATABASE_NAME",
    "ECAM_DATABASE_CONNECT_TIMEOUT_SECS",
    "ECAM_ACCOUNT_USERNAME",
    "ECAM_ACCOUNT_PASSWORD",
    "ECAM_ACCOUNT_ROLE",
    "ECAM_DIAGNOSTICS_GROUP_ID",
    "ECAM_DIAGNOSTICS_TENANT_ID",
    "ECAM_DIAGNOSTICS_SAMPLE_LIMIT",
];

#[cfg(test)]
fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}
