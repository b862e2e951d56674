//! TOML-based configuration for quarry.
//!
//! Supports a config file (quarry.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [session]
//! dialect = "sqlite"
//! batch_size = 20
//! timeout_secs = 30
//! parameterize = true
//!
//! [connections.default]
//! driver = "sqlite"
//! connection_string = "${APP_DB}"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sql::Dialect;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Defaults applied to every session.
    pub session: SessionSettings,

    /// Named database connections.
    pub connections: HashMap<String, ConnectionSettings>,
}

/// Session defaults as written in the config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionSettings {
    /// SQL dialect: tsql, mysql, postgres or sqlite.
    pub dialect: String,

    /// Commands sent per round trip.
    pub batch_size: usize,

    /// Command timeout in seconds; 0 disables.
    pub timeout_secs: u64,

    /// Bind literals as parameters instead of inlining them.
    pub parameterize: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            dialect: "tsql".to_string(),
            batch_size: 20,
            timeout_secs: 30,
            parameterize: true,
        }
    }
}

impl SessionSettings {
    /// Validate and convert into the options sessions consume.
    pub fn to_options(&self) -> Result<SessionOptions, SettingsError> {
        let dialect = self
            .dialect
            .parse::<Dialect>()
            .map_err(SettingsError::UnsupportedDialect)?;
        if self.batch_size == 0 {
            return Err(SettingsError::InvalidConfig(
                "session.batch_size must be at least 1".into(),
            ));
        }
        Ok(SessionOptions {
            dialect,
            batch_size: self.batch_size,
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
            parameterize: self.parameterize,
        })
    }
}

/// Resolved options for a session and the commands it compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub dialect: Dialect,
    pub batch_size: usize,
    /// Passed to the provider with every command.
    pub timeout: Option<Duration>,
    pub parameterize: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            batch_size: 20,
            timeout: Some(Duration::from_secs(30)),
            parameterize: true,
        }
    }
}

impl SessionOptions {
    /// Default options for a dialect.
    pub fn for_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_parameterize(mut self, parameterize: bool) -> Self {
        self.parameterize = parameterize;
        self
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionSettings {
    /// Database driver (tsql, mysql, postgres, sqlite).
    pub driver: String,

    /// Connection string (supports ${ENV_VAR} expansion).
    pub connection_string: String,

    /// Default schema for this connection.
    #[serde(default)]
    pub default_schema: Option<String>,
}

impl ConnectionSettings {
    /// The dialect spoken by this connection's driver.
    pub fn dialect(&self) -> Result<Dialect, SettingsError> {
        self.driver
            .parse::<Dialect>()
            .map_err(SettingsError::UnsupportedDialect)
    }

    /// Get the connection string with environment variables expanded.
    pub fn resolved_connection_string(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.connection_string)
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `QUARRY_CONFIG`
    /// 2. `./quarry.toml`
    /// 3. `<config dir>/quarry/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("QUARRY_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("quarry.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("quarry").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Get a connection by name.
    pub fn get_connection(&self, name: &str) -> Result<&ConnectionSettings, SettingsError> {
        self.connections
            .get(name)
            .ok_or_else(|| SettingsError::ConnectionNotFound(name.to_string()))
    }

    /// Get the default connection (first one defined, or "default" if it exists).
    pub fn default_connection(&self) -> Option<(&str, &ConnectionSettings)> {
        if let Some(conn) = self.connections.get("default") {
            return Some(("default", conn));
        }
        self.connections.iter().next().map(|(k, v)| (k.as_str(), v))
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        if chars.peek() == Some(&'{') {
            chars.next();
            let mut var_name = String::new();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
            let value =
                env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
            result.push_str(&value);
        } else {
            // $VAR (ends at non-alphanumeric/underscore)
            let mut var_name = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' {
                    var_name.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            if var_name.is_empty() {
                result.push('$');
            } else {
                let value = env::var(&var_name)
                    .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                result.push_str(&value);
            }
        }
    }

    Ok(result)
}
