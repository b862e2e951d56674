//! Configuration module for quarry.
//!
//! Handles session defaults, named connections and environment variables.

mod settings;

pub use settings::{
    expand_env_vars, ConnectionSettings, SessionOptions, SessionSettings, Settings, SettingsError,
};
