//! Errors surfaced outside the UDS response path.
//!
//! The dispatcher itself never returns a `Result` — every recognized failure is
//! encoded in-band as a negative response frame. `ConfigError` covers the one
//! place an `Err` is the right shape: loading a simulator configuration file
//! before the server exists at all.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid hex string: {0}")]
    InvalidHex(String),
}
