//! Broker configuration loading.
//!
//! TOML is the sole config source. Default config path:
//! `/etc/rusty-broker/broker.toml`. Two-pass deserialization: [`RawConfig`]
//! accepts every field as `Option` so TOML errors are reported as "missing
//! field" rather than a generic parse failure, then [`load_config_from_str`]
//! validates and fills in defaults to produce [`BrokerConfig`].
//!
//! # Required fields
//! - `schema_version = 1`
//! - `listen.kind` (`"tcp"` or `"unix"`)
//! - `listen.address`

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/rusty-broker/broker.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenKind {
    Tcp,
    Unix,
}

#[derive(Debug, Clone)]
pub struct ListenConfig {
    pub kind: ListenKind,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub schema_version: u32,
    pub listen: ListenConfig,
    pub log_level: String,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    listen: Option<RawListenConfig>,
    log_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawListenConfig {
    kind: Option<String>,
    address: Option<String>,
}

/// Load broker config from the default path.
pub fn load_config() -> Result<BrokerConfig, ConfigError> {
    load_config_from_path(Path::new(DEFAULT_CONFIG_PATH))
}

pub fn load_config_from_path(path: &Path) -> Result<BrokerConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    load_config_from_str(&toml_str, path)
}

fn load_config_from_str(toml_str: &str, path: &Path) -> Result<BrokerConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    let schema_version = raw.schema_version.ok_or(ConfigError::MissingField("schema_version"))?;

    let raw_listen = raw.listen.ok_or(ConfigError::MissingField("listen"))?;
    let kind_str = raw_listen.kind.ok_or(ConfigError::MissingField("listen.kind"))?;
    let kind = match kind_str.as_str() {
        "tcp" => ListenKind::Tcp,
        "unix" => ListenKind::Unix,
        other => return Err(ConfigError::InvalidListenKind(other.to_owned())),
    };
    let address = raw_listen.address.ok_or(ConfigError::MissingField("listen.address"))?;

    let log_level = raw.log_level.unwrap_or_else(|| "info".to_owned());

    Ok(BrokerConfig { schema_version, listen: ListenConfig { kind, address }, log_level })
}
