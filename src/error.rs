//! Per-module error taxonomy, aggregated at the binary boundary.
//!
//! Mirrors the wire crate's `CodecError`: each subsystem gets its own
//! `thiserror`-derived enum rather than a single catch-all, and `BrokerError`
//! stitches them together with `#[from]` conversions.

use broker_wire::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("channel name {0:?} is already registered")]
    RegisterFail(String),

    #[error("no channel named {0:?}")]
    UnknownChannel(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read { path: String, #[source] source: std::io::Error },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse { path: String, #[source] source: toml::de::Error },

    #[error("config field {0} is required but missing")]
    MissingField(&'static str),

    #[error("config field listen.kind must be \"tcp\" or \"unix\", got {0:?}")]
    InvalidListenKind(String),
}

/// Top-level error type the binary entrypoint deals in.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
