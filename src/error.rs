//! Error taxonomy for the face and its companion link.
//!
//! None of these ever escape the engine: they are logged where they occur and
//! the worst visible outcome is stale or missing weather on the face.

use std::path::PathBuf;

use thiserror::Error;

/// A weather update payload could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("missing key `{0}`")]
    MissingKey(&'static str),
    #[error("key `{0}` is not an integer")]
    NotAnInteger(&'static str),
    #[error("key `{key}` out of range: {value}")]
    OutOfRange { key: &'static str, value: i64 },
}

/// A data item could not be handed to the companion link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("companion link is not connected")]
    NotConnected,
    #[error("companion link closed")]
    Closed,
    #[error("send failed: {0}")]
    Send(String),
}

/// The face configuration file could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid face config: {0}")]
    Parse(#[from] toml::de::Error),
}
