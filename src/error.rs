//! Top-level error type for inspector setup and host-facing operations.

use thiserror::Error;

use crate::codec::CodecError;
use crate::transport::TransportError;

/// Error type for inspector installation and import/export.
///
/// Only configuration problems are fatal; everything on the relay path is
/// recovered locally and at worst logged.
#[derive(Debug, Error)]
pub enum InspectorError {
    /// Invalid configuration, rejected at install time.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A filter list entry is not a valid pattern.
    #[error("invalid filter pattern: {0}")]
    Filter(#[from] regex::Error),

    /// The transport collaborator failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}
