//! Error types.
//!
//! Every configuration problem is fatal at startup. Request handling has no
//! recoverable errors; the only failure on that path is a delay cut short by
//! shutdown.

use std::path::PathBuf;
use thiserror::Error;

/// A configuration problem found while loading or validating the endpoint file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or is not well-formed JSON.
    #[error("cannot read configuration file {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    /// The document does not contain a usable list of endpoint entries.
    #[error("malformed configuration: {reason}")]
    Malformed { reason: String },

    /// A field of an endpoint entry is missing or out of range.
    #[error("endpoint {index}: invalid `{field}`: {reason}")]
    EndpointInvalid {
        index: usize,
        field: &'static str,
        reason: String,
    },

    /// Both `payload_inline` and `payload_file` were given.
    #[error("endpoint {index}: cannot specify both `payload_inline` and `payload_file`")]
    PayloadAmbiguous { index: usize },

    /// Neither `payload_inline` nor `payload_file` was given.
    #[error("endpoint {index}: either `payload_inline` or `payload_file` must be specified")]
    PayloadMissing { index: usize },

    /// The referenced payload file is missing, unreadable or not a JSON object/array.
    #[error("endpoint {index}: payload file {}: {reason}", path.display())]
    PayloadFileError {
        index: usize,
        path: PathBuf,
        reason: String,
    },

    /// The inline payload is a JSON scalar or null.
    #[error("endpoint {index}: payload must be a JSON object or array, got {kind}")]
    PayloadKindInvalid { index: usize, kind: &'static str },

    /// Two entries share the same (method, path) key.
    #[error("endpoint {index}: duplicate of endpoint {first} ({method} {path})")]
    DuplicateEndpoint {
        index: usize,
        first: usize,
        method: String,
        path: String,
    },
}

/// The configured delay was interrupted by a shutdown request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("response delay cancelled by shutdown")]
pub struct DelayCancelled;
