use std::io;
use thiserror::Error;

/// Errors produced by the typed value accessors.
///
/// A missing key and an unparseable value are distinct failures: handlers
/// often want to fall back on the former and reject the request on the
/// latter.
#[derive(Error, Debug)]
pub enum ValueError {
    #[error("{key} not found")]
    NotFound { key: String },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl ValueError {
    pub(crate) fn not_found<S: ToString>(key: S) -> Self {
        Self::NotFound { key: key.to_string() }
    }

    pub(crate) fn invalid<S: ToString, R: ToString>(key: S, reason: R) -> Self {
        Self::Invalid { key: key.to_string(), reason: reason.to_string() }
    }
}

#[derive(Error, Debug)]
pub enum ResponseError {
    /// The response has already been flushed (or terminated by a redirect
    /// or a timeout); the write was discarded.
    #[error("response already closed")]
    Closed,

    #[error("serialize error: {source}")]
    Serialize {
        #[from]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("invalid listen address: {addr}")]
    InvalidAddress { addr: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ServeError {
    pub(crate) fn invalid_address<S: ToString>(addr: S) -> Self {
        Self::InvalidAddress { addr: addr.to_string() }
    }
}
