use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Which codec table a numeric code was looked up in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Serializer,
    Compressor,
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecKind::Serializer => f.write_str("serializer"),
            CodecKind::Compressor => f.write_str("compressor"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Unsupported {kind} code: {code}")]
    UnsupportedCodec { kind: CodecKind, code: u8 },

    #[error("Service descriptor has no name")]
    NilService,

    #[error("Unsupported service shape: {0}")]
    UnsupportedServiceShape(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Method not found: {service}.{method}")]
    MethodNotFound { service: String, method: String },

    /// Server side: the call was handed to a background task, write no response.
    #[error("Oneway call dispatched")]
    OnewayDispatched,

    /// Client side: the request was written and no response will be read.
    #[error("Oneway call, no response expected")]
    Oneway,

    /// Error text sent back by the remote method.
    #[error("{0}")]
    Remote(String),

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Call cancelled")]
    Cancelled,

    #[error("Timed out after {0:?} waiting for a pooled connection")]
    PoolTimeout(Duration),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    pub fn codec(err: impl fmt::Display) -> Self {
        Self::Codec(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
