//! Error taxonomy shared by every bridge crate.
//!
//! Nothing in the bridge recovers locally: each variant is fatal to the
//! current crossing and travels up to `main`, which terminates the process.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while performing a bridge crossing.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Malformed base64, UTF-8 or UTF-16 text.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Decryption failure, unparseable identity or recipient text.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// The custodian key service or the job service call failed.
    #[error("Remote service error ({service}): {message}")]
    RemoteService { service: String, message: String },

    /// Framed message malformed, agent exit code out of contract,
    /// missing or invalid exported job variable.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Job polling ceiling exceeded.
    #[error("Timed out after {}s: {message}", .elapsed.as_secs())]
    Timeout { elapsed: Duration, message: String },

    /// Required configuration missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl BridgeError {
    pub fn remote(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteService {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Short machine-friendly kind, used in audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Encoding(_) => "encoding",
            Self::Crypto(_) => "crypto",
            Self::RemoteService { .. } => "remote_service",
            Self::Protocol(_) => "protocol",
            Self::Timeout { .. } => "timeout",
            Self::Config(_) => "config",
            Self::Io { .. } => "io",
        }
    }
}

impl From<base64::DecodeError> for BridgeError {
    fn from(e: base64::DecodeError) -> Self {
        Self::Encoding(format!("invalid base64: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
