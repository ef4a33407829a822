use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a transient failure happened. All of these are worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientKind {
    Timeout,
    RateLimited,
    Server,
    Network,
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransientKind::Timeout => write!(f, "timeout"),
            TransientKind::RateLimited => write!(f, "rate-limit"),
            TransientKind::Server => write!(f, "server"),
            TransientKind::Network => write!(f, "network"),
        }
    }
}

/// Errors a generation provider may report. Implementations must classify
/// every failure; the router never sees raw transport errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("transient {kind} error: {message}")]
    Transient {
        kind: TransientKind,
        message: String,
    },

    #[error("terminal error: {message}")]
    Terminal { message: String },
}

impl ProviderError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::transient(TransientKind::Timeout, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::transient(TransientKind::RateLimited, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::transient(TransientKind::Server, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::transient(TransientKind::Network, message)
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal {
            message: message.into(),
        }
    }

    fn transient(kind: TransientKind, message: impl Into<String>) -> Self {
        Self::Transient {
            kind,
            message: message.into(),
        }
    }

    /// Classifies an HTTP-style status code returned by a provider backend.
    ///
    /// 408 and 429 plus the whole 5xx range are transient; anything else
    /// (bad request, auth, content policy) is terminal.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            408 => Self::timeout(message),
            429 => Self::rate_limited(message),
            500..=599 => Self::server(message),
            _ => Self::terminal(message),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient { .. })
    }
}

/// Errors from the content (research) source port.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("content source unavailable: {0}")]
    Unavailable(String),

    #[error("content source rejected the request: {0}")]
    Invalid(String),
}
