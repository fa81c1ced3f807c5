//! Error taxonomy shared by every layer of the search engine.
//!
//! All variants are `Clone` so that a failure produced inside a scan task or a
//! fetch worker can be handed across a join handle, a channel or a callback
//! without losing its classification.

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T, E = BackendError> = std::result::Result<T, E>;

/// Top-level error delivered to callers of the search engine.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error(transparent)]
    Unexpected(#[from] UnexpectedError),
}

impl From<tokio::task::JoinError> for BackendError {
    fn from(error: tokio::task::JoinError) -> Self {
        if error.is_panic() {
            UnexpectedError::from_panic(error.into_panic()).into()
        } else {
            UnexpectedError::capture(format!("task failed: {}", error)).into()
        }
    }
}

/// Malformed query text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}: {text}")]
pub struct PatternError {
    /// The offending source text (the whole query, or the failed regex).
    pub text: String,
    pub message: String,
}

impl PatternError {
    pub fn new(text: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            message: message.into(),
        }
    }
}

/// A failed network request, keyed by the URL that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} ({url})")]
pub struct FetchError {
    pub url: String,
    pub kind: FetchErrorKind,
}

impl FetchError {
    pub fn status(url: impl Into<String>, code: u16) -> Self {
        Self {
            url: url.into(),
            kind: FetchErrorKind::Status(code),
        }
    }

    pub fn transport(url: impl Into<String>, code: TransportCode) -> Self {
        Self {
            url: url.into(),
            kind: FetchErrorKind::Transport(code),
        }
    }

    pub fn api(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind: FetchErrorKind::Api(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The server answered with a non-success HTTP status.
    Status(u16),
    /// The connection failed before a response was received.
    Transport(TransportCode),
    /// The remote API reported an error inside a well-formed response.
    Api(String),
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchErrorKind::Status(code) => {
                let reason = StatusCode::from_u16(*code)
                    .ok()
                    .and_then(|status| status.canonical_reason())
                    .unwrap_or("");
                write!(f, "[HTTP {}] {}", code, reason)
            }
            FetchErrorKind::Transport(code) => {
                write!(f, "[Errno {}] {}", code.errno(), code.reason())
            }
            FetchErrorKind::Api(message) => f.write_str(message),
        }
    }
}

/// Stable classification of transport failures, numbered like Linux errno.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportCode {
    TimedOut,
    ConnectionRefused,
    ConnectionReset,
    HostUnreachable,
    NameResolution,
    Other,
}

impl TransportCode {
    pub fn errno(self) -> i32 {
        match self {
            TransportCode::TimedOut => 110,
            TransportCode::ConnectionRefused => 111,
            TransportCode::ConnectionReset => 104,
            TransportCode::HostUnreachable => 113,
            TransportCode::NameResolution => -2,
            TransportCode::Other => 5,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            TransportCode::TimedOut => "Connection timed out",
            TransportCode::ConnectionRefused => "Connection refused",
            TransportCode::ConnectionReset => "Connection reset by peer",
            TransportCode::HostUnreachable => "No route to host",
            TransportCode::NameResolution => "Name or service not known",
            TransportCode::Other => "Input/output error",
        }
    }
}

/// The package database could not be opened or enumerated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("database error: {reason}{}", .location.as_deref().map(|l| format!(": {}", l)).unwrap_or_default())]
pub struct DatabaseError {
    /// Path or database name the failure refers to, if any.
    pub location: Option<String>,
    pub reason: String,
}

impl DatabaseError {
    pub fn new(location: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            location,
            reason: reason.into(),
        }
    }
}

/// Any other fault, carried with the backtrace captured where it happened.
#[derive(Debug, Clone, Error)]
#[error("unexpected failure: {message}")]
pub struct UnexpectedError {
    pub message: String,
    pub trace: String,
}

impl UnexpectedError {
    pub fn capture(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            trace: Backtrace::force_capture().to_string(),
        }
    }

    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "panic with non-string payload".to_string()
        };
        Self::capture(message)
    }
}
