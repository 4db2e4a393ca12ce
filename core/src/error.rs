//! Error types for the API client core.
//!
//! # Design
//! Two error families share one enum. `Transport` and `Api` describe runtime
//! conditions of a single call and are the only variants routed through the
//! connection's raise/capture switch. Everything else (`Configuration`,
//! `Shape`, `UnresolvedType`, `Contract`, `Field`) signals a programming or
//! setup defect and is always returned to the caller.

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the connection and mapping layers.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid setup: unknown format, empty base URL.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The HTTP round-trip itself failed (DNS, connect, timeout).
    #[error("transport error on {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },

    /// The response decoded to nothing, or carried the status field.
    #[error("api error [{}]: {message}", display_code(.code))]
    Api {
        code: Option<Value>,
        message: String,
        error_type: Option<String>,
        url: String,
    },

    /// A collection was expected but the payload was scalar text.
    #[error("unexpected response shape: {0}")]
    Shape(String),

    /// No constructor is registered under the resolved type name.
    #[error("undefined mapper type {name}")]
    UnresolvedType { name: String },

    /// The resolved mapper is not the type the caller asked for.
    #[error("mapper {resolved} is not a {expected}")]
    Contract {
        resolved: String,
        expected: &'static str,
    },

    /// A raw value could not be coerced into a mapper field.
    #[error("cannot assign field {field}: {source}")]
    Field {
        field: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Coarse classification of an [`Error`], used for logging and by callers
/// that only need to branch on the family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Transport,
    Api,
    Shape,
    UnresolvedType,
    Contract,
    Field,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Transport => "transport",
            ErrorKind::Api => "api",
            ErrorKind::Shape => "shape",
            ErrorKind::UnresolvedType => "unresolved_type",
            ErrorKind::Contract => "contract",
            ErrorKind::Field => "field",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Api { .. } => ErrorKind::Api,
            Error::Shape(_) => ErrorKind::Shape,
            Error::UnresolvedType { .. } => ErrorKind::UnresolvedType,
            Error::Contract { .. } => ErrorKind::Contract,
            Error::Field { .. } => ErrorKind::Field,
        }
    }

    /// Error code reported by the API (status field value) or, for
    /// transport failures, the transport error kind name.
    pub fn code(&self) -> Option<Value> {
        match self {
            Error::Transport { source, .. } => Some(Value::String(source.kind.as_str().to_string())),
            Error::Api { code, .. } => code.clone(),
            _ => None,
        }
    }

    /// Request URL the error was produced for, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            Error::Transport { url, .. } | Error::Api { url, .. } => Some(url),
            _ => None,
        }
    }

    /// Whether this error is subject to the raise/capture switch.
    pub fn is_call_failure(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::Api { .. })
    }
}

fn display_code(code: &Option<Value>) -> String {
    match code {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "null".to_string(),
    }
}

/// Failure reported by a [`crate::Transport`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request did not complete within the configured timeout.
    Timeout,
    /// Host name resolution failed.
    Dns,
    /// The TCP/TLS connection could not be established.
    Connect,
    Io,
    Other,
}

impl TransportErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Dns => "dns",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Io => "io",
            TransportErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn api_error_display_includes_code_and_message() {
        let err = Error::Api {
            code: Some(json!(404)),
            message: "not found".to_string(),
            error_type: None,
            url: "http://api/v1/x".to_string(),
        };
        assert_eq!(err.to_string(), "api error [404]: not found");
        assert_eq!(err.code(), Some(json!(404)));
        assert_eq!(err.kind(), ErrorKind::Api);
        assert!(err.is_call_failure());
    }

    #[test]
    fn api_error_without_code_displays_null() {
        let err = Error::Api {
            code: None,
            message: "empty".to_string(),
            error_type: None,
            url: String::new(),
        };
        assert_eq!(err.to_string(), "api error [null]: empty");
    }

    #[test]
    fn transport_error_code_is_kind_name() {
        let err = Error::Transport {
            url: "http://nowhere".to_string(),
            source: TransportError::new(TransportErrorKind::Dns, "no such host"),
        };
        assert_eq!(err.code(), Some(json!("dns")));
        assert_eq!(err.url(), Some("http://nowhere"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn mapping_errors_are_not_call_failures() {
        let err = Error::UnresolvedType {
            name: "zoo::Cat".to_string(),
        };
        assert!(!err.is_call_failure());
        assert_eq!(err.code(), None);
        assert!(!Error::Shape("x".into()).is_call_failure());
        assert!(!Error::Configuration("x".into()).is_call_failure());
    }
}
