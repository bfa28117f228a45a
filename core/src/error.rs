//! Error types for the service client.
//!
//! # Design
//! `InvalidArgument` is raised before anything is sent and is never retried.
//! A call that exhausts its retry budget (or hits a non-retryable status)
//! surfaces as `Request`, boxing a `RequestFailure` that keeps the request,
//! the final response when there was one, and the attempt count, so callers
//! can inspect exactly what went over the wire.

use std::fmt;
use std::path::PathBuf;

use crate::http::{HttpRequest, HttpResponse};

/// Errors returned by the client, engine, and registry.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A required input was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The call reached a terminal failure.
    #[error(transparent)]
    Request(Box<RequestFailure>),

    /// A structured payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No configuration record exists for the service name.
    #[error("unknown service: {0}")]
    UnknownService(String),
}

impl ClientError {
    /// The terminal failure, if this error is one.
    pub fn as_request_failure(&self) -> Option<&RequestFailure> {
        match self {
            ClientError::Request(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<RequestFailure> for ClientError {
    fn from(failure: RequestFailure) -> Self {
        ClientError::Request(Box::new(failure))
    }
}

/// Dispatch failed before any response arrived.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Io(String),
}

/// Terminal outcome of a call chain.
///
/// `response` is `None` when the last attempt never got a response, in
/// which case `transport_error` says why.
#[derive(Debug, Clone)]
pub struct RequestFailure {
    pub context: String,
    pub request: HttpRequest,
    pub response: Option<HttpResponse>,
    pub transport_error: Option<TransportError>,
    pub attempts: u32,
}

impl RequestFailure {
    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.attempts == 1 { "" } else { "s" };
        write!(
            f,
            "{}: {} {} failed after {} attempt{plural}: ",
            self.context, self.request.method, self.request.url, self.attempts
        )?;
        match (&self.response, &self.transport_error) {
            (Some(response), _) => f.write_str(&response.status_line()),
            (None, Some(err)) => write!(f, "{err}"),
            (None, None) => f.write_str("no response"),
        }
    }
}

impl std::error::Error for RequestFailure {}

/// Errors raised while loading service configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to fetch configuration: {0}")]
    Fetch(String),

    #[error("invalid configuration for {service}: {reason}")]
    Invalid { service: String, reason: String },
}
