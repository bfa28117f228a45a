//! Blocking client for RESTful JSON services addressed by name.
//!
//! # Overview
//! A `ServiceClient` turns a verb call (path, parameters, headers, content)
//! into an `HttpRequest`, dispatches it through a `Transport` with bounded
//! retry, and decodes the final response. A `Registry` maps service names to
//! clients built from a `ConfigStore`.
//!
//! # Design
//! - Requests and responses are plain data (`http`); only `Transport`
//!   touches the network, so everything above it is deterministic.
//! - `url_builder`, `encode` and `decode` are pure functions.
//! - `engine` holds the retry state machine. 403, 404, 405 and 413 are
//!   never retried; other failures are retried up to the retry limit.
//! - Terminal failures are `Err(ClientError::Request(..))` by default, or
//!   `Ok(None)` under `FailurePolicy::ReturnEmpty`.

pub mod client;
pub mod config;
pub mod decode;
pub mod encode;
pub mod engine;
pub mod error;
pub mod http;
pub mod params;
pub mod registry;
pub mod transport;
pub mod url_builder;

pub use client::{CallOptions, RequestSpec, ServiceClient};
pub use config::{AuthConfig, ClientConfig, ConfigStore, RemoteConfigSource, ServiceConfigs};
pub use decode::Processed;
pub use encode::ContentType;
pub use engine::{FailurePolicy, NON_RETRYABLE_STATUSES};
pub use error::{ClientError, ConfigError, RequestFailure, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use params::{Content, Params};
pub use registry::{configure, set_raise_on_failure, with_service, Registry, SharedClient};
pub use transport::{ScriptedTransport, Transport, TransportOptions, UreqTransport};
