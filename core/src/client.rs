//! Verb-shaped client for one named service.
//!
//! # Design
//! `ServiceClient` owns its `ClientConfig`, a transport built on first use,
//! and the last request/response pair. Every calling method takes
//! `&mut self`: a client serves one call at a time, and the last-exchange
//! fields always describe the call that just finished. Give each thread its
//! own client (or wrap one in a mutex) for concurrent use.
//!
//! `get`, `post`, `delete` and `head` return the decoded body. `put` returns
//! the raw response.

use std::time::Duration;

use crate::config::ClientConfig;
use crate::decode::{self, Processed};
use crate::encode;
use crate::engine::{Engine, Exchange, FailurePolicy};
use crate::error::ClientError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::params::{Content, Params};
use crate::transport::{Transport, UreqTransport};
use crate::url_builder;

/// Optional inputs to a call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub params: Params,
    pub headers: Params,
    pub content: Option<Content>,
    pub content_type: Option<String>,
    pub timeout: Option<Duration>,
    /// Overrides the configured retry limit.
    pub retry: Option<u32>,
    /// Prefix for failure summaries; defaults to the service name.
    pub context: Option<String>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(mut self, params: impl Into<Params>) -> Self {
        self.params = params.into();
        self
    }

    pub fn headers(mut self, headers: impl Into<Params>) -> Self {
        self.headers = headers.into();
        self
    }

    pub fn content(mut self, content: impl Into<Content>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Structured JSON body with a JSON content type.
    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.content = Some(Content::Json(value));
        self.content_type = Some(encode::JSON.to_string());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// One logical call: method, path, and options.
#[derive(Debug, Clone, Default)]
pub struct RequestSpec {
    pub method: Option<HttpMethod>,
    pub path: String,
    pub options: CallOptions,
}

impl RequestSpec {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method: Some(method),
            path: path.into(),
            options: CallOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }
}

/// Client for a single service.
pub struct ServiceClient {
    name: String,
    config: ClientConfig,
    policy: FailurePolicy,
    transport: Option<Box<dyn Transport>>,
    exchange: Exchange,
}

impl ServiceClient {
    pub fn new(name: impl Into<String>, config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let policy = config
            .raise_on_failure
            .map(FailurePolicy::from_raise)
            .unwrap_or_default();
        Ok(Self {
            name: name.into(),
            config,
            policy,
            transport: None,
            exchange: Exchange::default(),
        })
    }

    /// Use `transport` instead of building a `UreqTransport` on first call.
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn set_failure_policy(&mut self, policy: FailurePolicy) {
        self.policy = policy;
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn last_request(&self) -> Option<&HttpRequest> {
        self.exchange.request.as_ref()
    }

    /// `None` after a call whose last attempt got no response.
    pub fn last_response(&self) -> Option<&HttpResponse> {
        self.exchange.response.as_ref()
    }

    pub fn head(&mut self, path: &str, options: CallOptions) -> Result<Option<Processed>, ClientError> {
        self.verb(HttpMethod::Head, path, options)
    }

    pub fn get(&mut self, path: &str, options: CallOptions) -> Result<Option<Processed>, ClientError> {
        self.verb(HttpMethod::Get, path, options)
    }

    pub fn post(&mut self, path: &str, options: CallOptions) -> Result<Option<Processed>, ClientError> {
        self.verb(HttpMethod::Post, path, options)
    }

    pub fn delete(&mut self, path: &str, options: CallOptions) -> Result<Option<Processed>, ClientError> {
        self.verb(HttpMethod::Delete, path, options)
    }

    pub fn put(&mut self, path: &str, options: CallOptions) -> Result<Option<HttpResponse>, ClientError> {
        self.get_response(RequestSpec::new(HttpMethod::Put, path).with_options(options))
    }

    fn verb(
        &mut self,
        method: HttpMethod,
        path: &str,
        options: CallOptions,
    ) -> Result<Option<Processed>, ClientError> {
        self.get_processed_response(RequestSpec::new(method, path).with_options(options))
    }

    /// Run `spec` and decode the final response.
    pub fn get_processed_response(
        &mut self,
        spec: RequestSpec,
    ) -> Result<Option<Processed>, ClientError> {
        let response = self.get_response(spec)?;
        Ok(response.as_ref().and_then(|r| decode::decode(Some(r))))
    }

    /// Run `spec` and return the final response as received.
    pub fn get_response(&mut self, spec: RequestSpec) -> Result<Option<HttpResponse>, ClientError> {
        let retry = spec.options.retry.unwrap_or(self.config.retry_limit);
        let context = spec
            .options
            .context
            .clone()
            .unwrap_or_else(|| self.name.clone());
        let request = self.build_request(spec)?;

        let (name, config) = (&self.name, &self.config);
        let transport: &dyn Transport = &**self.transport.get_or_insert_with(|| {
            tracing::debug!(service = %name, "building transport");
            Box::new(UreqTransport::new(config.transport_options())) as Box<dyn Transport>
        });
        let engine = Engine {
            transport,
            policy: self.policy,
            context: &context,
            verbose: self.config.verbose,
        };
        engine.execute(&mut self.exchange, request, retry)
    }

    /// Build the request `spec` describes without sending it.
    pub fn build_request(&self, spec: RequestSpec) -> Result<HttpRequest, ClientError> {
        let method = spec
            .method
            .ok_or_else(|| ClientError::InvalidArgument("method is required".to_string()))?;
        if spec.path.is_empty() {
            return Err(ClientError::InvalidArgument("path is required".to_string()));
        }
        let options = spec.options;
        let url = url_builder::build_url(&self.config.base_url()?, &spec.path, options.params)?;

        let mut request = HttpRequest::new(method, url);
        request.headers = options
            .headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        if let Some(encoded) =
            encode::encode(options.content.as_ref(), options.content_type.as_deref())?
        {
            request
                .headers
                .retain(|(k, _)| !k.eq_ignore_ascii_case("content-type"));
            request
                .headers
                .push(("Content-Type".to_string(), encoded.content_type));
            request.body = Some(encoded.body);
        }
        request.timeout = options.timeout;
        check_sendable(&request)?;
        Ok(request)
    }
}

/// Reject a request no transport could put on the wire: the URL must be an
/// absolute URI and every header must be a legal name/value pair.
fn check_sendable(request: &HttpRequest) -> Result<(), ClientError> {
    let invalid = |what: String| ClientError::InvalidArgument(what);
    let uri = ureq::http::Uri::try_from(request.url.as_str())
        .map_err(|e| invalid(format!("invalid url {:?}: {e}", request.url)))?;
    if uri.scheme().is_none() || uri.host().is_none() {
        return Err(invalid(format!("url {:?} is not absolute", request.url)));
    }
    for (name, value) in &request.headers {
        ureq::http::HeaderName::try_from(name.as_str())
            .map_err(|e| invalid(format!("invalid header name {name:?}: {e}")))?;
        ureq::http::HeaderValue::try_from(value.as_str())
            .map_err(|e| invalid(format!("invalid value for header {name}: {e}")))?;
    }
    Ok(())
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("transport_ready", &self.transport.is_some())
            .finish()
    }
}
