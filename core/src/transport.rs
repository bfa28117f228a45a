//! The I/O boundary.
//!
//! # Design
//! The engine only ever sees `Transport::send`, which turns an `HttpRequest`
//! into an `HttpResponse` or a `TransportError`. Non-2xx statuses are data,
//! not errors: `UreqTransport` disables ureq's status-as-error behaviour so
//! the engine can classify every response itself.
//!
//! `ScriptedTransport` replays queued replies and records what was sent. It
//! is cheap to clone; clones share the same script, so a test can keep one
//! handle after giving the other to a client.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Sends one request and waits for its response.
pub trait Transport: Send {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Settings applied to every request a transport sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    pub timeout: Duration,
    pub user_agent: String,
    pub keep_alive: bool,
    pub default_headers: Vec<(String, String)>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: format!("rest-core/{}", env!("CARGO_PKG_VERSION")),
            keep_alive: true,
            default_headers: vec![("Accept".to_string(), "application/json".to_string())],
        }
    }
}

/// Blocking transport backed by a `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
    default_headers: Vec<(String, String)>,
}

impl UreqTransport {
    pub fn new(options: TransportOptions) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(options.timeout))
            .user_agent(options.user_agent.as_str())
            .build()
            .new_agent();

        let mut default_headers = options.default_headers;
        if !options.keep_alive {
            default_headers.push(("Connection".to_string(), "close".to_string()));
        }
        Self {
            agent,
            default_headers,
        }
    }

    /// Defaults first, minus any the request overrides, then the request's own.
    fn merged_headers<'a>(&'a self, request: &'a HttpRequest) -> Vec<(&'a str, &'a str)> {
        self.default_headers
            .iter()
            .filter(|(name, _)| request.header(name).is_none())
            .chain(request.headers.iter())
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect()
    }

    fn run<S: ureq::AsSendBody>(
        &self,
        request: ureq::http::Request<S>,
        timeout: Option<Duration>,
    ) -> Result<ureq::http::Response<ureq::Body>, TransportError> {
        let request = match timeout {
            Some(timeout) => self
                .agent
                .configure_request(request)
                .timeout_global(Some(timeout))
                .build(),
            None => request,
        };
        self.agent.run(request).map_err(classify)
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = ureq::http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str());
        for (name, value) in self.merged_headers(request) {
            builder = builder.header(name, value);
        }
        let built = |e: ureq::http::Error| TransportError::Io(e.to_string());
        let mut response = match &request.body {
            Some(body) => self.run(
                builder.body(body.clone().into_bytes()).map_err(built)?,
                request.timeout,
            ),
            None => self.run(builder.body(()).map_err(built)?, request.timeout),
        }?;

        let status = response.status().as_u16();
        let headers = header_pairs(response.headers());
        let body = if request.method == HttpMethod::Head {
            String::new()
        } else {
            response
                .body_mut()
                .read_to_string()
                .map_err(|e| TransportError::Io(e.to_string()))?
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Header values that are not valid UTF-8 are kept, lossily decoded.
fn header_pairs(headers: &ureq::http::HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn classify(err: ureq::Error) -> TransportError {
    match &err {
        ureq::Error::Timeout(_) => TransportError::Timeout,
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            TransportError::Connect(err.to_string())
        }
        ureq::Error::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            TransportError::Connect(err.to_string())
        }
        _ => TransportError::Io(err.to_string()),
    }
}

type Reply = Result<HttpResponse, TransportError>;

#[derive(Default)]
struct Script {
    replies: VecDeque<Reply>,
    fallback: Option<Reply>,
    echo: bool,
    sent: Vec<HttpRequest>,
}

/// In-memory transport that replays scripted replies.
///
/// Queued replies are used first, in order. After that the `always` reply
/// (if set) repeats, then echo mode (if set) answers with the request body.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, response: HttpResponse) -> Self {
        self.script.lock().replies.push_back(Ok(response));
        self
    }

    pub fn fail(self, err: TransportError) -> Self {
        self.script.lock().replies.push_back(Err(err));
        self
    }

    pub fn always(self, reply: Result<HttpResponse, TransportError>) -> Self {
        self.script.lock().fallback = Some(reply);
        self
    }

    /// Answer with status 200, the request body, and the request's content type.
    pub fn echo(self) -> Self {
        self.script.lock().echo = true;
        self
    }

    pub fn sent(&self) -> Vec<HttpRequest> {
        self.script.lock().sent.clone()
    }

    pub fn calls(&self) -> usize {
        self.script.lock().sent.len()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut script = self.script.lock();
        script.sent.push(request.clone());
        if let Some(reply) = script.replies.pop_front() {
            return reply;
        }
        if let Some(reply) = &script.fallback {
            return reply.clone();
        }
        if script.echo {
            let mut response = HttpResponse::new(200, request.body.clone().unwrap_or_default());
            if let Some(ct) = request.header("content-type") {
                response = response.with_header("Content-Type", ct);
            }
            return Ok(response);
        }
        Err(TransportError::Io("no scripted reply left".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_send_json_accept() {
        let options = TransportOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert!(options.user_agent.starts_with("rest-core/"));
        assert!(options.keep_alive);
        assert_eq!(
            options.default_headers,
            vec![("Accept".to_string(), "application/json".to_string())]
        );
    }

    #[test]
    fn disabling_keep_alive_adds_connection_close() {
        let transport = UreqTransport::new(TransportOptions {
            keep_alive: false,
            ..TransportOptions::default()
        });
        let request = HttpRequest::new(HttpMethod::Get, "http://localhost/");
        let headers = transport.merged_headers(&request);
        assert!(headers.contains(&("Connection", "close")));
    }

    #[test]
    fn request_headers_override_defaults() {
        let transport = UreqTransport::new(TransportOptions::default());
        let mut request = HttpRequest::new(HttpMethod::Get, "http://localhost/");
        request.headers.push(("accept".to_string(), "text/csv".to_string()));
        let headers = transport.merged_headers(&request);
        assert_eq!(headers, vec![("accept", "text/csv")]);
    }

    #[test]
    fn non_ascii_header_values_survive() {
        let mut headers = ureq::http::HeaderMap::new();
        headers.insert(
            "content-disposition",
            ureq::http::HeaderValue::from_bytes("attachment; filename=café.txt".as_bytes())
                .unwrap(),
        );
        assert_eq!(
            header_pairs(&headers),
            vec![(
                "content-disposition".to_string(),
                "attachment; filename=café.txt".to_string()
            )]
        );
    }

    #[test]
    fn scripted_replies_run_in_order_then_fallback() {
        let transport = ScriptedTransport::new()
            .reply(HttpResponse::new(500, ""))
            .fail(TransportError::Timeout)
            .always(Ok(HttpResponse::new(204, "")));
        let request = HttpRequest::new(HttpMethod::Get, "http://h/x");

        assert_eq!(transport.send(&request).unwrap().status, 500);
        assert_eq!(transport.send(&request).unwrap_err(), TransportError::Timeout);
        assert_eq!(transport.send(&request).unwrap().status, 204);
        assert_eq!(transport.send(&request).unwrap().status, 204);
        assert_eq!(transport.calls(), 4);
    }

    #[test]
    fn echo_mirrors_body_and_content_type() {
        let transport = ScriptedTransport::new().echo();
        let mut request = HttpRequest::new(HttpMethod::Post, "http://h/echo");
        request.headers.push(("Content-Type".to_string(), "application/json".to_string()));
        request.body = Some("[1,2]".to_string());

        let response = transport.send(&request).unwrap();
        assert_eq!(response.body, "[1,2]");
        assert_eq!(response.content_type(), Some("application/json"));
    }

    #[test]
    fn clones_share_the_script() {
        let transport = ScriptedTransport::new().echo();
        let handle = transport.clone();
        transport
            .send(&HttpRequest::new(HttpMethod::Get, "http://h/"))
            .unwrap();
        assert_eq!(handle.sent().len(), 1);
    }

    #[test]
    fn exhausted_script_is_a_transport_error() {
        let transport = ScriptedTransport::new();
        let err = transport
            .send(&HttpRequest::new(HttpMethod::Get, "http://h/"))
            .unwrap_err();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
