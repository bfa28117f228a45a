//! Request execution and retry.
//!
//! # Design
//! One call owns one `ExecutionState`. Each dispatch goes through
//! `ExecutionState::classify`, which decides between success, another
//! attempt, and a terminal failure:
//!
//! - 2xx is success.
//! - 403, 404, 405 and 413 are terminal on the first attempt.
//! - Anything else (including a transport error) is retried until the
//!   attempt count exceeds the retry limit, so a limit of `n` allows `n + 1`
//!   attempts.
//!
//! Retries re-send the identical request immediately; there is no backoff
//! between attempts. Every dispatch overwrites the caller's `Exchange`, so
//! after a call it holds the final attempt.

use crate::error::{ClientError, RequestFailure, TransportError};
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::Transport;

/// Statuses that are never retried.
pub const NON_RETRYABLE_STATUSES: [u16; 4] = [403, 404, 405, 413];

/// What a terminal failure turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Return `Err(ClientError::Request(..))`.
    #[default]
    Raise,
    /// Return `Ok(None)`.
    ReturnEmpty,
}

impl FailurePolicy {
    pub fn from_raise(raise: bool) -> Self {
        if raise {
            FailurePolicy::Raise
        } else {
            FailurePolicy::ReturnEmpty
        }
    }
}

/// The most recent request sent and the response it got, if any.
#[derive(Debug, Clone, Default)]
pub struct Exchange {
    pub request: Option<HttpRequest>,
    pub response: Option<HttpResponse>,
}

/// Result of classifying one dispatch.
#[derive(Debug, PartialEq)]
pub enum Step {
    Success(HttpResponse),
    Retry,
    Terminal,
}

/// Per-call retry bookkeeping.
#[derive(Debug)]
pub struct ExecutionState {
    pub request: HttpRequest,
    pub attempts: u32,
    pub retry_limit: u32,
    pub last_response: Option<HttpResponse>,
    pub last_error: Option<TransportError>,
}

impl ExecutionState {
    pub fn new(request: HttpRequest, retry_limit: u32) -> Self {
        Self {
            request,
            attempts: 0,
            retry_limit,
            last_response: None,
            last_error: None,
        }
    }

    pub fn classify(&mut self, result: Result<HttpResponse, TransportError>) -> Step {
        self.attempts += 1;
        let non_retryable = match result {
            Ok(response) if response.is_success() => return Step::Success(response),
            Ok(response) => {
                let exempt = NON_RETRYABLE_STATUSES.contains(&response.status);
                self.last_response = Some(response);
                self.last_error = None;
                exempt
            }
            Err(err) => {
                self.last_response = None;
                self.last_error = Some(err);
                false
            }
        };
        if non_retryable || self.attempts > self.retry_limit {
            Step::Terminal
        } else {
            Step::Retry
        }
    }

    pub fn into_failure(self, context: &str) -> RequestFailure {
        RequestFailure {
            context: context.to_string(),
            request: self.request,
            response: self.last_response,
            transport_error: self.last_error,
            attempts: self.attempts,
        }
    }

    fn failure_message(&self) -> String {
        match (&self.last_response, &self.last_error) {
            (Some(response), _) => response.status_line(),
            (None, Some(err)) => err.to_string(),
            (None, None) => "no response".to_string(),
        }
    }
}

/// Runs calls against a transport.
pub struct Engine<'a> {
    pub transport: &'a dyn Transport,
    pub policy: FailurePolicy,
    pub context: &'a str,
    pub verbose: bool,
}

impl Engine<'_> {
    /// Send `request` until it succeeds or fails terminally.
    ///
    /// `Ok(None)` is only returned for a terminal failure under
    /// `FailurePolicy::ReturnEmpty`.
    pub fn execute(
        &self,
        exchange: &mut Exchange,
        request: HttpRequest,
        retry_limit: u32,
    ) -> Result<Option<HttpResponse>, ClientError> {
        let mut state = ExecutionState::new(request, retry_limit);
        loop {
            tracing::debug!(
                method = %state.request.method,
                url = %state.request.url,
                attempt = state.attempts + 1,
                "dispatching request"
            );
            if self.verbose {
                tracing::info!(request = ?state.request, "sending");
            }

            let result = self.transport.send(&state.request);
            exchange.request = Some(state.request.clone());
            exchange.response = result.as_ref().ok().cloned();
            if self.verbose {
                tracing::info!(response = ?result, "received");
            }

            match state.classify(result) {
                Step::Success(response) => {
                    tracing::debug!(status = response.status, url = %state.request.url, "request succeeded");
                    return Ok(Some(response));
                }
                Step::Retry => {
                    tracing::warn!(
                        status = state.last_response.as_ref().map(|r| r.status),
                        attempt = state.attempts,
                        retry_limit = state.retry_limit,
                        url = %state.request.url,
                        "request failed, retrying: {}",
                        state.failure_message()
                    );
                }
                Step::Terminal => return self.terminate(state),
            }
        }
    }

    fn terminate(&self, state: ExecutionState) -> Result<Option<HttpResponse>, ClientError> {
        let failure = state.into_failure(self.context);
        tracing::debug!(attempts = failure.attempts, "request failed terminally: {failure}");
        match self.policy {
            FailurePolicy::Raise => Err(failure.into()),
            FailurePolicy::ReturnEmpty => Ok(None),
        }
    }
}
