use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{LastFailure, Result, ZpError};
use crate::relay::envelope::RequestEnvelope;

/// Statuses retried by default: rate limiting and transient server errors.
pub const DEFAULT_RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart {
        fields: Vec<(String, String)>,
        file: Upload,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub body: RequestBody,
    /// Whether to attach the bearer token.
    pub authorized: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|value| value.contains("json"))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Result<Value> {
        serde_json::from_slice(&self.body)
    }
}

/// Failure before any HTTP status was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    Timeout(String),
    Connect(String),
    Other(String),
}

impl TransportFailure {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connect(_))
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(message) => write!(f, "timeout: {message}"),
            Self::Connect(message) => write!(f, "connection error: {message}"),
            Self::Other(message) => f.write_str(message),
        }
    }
}

/// One raw HTTP exchange, without retries.
pub trait HttpTransport: Send + Sync {
    fn execute(&self, request: &OutboundRequest) -> Result<RawResponse, TransportFailure>;
}

/// Blocking `reqwest` transport with bearer authentication.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    api_key: String,
}

impl ReqwestTransport {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ZpError::InvalidInput(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }

    fn prepare(&self, request: &OutboundRequest) -> Result<RequestBuilder, TransportFailure> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        if request.authorized {
            builder = builder.bearer_auth(&self.api_key);
        }

        let builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart { fields, file } => {
                let mut form = Form::new();
                for (name, value) in fields {
                    form = form.text(name.clone(), value.clone());
                }
                let part = Part::bytes(file.bytes.clone())
                    .file_name(file.file_name.clone())
                    .mime_str(&file.mime)
                    .map_err(|err| TransportFailure::Other(err.to_string()))?;
                builder.multipart(form.part(file.field.clone(), part))
            }
        };
        Ok(builder)
    }
}

impl HttpTransport for ReqwestTransport {
    fn execute(&self, request: &OutboundRequest) -> Result<RawResponse, TransportFailure> {
        let response = self.prepare(request)?.send().map_err(classify)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().map_err(classify)?.to_vec();
        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }
}

fn classify(err: reqwest::Error) -> TransportFailure {
    if err.is_timeout() {
        TransportFailure::Timeout(err.to_string())
    } else if err.is_connect() || err.is_request() {
        TransportFailure::Connect(err.to_string())
    } else {
        TransportFailure::Other(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Delay after the `retry`-th failed attempt (zero-based), doubling each time.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Status(u16),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Retry,
    Fallback,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportAttempt {
    /// One-based attempt number.
    pub index: u32,
    pub elapsed: Duration,
    pub outcome: AttemptOutcome,
    pub decision: Decision,
}

/// Result of a call plus the attempts it took.
#[derive(Debug)]
pub struct Exchange {
    pub attempts: Vec<TransportAttempt>,
    pub response: Result<RawResponse>,
}

/// Retrying wrapper shared by every operation.
#[derive(Debug, Clone)]
pub struct ResilientTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: HttpTransport> ResilientTransport<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn send(&self, envelope: &RequestEnvelope, endpoint: &str) -> Result<RawResponse> {
        self.send_recorded(envelope, endpoint, false).response
    }

    /// Sends and keeps the attempt history. With `fallback_armed`, a terminal
    /// failure is recorded as [`Decision::Fallback`].
    pub fn send_recorded(
        &self,
        envelope: &RequestEnvelope,
        endpoint: &str,
        fallback_armed: bool,
    ) -> Exchange {
        debug!(
            operation = envelope.operation().as_str(),
            endpoint, "sending request"
        );
        self.execute_with_retry(&envelope.to_request(endpoint), fallback_armed)
    }

    /// Unauthenticated GET, used to download provider-hosted artifacts.
    pub fn fetch(&self, url: &str) -> Result<RawResponse> {
        let request = OutboundRequest {
            method: Method::Get,
            url: url.to_string(),
            body: RequestBody::Empty,
            authorized: false,
        };
        self.execute_with_retry(&request, false).response
    }

    fn execute_with_retry(&self, request: &OutboundRequest, fallback_armed: bool) -> Exchange {
        let max_attempts = self.policy.max_attempts.max(1);
        let terminal = if fallback_armed {
            Decision::Fallback
        } else {
            Decision::Fail
        };
        let mut attempts = Vec::new();
        let mut index = 0;

        loop {
            index += 1;
            let started = Instant::now();
            let result = self.inner.execute(request);
            let elapsed = started.elapsed();
            let has_budget = index < max_attempts;

            let (outcome, failure) = match result {
                Ok(response) if response.is_success() => {
                    attempts.push(TransportAttempt {
                        index,
                        elapsed,
                        outcome: AttemptOutcome::Status(response.status),
                        decision: Decision::Accept,
                    });
                    debug!(attempt = index, status = response.status, "request accepted");
                    return Exchange {
                        attempts,
                        response: Ok(response),
                    };
                }
                Ok(response) => {
                    let status = response.status;
                    let body = response.text();
                    if !self.policy.is_retryable_status(status) {
                        attempts.push(TransportAttempt {
                            index,
                            elapsed,
                            outcome: AttemptOutcome::Status(status),
                            decision: terminal,
                        });
                        warn!(attempt = index, status, "non-retryable status");
                        return Exchange {
                            attempts,
                            response: Err(ZpError::Api { status, body }),
                        };
                    }
                    (
                        AttemptOutcome::Status(status),
                        LastFailure::Status { status, body },
                    )
                }
                Err(failure) => {
                    let message = failure.to_string();
                    if !failure.is_retryable() {
                        attempts.push(TransportAttempt {
                            index,
                            elapsed,
                            outcome: AttemptOutcome::Error(message.clone()),
                            decision: terminal,
                        });
                        return Exchange {
                            attempts,
                            response: Err(ZpError::TransportExhausted {
                                attempts: index,
                                last: LastFailure::Transport(message),
                            }),
                        };
                    }
                    (
                        AttemptOutcome::Error(message.clone()),
                        LastFailure::Transport(message),
                    )
                }
            };

            if !has_budget {
                attempts.push(TransportAttempt {
                    index,
                    elapsed,
                    outcome,
                    decision: terminal,
                });
                warn!(attempts = index, last = %failure, "retries exhausted");
                return Exchange {
                    attempts,
                    response: Err(ZpError::TransportExhausted {
                        attempts: index,
                        last: failure,
                    }),
                };
            }

            let delay = self.policy.delay_for(index - 1);
            warn!(
                attempt = index,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "retrying after {failure}"
            );
            attempts.push(TransportAttempt {
                index,
                elapsed,
                outcome,
                decision: Decision::Retry,
            });
            thread::sleep(delay);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use serde_json::Value;

    use super::{HttpTransport, OutboundRequest, RawResponse, TransportFailure};

    type Reply = Result<RawResponse, TransportFailure>;

    pub(crate) fn json_reply(status: u16, body: Value) -> Reply {
        Ok(RawResponse {
            status,
            content_type: Some("application/json".to_string()),
            body: body.to_string().into_bytes(),
        })
    }

    pub(crate) fn status_reply(status: u16) -> Reply {
        Ok(RawResponse {
            status,
            content_type: None,
            body: Vec::new(),
        })
    }

    /// Replays queued replies for the first route whose fragment occurs in the URL.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedTransport {
        routes: Mutex<Vec<(String, VecDeque<Reply>)>>,
        seen: Mutex<Vec<OutboundRequest>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn route(self, fragment: &str, replies: Vec<Reply>) -> Self {
            self.routes
                .lock()
                .expect("routes lock")
                .push((fragment.to_string(), replies.into()));
            self
        }

        pub(crate) fn seen(&self) -> Vec<OutboundRequest> {
            self.seen.lock().expect("seen lock").clone()
        }
    }

    impl HttpTransport for ScriptedTransport {
        fn execute(&self, request: &OutboundRequest) -> Result<RawResponse, TransportFailure> {
            self.seen.lock().expect("seen lock").push(request.clone());
            let mut routes = self.routes.lock().expect("routes lock");
            routes
                .iter_mut()
                .find(|(fragment, _)| request.url.contains(fragment.as_str()))
                .and_then(|(_, replies)| replies.pop_front())
                .unwrap_or_else(|| {
                    Err(TransportFailure::Other(format!(
                        "no scripted reply for {}",
                        request.url
                    )))
                })
        }
    }
}
