use std::env;
use std::time::Duration;

use serde_json::{Value, json};

use crate::error::{Result, ZpError};
use crate::relay::envelope::RequestEnvelope;
use crate::relay::extract;
use crate::relay::result::{CanonicalResult, Diagnostic, ExpectedShape};
use crate::relay::transport::{
    Exchange, HttpTransport, RawResponse, ReqwestTransport, ResilientTransport, RetryPolicy,
};

pub const DEFAULT_BASE_URL: &str = "https://open.bigmodel.cn";
pub const API_KEY_ENV: &str = "ZHIPU_API_KEY";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const PAAS_PREFIX: &str = "/api/paas/v4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Agent,
    Chat,
    Moderation,
    Embeddings,
    Rerank,
    WebSearch,
    Images,
    Transcription,
    Speech,
    Tokenizer,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Self::Agent => "/api/v1/agents",
            Self::Chat => "/api/paas/v4/chat/completions",
            Self::Moderation => "/api/paas/v4/moderations",
            Self::Embeddings => "/api/paas/v4/embeddings",
            Self::Rerank => "/api/paas/v4/rerank",
            Self::WebSearch => "/api/paas/v4/web_search",
            Self::Images => "/api/paas/v4/images/generations",
            Self::Transcription => "/api/paas/v4/audio/transcriptions",
            Self::Speech => "/api/paas/v4/audio/speech",
            Self::Tokenizer => "/api/paas/v4/tokenizer",
        }
    }
}

pub fn api_key_from_env() -> Option<String> {
    env::var(API_KEY_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Strips trailing slashes and a trailing `/api/paas/v4`, so both
/// `https://open.bigmodel.cn` and `https://open.bigmodel.cn/api/paas/v4/` work.
pub fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    trimmed
        .strip_suffix(PAAS_PREFIX)
        .unwrap_or(trimmed)
        .to_string()
}

/// Endpoint and body an envelope would be sent with. Never touches the network.
pub fn preview(base_url: &str, envelope: &RequestEnvelope, endpoint: Endpoint) -> Value {
    json!({
        "endpoint": format!("{}{}", normalize_base_url(base_url), endpoint.path()),
        "operation": envelope.operation().as_str(),
        "body": envelope.preview(),
    })
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// Reads the key from `ZHIPU_API_KEY`.
    pub fn from_env() -> Result<Self> {
        api_key_from_env()
            .map(Self::new)
            .ok_or(ZpError::MissingApiKey {
                key_env: API_KEY_ENV,
            })
    }
}

/// Zhipu API client. Every operation shares one [`ResilientTransport`].
#[derive(Debug, Clone)]
pub struct ZhipuClient<T = ReqwestTransport> {
    base_url: String,
    transport: ResilientTransport<T>,
}

impl ZhipuClient<ReqwestTransport> {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ZpError::MissingApiKey {
                key_env: API_KEY_ENV,
            });
        }
        let inner = ReqwestTransport::new(config.api_key, config.timeout)?;
        Ok(Self::with_transport(&config.base_url, inner, config.retry))
    }
}

impl<T: HttpTransport> ZhipuClient<T> {
    pub fn with_transport(base_url: &str, inner: T, retry: RetryPolicy) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            transport: ResilientTransport::new(inner, retry),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &ResilientTransport<T> {
        &self.transport
    }

    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    pub fn preview(&self, envelope: &RequestEnvelope, endpoint: Endpoint) -> Value {
        preview(&self.base_url, envelope, endpoint)
    }

    pub fn send(&self, envelope: &RequestEnvelope, endpoint: Endpoint) -> Result<RawResponse> {
        self.transport.send(envelope, &self.url(endpoint))
    }

    pub fn send_recorded(
        &self,
        envelope: &RequestEnvelope,
        endpoint: Endpoint,
        fallback_armed: bool,
    ) -> Exchange {
        self.transport
            .send_recorded(envelope, &self.url(endpoint), fallback_armed)
    }

    /// Sends and extracts. A response that matched no rule comes back as
    /// [`CanonicalResult::Unmatched`], not as an error.
    pub fn execute(
        &self,
        envelope: &RequestEnvelope,
        endpoint: Endpoint,
        expected: ExpectedShape,
    ) -> Result<CanonicalResult> {
        let raw = self.send(envelope, endpoint)?;
        Ok(extract::extract(&raw, expected))
    }

    /// Sends and decodes the JSON body as-is.
    pub fn execute_json(&self, envelope: &RequestEnvelope, endpoint: Endpoint) -> Result<Value> {
        let raw = self.send(envelope, endpoint)?;
        Ok(raw.json()?)
    }
}

/// Error for a result of the wrong kind, keeping the diagnostic when there is one.
pub(crate) fn unexpected(result: CanonicalResult, expected: ExpectedShape) -> ZpError {
    match result {
        CanonicalResult::Unmatched(diagnostic) => ZpError::Unmatched(diagnostic),
        _ => ZpError::Unmatched(Diagnostic {
            expected,
            seen_keys: Vec::new(),
            note: Some("response produced a different result kind".to_string()),
        }),
    }
}

/// Rejects blank input with a message naming the field.
pub(crate) fn require_text<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ZpError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(trimmed)
}

/// Rejects a value outside `allowed`, listing the accepted values.
pub(crate) fn require_one_of(value: &str, allowed: &[&str], field: &str) -> Result<()> {
    if allowed.contains(&value) {
        return Ok(());
    }
    Err(ZpError::InvalidInput(format!(
        "unsupported {field} '{value}', expected one of: {}",
        allowed.join(", ")
    )))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::envelope::OperationKind;
    use crate::relay::transport::testing::{ScriptedTransport, json_reply};

    #[test]
    fn base_url_tolerates_paas_suffix() {
        assert_eq!(normalize_base_url("https://open.bigmodel.cn/"), DEFAULT_BASE_URL);
        assert_eq!(
            normalize_base_url("https://open.bigmodel.cn/api/paas/v4/"),
            DEFAULT_BASE_URL
        );
        assert_eq!(normalize_base_url("http://127.0.0.1:9000"), "http://127.0.0.1:9000");
    }

    #[test]
    fn urls_join_base_and_endpoint() {
        let client = ZhipuClient::with_transport(
            "https://open.bigmodel.cn/api/paas/v4",
            ScriptedTransport::new(),
            RetryPolicy::default(),
        );
        assert_eq!(
            client.url(Endpoint::Chat),
            "https://open.bigmodel.cn/api/paas/v4/chat/completions"
        );
        assert_eq!(
            client.url(Endpoint::Agent),
            "https://open.bigmodel.cn/api/v1/agents"
        );
    }

    #[test]
    fn preview_shows_endpoint_and_body() {
        let client = testing::scripted_client(ScriptedTransport::new());
        let envelope = RequestEnvelope::builder(OperationKind::Moderation)
            .model("moderation")
            .text("hello")
            .build()
            .expect("envelope should build");

        let preview = client.preview(&envelope, Endpoint::Moderation);
        assert_eq!(preview["endpoint"], "http://zp.test/api/paas/v4/moderations");
        assert_eq!(preview["body"]["input"], "hello");
        assert!(client.transport().inner().seen().is_empty());
    }

    #[test]
    fn unmatched_responses_stay_values() {
        let client = testing::scripted_client(
            ScriptedTransport::new().route("/chat/completions", vec![json_reply(200, json!({ "choices": [] }))]),
        );
        let envelope = RequestEnvelope::builder(OperationKind::Chat)
            .text("hi")
            .build()
            .expect("envelope should build");

        let result = client
            .execute(&envelope, Endpoint::Chat, ExpectedShape::AssistantText)
            .expect("transport succeeded");
        assert!(result.is_unmatched());
    }

    #[test]
    fn blank_and_unsupported_inputs_are_rejected() {
        assert!(require_text("  ", "text").is_err());
        assert_eq!(require_text(" hi ", "text").ok(), Some("hi"));
        assert!(require_one_of("wav", &["wav", "mp3"], "format").is_ok());
        let err = require_one_of("ogg", &["wav", "mp3"], "format").expect_err("ogg is unsupported");
        assert!(err.to_string().contains("wav, mp3"));
    }
}
