use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, ZpError};
use crate::relay::envelope::{OperationKind, RequestEnvelope};
use crate::relay::extract;
use crate::relay::result::{CanonicalResult, ExpectedShape};
use crate::relay::transport::HttpTransport;
use crate::zhipu::client::{Endpoint, ZhipuClient, require_one_of, require_text, unexpected};

pub const DEFAULT_MODEL: &str = "glm-4-plus";
pub const ROLES: &[&str] = &["system", "user", "assistant"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }
}

/// Messages to count, in conversation order.
pub fn tokenizer_request(messages: &[ChatMessage], model: Option<&str>) -> Result<RequestEnvelope> {
    if messages.is_empty() {
        return Err(ZpError::InvalidInput(
            "at least one message is required".to_string(),
        ));
    }
    let mut builder =
        RequestEnvelope::builder(OperationKind::Tokenizer).model(model.unwrap_or(DEFAULT_MODEL));
    let mut wire = Vec::with_capacity(messages.len());
    for message in messages {
        require_one_of(&message.role, ROLES, "message role")?;
        let content = require_text(&message.content, "message content")?;
        builder = builder.text(content);
        wire.push(ChatMessage::new(message.role.as_str(), content));
    }

    // A lone user message is the envelope's default rendering.
    if !matches!(wire.as_slice(), [only] if only.role == "user") {
        let wire = serde_json::to_value(&wire)?;
        builder = builder.tunable("messages", wire);
    }
    builder.build()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub model: String,
    pub prompt_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl<T: HttpTransport> ZhipuClient<T> {
    pub fn tokenize(&self, messages: &[ChatMessage], model: Option<&str>) -> Result<TokenUsage> {
        let envelope = tokenizer_request(messages, model)?;
        let value = self.execute_json(&envelope, Endpoint::Tokenizer)?;
        match extract::extract_json(&value, ExpectedShape::TokenCount) {
            CanonicalResult::TokenCount { prompt_tokens } => Ok(TokenUsage {
                model: envelope.model().unwrap_or(DEFAULT_MODEL).to_string(),
                prompt_tokens,
                request_id: value
                    .get("request_id")
                    .or_else(|| value.get("id"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            other => Err(unexpected(other, ExpectedShape::TokenCount)),
        }
    }

    /// Token count of `text` sent as a single message with `role`.
    pub fn count_tokens(&self, text: &str, role: &str, model: Option<&str>) -> Result<u64> {
        let usage = self.tokenize(&[ChatMessage::new(role, text)], model)?;
        Ok(usage.prompt_tokens)
    }

    pub fn count_tokens_for_messages(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
    ) -> Result<u64> {
        Ok(self.tokenize(messages, model)?.prompt_tokens)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::relay::transport::RequestBody;
    use crate::relay::transport::testing::{ScriptedTransport, json_reply, status_reply};
    use crate::zhipu::client::testing::scripted_client;

    fn json_body(envelope: &RequestEnvelope) -> Value {
        match envelope.body() {
            RequestBody::Json(value) => value,
            other => panic!("tokenizer body should be JSON, got {other:?}"),
        }
    }

    #[test]
    fn single_user_message_body() {
        let envelope =
            tokenizer_request(&[ChatMessage::user("hello")], None).expect("envelope should build");
        let body = json_body(&envelope);
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["messages"], json!([{ "role": "user", "content": "hello" }]));
    }

    #[test]
    fn conversation_keeps_roles_and_order() {
        let messages = [
            ChatMessage::new("system", "You are a helpful assistant."),
            ChatMessage::user("Tell me about AI development."),
            ChatMessage::new("assistant", "AI has evolved significantly."),
        ];
        let body = json_body(&tokenizer_request(&messages, Some("glm-4")).expect("should build"));

        assert_eq!(body["model"], "glm-4");
        assert_eq!(body["messages"].as_array().map(Vec::len), Some(3));
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][2]["content"], "AI has evolved significantly.");
    }

    #[test]
    fn bad_roles_and_blank_content_are_rejected() {
        assert!(tokenizer_request(&[], None).is_err());
        assert!(tokenizer_request(&[ChatMessage::new("tool", "x")], None).is_err());
        assert!(tokenizer_request(&[ChatMessage::user("  ")], None).is_err());
    }

    #[test]
    fn counts_come_from_prompt_usage() {
        let client = scripted_client(ScriptedTransport::new().route(
            "/tokenizer",
            vec![
                status_reply(503),
                json_reply(200, json!({ "id": "tok_9", "usage": { "prompt_tokens": 21 } })),
                json_reply(200, json!({ "usage": { "prompt_tokens": 4 } })),
            ],
        ));

        let usage = client
            .tokenize(&[ChatMessage::user("What opportunities lie ahead?")], None)
            .expect("retry should recover");
        assert_eq!(usage.prompt_tokens, 21);
        assert_eq!(usage.request_id.as_deref(), Some("tok_9"));

        assert_eq!(client.count_tokens("hi", "user", None).expect("count"), 4);
        let seen = client.transport().inner().seen();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].url.ends_with("/api/paas/v4/tokenizer"));
    }

    #[test]
    fn missing_usage_is_unmatched() {
        let client = scripted_client(
            ScriptedTransport::new().route("/tokenizer", vec![json_reply(200, json!({ "id": "x" }))]),
        );
        let err = client
            .count_tokens_for_messages(&[ChatMessage::user("hi")], None)
            .expect_err("no usage block");
        assert!(matches!(err, ZpError::Unmatched(_)));
    }
}
