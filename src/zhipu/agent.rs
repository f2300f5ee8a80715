//! Agent dialogue with plain chat-completion fallback.
//!
//! The agent endpoint keeps server-side conversation state. When it fails, the
//! same message goes to the chat-completions endpoint, which has no notion of
//! a conversation id; the reply says so through [`Continuity::Dropped`].

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, ZpError};
use crate::relay::envelope::{OperationKind, RequestEnvelope};
use crate::relay::extract;
use crate::relay::payload::ContentPart;
use crate::relay::fallback::dispatch_with_fallback;
use crate::relay::transport::HttpTransport;
use crate::zhipu::client::{Endpoint, ZhipuClient, require_text};

pub const DEFAULT_FALLBACK_MODEL: &str = "glm-4";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    pub agent_id: String,
    pub message: String,
    pub conversation_id: Option<String>,
    /// Previously uploaded file sent alongside, or instead of, the message.
    pub file_id: Option<String>,
    pub fallback_model: String,
}

impl AgentRequest {
    pub fn new(agent_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            message: message.into(),
            conversation_id: None,
            file_id: None,
            fallback_model: DEFAULT_FALLBACK_MODEL.to_string(),
        }
    }

    /// Agent message: the text first, then the file reference.
    pub fn primary_envelope(&self) -> Result<RequestEnvelope> {
        let agent_id = require_text(&self.agent_id, "agent id")?;
        let message = self.message.trim();
        let file_id = non_blank(self.file_id.as_deref());
        if message.is_empty() && file_id.is_none() {
            return Err(ZpError::InvalidInput(
                "message or file id must not be empty".to_string(),
            ));
        }

        let mut builder = RequestEnvelope::builder(OperationKind::Agent)
            .tunable("agent_id", agent_id)
            .tunable_opt("conversation_id", non_blank(self.conversation_id.as_deref()));
        if !message.is_empty() {
            builder = builder.text(message);
        }
        if let Some(file_id) = file_id {
            builder = builder.part(ContentPart::FileId(file_id.to_string()));
        }
        builder.build()
    }

    /// Plain chat request with the message text. Chat completion cannot see
    /// uploaded files, so a file-only request has no fallback.
    pub fn fallback_envelope(&self) -> Result<RequestEnvelope> {
        let message = require_text(&self.message, "chat fallback message")?;
        RequestEnvelope::builder(OperationKind::Chat)
            .model(self.fallback_model.as_str())
            .text(message)
            .build()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Whether the server-side conversation survived the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Continuity {
    Preserved,
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentReply {
    pub agent_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub continuity: Continuity,
    /// Endpoint that produced the text: `agent` or `chat`.
    pub served_by: &'static str,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl<T: HttpTransport> ZhipuClient<T> {
    pub fn agent_chat(&self, request: &AgentRequest) -> Result<AgentReply> {
        let primary = request.primary_envelope()?;

        let dispatched = dispatch_with_fallback(
            || {
                let exchange = self.send_recorded(&primary, Endpoint::Agent, true);
                debug!(attempts = exchange.attempts.len(), "agent exchange finished");
                let value = exchange.response?.json()?;
                let text = extract::assistant_text(&value).map_err(ZpError::Unmatched)?;
                let conversation_id = value
                    .get("conversation_id")
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .or_else(|| request.conversation_id.clone());
                Ok((text, conversation_id))
            },
            || {
                let fallback = request.fallback_envelope()?;
                let value = self.execute_json(&fallback, Endpoint::Chat)?;
                let text = extract::assistant_text(&value).map_err(ZpError::Unmatched)?;
                Ok((text, None))
            },
        )?;

        let (text, conversation_id) = dispatched.value;
        let (continuity, served_by) = if dispatched.degraded {
            info!(
                agent_id = request.agent_id.as_str(),
                model = request.fallback_model.as_str(),
                "agent unavailable, answered by chat completion"
            );
            (Continuity::Dropped, "chat")
        } else {
            (Continuity::Preserved, "agent")
        };

        Ok(AgentReply {
            agent_id: request.agent_id.trim().to_string(),
            text,
            conversation_id,
            continuity,
            served_by,
            degraded: dispatched.degraded,
            reason: dispatched.reason,
        })
    }
}
