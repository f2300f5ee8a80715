use std::path::PathBuf;

use serde::Serialize;

use crate::error::Result;
use crate::relay::envelope::{OperationKind, RequestEnvelope};
use crate::relay::payload::assemble;
use crate::relay::result::{CanonicalResult, ExpectedShape};
use crate::relay::transport::HttpTransport;
use crate::zhipu::client::{Endpoint, ZhipuClient, unexpected};

pub const DEFAULT_MODEL: &str = "glm-4v";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct VisionRequest {
    pub text: String,
    pub files: Vec<PathBuf>,
    pub urls: Vec<String>,
    pub model: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl VisionRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            files: Vec::new(),
            urls: Vec::new(),
            model: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn envelope(&self) -> Result<RequestEnvelope> {
        let parts = assemble(&self.text, &self.files, &self.urls)?;
        RequestEnvelope::builder(OperationKind::Vision)
            .model(self.model.as_deref().unwrap_or(DEFAULT_MODEL))
            .parts(parts)
            .tunable("temperature", self.temperature)
            .tunable("max_tokens", self.max_tokens)
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisionReply {
    pub model: String,
    pub text: String,
    /// Content parts actually sent, after unreadable files were skipped.
    pub parts: usize,
}

impl<T: HttpTransport> ZhipuClient<T> {
    pub fn analyze(&self, request: &VisionRequest) -> Result<VisionReply> {
        let envelope = request.envelope()?;
        match self.execute(&envelope, Endpoint::Chat, ExpectedShape::AssistantText)? {
            CanonicalResult::AssistantText { text } => Ok(VisionReply {
                model: envelope.model().unwrap_or(DEFAULT_MODEL).to_string(),
                text,
                parts: envelope.parts().len(),
            }),
            other => Err(unexpected(other, ExpectedShape::AssistantText)),
        }
    }
}
