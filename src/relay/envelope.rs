use serde_json::{Map, Value, json};

use crate::error::{Result, ZpError};
use crate::relay::payload::{ContentPart, MediaSource, content_value};
use crate::relay::transport::{Method, OutboundRequest, RequestBody, Upload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Chat,
    Agent,
    Vision,
    Moderation,
    Embedding,
    Rerank,
    WebSearch,
    ImageGeneration,
    Transcription,
    Speech,
    Tokenizer,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Agent => "agent",
            Self::Vision => "vision",
            Self::Moderation => "moderation",
            Self::Embedding => "embedding",
            Self::Rerank => "rerank",
            Self::WebSearch => "web_search",
            Self::ImageGeneration => "image_generation",
            Self::Transcription => "transcription",
            Self::Speech => "speech",
            Self::Tokenizer => "tokenizer",
        }
    }
}

/// A fully built request. Fields are private so it cannot change after `build`.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    operation: OperationKind,
    model: Option<String>,
    parts: Vec<ContentPart>,
    tunables: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    operation: OperationKind,
    model: Option<String>,
    parts: Vec<ContentPart>,
    tunables: Map<String, Value>,
}

impl EnvelopeBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.parts.push(ContentPart::Text(text.into()));
        self
    }

    pub fn part(mut self, part: ContentPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn parts(mut self, parts: impl IntoIterator<Item = ContentPart>) -> Self {
        self.parts.extend(parts);
        self
    }

    /// Extra body key, written after the generated keys so it can replace them.
    pub fn tunable(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.tunables.insert(key.to_string(), value.into());
        self
    }

    /// Sets `key` only when a value is present.
    pub fn tunable_opt<V: Into<Value>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.tunable(key, value),
            None => self,
        }
    }

    pub fn build(self) -> Result<RequestEnvelope> {
        if self.parts.is_empty() {
            return Err(ZpError::EmptyPayload);
        }
        if self.operation == OperationKind::Transcription && upload_part(&self.parts).is_none() {
            return Err(ZpError::InvalidInput(
                "transcription needs a local audio file".to_string(),
            ));
        }
        Ok(RequestEnvelope {
            operation: self.operation,
            model: self.model,
            parts: self.parts,
            tunables: self.tunables,
        })
    }
}

impl RequestEnvelope {
    pub fn builder(operation: OperationKind) -> EnvelopeBuilder {
        EnvelopeBuilder {
            operation,
            model: None,
            parts: Vec::new(),
            tunables: Map::new(),
        }
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn parts(&self) -> &[ContentPart] {
        &self.parts
    }

    pub fn tunable(&self, key: &str) -> Option<&Value> {
        self.tunables.get(key)
    }

    fn texts(&self) -> Vec<&str> {
        self.parts.iter().filter_map(ContentPart::as_text).collect()
    }

    fn first_text(&self) -> String {
        self.texts().first().map(|text| text.to_string()).unwrap_or_default()
    }

    /// Operation-specific wire body.
    pub fn body(&self) -> RequestBody {
        if self.operation == OperationKind::Transcription {
            return self.multipart_body();
        }

        let mut body = Map::new();
        if let Some(model) = &self.model {
            body.insert("model".to_string(), Value::String(model.clone()));
        }
        match self.operation {
            OperationKind::Chat
            | OperationKind::Agent
            | OperationKind::Vision
            | OperationKind::Tokenizer => {
                body.insert(
                    "messages".to_string(),
                    json!([{ "role": "user", "content": content_value(&self.parts) }]),
                );
            }
            OperationKind::Moderation | OperationKind::Speech => {
                body.insert("input".to_string(), Value::String(self.first_text()));
            }
            OperationKind::Embedding => {
                let texts = self.texts();
                let input = match texts.as_slice() {
                    [single] => Value::String(single.to_string()),
                    many => json!(many),
                };
                body.insert("input".to_string(), input);
            }
            OperationKind::Rerank => {
                body.insert("documents".to_string(), json!(self.texts()));
            }
            OperationKind::WebSearch => {
                body.insert("search_query".to_string(), Value::String(self.first_text()));
            }
            OperationKind::ImageGeneration => {
                body.insert("prompt".to_string(), Value::String(self.first_text()));
            }
            OperationKind::Transcription => {}
        }
        for (key, value) in &self.tunables {
            body.insert(key.clone(), value.clone());
        }
        RequestBody::Json(Value::Object(body))
    }

    fn multipart_body(&self) -> RequestBody {
        let mut fields = Vec::new();
        if let Some(model) = &self.model {
            fields.push(("model".to_string(), model.clone()));
        }
        for (key, value) in &self.tunables {
            let value = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            fields.push((key.clone(), value));
        }
        let file = upload_part(&self.parts).unwrap_or_else(|| Upload {
            field: "file".to_string(),
            file_name: String::new(),
            mime: crate::relay::payload::OCTET_STREAM.to_string(),
            bytes: Vec::new(),
        });
        RequestBody::Multipart { fields, file }
    }

    pub fn to_request(&self, url: &str) -> OutboundRequest {
        OutboundRequest {
            method: Method::Post,
            url: url.to_string(),
            body: self.body(),
            authorized: true,
        }
    }

    /// Loggable view of the body; uploaded bytes are reduced to their size.
    pub fn preview(&self) -> Value {
        match self.body() {
            RequestBody::Json(value) => value,
            RequestBody::Empty => Value::Null,
            RequestBody::Multipart { fields, file } => {
                let fields: Map<String, Value> = fields
                    .into_iter()
                    .map(|(key, value)| (key, Value::String(value)))
                    .collect();
                json!({
                    "fields": fields,
                    "file": { "name": file.file_name, "mime": file.mime, "size": file.bytes.len() },
                })
            }
        }
    }
}

fn upload_part(parts: &[ContentPart]) -> Option<Upload> {
    parts.iter().find_map(|part| match part {
        ContentPart::File {
            source: MediaSource::Inline(bytes),
            name,
            mime,
        } => Some(Upload {
            field: "file".to_string(),
            file_name: name.clone(),
            mime: mime.clone(),
            bytes: bytes.clone(),
        }),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_body(envelope: &RequestEnvelope) -> Value {
        match envelope.body() {
            RequestBody::Json(value) => value,
            other => panic!("expected JSON body, got {other:?}"),
        }
    }

    #[test]
    fn building_without_parts_is_an_empty_payload() {
        let err = RequestEnvelope::builder(OperationKind::Chat)
            .model("glm-4")
            .build()
            .expect_err("no parts should fail");
        assert!(matches!(err, ZpError::EmptyPayload));
    }

    #[test]
    fn chat_body_wraps_parts_in_a_user_message() {
        let envelope = RequestEnvelope::builder(OperationKind::Chat)
            .model("glm-4")
            .text("hi")
            .tunable("temperature", 0.7)
            .tunable_opt::<u32>("max_tokens", None)
            .build()
            .expect("envelope should build");

        let body = json_body(&envelope);
        assert_eq!(body["model"], "glm-4");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi");
        assert_eq!(body["temperature"], 0.7);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn embedding_input_is_scalar_or_list() {
        let single = RequestEnvelope::builder(OperationKind::Embedding)
            .text("a")
            .build()
            .expect("single input should build");
        assert_eq!(json_body(&single)["input"], "a");

        let batch = RequestEnvelope::builder(OperationKind::Embedding)
            .text("a")
            .text("b")
            .build()
            .expect("batch input should build");
        assert_eq!(json_body(&batch)["input"], json!(["a", "b"]));
    }

    #[test]
    fn transcription_requires_a_local_file() {
        let err = RequestEnvelope::builder(OperationKind::Transcription)
            .text("not audio")
            .build()
            .expect_err("text-only transcription should fail");
        assert!(matches!(err, ZpError::InvalidInput(_)));

        let envelope = RequestEnvelope::builder(OperationKind::Transcription)
            .model("glm-asr")
            .part(ContentPart::File {
                source: MediaSource::Inline(vec![1, 2, 3]),
                name: "clip.wav".to_string(),
                mime: "audio/wav".to_string(),
            })
            .tunable("response_format", "json")
            .build()
            .expect("audio upload should build");
        let preview = envelope.preview();
        assert_eq!(preview["fields"]["model"], "glm-asr");
        assert_eq!(preview["fields"]["response_format"], "json");
        assert_eq!(preview["file"]["size"], 3);
    }
}
