//! Text-to-speech.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::{Result, ZpError};
use crate::relay::envelope::{OperationKind, RequestEnvelope};
use crate::relay::result::{CanonicalResult, ExpectedShape};
use crate::relay::transport::HttpTransport;
use crate::zhipu::client::{Endpoint, ZhipuClient, require_one_of, require_text, unexpected};

pub const DEFAULT_MODEL: &str = "cogtts";
pub const DEFAULT_VOICE: &str = "tongtong";
pub const VOICES: &[&str] = &["tongtong", "xiaoxiao", "xiaomo", "xiaobei", "xiaoxuan"];
pub const FORMATS: &[&str] = &["wav", "mp3"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
    pub format: String,
    pub model: Option<String>,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: DEFAULT_VOICE.to_string(),
            format: "wav".to_string(),
            model: None,
        }
    }

    pub fn envelope(&self) -> Result<RequestEnvelope> {
        let text = require_text(&self.text, "speech text")?;
        require_one_of(&self.voice, VOICES, "voice")?;
        require_one_of(&self.format, FORMATS, "audio format")?;
        RequestEnvelope::builder(OperationKind::Speech)
            .model(self.model.as_deref().unwrap_or(DEFAULT_MODEL))
            .text(text)
            .tunable("voice", self.voice.as_str())
            .tunable("response_format", self.format.as_str())
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechAudio {
    pub bytes: Vec<u8>,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedAudio {
    pub path: PathBuf,
    pub format: String,
    pub size: usize,
    pub voice: String,
}

/// Writes synthesized audio, creating parent directories as needed.
pub fn save_audio(path: &Path, audio: &SpeechAudio, voice: &str) -> Result<SavedAudio> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| ZpError::io(parent, err))?;
    }
    fs::write(path, &audio.bytes).map_err(|err| ZpError::io(path, err))?;
    info!(path = %path.display(), size = audio.bytes.len(), "audio saved");
    Ok(SavedAudio {
        path: path.to_path_buf(),
        format: audio.format.clone(),
        size: audio.bytes.len(),
        voice: voice.to_string(),
    })
}

impl<T: HttpTransport> ZhipuClient<T> {
    pub fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechAudio> {
        let envelope = request.envelope()?;
        match self.execute(&envelope, Endpoint::Speech, ExpectedShape::Audio)? {
            CanonicalResult::Audio { bytes, format } => Ok(SpeechAudio {
                bytes,
                // Unknown content types fall back to the requested format.
                format: if format == "bin" {
                    request.format.clone()
                } else {
                    format
                },
            }),
            other => Err(unexpected(other, ExpectedShape::Audio)),
        }
    }
}
