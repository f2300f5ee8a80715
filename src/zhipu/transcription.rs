use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Result, ZpError};
use crate::relay::batch::{BatchReport, BatchRunner};
use crate::relay::envelope::{OperationKind, RequestEnvelope};
use crate::relay::payload::{ContentPart, MediaSource};
use crate::relay::result::{CanonicalResult, ExpectedShape, Segment};
use crate::relay::transport::HttpTransport;
use crate::zhipu::client::{Endpoint, ZhipuClient, require_one_of, unexpected};

pub const DEFAULT_MODEL: &str = "glm-asr";
pub const MAX_AUDIO_BYTES: u64 = 25 * 1024 * 1024;
pub const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3"];
pub const RESPONSE_FORMATS: &[&str] = &["json", "text", "srt", "verbose_json", "vtt"];

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionRequest {
    pub file: PathBuf,
    pub model: Option<String>,
    pub language: Option<String>,
    pub prompt: Option<String>,
    pub response_format: String,
    pub temperature: f64,
}

impl TranscriptionRequest {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            model: None,
            language: None,
            prompt: None,
            response_format: "json".to_string(),
            temperature: 0.0,
        }
    }

    pub fn envelope(&self) -> Result<RequestEnvelope> {
        require_one_of(&self.response_format, RESPONSE_FORMATS, "response format")?;
        let audio = load_audio(&self.file)?;
        RequestEnvelope::builder(OperationKind::Transcription)
            .model(self.model.as_deref().unwrap_or(DEFAULT_MODEL))
            .part(audio)
            .tunable("response_format", self.response_format.as_str())
            .tunable("temperature", self.temperature)
            .tunable_opt("language", self.language.as_deref())
            .tunable_opt("prompt", self.prompt.as_deref())
            .build()
    }
}

/// Checks extension and size, then reads the file as an upload part.
pub fn load_audio(path: &Path) -> Result<ContentPart> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if !AUDIO_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ZpError::InvalidInput(format!(
            "unsupported audio file '{}': only .wav and .mp3 are accepted",
            path.display()
        )));
    }

    let size = fs::metadata(path).map_err(|err| ZpError::io(path, err))?.len();
    if size == 0 {
        return Err(ZpError::InvalidInput(format!(
            "audio file '{}' is empty",
            path.display()
        )));
    }
    if size > MAX_AUDIO_BYTES {
        return Err(ZpError::InvalidInput(format!(
            "audio file '{}' is {:.1} MB, the limit is 25 MB",
            path.display(),
            size as f64 / (1024.0 * 1024.0)
        )));
    }

    let bytes = fs::read(path).map_err(|err| ZpError::io(path, err))?;
    let mime = if extension == "wav" { "audio/wav" } else { "audio/mpeg" };
    Ok(ContentPart::File {
        source: MediaSource::Inline(bytes),
        name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("audio.{extension}")),
        mime: mime.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transcribed {
    pub file: PathBuf,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<Segment>,
}

impl<T: HttpTransport> ZhipuClient<T> {
    pub fn transcribe(&self, request: &TranscriptionRequest) -> Result<Transcribed> {
        let envelope = request.envelope()?;
        match self.execute(&envelope, Endpoint::Transcription, ExpectedShape::Transcript)? {
            CanonicalResult::Transcript { text, segments } => Ok(Transcribed {
                file: request.file.clone(),
                text,
                segments,
            }),
            other => Err(unexpected(other, ExpectedShape::Transcript)),
        }
    }

    /// Transcribes every file with the options of `template`.
    pub fn transcribe_batch(
        &self,
        files: &[PathBuf],
        template: &TranscriptionRequest,
        runner: &BatchRunner,
    ) -> BatchReport<PathBuf, Transcribed> {
        runner.execute(files, |_, file| {
            self.transcribe(&TranscriptionRequest {
                file: file.clone(),
                ..template.clone()
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::time::{SystemTime, UNIX_EPOCH};

    use serde_json::json;

    use super::*;
    use crate::relay::transport::RequestBody;
    use crate::relay::transport::testing::{ScriptedTransport, json_reply};
    use crate::zhipu::client::testing::scripted_client;

    fn temp_audio(name: &str, bytes: &[u8]) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after unix epoch")
            .as_nanos();
        let path = env::temp_dir().join(format!("zpipe-{nanos}-{name}"));
        fs::write(&path, bytes).expect("temp audio should be written");
        path
    }

    #[test]
    fn unsupported_extensions_are_rejected() {
        let path = temp_audio("clip.ogg", b"OggS");
        let err = load_audio(&path).expect_err("ogg should be rejected");
        assert!(err.to_string().contains(".wav and .mp3"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_audio(Path::new("/definitely/missing.wav")).expect_err("missing file");
        assert!(matches!(err, ZpError::Io { .. }));
    }

    #[test]
    fn upload_is_multipart_with_options() {
        let path = temp_audio("clip.wav", b"RIFF0000WAVE");
        let request = TranscriptionRequest {
            language: Some("zh".to_string()),
            ..TranscriptionRequest::new(&path)
        };
        let envelope = request.envelope().expect("envelope should build");
        let RequestBody::Multipart { fields, file } = envelope.body() else {
            panic!("transcription body should be multipart");
        };
        assert!(fields.contains(&("model".to_string(), DEFAULT_MODEL.to_string())));
        assert!(fields.contains(&("language".to_string(), "zh".to_string())));
        assert_eq!(file.mime, "audio/wav");
        assert_eq!(file.bytes, b"RIFF0000WAVE");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn batch_isolates_bad_files() {
        let good = temp_audio("good.mp3", b"ID3");
        let client = scripted_client(ScriptedTransport::new().route(
            "/audio/transcriptions",
            vec![json_reply(200, json!({ "text": "你好" }))],
        ));
        let files = vec![PathBuf::from("/definitely/missing.mp3"), good.clone()];
        let report = client.transcribe_batch(
            &files,
            &TranscriptionRequest::new(""),
            &BatchRunner::default(),
        );

        assert_eq!((report.total, report.successful, report.failed), (2, 1, 1));
        assert_eq!(report.results[1].result().map(|t| t.text.as_str()), Some("你好"));
        let _ = fs::remove_file(good);
    }
}
