//! Image generation and download of the generated artifact.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Result, ZpError};
use crate::relay::batch::{BatchReport, BatchRunner};
use crate::relay::envelope::{OperationKind, RequestEnvelope};
use crate::relay::result::{CanonicalResult, ExpectedShape};
use crate::relay::transport::HttpTransport;
use crate::zhipu::client::{Endpoint, ZhipuClient, require_one_of, require_text, unexpected};

pub const DEFAULT_MODEL: &str = "cogview-4";
pub const SIZES: &[&str] = &["1024x1024", "1024x768", "768x1024", "512x512", "768x768"];
pub const QUALITIES: &[&str] = &["standard", "hd"];
pub const MIN_PROMPT_CHARS: usize = 5;
pub const MAX_PROMPT_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub prompt: String,
    pub size: String,
    pub quality: String,
    pub model: Option<String>,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            size: "1024x1024".to_string(),
            quality: "standard".to_string(),
            model: None,
        }
    }

    pub fn envelope(&self) -> Result<RequestEnvelope> {
        let prompt = require_text(&self.prompt, "image prompt")?;
        let chars = prompt.chars().count();
        if !(MIN_PROMPT_CHARS..=MAX_PROMPT_CHARS).contains(&chars) {
            return Err(ZpError::InvalidInput(format!(
                "image prompt must be {MIN_PROMPT_CHARS}-{MAX_PROMPT_CHARS} characters, got {chars}"
            )));
        }
        require_one_of(&self.size, SIZES, "image size")?;
        require_one_of(&self.quality, QUALITIES, "image quality")?;
        RequestEnvelope::builder(OperationKind::ImageGeneration)
            .model(self.model.as_deref().unwrap_or(DEFAULT_MODEL))
            .text(prompt)
            .tunable("size", self.size.as_str())
            .tunable("quality", self.quality.as_str())
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedImage {
    pub prompt: String,
    pub model: String,
    pub size: String,
    pub quality: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

/// Writes downloaded image bytes as `<stem>.<ext>`, the extension taken from
/// the detected image format.
pub fn save_image(bytes: &[u8], out_dir: &Path, stem: &str) -> Result<PathBuf> {
    let format = image::guess_format(bytes).map_err(|err| {
        ZpError::InvalidInput(format!("downloaded file is not a recognized image: {err}"))
    })?;
    let extension = format.extensions_str().first().copied().unwrap_or("img");
    fs::create_dir_all(out_dir).map_err(|err| ZpError::io(out_dir, err))?;
    let path = out_dir.join(format!("{stem}.{extension}"));
    fs::write(&path, bytes).map_err(|err| ZpError::io(&path, err))?;
    info!(path = %path.display(), size = bytes.len(), "image saved");
    Ok(path)
}

fn default_stem(index: usize) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default();
    format!("zpipe-image-{millis}-{index}")
}

impl<T: HttpTransport> ZhipuClient<T> {
    pub fn generate_image(&self, request: &ImageRequest) -> Result<GeneratedImage> {
        let envelope = request.envelope()?;
        match self.execute(&envelope, Endpoint::Images, ExpectedShape::GeneratedImage)? {
            CanonicalResult::GeneratedImage { url, .. } => Ok(GeneratedImage {
                prompt: request.prompt.trim().to_string(),
                model: envelope.model().unwrap_or(DEFAULT_MODEL).to_string(),
                size: request.size.clone(),
                quality: request.quality.clone(),
                url,
                local_path: None,
            }),
            other => Err(unexpected(other, ExpectedShape::GeneratedImage)),
        }
    }

    /// Downloads a provider-hosted image without the API credentials.
    pub fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.transport().fetch(url)?;
        debug!(url, size = response.body.len(), "image downloaded");
        Ok(response.body)
    }

    pub fn generate_and_save(
        &self,
        request: &ImageRequest,
        out_dir: &Path,
        index: usize,
    ) -> Result<GeneratedImage> {
        let mut generated = self.generate_image(request)?;
        let bytes = self.download(&generated.url)?;
        generated.local_path = Some(save_image(&bytes, out_dir, &default_stem(index))?);
        Ok(generated)
    }

    /// Generates one image per prompt with the options of `template`.
    pub fn generate_batch(
        &self,
        prompts: &[String],
        template: &ImageRequest,
        out_dir: Option<&Path>,
        runner: &BatchRunner,
    ) -> BatchReport<String, GeneratedImage> {
        runner.execute(prompts, |index, prompt| {
            let request = ImageRequest {
                prompt: prompt.clone(),
                ..template.clone()
            };
            match out_dir {
                Some(dir) => self.generate_and_save(&request, dir, index + 1),
                None => self.generate_image(&request),
            }
        })
    }
}
