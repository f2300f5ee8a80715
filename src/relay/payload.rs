//! Multimodal payload assembly.
//!
//! Text, local files and remote URLs are normalized into an ordered list of
//! [`ContentPart`]s. Local files travel inline as `data:` URIs; URLs travel by
//! reference so the provider fetches them itself.

use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{Result, ZpError};

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Where the bytes of a media part live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    Inline(Vec<u8>),
    Uri(String),
}

impl MediaSource {
    fn to_url(&self, mime: &str) -> String {
        match self {
            Self::Inline(bytes) => format!("data:{mime};base64,{}", STANDARD.encode(bytes)),
            Self::Uri(uri) => uri.clone(),
        }
    }
}

/// One typed piece of a multimodal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    Image { source: MediaSource, mime: String },
    Video { source: MediaSource, mime: String },
    File {
        source: MediaSource,
        name: String,
        mime: String,
    },
    UrlRef(String),
    /// A file already uploaded to the provider, referenced by id.
    FileId(String),
}

impl ContentPart {
    /// Reads a local file and classifies it by extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = fs::read(path)?;
        let mime = mime_for(path);
        let part = match media_kind(&mime) {
            MediaKind::Image => Self::Image {
                source: MediaSource::Inline(bytes),
                mime,
            },
            MediaKind::Video => Self::Video {
                source: MediaSource::Inline(bytes),
                mime,
            },
            MediaKind::Other => Self::File {
                source: MediaSource::Inline(bytes),
                name: path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                mime,
            },
        };
        Ok(part)
    }

    /// Classifies a remote URL by the extension of its path.
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let guessed = mime_guess::from_path(path).first();
        match guessed {
            Some(mime) if mime.type_().as_str() == "image" => Self::Image {
                source: MediaSource::Uri(url.to_string()),
                mime: mime.essence_str().to_string(),
            },
            Some(mime) if mime.type_().as_str() == "video" => Self::Video {
                source: MediaSource::Uri(url.to_string()),
                mime: mime.essence_str().to_string(),
            },
            _ => Self::UrlRef(url.to_string()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Chat-completions content item for this part.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(text) => json!({ "type": "text", "text": text }),
            Self::Image { source, mime } => json!({
                "type": "image_url",
                "image_url": { "url": source.to_url(mime) },
            }),
            Self::Video { source, mime } => json!({
                "type": "video_url",
                "video_url": { "url": source.to_url(mime) },
            }),
            Self::File { source, name, mime } => json!({
                "type": "file",
                "file": { "url": source.to_url(mime), "filename": name },
            }),
            Self::UrlRef(url) => json!({ "type": "text", "text": format!("Link: {url}") }),
            Self::FileId(id) => json!({ "type": "file_id", "file_id": id }),
        }
    }
}

/// Serializes parts as a message `content` value. A lone text part stays a plain string.
pub fn content_value(parts: &[ContentPart]) -> Value {
    match parts {
        [ContentPart::Text(text)] => Value::String(text.clone()),
        _ => Value::Array(parts.iter().map(ContentPart::to_json).collect()),
    }
}

/// Builds the ordered part list: text, then files, then urls.
///
/// Unreadable files are skipped. Fails only when nothing usable remains.
pub fn assemble<P, U>(text: &str, files: &[P], urls: &[U]) -> Result<Vec<ContentPart>>
where
    P: AsRef<Path>,
    U: AsRef<str>,
{
    let mut parts = Vec::with_capacity(1 + files.len() + urls.len());

    if !text.trim().is_empty() {
        parts.push(ContentPart::Text(text.to_string()));
    }

    for path in files {
        let path = path.as_ref();
        match ContentPart::from_path(path) {
            Ok(part) => parts.push(part),
            Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable file"),
        }
    }

    for url in urls {
        let url = url.as_ref().trim();
        if !url.is_empty() {
            parts.push(ContentPart::from_url(url));
        }
    }

    if parts.is_empty() {
        return Err(ZpError::EmptyPayload);
    }
    debug!(parts = parts.len(), "assembled payload");
    Ok(parts)
}

enum MediaKind {
    Image,
    Video,
    Other,
}

fn mime_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map_or_else(|| OCTET_STREAM.to_string(), |mime| mime.essence_str().to_string())
}

fn media_kind(mime: &str) -> MediaKind {
    if mime.starts_with("image/") {
        MediaKind::Image
    } else if mime.starts_with("video/") {
        MediaKind::Video
    } else {
        MediaKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_path(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!("zpipe-payload-{label}-{nanos}"))
    }

    #[test]
    fn parts_keep_text_files_urls_order() {
        let dir = unique_temp_path("order");
        fs::create_dir_all(&dir).expect("temp dir should be creatable");
        let image = dir.join("cat.png");
        let notes = dir.join("notes.pdf");
        fs::write(&image, [0x89, b'P', b'N', b'G']).expect("image should be writable");
        fs::write(&notes, b"%PDF-1.4").expect("pdf should be writable");

        let parts = assemble(
            "describe these",
            &[image, notes],
            &["https://example.com/clip.mp4", "https://example.com/page"],
        )
        .expect("payload should assemble");

        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], ContentPart::Text("describe these".to_string()));
        assert!(matches!(&parts[1], ContentPart::Image { mime, .. } if mime == "image/png"));
        assert!(matches!(&parts[2], ContentPart::File { name, .. } if name == "notes.pdf"));
        assert!(matches!(&parts[3], ContentPart::Video { source: MediaSource::Uri(_), .. }));
        assert_eq!(
            parts[4],
            ContentPart::UrlRef("https://example.com/page".to_string())
        );
    }

    #[test]
    fn missing_files_are_skipped() {
        let parts = assemble("hi", &[unique_temp_path("absent")], &[] as &[&str])
            .expect("text alone is enough");
        assert_eq!(parts, vec![ContentPart::Text("hi".to_string())]);
    }

    #[test]
    fn nothing_usable_is_an_empty_payload() {
        let err = assemble("   ", &[unique_temp_path("absent")], &[" "])
            .expect_err("nothing usable should fail");
        assert!(matches!(err, ZpError::EmptyPayload));
    }

    #[test]
    fn unknown_extension_falls_back_to_octet_stream() {
        let path = unique_temp_path("blob").with_extension("zzunknown");
        fs::write(&path, b"\x00\x01").expect("blob should be writable");

        let part = ContentPart::from_path(&path).expect("blob should be readable");
        match part {
            ContentPart::File { mime, source, .. } => {
                assert_eq!(mime, OCTET_STREAM);
                assert_eq!(source, MediaSource::Inline(vec![0, 1]));
            }
            other => panic!("expected file part, got {other:?}"),
        }
    }

    #[test]
    fn inline_media_serializes_as_data_uri() {
        let part = ContentPart::Image {
            source: MediaSource::Inline(b"abc".to_vec()),
            mime: "image/jpeg".to_string(),
        };
        assert_eq!(
            part.to_json()["image_url"]["url"],
            "data:image/jpeg;base64,YWJj"
        );
    }

    #[test]
    fn url_classification_ignores_query_strings() {
        assert!(matches!(
            ContentPart::from_url("https://cdn.example.com/a.JPG?sig=1"),
            ContentPart::Image { .. }
        ));
        assert!(matches!(
            ContentPart::from_url("https://example.com/docs"),
            ContentPart::UrlRef(_)
        ));
    }

    #[test]
    fn lone_text_content_is_a_plain_string() {
        let text = vec![ContentPart::Text("hello".to_string())];
        assert_eq!(content_value(&text), Value::String("hello".to_string()));

        let mixed = vec![
            ContentPart::Text("hello".to_string()),
            ContentPart::UrlRef("https://example.com".to_string()),
        ];
        let value = content_value(&mixed);
        assert_eq!(value[1]["text"], "Link: https://example.com");
    }
}
