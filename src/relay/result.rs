use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Result kind a caller expects back from a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedShape {
    AssistantText,
    ModerationVerdict,
    Embeddings,
    RelevanceScores,
    Transcript,
    Audio,
    GeneratedImage,
    SearchResults,
    TokenCount,
}

impl ExpectedShape {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AssistantText => "assistant text",
            Self::ModerationVerdict => "moderation verdict",
            Self::Embeddings => "embedding vectors",
            Self::RelevanceScores => "relevance scores",
            Self::Transcript => "transcript",
            Self::Audio => "audio",
            Self::GeneratedImage => "generated image",
            Self::SearchResults => "search results",
            Self::TokenCount => "token usage",
        }
    }
}

/// Placeholder produced when no extraction rule matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub expected: ExpectedShape,
    /// Top-level keys of the response, sorted.
    pub seen_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "response did not contain {} (top-level keys: [{}])",
            self.expected.as_str(),
            self.seen_keys.join(", ")
        )?;
        if let Some(note) = &self.note {
            write!(f, "; {note}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Parses provider labels, including the Chinese single-character forms.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "high" | "高" => Self::High,
            "medium" | "中" => Self::Medium,
            _ => Self::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModerationVerdict {
    pub risk_level: RiskLevel,
    pub risk_types: Vec<String>,
}

impl ModerationVerdict {
    /// Only high risk is unsafe; medium findings are reported but pass.
    pub fn is_safe(&self) -> bool {
        self.risk_level != RiskLevel::High
    }
}

/// Provider relevance score for one submitted document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredIndex {
    pub index: usize,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedDocument {
    pub text: String,
    pub score: f64,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub content: String,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<String>,
}

/// Normalized outcome of one provider call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CanonicalResult {
    AssistantText {
        text: String,
    },
    ModerationVerdict(ModerationVerdict),
    /// One vector per input, ordered by input index.
    EmbeddingVectors {
        vectors: Vec<Vec<f64>>,
    },
    RelevanceScores {
        scores: Vec<ScoredIndex>,
    },
    RankedDocuments {
        documents: Vec<RankedDocument>,
    },
    Transcript {
        text: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        segments: Vec<Segment>,
    },
    Audio {
        #[serde(skip)]
        bytes: Vec<u8>,
        format: String,
    },
    GeneratedImage {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        local_path: Option<PathBuf>,
    },
    SearchResults {
        hits: Vec<SearchHit>,
    },
    TokenCount {
        prompt_tokens: u64,
    },
    Unmatched(Diagnostic),
}

impl CanonicalResult {
    pub fn is_unmatched(&self) -> bool {
        matches!(self, Self::Unmatched(_))
    }
}
