//! Zhipu (bigmodel) API client.
//!
//! [`ZhipuClient`] owns the shared retrying transport; each submodule adds the
//! operations for one endpoint family as methods on it.

/// Agent dialogue with chat-completion fallback.
pub mod agent;
/// Client configuration, endpoints and shared call plumbing.
pub mod client;
/// Text embeddings and embedding similarity.
pub mod embeddings;
/// Image generation and download.
pub mod image;
/// Content moderation.
pub mod moderation;
/// Provider-scored document reranking.
pub mod rerank;
/// Text-to-speech.
pub mod speech;
/// Token counting for chat messages.
pub mod tokenizer;
/// Speech-to-text uploads.
pub mod transcription;
/// Multimodal analysis through chat completions.
pub mod vision;
/// Web search.
pub mod web_search;

pub use client::{ClientConfig, Endpoint, ZhipuClient};
