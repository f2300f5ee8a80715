//! Provider-independent request/response normalization.
//!
//! Payload assembly, retrying transport, fallback dispatch, tolerant response
//! extraction, similarity ranking and batch execution. The provider client in
//! [`crate::zhipu`] composes these for each endpoint.

/// Partial-failure-tolerant batch execution.
pub mod batch;
/// Immutable request envelopes and their wire bodies.
pub mod envelope;
/// Ordered extraction rules per expected result kind.
pub mod extract;
/// One-level primary/fallback dispatch.
pub mod fallback;
/// Multimodal content part assembly.
pub mod payload;
/// Cosine and relevance-score ranking.
pub mod rank;
/// Canonical result types.
pub mod result;
/// Retrying HTTP transport.
pub mod transport;
