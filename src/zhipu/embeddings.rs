use serde::Serialize;

use crate::error::{Result, ZpError};
use crate::relay::envelope::{OperationKind, RequestEnvelope};
use crate::relay::rank::{RankOptions, Ranker};
use crate::relay::result::{CanonicalResult, ExpectedShape, RankedDocument};
use crate::relay::transport::HttpTransport;
use crate::zhipu::client::{Endpoint, ZhipuClient, require_text, unexpected};

pub const DEFAULT_MODEL: &str = "embedding-3";

pub fn embedding_request<S: AsRef<str>>(texts: &[S], model: Option<&str>) -> Result<RequestEnvelope> {
    let mut builder =
        RequestEnvelope::builder(OperationKind::Embedding).model(model.unwrap_or(DEFAULT_MODEL));
    for text in texts {
        builder = builder.text(require_text(text.as_ref(), "embedding input")?);
    }
    builder.build()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embedded {
    pub model: String,
    pub dimensions: usize,
    pub vectors: Vec<Vec<f64>>,
}

impl<T: HttpTransport> ZhipuClient<T> {
    /// One vector per input, in input order.
    pub fn embed<S: AsRef<str>>(&self, texts: &[S], model: Option<&str>) -> Result<Embedded> {
        let envelope = embedding_request(texts, model)?;
        let vectors = match self.execute(&envelope, Endpoint::Embeddings, ExpectedShape::Embeddings)? {
            CanonicalResult::EmbeddingVectors { vectors } => vectors,
            other => return Err(unexpected(other, ExpectedShape::Embeddings)),
        };
        if vectors.len() != texts.len() {
            return Err(ZpError::InvalidInput(format!(
                "expected {} embedding(s), provider returned {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(Embedded {
            model: envelope.model().unwrap_or(DEFAULT_MODEL).to_string(),
            dimensions: vectors.first().map_or(0, Vec::len),
            vectors,
        })
    }

    /// Ranks `candidates` by cosine similarity to `query`, embedding all of
    /// them in a single request.
    pub fn similar<S: AsRef<str>>(
        &self,
        query: &str,
        candidates: &[S],
        model: Option<&str>,
        options: RankOptions,
    ) -> Result<Vec<RankedDocument>> {
        if candidates.is_empty() {
            return Err(ZpError::InvalidInput(
                "at least one candidate is required".to_string(),
            ));
        }
        let mut texts = Vec::with_capacity(candidates.len() + 1);
        texts.push(query);
        texts.extend(candidates.iter().map(|candidate| candidate.as_ref()));

        let embedded = self.embed(&texts, model)?;
        let (query_vector, candidate_vectors) = embedded
            .vectors
            .split_first()
            .ok_or_else(|| ZpError::InvalidInput("provider returned no embeddings".to_string()))?;
        Ok(Ranker::new(options).by_embedding(query_vector, candidates, candidate_vectors))
    }
}
