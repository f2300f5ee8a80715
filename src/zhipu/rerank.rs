use crate::error::{Result, ZpError};
use crate::relay::envelope::{OperationKind, RequestEnvelope};
use crate::relay::rank::{RankOptions, Ranker};
use crate::relay::result::{CanonicalResult, ExpectedShape, RankedDocument};
use crate::relay::transport::HttpTransport;
use crate::zhipu::client::{Endpoint, ZhipuClient, require_text, unexpected};

pub const DEFAULT_MODEL: &str = "rerank";

pub fn rerank_request<S: AsRef<str>>(
    query: &str,
    documents: &[S],
    model: Option<&str>,
) -> Result<RequestEnvelope> {
    let query = require_text(query, "rerank query")?;
    if documents.is_empty() {
        return Err(ZpError::InvalidInput(
            "at least one document is required".to_string(),
        ));
    }
    let mut builder = RequestEnvelope::builder(OperationKind::Rerank)
        .model(model.unwrap_or(DEFAULT_MODEL))
        .tunable("query", query);
    for document in documents {
        builder = builder.text(document.as_ref());
    }
    builder.build()
}

impl<T: HttpTransport> ZhipuClient<T> {
    /// Documents ordered by the provider's relevance scores.
    pub fn rerank<S: AsRef<str>>(
        &self,
        query: &str,
        documents: &[S],
        model: Option<&str>,
        options: RankOptions,
    ) -> Result<Vec<RankedDocument>> {
        let envelope = rerank_request(query, documents, model)?;
        match self.execute(&envelope, Endpoint::Rerank, ExpectedShape::RelevanceScores)? {
            CanonicalResult::RelevanceScores { scores } => {
                Ok(Ranker::new(options).by_relevance(documents, &scores))
            }
            other => Err(unexpected(other, ExpectedShape::RelevanceScores)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::relay::transport::RequestBody;
    use crate::relay::transport::testing::{ScriptedTransport, json_reply};
    use crate::zhipu::client::testing::scripted_client;

    #[test]
    fn body_carries_query_and_documents() {
        let envelope = rerank_request("rust", &["a", "b"], None).expect("envelope should build");
        let RequestBody::Json(body) = envelope.body() else {
            panic!("rerank body should be JSON");
        };
        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["query"], "rust");
        assert_eq!(body["documents"], json!(["a", "b"]));
    }

    #[test]
    fn empty_document_list_is_rejected() {
        assert!(rerank_request::<&str>("rust", &[], None).is_err());
    }

    #[test]
    fn provider_scores_order_the_documents() {
        let client = scripted_client(ScriptedTransport::new().route(
            "/rerank",
            vec![json_reply(
                200,
                json!({
                    "results": [
                        { "index": 0, "relevance_score": 0.12 },
                        { "index": 2, "relevance_score": 0.91 },
                        { "index": 1, "relevance_score": 0.55 }
                    ]
                }),
            )],
        ));
        let ranked = client
            .rerank(
                "borrow checker",
                &["gardening", "lifetimes", "ownership"],
                None,
                RankOptions {
                    top_k: None,
                    threshold: Some(0.5),
                },
            )
            .expect("rerank should succeed");

        let texts: Vec<&str> = ranked.iter().map(|doc| doc.text.as_str()).collect();
        assert_eq!(texts, vec!["ownership", "lifetimes"]);
        assert_eq!(ranked[0].score, 0.91);
    }
}
