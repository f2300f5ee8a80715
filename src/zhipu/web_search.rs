use serde::Serialize;

use crate::error::{Result, ZpError};
use crate::relay::envelope::{OperationKind, RequestEnvelope};
use crate::relay::result::{CanonicalResult, ExpectedShape, SearchHit};
use crate::relay::transport::HttpTransport;
use crate::zhipu::client::{Endpoint, ZhipuClient, require_one_of, require_text, unexpected};

pub const SEARCH_ENGINE: &str = "search_std";
pub const RECENCY_FILTERS: &[&str] = &["noLimit", "day", "week", "month", "year"];
pub const DEFAULT_COUNT: u32 = 10;
pub const MAX_COUNT: u32 = 50;
pub const MAX_QUERY_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub count: u32,
    pub recency: String,
    pub intent: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            count: DEFAULT_COUNT,
            recency: "noLimit".to_string(),
            intent: false,
        }
    }

    pub fn envelope(&self) -> Result<RequestEnvelope> {
        let query = require_text(&self.query, "search query")?;
        if query.chars().count() > MAX_QUERY_CHARS {
            return Err(ZpError::InvalidInput(format!(
                "search query exceeds {MAX_QUERY_CHARS} characters"
            )));
        }
        if !(1..=MAX_COUNT).contains(&self.count) {
            return Err(ZpError::InvalidInput(format!(
                "result count must be between 1 and {MAX_COUNT}"
            )));
        }
        require_one_of(&self.recency, RECENCY_FILTERS, "recency filter")?;

        RequestEnvelope::builder(OperationKind::WebSearch)
            .text(query)
            .tunable("search_engine", SEARCH_ENGINE)
            .tunable("count", self.count)
            .tunable("search_recency_filter", self.recency.as_str())
            .tunable("search_intent", self.intent)
            .build()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub query: String,
    pub total: usize,
    pub hits: Vec<SearchHit>,
}

impl<T: HttpTransport> ZhipuClient<T> {
    pub fn web_search(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        let envelope = request.envelope()?;
        match self.execute(&envelope, Endpoint::WebSearch, ExpectedShape::SearchResults)? {
            CanonicalResult::SearchResults { hits } => Ok(SearchOutcome {
                query: request.query.trim().to_string(),
                total: hits.len(),
                hits,
            }),
            other => Err(unexpected(other, ExpectedShape::SearchResults)),
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
    fn body_has_engine_and_filters() {
        let request = SearchRequest {
            recency: "week".to_string(),
            count: 5,
            ..SearchRequest::new("rust 2024 edition")
        };
        let RequestBody::Json(body) = request.envelope().expect("envelope should build").body()
        else {
            panic!("search body should be JSON");
        };
        assert_eq!(body["search_query"], "rust 2024 edition");
        assert_eq!(body["search_engine"], SEARCH_ENGINE);
        assert_eq!(body["count"], 5);
        assert_eq!(body["search_recency_filter"], "week");
        assert_eq!(body["search_intent"], false);
    }

    #[test]
    fn out_of_range_options_are_rejected() {
        let too_many = SearchRequest {
            count: 51,
            ..SearchRequest::new("q")
        };
        assert!(too_many.envelope().is_err());

        let bad_recency = SearchRequest {
            recency: "decade".to_string(),
            ..SearchRequest::new("q")
        };
        assert!(bad_recency.envelope().is_err());
    }

    #[test]
    fn hits_are_extracted() {
        let client = scripted_client(ScriptedTransport::new().route(
            "/web_search",
            vec![json_reply(
                200,
                json!({
                    "search_result": [
                        { "title": "Rust", "content": "A language", "link": "https://rust-lang.org" }
                    ]
                }),
            )],
        ));
        let outcome = client
            .web_search(&SearchRequest::new("rust"))
            .expect("search should succeed");
        assert_eq!(outcome.total, 1);
        assert_eq!(outcome.hits[0].link, "https://rust-lang.org");
    }
}
