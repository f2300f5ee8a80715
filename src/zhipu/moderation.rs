use serde::Serialize;

use crate::error::Result;
use crate::relay::batch::{BatchReport, BatchRunner};
use crate::relay::envelope::{OperationKind, RequestEnvelope};
use crate::relay::result::{CanonicalResult, ExpectedShape, ModerationVerdict};
use crate::relay::transport::HttpTransport;
use crate::zhipu::client::{Endpoint, ZhipuClient, require_text, unexpected};

pub const DEFAULT_MODEL: &str = "moderation";

pub fn moderation_request(text: &str, model: Option<&str>) -> Result<RequestEnvelope> {
    let text = require_text(text, "moderation input")?;
    RequestEnvelope::builder(OperationKind::Moderation)
        .model(model.unwrap_or(DEFAULT_MODEL))
        .text(text)
        .build()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModerationOutcome {
    pub safe: bool,
    #[serde(flatten)]
    pub verdict: ModerationVerdict,
}

impl From<ModerationVerdict> for ModerationOutcome {
    fn from(verdict: ModerationVerdict) -> Self {
        Self {
            safe: verdict.is_safe(),
            verdict,
        }
    }
}

/// Batch moderation report with the number of texts judged unsafe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModerationBatch {
    #[serde(flatten)]
    pub report: BatchReport<String, ModerationOutcome>,
    pub unsafe_count: usize,
}

impl<T: HttpTransport> ZhipuClient<T> {
    pub fn moderate(&self, text: &str, model: Option<&str>) -> Result<ModerationOutcome> {
        let envelope = moderation_request(text, model)?;
        match self.execute(&envelope, Endpoint::Moderation, ExpectedShape::ModerationVerdict)? {
            CanonicalResult::ModerationVerdict(verdict) => Ok(verdict.into()),
            other => Err(unexpected(other, ExpectedShape::ModerationVerdict)),
        }
    }

    pub fn moderate_batch(
        &self,
        texts: &[String],
        model: Option<&str>,
        runner: &BatchRunner,
    ) -> ModerationBatch {
        let report = runner.execute(texts, |_, text| self.moderate(text, model));
        let unsafe_count = report
            .results
            .iter()
            .filter_map(|entry| entry.result())
            .filter(|outcome| !outcome.safe)
            .count();
        ModerationBatch {
            report,
            unsafe_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::relay::result::RiskLevel;
    use crate::relay::transport::testing::{ScriptedTransport, json_reply, status_reply};
    use crate::zhipu::client::testing::scripted_client;

    fn risky() -> serde_json::Value {
        json!({
            "result_list": [
                { "content_type": "text", "risk_level": "PASS", "risk_type": [] },
                { "content_type": "text", "risk_level": "high", "risk_type": ["porn"] }
            ]
        })
    }

    #[test]
    fn blank_input_never_reaches_the_network() {
        let client = scripted_client(ScriptedTransport::new());
        assert!(client.moderate("   ", None).is_err());
        assert!(client.transport().inner().seen().is_empty());
    }

    #[test]
    fn verdict_uses_the_highest_risk() {
        let client = scripted_client(
            ScriptedTransport::new().route("/moderations", vec![json_reply(200, risky())]),
        );
        let outcome = client.moderate("something", None).expect("moderation should succeed");

        assert!(!outcome.safe);
        assert_eq!(outcome.verdict.risk_level, RiskLevel::High);
        assert_eq!(outcome.verdict.risk_types, vec!["porn".to_string()]);
    }

    #[test]
    fn batch_counts_unsafe_items_and_keeps_failures() {
        let client = scripted_client(ScriptedTransport::new().route(
            "/moderations",
            vec![
                json_reply(200, json!({ "result_list": [] })),
                json_reply(200, risky()),
                status_reply(400),
            ],
        ));
        let texts = vec!["fine".to_string(), "bad".to_string(), "broken".to_string()];
        let batch = client.moderate_batch(&texts, None, &BatchRunner::default());

        assert_eq!(batch.report.total, 3);
        assert_eq!(batch.report.successful, 2);
        assert_eq!(batch.report.failed, 1);
        assert_eq!(batch.unsafe_count, 1);

        let value = serde_json::to_value(&batch).expect("batch should serialize");
        assert_eq!(value["unsafe_count"], 1);
        assert_eq!(value["total"], 3);
        assert_eq!(value["results"][1]["result"]["risk_level"], "high");
    }

    #[test]
    fn medium_risk_is_reported_but_safe() {
        let client = scripted_client(ScriptedTransport::new().route(
            "/moderations",
            vec![json_reply(
                200,
                json!({ "result_list": [{ "risk_level": "medium", "risk_type": ["ads"] }] }),
            )],
        ));
        let outcome = client.moderate("buy now", None).expect("moderation should succeed");

        assert!(outcome.safe);
        assert_eq!(outcome.verdict.risk_level, RiskLevel::Medium);
        assert_eq!(outcome.verdict.risk_types, vec!["ads".to_string()]);
    }

    #[test]
    fn parallel_batch_moderates_every_text() {
        let client = scripted_client(ScriptedTransport::new().route(
            "/moderations",
            vec![
                json_reply(200, risky()),
                json_reply(200, json!({ "result_list": [] })),
                json_reply(200, json!({ "result_list": [] })),
                json_reply(200, json!({ "result_list": [] })),
            ],
        ));
        let texts: Vec<String> = (1..=4).map(|n| format!("text {n}")).collect();
        let runner = BatchRunner::default().with_concurrency(3);
        let batch = client.moderate_batch(&texts, None, &runner);

        assert_eq!(batch.report.total, 4);
        assert_eq!(batch.report.successful, 4);
        assert_eq!(batch.unsafe_count, 1);
        assert_eq!(client.transport().inner().seen().len(), 4);
        let inputs: Vec<&str> = batch.report.results.iter().map(|entry| entry.input.as_str()).collect();
        assert_eq!(inputs, vec!["text 1", "text 2", "text 3", "text 4"]);
    }
}
