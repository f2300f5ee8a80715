//! Rule-table extraction of canonical results from loosely shaped responses.
//!
//! Every expected shape owns an ordered table of pure rules. Rules are tried
//! in order and the first match wins, even when a later rule would also match.
//! Nothing here returns an error: a response that matches no rule becomes a
//! [`Diagnostic`] listing the top-level keys that were present.

use serde_json::Value;
use tracing::debug;

use crate::relay::result::{
    CanonicalResult, Diagnostic, ExpectedShape, ModerationVerdict, RiskLevel, ScoredIndex,
    SearchHit, Segment,
};
use crate::relay::transport::RawResponse;

type Rule<T> = (&'static str, fn(&Value) -> Option<T>);

const ALTERNATIVE_TEXT_FIELDS: &[&str] = &["answer", "reply", "text", "result", "output"];

const ASSISTANT_TEXT_RULES: &[Rule<String>] = &[
    ("choices.messages", assistant_in_messages),
    ("choices.messages.nested", nested_assistant_in_messages),
    ("choices.message", single_message),
    ("data.choices", data_wrapped_text),
    ("top_level_field", top_level_text),
];

const MODERATION_RULES: &[Rule<ModerationVerdict>] = &[
    ("result_list", |value| verdict_from(&value["result_list"])),
    ("data.result_list", |value| {
        verdict_from(&value["data"]["result_list"])
    }),
];

const EMBEDDING_RULES: &[Rule<Vec<Vec<f64>>>] = &[
    ("data", indexed_embeddings),
    ("embeddings", bare_embeddings),
];

const RELEVANCE_RULES: &[Rule<Vec<ScoredIndex>>] = &[
    ("results", |value| scores_from(&value["results"])),
    ("data", |value| scores_from(&value["data"])),
];

const TRANSCRIPT_RULES: &[Rule<(String, Vec<Segment>)>] = &[
    ("text", transcript_from),
    ("data.text", |value| transcript_from(&value["data"])),
];

const IMAGE_RULES: &[Rule<String>] = &[
    ("data.url", |value| non_blank(&value["data"][0]["url"])),
    ("images.url", |value| non_blank(&value["images"][0]["url"])),
    ("url", |value| non_blank(&value["url"])),
];

const SEARCH_RULES: &[Rule<Vec<SearchHit>>] = &[
    ("search_result", search_hits),
    ("choices.message", |value| {
        single_message(value).map(|content| {
            vec![SearchHit {
                title: "Web search summary".to_string(),
                content,
                link: String::new(),
                publish_date: None,
            }]
        })
    }),
];

const TOKEN_COUNT_RULES: &[Rule<u64>] = &[
    ("usage.prompt_tokens", |value| value["usage"]["prompt_tokens"].as_u64()),
    ("data.usage.prompt_tokens", |value| {
        value["data"]["usage"]["prompt_tokens"].as_u64()
    }),
];

fn first_match<T>(value: &Value, rules: &[Rule<T>], expected: ExpectedShape) -> Option<T> {
    rules.iter().find_map(|(name, rule)| {
        let matched = rule(value);
        if matched.is_some() {
            debug!(rule = *name, expected = expected.as_str(), "extraction rule matched");
        }
        matched
    })
}

pub fn diagnose(value: &Value, expected: ExpectedShape) -> Diagnostic {
    let mut seen_keys: Vec<String> = value
        .as_object()
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();
    seen_keys.sort();
    Diagnostic {
        expected,
        seen_keys,
        note: None,
    }
}

fn run<T>(value: &Value, rules: &[Rule<T>], expected: ExpectedShape) -> Result<T, Diagnostic> {
    first_match(value, rules, expected).ok_or_else(|| diagnose(value, expected))
}

pub fn assistant_text(value: &Value) -> Result<String, Diagnostic> {
    run(value, ASSISTANT_TEXT_RULES, ExpectedShape::AssistantText)
}

pub fn moderation_verdict(value: &Value) -> Result<ModerationVerdict, Diagnostic> {
    run(value, MODERATION_RULES, ExpectedShape::ModerationVerdict)
}

/// Embedding vectors ordered by their declared input index.
pub fn embeddings(value: &Value) -> Result<Vec<Vec<f64>>, Diagnostic> {
    run(value, EMBEDDING_RULES, ExpectedShape::Embeddings)
}

/// Relevance scores ordered by their declared document index.
pub fn relevance_scores(value: &Value) -> Result<Vec<ScoredIndex>, Diagnostic> {
    run(value, RELEVANCE_RULES, ExpectedShape::RelevanceScores)
}

pub fn transcript(value: &Value) -> Result<(String, Vec<Segment>), Diagnostic> {
    run(value, TRANSCRIPT_RULES, ExpectedShape::Transcript)
}

pub fn image_url(value: &Value) -> Result<String, Diagnostic> {
    run(value, IMAGE_RULES, ExpectedShape::GeneratedImage)
}

pub fn search_results(value: &Value) -> Result<Vec<SearchHit>, Diagnostic> {
    run(value, SEARCH_RULES, ExpectedShape::SearchResults)
}

pub fn token_count(value: &Value) -> Result<u64, Diagnostic> {
    run(value, TOKEN_COUNT_RULES, ExpectedShape::TokenCount)
}

/// Extracts from a parsed JSON value. Audio cannot come from JSON.
pub fn extract_json(value: &Value, expected: ExpectedShape) -> CanonicalResult {
    let extracted = match expected {
        ExpectedShape::AssistantText => {
            assistant_text(value).map(|text| CanonicalResult::AssistantText { text })
        }
        ExpectedShape::ModerationVerdict => {
            moderation_verdict(value).map(CanonicalResult::ModerationVerdict)
        }
        ExpectedShape::Embeddings => {
            embeddings(value).map(|vectors| CanonicalResult::EmbeddingVectors { vectors })
        }
        ExpectedShape::RelevanceScores => {
            relevance_scores(value).map(|scores| CanonicalResult::RelevanceScores { scores })
        }
        ExpectedShape::Transcript => transcript(value)
            .map(|(text, segments)| CanonicalResult::Transcript { text, segments }),
        ExpectedShape::GeneratedImage => image_url(value).map(|url| {
            CanonicalResult::GeneratedImage {
                url,
                local_path: None,
            }
        }),
        ExpectedShape::SearchResults => {
            search_results(value).map(|hits| CanonicalResult::SearchResults { hits })
        }
        ExpectedShape::TokenCount => token_count(value)
            .map(|prompt_tokens| CanonicalResult::TokenCount { prompt_tokens }),
        ExpectedShape::Audio => Err(Diagnostic {
            note: Some("expected audio bytes, got a JSON body".to_string()),
            ..diagnose(value, expected)
        }),
    };
    extracted.unwrap_or_else(CanonicalResult::Unmatched)
}

/// Extracts from a raw response body.
pub fn extract(raw: &RawResponse, expected: ExpectedShape) -> CanonicalResult {
    if expected == ExpectedShape::Audio && !raw.is_json() && !raw.body.is_empty() {
        return CanonicalResult::Audio {
            bytes: raw.body.clone(),
            format: audio_format(raw.content_type.as_deref()),
        };
    }

    match raw.json() {
        Ok(value) => extract_json(&value, expected),
        Err(_) if expected == ExpectedShape::Transcript => CanonicalResult::Transcript {
            text: raw.text(),
            segments: Vec::new(),
        },
        Err(err) => CanonicalResult::Unmatched(Diagnostic {
            expected,
            seen_keys: Vec::new(),
            note: Some(format!("body is not JSON: {err}")),
        }),
    }
}

/// Short format name for an audio content type.
pub fn audio_format(content_type: Option<&str>) -> String {
    let essence = content_type
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_lowercase())
        .unwrap_or_default();
    match essence.as_str() {
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav".to_string(),
        "audio/mpeg" | "audio/mp3" => "mp3".to_string(),
        other => match other.split_once('/') {
            Some(("audio", subtype)) if !subtype.is_empty() => subtype.to_string(),
            _ => "bin".to_string(),
        },
    }
}

fn non_blank(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
}

/// A `text` or `content` string inside an object, or inside the first such
/// object of an array of content items.
fn nested_text(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => ["text", "content"]
            .iter()
            .find_map(|key| map.get(*key).and_then(non_blank)),
        Value::Array(items) => items.iter().find_map(nested_text),
        _ => None,
    }
}

fn assistant_messages(value: &Value) -> impl Iterator<Item = &Value> {
    value["choices"][0]["messages"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|message| message["role"].as_str() == Some("assistant"))
}

fn assistant_in_messages(value: &Value) -> Option<String> {
    assistant_messages(value).find_map(|message| non_blank(&message["content"]))
}

fn nested_assistant_in_messages(value: &Value) -> Option<String> {
    assistant_messages(value).find_map(|message| nested_text(&message["content"]))
}

fn single_message(value: &Value) -> Option<String> {
    let content = &value["choices"][0]["message"]["content"];
    non_blank(content).or_else(|| nested_text(content))
}

fn data_wrapped_text(value: &Value) -> Option<String> {
    let data = value.get("data").filter(|data| data.is_object())?;
    assistant_in_messages(data)
        .or_else(|| nested_assistant_in_messages(data))
        .or_else(|| single_message(data))
}

fn top_level_text(value: &Value) -> Option<String> {
    ALTERNATIVE_TEXT_FIELDS
        .iter()
        .find_map(|field| non_blank(&value[*field]))
}

fn risk_types(value: &Value) -> Vec<String> {
    match value {
        Value::String(kind) if !kind.is_empty() => vec![kind.clone()],
        Value::Array(kinds) => kinds
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn verdict_from(list: &Value) -> Option<ModerationVerdict> {
    let entries = list.as_array()?;
    let mut verdict = ModerationVerdict {
        risk_level: RiskLevel::Low,
        risk_types: Vec::new(),
    };
    for entry in entries {
        let level = RiskLevel::parse(entry["risk_level"].as_str().unwrap_or_default());
        if level == RiskLevel::Low {
            continue;
        }
        verdict.risk_level = verdict.risk_level.max(level);
        for kind in risk_types(&entry["risk_type"]) {
            if !verdict.risk_types.contains(&kind) {
                verdict.risk_types.push(kind);
            }
        }
    }
    Some(verdict)
}

fn number_vector(value: &Value) -> Option<Vec<f64>> {
    value.as_array()?.iter().map(Value::as_f64).collect()
}

fn indexed_embeddings(value: &Value) -> Option<Vec<Vec<f64>>> {
    let entries = value["data"].as_array()?;
    let mut indexed = entries
        .iter()
        .enumerate()
        .map(|(position, entry)| {
            let index = entry["index"].as_u64().map_or(position, |index| index as usize);
            number_vector(&entry["embedding"]).map(|vector| (index, vector))
        })
        .collect::<Option<Vec<_>>>()?;
    indexed.sort_by_key(|(index, _)| *index);
    Some(indexed.into_iter().map(|(_, vector)| vector).collect())
}

fn bare_embeddings(value: &Value) -> Option<Vec<Vec<f64>>> {
    value["embeddings"].as_array()?.iter().map(number_vector).collect()
}

fn scores_from(list: &Value) -> Option<Vec<ScoredIndex>> {
    let entries = list.as_array()?;
    let mut scores: Vec<ScoredIndex> = entries
        .iter()
        .filter_map(|entry| {
            Some(ScoredIndex {
                index: entry["index"].as_u64()? as usize,
                score: entry["relevance_score"].as_f64()?,
            })
        })
        .collect();
    if scores.is_empty() && !entries.is_empty() {
        return None;
    }
    scores.sort_by_key(|scored| scored.index);
    Some(scores)
}

fn transcript_from(value: &Value) -> Option<(String, Vec<Segment>)> {
    let text = value["text"].as_str()?.to_string();
    let segments = value["segments"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|segment| {
            Some(Segment {
                start: segment["start"].as_f64()?,
                end: segment["end"].as_f64()?,
                text: segment["text"].as_str()?.to_string(),
            })
        })
        .collect();
    Some((text, segments))
}

fn search_hits(value: &Value) -> Option<Vec<SearchHit>> {
    let entries = value["search_result"].as_array()?;
    let text = |entry: &Value, key: &str| entry[key].as_str().unwrap_or_default().to_string();
    Some(
        entries
            .iter()
            .map(|entry| SearchHit {
                title: text(entry, "title"),
                content: text(entry, "content"),
                link: text(entry, "link"),
                publish_date: non_blank(&entry["publish_date"]),
            })
            .collect(),
    )
}
