//! Tagged success/failure records for machine-readable output.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::ZpError;

/// `{"success": true, ...fields}`. Object payloads are flattened into the
/// record; anything else lands under `result`.
pub fn success<T: Serialize>(value: &T) -> Value {
    let mut record = Map::new();
    record.insert("success".to_string(), Value::Bool(true));
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => {
            for (key, field) in fields {
                if key != "success" {
                    record.insert(key, field);
                }
            }
        }
        Ok(other) => {
            record.insert("result".to_string(), other);
        }
        Err(err) => return failure_message(&format!("failed to encode result: {err}")),
    }
    Value::Object(record)
}

pub fn failure(err: &ZpError) -> Value {
    failure_message(&err.to_string())
}

pub fn failure_message(message: &str) -> Value {
    json!({ "success": false, "error": message })
}

/// Converts an operation result into its record.
pub fn from_result<T: Serialize>(result: &Result<T, ZpError>) -> Value {
    match result {
        Ok(value) => success(value),
        Err(err) => failure(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Reply {
        text: String,
    }

    #[test]
    fn success_flattens_object_fields() {
        let record = success(&Reply {
            text: "hello".to_string(),
        });
        assert_eq!(record, json!({ "success": true, "text": "hello" }));
    }

    #[test]
    fn non_object_results_are_nested() {
        assert_eq!(
            success(&vec![1, 2]),
            json!({ "success": true, "result": [1, 2] })
        );
    }

    #[test]
    fn failures_carry_the_error_message() {
        let record = from_result::<()>(&Err(ZpError::EmptyPayload));
        assert_eq!(record["success"], false);
        assert!(
            record["error"]
                .as_str()
                .is_some_and(|message| message.contains("no usable content"))
        );
    }
}
