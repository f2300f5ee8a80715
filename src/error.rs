//! Error taxonomy shared by the relay layer and the provider client.

use std::fmt;

use thiserror::Error;

use crate::relay::result::Diagnostic;

/// Last observed failure of an exhausted transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LastFailure {
    /// The server answered with a retryable status.
    Status { status: u16, body: String },
    /// The request never produced a response.
    Transport(String),
}

impl fmt::Display for LastFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { status, body } if body.is_empty() => write!(f, "HTTP {status}"),
            Self::Status { status, body } => write!(f, "HTTP {status}: {body}"),
            Self::Transport(message) => f.write_str(message),
        }
    }
}

#[derive(Debug, Error)]
pub enum ZpError {
    /// Text, files and urls were all empty or unreadable.
    #[error("no usable content: text, files and urls are all empty or unreadable")]
    EmptyPayload,

    #[error("request failed after {attempts} attempt(s): {last}")]
    TransportExhausted { attempts: u32, last: LastFailure },

    #[error("primary request failed ({primary}); fallback request failed ({fallback})")]
    CompositeFallback {
        primary: Box<ZpError>,
        fallback: Box<ZpError>,
    },

    /// Non-retryable HTTP status.
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// The response carried none of the expected fields.
    #[error("{0}")]
    Unmatched(Diagnostic),

    #[error("{key_env} is not set in the environment")]
    MissingApiKey { key_env: &'static str },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ZpError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

pub type Result<T, E = ZpError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_error_mentions_both_causes() {
        let err = ZpError::CompositeFallback {
            primary: Box::new(ZpError::Api {
                status: 404,
                body: "agent not found".to_string(),
            }),
            fallback: Box::new(ZpError::TransportExhausted {
                attempts: 3,
                last: LastFailure::Status {
                    status: 503,
                    body: String::new(),
                },
            }),
        };

        let message = err.to_string();
        assert!(message.contains("agent not found"));
        assert!(message.contains("after 3 attempt(s): HTTP 503"));
    }
}
