use serde::Serialize;
use tracing::warn;

use crate::error::{Result, ZpError};

/// Value produced by a primary or fallback path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dispatched<T> {
    pub value: T,
    /// True when the fallback produced the value.
    pub degraded: bool,
    /// Why the primary path was abandoned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl<T> Dispatched<T> {
    pub fn primary(value: T) -> Self {
        Self {
            value,
            degraded: false,
            reason: None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Dispatched<U> {
        Dispatched {
            value: f(self.value),
            degraded: self.degraded,
            reason: self.reason,
        }
    }
}

/// Runs `primary`; on any failure runs `fallback` once. When both fail the
/// error carries both causes.
pub fn dispatch_with_fallback<T, P, F>(primary: P, fallback: F) -> Result<Dispatched<T>>
where
    P: FnOnce() -> Result<T>,
    F: FnOnce() -> Result<T>,
{
    let primary_err = match primary() {
        Ok(value) => return Ok(Dispatched::primary(value)),
        Err(err) => err,
    };
    warn!(error = %primary_err, "primary path failed, trying fallback");

    match fallback() {
        Ok(value) => Ok(Dispatched {
            value,
            degraded: true,
            reason: Some(primary_err.to_string()),
        }),
        Err(fallback_err) => Err(ZpError::CompositeFallback {
            primary: Box::new(primary_err),
            fallback: Box::new(fallback_err),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn not_found() -> ZpError {
        ZpError::Api {
            status: 404,
            body: "agent not found".to_string(),
        }
    }

    #[test]
    fn primary_success_never_touches_fallback() {
        let fallback_calls = Cell::new(0);
        let dispatched = dispatch_with_fallback(
            || Ok("primary"),
            || {
                fallback_calls.set(fallback_calls.get() + 1);
                Ok("fallback")
            },
        )
        .expect("primary should succeed");

        assert_eq!(dispatched.value, "primary");
        assert!(!dispatched.degraded);
        assert_eq!(fallback_calls.get(), 0);
    }

    #[test]
    fn fallback_result_is_marked_degraded() {
        let dispatched = dispatch_with_fallback(|| Err(not_found()), || Ok(42))
            .expect("fallback should succeed");

        assert_eq!(dispatched.value, 42);
        assert!(dispatched.degraded);
        assert!(
            dispatched
                .reason
                .as_deref()
                .is_some_and(|reason| reason.contains("404"))
        );
    }

    #[test]
    fn double_failure_is_composite() {
        let err = dispatch_with_fallback::<(), _, _>(
            || Err(not_found()),
            || Err(ZpError::InvalidInput("fallback model rejected".to_string())),
        )
        .expect_err("both paths failed");

        match err {
            ZpError::CompositeFallback { primary, fallback } => {
                assert!(matches!(*primary, ZpError::Api { status: 404, .. }));
                assert!(fallback.to_string().contains("fallback model rejected"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
