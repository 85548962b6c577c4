//! Best-effort execution of operations whose failure must not escape.
//!
//! Every storage and subscription call in the synchronizer goes through
//! [`attempt`] or [`attempt_async`]: the operation runs once (no retry); on
//! failure the error is logged with its [`SyncError::kind`] and `None` is
//! returned so the caller carries on with its best-known state.

use std::future::Future;

use tracing::warn;

use crate::error::SyncError;

/// Run a fallible operation, logging and discarding its error.
pub fn attempt<T>(operation: &'static str, result: Result<T, SyncError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(operation, kind = e.kind(), error = %e, "Best-effort operation failed");
            None
        }
    }
}

/// Await a fallible operation, logging and discarding its error.
pub async fn attempt_async<T, F>(operation: &'static str, future: F) -> Option<T>
where
    F: Future<Output = Result<T, SyncError>>,
{
    attempt(operation, future.await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_attempt_passes_success_through() {
        assert_eq!(attempt("read", Ok::<_, SyncError>(3)), Some(3));
    }

    #[test]
    fn test_attempt_swallows_failure() {
        let result: Result<u8, SyncError> = Err(StoreError::Poisoned.into());
        assert_eq!(attempt("write", result), None);
    }

    #[tokio::test]
    async fn test_attempt_async_swallows_failure() {
        let outcome = attempt_async("write", async {
            Err::<(), _>(SyncError::Subscription("gone".to_string()))
        })
        .await;
        assert!(outcome.is_none());
    }
}
