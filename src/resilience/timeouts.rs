//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap every store round-trip with a deadline
//! - Cancel operations cleanly on timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors (`StoreError::Timeout`)
//! - A timed-out operation is a server fault; the whole request is safe to retry

use std::future::Future;
use std::time::Duration;

use crate::error::StoreError;

/// Run a store operation, failing with `StoreError::Timeout` after `limit`.
///
/// Dropping the inner future on timeout is the cancellation: store backends
/// must make each operation all-or-nothing so nothing half-applied remains.
pub async fn with_deadline<T, F>(
    operation: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout = ?limit, "Store operation timed out");
            Err(StoreError::Timeout {
                operation,
                after: limit,
            })
        }
    }
}
