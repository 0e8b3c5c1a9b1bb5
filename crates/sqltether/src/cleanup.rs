//! Best-effort cleanup.
//!
//! Closing cursors, rolling back after a read and closing evicted
//! connections are done purely to release resources. Their failures must not
//! mask the outcome of the operation that triggered them, so they go through
//! [`best_effort`], which logs and discards the error.

use crate::driver::BoxError;

/// Run a cleanup step, logging and discarding any failure.
///
/// Returns `true` if the step succeeded.
pub(crate) fn best_effort<F>(step: &'static str, f: F) -> bool
where
    F: FnOnce() -> Result<(), BoxError>,
{
    match f() {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(step, error = %e, "cleanup step failed, ignoring");
            false
        }
    }
}
