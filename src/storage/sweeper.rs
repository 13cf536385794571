/// Expired Session Sweeps
///
/// A session older than the refresh window can never be validated or rotated
/// again, so its record is dead weight. The sweeper deletes such records on a
/// fixed interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::storage::SessionStore;

/// Delete every session created more than `max_age_seconds` ago
pub async fn sweep_expired_sessions(
    sessions: &dyn SessionStore,
    max_age_seconds: i64,
) -> Result<u64, AppError> {
    let cutoff = Utc::now() - chrono::Duration::seconds(max_age_seconds);
    sessions.delete_created_before(cutoff).await
}

/// Run [`sweep_expired_sessions`] every `every` until the task is aborted.
/// A failed sweep is logged and retried on the next tick.
pub fn spawn_session_sweeper(
    sessions: Arc<dyn SessionStore>,
    max_age_seconds: i64,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match sweep_expired_sessions(sessions.as_ref(), max_age_seconds).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Swept expired sessions"),
                Err(e) => tracing::error!(error = %e, "Expired session sweep failed"),
            }
        }
    })
}
