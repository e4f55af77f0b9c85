//! Retention manager for cleaning up old check results.

use crate::db::{DbError, Store};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// How often the retention pass runs.
const RETENTION_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Manager for deleting results past the retention horizon.
///
/// Deletion goes through the store lock, so it cannot interleave with an
/// uptime snapshot being read.
pub struct RetentionManager {
    store: Arc<Store>,
    retention_days: i64,
    stop: Arc<Mutex<Option<tokio::sync::broadcast::Sender<()>>>>,
}

impl RetentionManager {
    pub fn new(store: Arc<Store>, retention_days: i64) -> Self {
        Self {
            store,
            retention_days,
            stop: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the retention manager background task.
    pub fn start(&self) {
        let store = self.store.clone();
        let stop = self.stop.clone();
        let retention_days = self.retention_days;

        tokio::spawn(async move {
            let (tx, _) = tokio::sync::broadcast::channel(1);
            {
                let mut stop_guard = stop.lock().await;
                *stop_guard = Some(tx.clone());
            }

            let mut rx = tx.subscribe();
            let mut interval = tokio::time::interval(RETENTION_INTERVAL);

            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = interval.tick() => {
                        if let Err(e) = process_retention(&store, retention_days, Utc::now()) {
                            tracing::error!("RetentionManager: Failed to prune results: {}", e);
                        }
                    }
                }
            }
        });
    }

    /// Stop the retention manager.
    pub async fn stop(&self) {
        let stop = self.stop.lock().await;
        if let Some(tx) = stop.as_ref() {
            let _ = tx.send(());
        }
    }
}

/// Delete results older than `retention_days` before `now`.
///
/// A horizon reaching past the earliest representable time deletes nothing.
pub fn process_retention(store: &Store, retention_days: i64, now: DateTime<Utc>) -> Result<usize, DbError> {
    let Some(cutoff) = ChronoDuration::try_days(retention_days)
        .and_then(|horizon| now.checked_sub_signed(horizon))
    else {
        return Ok(0);
    };
    let deleted = store.delete_results_before(cutoff)?;

    if deleted > 0 {
        tracing::info!(
            "RetentionManager: Deleted {} results older than {}",
            deleted,
            cutoff.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CheckResult;
    use crate::uptime::UptimeWindow;
    use chrono::TimeZone;
    use tempfile::NamedTempFile;

    #[test]
    fn test_retention_keeps_uptime_window() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 0, 30, 0).unwrap();
        let window = UptimeWindow::ending_at(now);

        for ts in [
            window.start() - ChronoDuration::days(5),
            window.start(),
            now - ChronoDuration::minutes(1),
        ] {
            store
                .append_result(&CheckResult {
                    endpoint_id: 1,
                    timestamp: ts,
                    success: true,
                    response_time_ms: Some(1.0),
                    observed_status: Some(200),
                    error_message: None,
                })
                .unwrap();
        }

        assert_eq!(process_retention(&store, 90, now).unwrap(), 1);
        assert_eq!(process_retention(&store, 90, now).unwrap(), 0);

        let kept = store.get_results(1, window.start(), window.end()).unwrap();
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_unbounded_horizon_deletes_nothing() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Store::new(tmp.path()).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 0, 30, 0).unwrap();

        store
            .append_result(&CheckResult {
                endpoint_id: 1,
                timestamp: now - ChronoDuration::days(400),
                success: false,
                response_time_ms: None,
                observed_status: None,
                error_message: Some("timeout".to_string()),
            })
            .unwrap();

        assert_eq!(process_retention(&store, 1_000_000_000, now).unwrap(), 0);
        assert_eq!(process_retention(&store, i64::MAX, now).unwrap(), 0);
        assert_eq!(process_retention(&store, 365, now).unwrap(), 1);
    }
}
