//! Scheduler module for running check cycles and pruning old results.
//!
//! A cycle probes every registered endpoint once. Cycles run on a fixed
//! interval and on demand, and never overlap: a caller asking for a cycle
//! while one is running waits for that one instead of starting another.

mod retention;

pub use retention::*;

use crate::db::{CheckResult, Endpoint, Store};
use crate::probe::{build_client, check_endpoint, ProbeError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, watch, Mutex, Notify, Semaphore};
use tokio::task::JoinSet;

/// Why a cycle did not complete cleanly.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CycleError {
    #[error("failed to read endpoint registry: {0}")]
    Registry(String),
    #[error("failed to store {failed} of {attempted} check results")]
    Persist { failed: usize, attempted: usize },
    #[error("check cycle aborted before completing")]
    Aborted,
}

/// Summary of a finished cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub checked: usize,
    pub succeeded: usize,
    pub failed: usize,
}

type CycleOutcome = Result<CycleReport, CycleError>;

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub probe_timeout: Duration,
    pub max_concurrent_probes: usize,
}

/// Drives periodic and on-demand check cycles.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<Store>,
    client: reqwest::Client,
    config: SchedulerConfig,
    /// Completion channel of the cycle in flight, if any.
    in_flight: Arc<Mutex<Option<watch::Receiver<Option<CycleOutcome>>>>>,
    timer_reset: Arc<Notify>,
    stop: broadcast::Sender<()>,
}

impl Scheduler {
    /// Create a new scheduler with the given store.
    pub fn new(store: Arc<Store>, config: SchedulerConfig) -> Result<Self, ProbeError> {
        let client = build_client(config.probe_timeout)?;
        let (stop, _) = broadcast::channel(1);

        Ok(Self {
            store,
            client,
            config,
            in_flight: Arc::new(Mutex::new(None)),
            timer_reset: Arc::new(Notify::new()),
            stop,
        })
    }

    /// Start the periodic loop. The first cycle runs immediately.
    pub fn start(&self) {
        let scheduler = self.clone();
        let mut stop_rx = self.stop.subscribe();

        tracing::info!(
            "Starting scheduler: cycle every {:?}, probe timeout {:?}, up to {} probes in flight",
            self.config.interval,
            self.config.probe_timeout,
            self.config.max_concurrent_probes
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.config.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = scheduler.timer_reset.notified() => {
                        interval.reset();
                    }
                    _ = interval.tick() => {
                        if let Err(e) = scheduler.run_cycle(false).await {
                            tracing::error!("Scheduled check cycle failed: {}", e);
                        }
                    }
                }
            }

            tracing::info!("Scheduler stopped");
        });
    }

    /// Stop the periodic loop. A cycle already running is left to finish.
    pub fn stop(&self) {
        let _ = self.stop.send(());
    }

    /// Run a cycle now, or join the one already running, and wait for it.
    ///
    /// Starting a fresh cycle also pushes the next periodic cycle a full
    /// interval into the future.
    pub async fn check_now(&self) -> CycleOutcome {
        self.run_cycle(true).await
    }

    async fn run_cycle(&self, reset_timer: bool) -> CycleOutcome {
        let mut done = {
            let mut in_flight = self.in_flight.lock().await;
            // A closed channel means the cycle task died without reporting
            match in_flight.as_ref().filter(|rx| rx.has_changed().is_ok()) {
                Some(rx) => {
                    tracing::debug!("Check cycle already running, waiting for it");
                    rx.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    *in_flight = Some(rx.clone());

                    // The cycle runs in its own task so that a caller going
                    // away does not cancel it.
                    let scheduler = self.clone();
                    tokio::spawn(async move {
                        let outcome = scheduler.execute_cycle().await;
                        scheduler.in_flight.lock().await.take();
                        tx.send_replace(Some(outcome));
                    });

                    if reset_timer {
                        self.timer_reset.notify_one();
                    }
                    rx
                }
            }
        };

        let outcome = match done.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Err(CycleError::Aborted)),
            Err(_) => Err(CycleError::Aborted),
        };
        outcome
    }

    /// Probe every registered endpoint once, with bounded fan-out.
    async fn execute_cycle(&self) -> CycleOutcome {
        let started_at = Utc::now();
        let clock = Instant::now();

        let endpoints = self
            .store
            .get_endpoints()
            .map_err(|e| CycleError::Registry(e.to_string()))?;

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_probes.max(1)));
        let mut probes = JoinSet::new();

        for endpoint in endpoints {
            let semaphore = semaphore.clone();
            let scheduler = self.clone();
            probes.spawn(async move {
                // The semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                scheduler.probe_and_record(&endpoint).await
            });
        }

        let mut report = CycleReport {
            started_at,
            finished_at: started_at,
            checked: 0,
            succeeded: 0,
            failed: 0,
        };
        let mut write_failures = 0;

        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(Some(result)) => {
                    report.checked += 1;
                    if result.success {
                        report.succeeded += 1;
                    } else {
                        report.failed += 1;
                    }
                }
                Ok(None) => write_failures += 1,
                Err(e) => {
                    tracing::error!("Probe task failed: {}", e);
                    write_failures += 1;
                }
            }
        }

        report.finished_at = Utc::now();
        tracing::info!(
            "Check cycle complete: {} endpoints, {} up, {} down in {:?}",
            report.checked + write_failures,
            report.succeeded,
            report.failed,
            clock.elapsed()
        );

        if write_failures > 0 {
            return Err(CycleError::Persist {
                failed: write_failures,
                attempted: report.checked + write_failures,
            });
        }

        Ok(report)
    }

    /// Probe one endpoint and append the result. Returns `None` when the
    /// result could not be stored.
    async fn probe_and_record(&self, endpoint: &Endpoint) -> Option<CheckResult> {
        let result = check_endpoint(&self.client, endpoint, self.config.probe_timeout).await;

        match self.store.append_result(&result) {
            Ok(_) => Some(result),
            Err(e) => {
                tracing::error!("Failed to store check result for {}: {}", endpoint.name, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewEndpoint;
    use crate::testutil::{serve, test_router};
    use crate::uptime::{overall_status, OutagePolicy, ServiceState};
    use tempfile::NamedTempFile;
    use tokio_test::{assert_err, assert_ok};

    fn test_config(probe_timeout: Duration) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(3600),
            probe_timeout,
            max_concurrent_probes: 4,
        }
    }

    fn count_results(store: &Store, endpoint_id: i64) -> usize {
        let start = Utc::now() - chrono::Duration::days(1);
        let end = Utc::now() + chrono::Duration::days(1);
        store.get_results(endpoint_id, start, end).unwrap().len()
    }

    #[tokio::test]
    async fn test_cycle_with_healthy_and_hung_endpoint() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let addr = serve(test_router()).await;

        let a = store.add_endpoint(&NewEndpoint::get("A", &format!("http://{addr}/ok"))).unwrap();
        let b = store.add_endpoint(&NewEndpoint::get("B", &format!("http://{addr}/hang"))).unwrap();

        let scheduler = Scheduler::new(store.clone(), test_config(Duration::from_millis(300))).unwrap();
        let report = assert_ok!(scheduler.check_now().await);
        assert_eq!(report.checked, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);

        let status = overall_status(&store, OutagePolicy::AllDown, Utc::now()).unwrap();
        assert_eq!(status.status, ServiceState::PartialOutage);
        assert_eq!(status.endpoints[0].endpoint.id, a.id);
        assert!(status.endpoints[0].current_status);
        assert_eq!(status.endpoints[1].endpoint.id, b.id);
        assert!(!status.endpoints[1].current_status);

        let hung = store.recent_checks(b.id, 1).unwrap();
        assert_eq!(hung[0].result.response_time_ms, None);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_share_one_cycle() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let addr = serve(test_router()).await;

        let a = store.add_endpoint(&NewEndpoint::get("A", &format!("http://{addr}/ok"))).unwrap();
        let b = store.add_endpoint(&NewEndpoint::get("B", &format!("http://{addr}/hang"))).unwrap();

        let scheduler = Scheduler::new(store.clone(), test_config(Duration::from_millis(300))).unwrap();
        let (first, second) = tokio::join!(scheduler.check_now(), scheduler.check_now());

        assert_eq!(assert_ok!(first.clone()), assert_ok!(second));
        assert_eq!(count_results(&store, a.id), 1);
        assert_eq!(count_results(&store, b.id), 1);

        // once finished, the next trigger starts a new cycle
        assert_ok!(scheduler.check_now().await);
        assert_eq!(count_results(&store, a.id), 2);
    }

    #[tokio::test]
    async fn test_hung_endpoint_does_not_block_others() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let addr = serve(test_router()).await;

        for i in 0..6 {
            let path = if i % 2 == 0 { "hang" } else { "ok" };
            store
                .add_endpoint(&NewEndpoint::get(&format!("E{i}"), &format!("http://{addr}/{path}")))
                .unwrap();
        }

        let mut config = test_config(Duration::from_millis(300));
        config.max_concurrent_probes = 2;
        let scheduler = Scheduler::new(store.clone(), config).unwrap();

        let started = Instant::now();
        let report = assert_ok!(scheduler.check_now().await);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(report.checked, 6);
        assert_eq!(report.succeeded, 3);
    }

    #[tokio::test]
    async fn test_results_are_monotonic_per_endpoint() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let addr = serve(test_router()).await;
        let a = store.add_endpoint(&NewEndpoint::get("A", &format!("http://{addr}/ok"))).unwrap();

        let scheduler = Scheduler::new(store.clone(), test_config(Duration::from_secs(2))).unwrap();
        for _ in 0..3 {
            assert_ok!(scheduler.check_now().await);
        }

        let start = Utc::now() - chrono::Duration::days(1);
        let results = store.get_results(a.id, start, Utc::now() + chrono::Duration::days(1)).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[tokio::test]
    async fn test_empty_registry_cycle() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let scheduler = Scheduler::new(store, test_config(Duration::from_secs(1))).unwrap();

        let report = assert_ok!(scheduler.check_now().await);
        assert_eq!(report.checked, 0);
    }

    #[tokio::test]
    async fn test_periodic_loop_runs_first_cycle_immediately() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let addr = serve(test_router()).await;
        let a = store.add_endpoint(&NewEndpoint::get("A", &format!("http://{addr}/ok"))).unwrap();

        let scheduler = Scheduler::new(store.clone(), test_config(Duration::from_secs(2))).unwrap();
        scheduler.start();

        let mut seen = 0;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            seen = count_results(&store, a.id);
            if seen > 0 {
                break;
            }
        }
        scheduler.stop();
        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn test_check_now_resets_periodic_timer() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let addr = serve(test_router()).await;
        let a = store.add_endpoint(&NewEndpoint::get("A", &format!("http://{addr}/ok"))).unwrap();

        let mut config = test_config(Duration::from_secs(1));
        config.interval = Duration::from_secs(2);
        let scheduler = Scheduler::new(store.clone(), config).unwrap();
        scheduler.start();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_ok!(scheduler.check_now().await);

        // the tick due at 2s was pushed back to ~3.5s
        tokio::time::sleep(Duration::from_millis(1200)).await;
        scheduler.stop();
        assert_eq!(count_results(&store, a.id), 2);
    }

    #[tokio::test]
    async fn test_store_write_failure_fails_cycle() {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let addr = serve(test_router()).await;
        store.add_endpoint(&NewEndpoint::get("A", &format!("http://{addr}/ok"))).unwrap();
        store.add_endpoint(&NewEndpoint::get("B", &format!("http://{addr}/fail"))).unwrap();

        rusqlite::Connection::open(tmp.path())
            .unwrap()
            .execute_batch("DROP TABLE check_results")
            .unwrap();

        let scheduler = Scheduler::new(store, test_config(Duration::from_millis(300))).unwrap();
        let err = assert_err!(scheduler.check_now().await);
        assert_eq!(err, CycleError::Persist { failed: 2, attempted: 2 });
    }

    #[test]
    fn test_cycle_error_messages() {
        let err: CycleOutcome = Err(CycleError::Persist { failed: 1, attempted: 3 });
        let err = assert_err!(err);
        assert_eq!(err.to_string(), "failed to store 1 of 3 check results");
    }
}
