//! Uptime views derived on read from the check result log.
//!
//! Nothing here is persisted: every view is recomputed from stored results,
//! so the latest status per endpoint is always the latest stored check.

mod daily;
mod reducer;

pub use daily::*;
pub use reducer::*;

use crate::db::{DbError, Endpoint, EndpointSnapshot, Store};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Current state of one endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStatus {
    pub endpoint: Endpoint,
    pub current_status: bool,
    pub last_check: Option<DateTime<Utc>>,
    /// Response time of the most recent successful check.
    #[serde(rename = "response_time")]
    pub response_time_ms: Option<f64>,
    #[serde(serialize_with = "serialize_percent")]
    pub uptime_90d: f64,
}

impl EndpointStatus {
    pub fn from_snapshot(endpoint: Endpoint, snapshot: &EndpointSnapshot, window: &UptimeWindow) -> Self {
        Self {
            endpoint,
            current_status: snapshot.latest.as_ref().is_some_and(|r| r.success),
            last_check: snapshot.latest.as_ref().map(|r| r.timestamp),
            response_time_ms: snapshot
                .latest_success
                .as_ref()
                .and_then(|r| r.response_time_ms),
            uptime_90d: window.uptime_ratio(&snapshot.window),
        }
    }
}

/// The whole status page.
#[derive(Debug, Clone, Serialize)]
pub struct OverallStatus {
    pub status: ServiceState,
    pub message: String,
    /// In registry order.
    pub endpoints: Vec<EndpointStatus>,
}

impl OverallStatus {
    pub fn new(endpoints: Vec<EndpointStatus>, policy: OutagePolicy) -> Self {
        let (status, message) = reduce_status(endpoints.iter().map(|e| e.current_status), policy);
        Self {
            status,
            message: message.to_string(),
            endpoints,
        }
    }
}

/// Per-day uptime of one endpoint across the window.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointHistory {
    pub endpoint: Endpoint,
    pub daily_uptimes: Vec<DailyUptime>,
}

fn serialize_percent<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round2(*value))
}

/// Build the status page as of `now`.
pub fn overall_status(
    store: &Store,
    policy: OutagePolicy,
    now: DateTime<Utc>,
) -> Result<OverallStatus, DbError> {
    let window = UptimeWindow::ending_at(now);

    let endpoints = store
        .get_endpoints()?
        .into_iter()
        .map(|endpoint| -> Result<EndpointStatus, DbError> {
            let snapshot = store.endpoint_snapshot(endpoint.id, window.start(), window.end())?;
            Ok(EndpointStatus::from_snapshot(endpoint, &snapshot, &window))
        })
        .collect::<Result<Vec<_>, DbError>>()?;

    Ok(OverallStatus::new(endpoints, policy))
}

/// Build the daily history of one endpoint as of `now`.
pub fn endpoint_history(
    store: &Store,
    endpoint_id: i64,
    now: DateTime<Utc>,
) -> Result<EndpointHistory, DbError> {
    let endpoint = store.get_endpoint(endpoint_id)?;
    let window = UptimeWindow::ending_at(now);
    let results = store.get_results(endpoint_id, window.start(), window.end())?;

    Ok(EndpointHistory {
        endpoint,
        daily_uptimes: window.daily_uptimes(&results),
    })
}
