//! Configuration module for Statusboard.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::uptime::{OutagePolicy, UPTIME_WINDOW_DAYS};

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Interval between periodic check cycles.
///
/// The dashboard refreshes on the same cadence and prints it in its footer,
/// so this is not exposed as a runtime setting.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Upper bound on `STATUSBOARD_RETENTION_DAYS` (100 years).
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "statusboard.db")
    pub db_path: String,
    /// Per-probe timeout (default: 10s)
    pub probe_timeout: Duration,
    /// Maximum probes in flight within one cycle (default: 16)
    pub max_concurrent_probes: usize,
    /// Days of raw check results to keep (default and minimum: 90)
    pub retention_days: i64,
    /// How mixed endpoint states reduce to an overall status
    pub outage_policy: OutagePolicy,
    /// Optional JSON file of endpoints to register at startup
    pub seed_file: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "statusboard.db".to_string(),
            probe_timeout: Duration::from_secs(10),
            max_concurrent_probes: 16,
            retention_days: UPTIME_WINDOW_DAYS,
            outage_policy: OutagePolicy::AllDown,
            seed_file: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `STATUSBOARD_HTTP_PORT`: HTTP port (default: 8080)
    /// - `STATUSBOARD_DB_PATH`: Database file path (default: "statusboard.db")
    /// - `STATUSBOARD_PROBE_TIMEOUT_SECS`: Probe timeout in seconds (default: 10)
    /// - `STATUSBOARD_MAX_CONCURRENT_PROBES`: Probe fan-out bound (default: 16)
    /// - `STATUSBOARD_RETENTION_DAYS`: Result retention in days (default: 90)
    /// - `STATUSBOARD_OUTAGE_THRESHOLD`: Percent of failing endpoints that
    ///   counts as a major outage (default: unset, meaning all of them)
    /// - `STATUSBOARD_SEED_FILE`: Endpoint seed file (default: unset)
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = parse_var(&lookup, "STATUSBOARD_HTTP_PORT") {
            cfg.http_port = port;
        }

        if let Some(db_path) = lookup("STATUSBOARD_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(secs) = parse_var::<f64, _>(&lookup, "STATUSBOARD_PROBE_TIMEOUT_SECS") {
            match Duration::try_from_secs_f64(secs) {
                Ok(timeout) if !timeout.is_zero() => cfg.probe_timeout = timeout,
                _ => tracing::warn!("Ignoring out-of-range probe timeout {}", secs),
            }
        }

        if let Some(max) = parse_var::<usize, _>(&lookup, "STATUSBOARD_MAX_CONCURRENT_PROBES") {
            cfg.max_concurrent_probes = max.max(1);
        }

        if let Some(days) = parse_var::<i64, _>(&lookup, "STATUSBOARD_RETENTION_DAYS") {
            if days < UPTIME_WINDOW_DAYS {
                tracing::warn!(
                    "Retention of {} days is shorter than the uptime window, using {}",
                    days,
                    UPTIME_WINDOW_DAYS
                );
            }
            if days > MAX_RETENTION_DAYS {
                tracing::warn!(
                    "Retention of {} days is too long, using {}",
                    days,
                    MAX_RETENTION_DAYS
                );
            }
            cfg.retention_days = days.clamp(UPTIME_WINDOW_DAYS, MAX_RETENTION_DAYS);
        }

        if let Some(threshold) = parse_var::<f64, _>(&lookup, "STATUSBOARD_OUTAGE_THRESHOLD") {
            if threshold > 0.0 && threshold <= 100.0 {
                cfg.outage_policy = OutagePolicy::Threshold {
                    major_percent: threshold,
                };
            } else {
                tracing::warn!("Ignoring out-of-range outage threshold {}", threshold);
            }
        }

        if let Some(path) = lookup("STATUSBOARD_SEED_FILE") {
            if !path.is_empty() {
                cfg.seed_file = Some(path);
            }
        }

        cfg
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring unparsable value for {}: {:?}", key, raw);
            None
        }
    }
}
