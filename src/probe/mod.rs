//! Probe module for endpoint health checks.
//!
//! A probe performs exactly one HTTP exchange and never retries. Failures of
//! any kind become a failed [`CheckResult`] rather than an error, because a
//! down endpoint is the condition being monitored.

mod http;

pub use http::*;

use crate::db::{CheckResult, Endpoint};

use chrono::Utc;
use std::time::Duration;
use thiserror::Error;

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Check one endpoint and describe the outcome.
///
/// Success means a response arrived and its status equals the endpoint's
/// expected status. The response time is kept whenever a response arrived.
pub async fn check_endpoint(
    client: &reqwest::Client,
    endpoint: &Endpoint,
    timeout: Duration,
) -> CheckResult {
    // Add jitter to avoid thundering herd
    let jitter = rand::random::<u64>() % 100;
    tokio::time::sleep(Duration::from_millis(jitter)).await;

    let timestamp = Utc::now();

    match run_http_probe(client, endpoint, timeout).await {
        Ok(response) => {
            let success = response.status == endpoint.expected_status;
            let error_message = (!success).then(|| {
                format!(
                    "HTTP {} (expected {})",
                    response.status, endpoint.expected_status
                )
            });
            CheckResult {
                endpoint_id: endpoint.id,
                timestamp,
                success,
                response_time_ms: Some(millis(response.elapsed)),
                observed_status: Some(response.status),
                error_message,
            }
        }
        Err(e) => {
            tracing::debug!("Probe failed for {}: {}", endpoint.name, e);
            CheckResult {
                endpoint_id: endpoint.id,
                timestamp,
                success: false,
                response_time_ms: None,
                observed_status: None,
                error_message: Some(e.to_string()),
            }
        }
    }
}

/// Milliseconds with two decimals of precision.
fn millis(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100_000.0).round() / 100.0
}
