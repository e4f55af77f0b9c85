//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitored HTTP endpoint, as configured in the registry.
///
/// `headers` and `body` are opaque blobs owned by whoever manages the
/// registry; the prober passes them through without validating them here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub method: String,
    pub headers: Option<String>,
    pub body: Option<String>,
    pub expected_status: u16,
    pub created_at: DateTime<Utc>,
}

/// An endpoint definition that has not been stored yet.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEndpoint {
    pub name: String,
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_expected_status() -> u16 {
    200
}

#[cfg(test)]
impl NewEndpoint {
    pub fn get(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            method: default_method(),
            headers: None,
            body: None,
            expected_status: default_expected_status(),
        }
    }
}

/// Outcome of one probe against one endpoint. Never mutated once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub endpoint_id: i64,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// Present whenever a response was received, even with the wrong status.
    pub response_time_ms: Option<f64>,
    pub observed_status: Option<u16>,
    pub error_message: Option<String>,
}

/// A stored check result together with its row id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCheck {
    pub id: i64,
    pub result: CheckResult,
}

/// Everything the status views need for one endpoint, read atomically.
#[derive(Debug, Clone, Default)]
pub struct EndpointSnapshot {
    /// Results inside the requested window, oldest first.
    pub window: Vec<CheckResult>,
    /// Most recent result overall.
    pub latest: Option<CheckResult>,
    /// Most recent successful result overall.
    pub latest_success: Option<CheckResult>,
}
