//! HTTP request handlers.

use super::AppState;
use crate::db::{DbError, StoredCheck};
use crate::scheduler::CycleError;
use crate::uptime::{endpoint_history, overall_status};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_CHECKS_LIMIT: u32 = 100;
const MAX_CHECKS_LIMIT: u32 = 1000;

// ============================================================================
// Errors
// ============================================================================

/// Failures surfaced to API clients.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Endpoint not found")]
    EndpointNotFound,
    #[error("{0}")]
    Db(DbError),
    #[error("{0}")]
    Cycle(#[from] CycleError),
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound => ApiError::EndpointNotFound,
            other => ApiError::Db(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::EndpointNotFound => StatusCode::NOT_FOUND,
            ApiError::Db(e) => {
                tracing::error!("Store error while serving request: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Cycle(e) => {
                tracing::error!("Check cycle failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}

// ============================================================================
// API: Status
// ============================================================================

pub async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now(),
    }))
}

pub async fn handle_status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let status = overall_status(&state.store, state.config.outage_policy, Utc::now())?;
    Ok(Json(status))
}

pub async fn handle_get_endpoints(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.get_endpoints()?))
}

pub async fn handle_endpoint_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let history = endpoint_history(&state.store, id, Utc::now())?;
    Ok(Json(history))
}

// ============================================================================
// API: Checks
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChecksQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

/// One stored check as listed by the checks endpoint.
#[derive(Debug, Serialize)]
pub struct ApiCheck {
    pub id: i64,
    pub endpoint_id: i64,
    pub status: bool,
    pub response_time: Option<f64>,
    pub status_code: Option<u16>,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl From<StoredCheck> for ApiCheck {
    fn from(check: StoredCheck) -> Self {
        let StoredCheck { id, result } = check;
        Self {
            id,
            endpoint_id: result.endpoint_id,
            status: result.success,
            response_time: result.response_time_ms,
            status_code: result.observed_status,
            error_message: result.error_message,
            checked_at: result.timestamp,
        }
    }
}

pub async fn handle_recent_checks(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<ChecksQuery>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.get_endpoint(id)?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_CHECKS_LIMIT)
        .min(MAX_CHECKS_LIMIT);

    let checks: Vec<ApiCheck> = state
        .store
        .recent_checks(id, limit)?
        .into_iter()
        .map(ApiCheck::from)
        .collect();

    Ok(Json(checks))
}

#[derive(Debug, Serialize)]
pub struct CheckNowResponse {
    pub message: &'static str,
    pub timestamp: DateTime<Utc>,
    pub checked: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Trigger a check cycle and wait for it to finish, so the response reflects
/// fresh results. Joins the running cycle if there is one.
pub async fn handle_check_now(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let report = state.scheduler.check_now().await?;

    Ok(Json(CheckNowResponse {
        message: "Health checks triggered",
        timestamp: report.finished_at,
        checked: report.checked,
        succeeded: report.succeeded,
        failed: report.failed,
    }))
}
