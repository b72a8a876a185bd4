//! HTTP request handlers.

use super::AppState;
use crate::db::{DbError, Host, HostSnapshot, MetricsReport, ReportAck};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// Trailing window for the endpoint history query.
pub const HISTORY_WINDOW_HOURS: i64 = 24;

// ============================================================================
// Metrics ingestion
// ============================================================================

pub async fn handle_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(report): Json<MetricsReport>,
) -> impl IntoResponse {
    let token = match bearer_token(&headers) {
        Some(token) => token,
        None => return (StatusCode::UNAUTHORIZED, "Missing credentials").into_response(),
    };

    let host = match state.store.get_host_by_token(token) {
        Ok(host) => host,
        Err(DbError::NotFound) => {
            return (StatusCode::UNAUTHORIZED, "Unknown credentials").into_response();
        }
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    // Snapshot time is the receive time, so a skewed agent clock cannot
    // confuse the watchdog.
    if let Err(e) = state.store.upsert_host_metrics(&host.id, Utc::now(), &report) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    let interval = state
        .store
        .get_report_interval()
        .unwrap_or(crate::config::DEFAULT_REPORT_INTERVAL_SECS);
    Json(ReportAck { ok: true, interval }).into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

// ============================================================================
// Status and history queries
// ============================================================================

pub async fn handle_get_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_endpoint(&id) {
        Ok(endpoint) => Json(endpoint).into_response(),
        Err(DbError::NotFound) => (StatusCode::NOT_FOUND, "Endpoint not found").into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_get_endpoint_events(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if let Err(DbError::NotFound) = state.store.get_endpoint(&id) {
        return (StatusCode::NOT_FOUND, "Endpoint not found").into_response();
    }

    let since = Utc::now() - ChronoDuration::hours(HISTORY_WINDOW_HOURS);
    match state.store.get_status_events_since(&id, since) {
        Ok(events) => Json(events).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Serialize)]
pub struct HostStatusResponse {
    pub host: Host,
    pub metrics: Option<HostSnapshot>,
}

pub async fn handle_get_host(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let host = match state.store.get_host(&id) {
        Ok(host) => host,
        Err(DbError::NotFound) => {
            return (StatusCode::NOT_FOUND, "Host not found").into_response();
        }
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    match state.store.get_host_metrics(&id) {
        Ok(metrics) => Json(HostStatusResponse { host, metrics }).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ============================================================================
// Report interval setting
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct IntervalPayload {
    pub interval: u64,
}

pub async fn handle_get_report_interval(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.get_report_interval() {
        Ok(interval) => Json(IntervalPayload { interval }).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_put_report_interval(
    State(state): State<AppState>,
    Json(payload): Json<IntervalPayload>,
) -> impl IntoResponse {
    if payload.interval < 1 {
        return (StatusCode::BAD_REQUEST, "Interval must be at least 1 second").into_response();
    }

    match state.store.set_report_interval(payload.interval) {
        Ok(()) => Json(payload).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
