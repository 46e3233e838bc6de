//! Scan trigger and status handlers.

use axum::{
    extract::{Query, State},
    http::{header::RETRY_AFTER, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use mentions_scan::{ceil_secs, ScanRejection, ScanRequest};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::{RequestId, UserId};

use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct StartScanRequest {
    pub monitor_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ScanStatusQuery {
    pub monitor_id: Uuid,
}

#[derive(Debug, Serialize)]
pub(super) struct StartedBody {
    pub started: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct InProgressBody {
    pub scan_in_progress: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RetryAfterBody {
    pub retry_after: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CooldownBody {
    /// Seconds until the next manual scan is allowed.
    pub cooldown_remaining: i64,
    pub next_scan_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ScanStatusBody {
    pub is_scanning: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_manual_scan_at: Option<DateTime<Utc>>,
    pub new_match_count: i32,
    pub can_scan: bool,
    pub cooldown_remaining: Option<i64>,
}

fn rejection_response(req_id: &str, rejection: ScanRejection) -> Response {
    tracing::debug!(request_id = req_id, reason = rejection.code(), "scan request rejected");
    match rejection {
        ScanRejection::ScanInProgress => (
            StatusCode::CONFLICT,
            Json(InProgressBody {
                scan_in_progress: true,
            }),
        )
            .into_response(),
        ScanRejection::RateLimited { retry_after_secs } => (
            StatusCode::TOO_MANY_REQUESTS,
            [(RETRY_AFTER, retry_after_secs.to_string())],
            Json(RetryAfterBody {
                retry_after: retry_after_secs,
            }),
        )
            .into_response(),
        ScanRejection::CooldownActive {
            remaining,
            next_scan_at,
        } => (
            StatusCode::BAD_REQUEST,
            Json(CooldownBody {
                cooldown_remaining: ceil_secs(remaining),
                next_scan_at,
            }),
        )
            .into_response(),
        ScanRejection::MonitorNotFound => {
            ApiError::new(req_id, "not_found", "monitor not found").into_response()
        }
        ScanRejection::Store(reason) => {
            tracing::error!(request_id = req_id, %reason, "scan request failed");
            ApiError::new(req_id, "internal_error", "database query failed").into_response()
        }
        other @ (ScanRejection::InactiveMonitor
        | ScanRejection::OutsideScheduleWindow
        | ScanRejection::NothingToScan
        | ScanRejection::QueueUnavailable) => {
            ApiError::new(req_id, other.code(), other.to_string()).into_response()
        }
    }
}

/// POST /api/v1/scan: request a manual scan of one monitor.
pub(super) async fn start_scan(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(UserId(user_id)): Extension<UserId>,
    Json(body): Json<StartScanRequest>,
) -> Response {
    match state
        .queue
        .submit(ScanRequest::manual(body.monitor_id, user_id))
        .await
    {
        Ok(_) => (StatusCode::OK, Json(StartedBody { started: true })).into_response(),
        Err(rejection) => rejection_response(&req_id.0, rejection),
    }
}

/// GET /api/v1/scan/status?monitorId=: current scan state for one monitor.
pub(super) async fn scan_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(UserId(user_id)): Extension<UserId>,
    Query(query): Query<ScanStatusQuery>,
) -> Response {
    match state
        .queue
        .scheduler()
        .scan_status(query.monitor_id, &user_id, Utc::now())
        .await
    {
        Ok(status) => Json(ScanStatusBody {
            is_scanning: status.is_scanning,
            last_checked_at: status.last_checked_at,
            last_manual_scan_at: status.last_manual_scan_at,
            new_match_count: status.new_match_count,
            can_scan: status.can_scan,
            cooldown_remaining: status.cooldown_remaining.map(ceil_secs),
        })
        .into_response(),
        Err(rejection) => rejection_response(&req_id.0, rejection),
    }
}
