use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use profilescan_core::ScanStatus;

use crate::middleware::RequestId;
use crate::recommender::Dispatch;

use super::scans::parse_scan_id;
use super::{json_body, map_db_error, ApiError, ApiResponse, AppState};

/// The client may echo what it already has; the stored scan is authoritative
/// so the extra fields are only logged.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GenerateRequest {
    #[serde(default)]
    scan_id: String,
    business_data: Option<Value>,
    scan_results: Option<Value>,
    place_details: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(super) enum GenerateStatus {
    Accepted,
    AlreadyCompleted,
    Failed,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GenerateResponse {
    scan_id: Uuid,
    status: GenerateStatus,
}

/// POST /api/v1/generate-recommendations — idempotent trigger.
pub(super) async fn generate_recommendations(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<GenerateResponse>>), ApiError> {
    let rid = &req_id.0;
    let body = json_body(rid, body)?;
    let scan_id = parse_scan_id(rid, &body.scan_id)?;

    let record = state
        .store
        .get_scan(scan_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", "scan not found"))?;

    let status = match record.status {
        ScanStatus::Completed => GenerateStatus::AlreadyCompleted,
        ScanStatus::Failed => GenerateStatus::Failed,
        ScanStatus::Pending => {
            let dispatch = state.recommender.dispatch(&record);
            tracing::debug!(
                %scan_id,
                started = dispatch == Dispatch::Started,
                echoed_business = body.business_data.is_some(),
                echoed_scores = body.scan_results.is_some(),
                echoed_place = body.place_details.is_some(),
                "recommendation generation requested"
            );
            GenerateStatus::Accepted
        }
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::new(GenerateResponse { scan_id, status }, req_id.0)),
    ))
}
