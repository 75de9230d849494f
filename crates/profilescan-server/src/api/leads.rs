use std::sync::LazyLock;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use profilescan_core::LeadContact;

use crate::middleware::RequestId;
use crate::store::LeadInput;

use super::scans::parse_scan_id;
use super::{json_body, map_db_error, ApiError, ApiResponse, AppState};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex")
});

const MAX_EMAIL_LEN: usize = 254;
const MAX_PHONE_LEN: usize = 32;
const MAX_POSTCODE_LEN: usize = 16;
const DEFAULT_SOURCE: &str = "scan_results";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CaptureLeadRequest {
    scan_id: Option<String>,
    #[serde(default)]
    email: String,
    phone: Option<String>,
    postcode: Option<String>,
    source: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CaptureLeadResponse {
    lead_id: Uuid,
    scan_id: Option<Uuid>,
}

fn validate_email(req_id: &str, raw: &str) -> Result<String, ApiError> {
    let email = raw.trim();
    if email.len() > MAX_EMAIL_LEN || !EMAIL_RE.is_match(email) {
        return Err(ApiError::new(
            req_id,
            "validation_error",
            "email must be a valid email address",
        ));
    }
    Ok(email.to_owned())
}

/// Blank optional fields are stored as absent.
fn optional_field(
    req_id: &str,
    field: &str,
    value: Option<&str>,
    max_len: usize,
) -> Result<Option<String>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) if v.chars().count() > max_len => Err(ApiError::new(
            req_id,
            "validation_error",
            format!("{field} must be at most {max_len} characters"),
        )),
        Some(v) => Ok(Some(v.to_owned())),
    }
}

/// POST /api/v1/capture-lead — record visitor contact details.
pub(super) async fn capture_lead(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Result<Json<CaptureLeadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CaptureLeadResponse>>), ApiError> {
    let rid = &req_id.0;
    let body = json_body(rid, body)?;

    let scan_id = body
        .scan_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| parse_scan_id(rid, v))
        .transpose()?;

    let lead = LeadInput {
        scan_id,
        contact: LeadContact {
            email: validate_email(rid, &body.email)?,
            phone: optional_field(rid, "phone", body.phone.as_deref(), MAX_PHONE_LEN)?,
            postcode: optional_field(rid, "postcode", body.postcode.as_deref(), MAX_POSTCODE_LEN)?,
        },
        source: body
            .source
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_SOURCE)
            .to_owned(),
    };

    let lead_id = state
        .store
        .capture_lead(&lead)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(%lead_id, scan_id = ?scan_id, source = %lead.source, "lead captured");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            CaptureLeadResponse { lead_id, scan_id },
            req_id.0,
        )),
    ))
}
