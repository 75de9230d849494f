use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::sse::{Event, KeepAlive, KeepAliveStream, Sse},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use uuid::Uuid;

use profilescan_core::{
    PlaceSummary, RecommendationPayload, RecommendationSource, ScanRecord, ScanRequest,
    ScanResult, ScanStatus, ScoreSet,
};

use crate::middleware::RequestId;
use crate::orchestrator::ScanError;
use crate::store::ScanStore;

use super::{json_body, map_db_error, ApiError, ApiResponse, AppState};

const MAX_FIELD_LEN: usize = 200;

type EventStream = Sse<KeepAliveStream<BoxStream<'static, Result<Event, Infallible>>>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateScanRequest {
    #[serde(default)]
    business_name: String,
    #[serde(default)]
    business_location: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ScanView {
    scan_id: Uuid,
    business_name: String,
    business_location: String,
    status: ScanStatus,
    scores: ScoreSet,
    place_summary: PlaceSummary,
    recommendations: Option<RecommendationPayload>,
    recommendation_source: Option<RecommendationSource>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ScanRecord> for ScanView {
    fn from(record: ScanRecord) -> Self {
        Self {
            scan_id: record.id,
            business_name: record.business_name,
            business_location: record.business_location,
            status: record.status,
            scores: record.scores,
            place_summary: record.place_summary,
            recommendations: record.recommendations,
            recommendation_source: record.recommendation_source,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Payload of the single event a stream emits.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecommendationEvent<'a> {
    scan_id: Uuid,
    status: ScanStatus,
    recommendations: Option<&'a RecommendationPayload>,
    recommendation_source: Option<RecommendationSource>,
}

fn required_field(req_id: &str, field: &str, value: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::new(
            req_id,
            "validation_error",
            format!("{field} is required"),
        ));
    }
    if trimmed.chars().count() > MAX_FIELD_LEN {
        return Err(ApiError::new(
            req_id,
            "validation_error",
            format!("{field} must be at most {MAX_FIELD_LEN} characters"),
        ));
    }
    Ok(trimmed.to_owned())
}

pub(super) fn parse_scan_id(req_id: &str, raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| {
        ApiError::new(
            req_id,
            "validation_error",
            format!("'{raw}' is not a valid scan id"),
        )
    })
}

fn scan_error_response(req_id: &str, err: &ScanError) -> ApiError {
    ApiError::new(req_id, err.code(), err.public_message())
}

/// POST /api/v1/scan — resolve, score and store a business profile scan.
pub(super) async fn create_scan(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    body: Result<Json<CreateScanRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ScanResult>>, ApiError> {
    let rid = &req_id.0;
    let body = json_body(rid, body)?;

    let request = ScanRequest::new(
        required_field(rid, "businessName", &body.business_name)?,
        required_field(rid, "businessLocation", &body.business_location)?,
    );

    let result = state
        .orchestrator
        .start_scan(&request)
        .await
        .map_err(|e| scan_error_response(rid, &e))?;

    Ok(Json(ApiResponse::new(result, req_id.0)))
}

/// GET /api/v1/scans/{scan_id}
pub(super) async fn get_scan(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse<ScanView>>, ApiError> {
    let rid = &req_id.0;
    let scan_id = parse_scan_id(rid, &raw_id)?;

    let record = state
        .store
        .get_scan(scan_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", "scan not found"))?;

    Ok(Json(ApiResponse::new(ScanView::from(record), req_id.0)))
}

/// GET /api/v1/scans/{scan_id}/events — one event once the scan leaves
/// `pending`, then the stream ends.
pub(super) async fn scan_events(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(raw_id): Path<String>,
) -> Result<EventStream, ApiError> {
    let rid = &req_id.0;
    let scan_id = parse_scan_id(rid, &raw_id)?;

    // Subscribe before the read so a write landing in between is not missed.
    let updates = BroadcastStream::new(state.events.subscribe());

    let record = state
        .store
        .get_scan(scan_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", "scan not found"))?;

    if let Some(event) = terminal_event(&record) {
        let once = stream::once(async move { Ok(event) }).boxed();
        return Ok(Sse::new(once).keep_alive(KeepAlive::default()));
    }

    let store = Arc::clone(&state.store);
    let events = updates
        .filter_map(move |update| {
            let store = Arc::clone(&store);
            async move { recheck(store.as_ref(), scan_id, update).await }
        })
        .take(1)
        .map(Ok)
        .boxed();

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

async fn recheck(
    store: &dyn ScanStore,
    scan_id: Uuid,
    update: Result<Uuid, BroadcastStreamRecvError>,
) -> Option<Event> {
    match update {
        Ok(id) if id == scan_id => {}
        Ok(_) => return None,
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(%scan_id, skipped, "scan event subscriber lagged; re-reading scan");
        }
    }
    match store.get_scan(scan_id).await {
        Ok(Some(record)) => terminal_event(&record),
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(%scan_id, error = %e, "failed to re-read scan for event stream");
            None
        }
    }
}

/// `None` while the scan is still pending.
fn terminal_event(record: &ScanRecord) -> Option<Event> {
    let name = match record.status {
        ScanStatus::Pending => return None,
        ScanStatus::Completed => "recommendations",
        ScanStatus::Failed => "failed",
    };
    let body = RecommendationEvent {
        scan_id: record.id,
        status: record.status,
        recommendations: record.recommendations.as_ref(),
        recommendation_source: record.recommendation_source,
    };
    Event::default()
        .event(name)
        .json_data(body)
        .inspect_err(|e| tracing::error!(scan_id = %record.id, error = %e, "failed to encode scan event"))
        .ok()
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;

    use super::super::test_support::{get, post_json, send, test_app};
    use crate::store::ScanStore;
    use crate::testing::{
        joes_plumbing, sample_payload, FakePlaces, ReadyEngine, SilentEngine,
    };
    use profilescan_core::{score, Priority, RecommendationSource, ScanRequest};
    use profilescan_places::PlacesError;

    fn scan_body() -> serde_json::Value {
        json!({ "businessName": "Joe's Plumbing", "businessLocation": "Manchester" })
    }

    #[tokio::test]
    async fn create_scan_returns_scores_and_summary() {
        let t = test_app(FakePlaces::found(joes_plumbing()), SilentEngine, 10);

        let (status, json) = send(&t.app, post_json("/api/v1/scan", &scan_body())).await;

        assert_eq!(status, StatusCode::OK);
        let expected = score(&joes_plumbing());
        assert_eq!(json["data"]["scores"]["overall"], expected.overall);
        assert_eq!(json["data"]["placeSummary"]["name"], "Joe's Plumbing & Heating");
        assert!(json["data"]["scanId"].is_string());
        assert_eq!(t.store.len(), 1);
    }

    #[tokio::test]
    async fn blank_name_is_validation_error() {
        let t = test_app(FakePlaces::found(joes_plumbing()), SilentEngine, 10);
        let body = json!({ "businessName": "   ", "businessLocation": "Manchester" });

        let (status, json) = send(&t.app, post_json("/api/v1/scan", &body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "validation_error");
        assert_eq!(t.store.len(), 0);
    }

    #[tokio::test]
    async fn overlong_location_is_validation_error() {
        let t = test_app(FakePlaces::found(joes_plumbing()), SilentEngine, 10);
        let body = json!({ "businessName": "Joe's", "businessLocation": "x".repeat(201) });

        let (status, _) = send(&t.app, post_json("/api/v1/scan", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_json_is_validation_error() {
        let t = test_app(FakePlaces::found(joes_plumbing()), SilentEngine, 10);
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/v1/scan")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap();

        let (status, json) = send(&t.app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "validation_error");
    }

    #[tokio::test]
    async fn unknown_business_is_not_found_with_hint() {
        let t = test_app(FakePlaces::not_found(), SilentEngine, 10);

        let (status, json) = send(&t.app, post_json("/api/v1/scan", &scan_body())).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "not_found");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("postcode"));
    }

    #[tokio::test]
    async fn missing_places_key_is_service_unavailable() {
        let t = test_app(
            FakePlaces::failing(|| {
                PlacesError::Configuration("GOOGLE_PLACES_API_KEY is not set".to_owned())
            }),
            SilentEngine,
            10,
        );

        let (status, json) = send(&t.app, post_json("/api/v1/scan", &scan_body())).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"]["code"], "service_unavailable");
        assert!(!json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("GOOGLE"));
    }

    #[tokio::test]
    async fn scan_endpoint_is_rate_limited() {
        let t = test_app(FakePlaces::found(joes_plumbing()), SilentEngine, 2);

        for _ in 0..2 {
            let (status, _) = send(&t.app, post_json("/api/v1/scan", &scan_body())).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, json) = send(&t.app, post_json("/api/v1/scan", &scan_body())).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["error"]["code"], "rate_limited");
        assert_eq!(t.store.len(), 2);
    }

    #[tokio::test]
    async fn get_scan_reads_back_stored_record() {
        let t = test_app(
            FakePlaces::found(joes_plumbing()),
            ReadyEngine(sample_payload(Priority::High)),
            10,
        );
        let place = joes_plumbing();
        let record = t
            .store
            .insert_scan(
                &ScanRequest::new("Joe's Plumbing", "Manchester"),
                score(&place),
                &place.summary(),
            )
            .await
            .unwrap();

        let (status, json) = send(&t.app, get(&format!("/api/v1/scans/{}", record.id))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "pending");
        assert_eq!(json["data"]["businessLocation"], "Manchester");
        assert!(json["data"]["recommendations"].is_null());
    }

    #[tokio::test]
    async fn get_scan_rejects_bad_and_unknown_ids() {
        let t = test_app(FakePlaces::found(joes_plumbing()), SilentEngine, 10);

        let (status, _) = send(&t.app, get("/api/v1/scans/not-a-uuid")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let unknown = uuid::Uuid::new_v4();
        let (status, json) = send(&t.app, get(&format!("/api/v1/scans/{unknown}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn events_for_completed_scan_emit_once_and_end() {
        let t = test_app(FakePlaces::found(joes_plumbing()), SilentEngine, 10);
        let place = joes_plumbing();
        let record = t
            .store
            .insert_scan(
                &ScanRequest::new("Joe's Plumbing", "Manchester"),
                score(&place),
                &place.summary(),
            )
            .await
            .unwrap();
        t.store
            .complete_if_pending(record.id, &sample_payload(Priority::Medium), RecommendationSource::Ai)
            .await
            .unwrap();

        let response = t
            .app
            .clone()
            .oneshot(get(&format!("/api/v1/scans/{}/events", record.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.contains("event: recommendations"));
        assert!(text.contains("\"recommendationSource\":\"ai\""));
        assert!(text.contains("\"priority\":\"medium\""));
    }

    #[tokio::test]
    async fn events_for_pending_scan_wait_for_the_write() {
        let t = test_app(FakePlaces::found(joes_plumbing()), SilentEngine, 10);
        let place = joes_plumbing();
        let record = t
            .store
            .insert_scan(
                &ScanRequest::new("Joe's Plumbing", "Manchester"),
                score(&place),
                &place.summary(),
            )
            .await
            .unwrap();

        let response = t
            .app
            .clone()
            .oneshot(get(&format!("/api/v1/scans/{}/events", record.id)))
            .await
            .unwrap();

        // Unrelated scans do not end the stream.
        t.events.publish(uuid::Uuid::new_v4());
        t.store
            .complete_if_pending(
                record.id,
                &sample_payload(Priority::Critical),
                RecommendationSource::Fallback,
            )
            .await
            .unwrap();

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(text.matches("event: recommendations").count(), 1);
        assert!(text.contains("\"recommendationSource\":\"fallback\""));
    }

    #[tokio::test]
    async fn events_for_unknown_scan_are_not_found() {
        let t = test_app(FakePlaces::found(joes_plumbing()), SilentEngine, 10);
        let (status, _) = send(
            &t.app,
            get(&format!("/api/v1/scans/{}/events", uuid::Uuid::new_v4())),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
