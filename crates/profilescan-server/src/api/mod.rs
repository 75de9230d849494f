mod leads;
mod recommendations;
mod scans;

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::events::ScanEvents;
use crate::middleware::{enforce_rate_limit, request_id, RateLimitState, RequestId};
use crate::orchestrator::ScanOrchestrator;
use crate::recommender::Recommender;
use crate::store::ScanStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ScanStore>,
    pub orchestrator: Arc<ScanOrchestrator>,
    pub recommender: Arc<Recommender>,
    pub events: ScanEvents,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: String) -> Self {
        Self {
            data,
            meta: ResponseMeta::new(request_id),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "validation_error" => StatusCode::BAD_REQUEST,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "upstream_unavailable" => StatusCode::BAD_GATEWAY,
            "service_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn map_db_error(request_id: String, error: &profilescan_db::DbError) -> ApiError {
    if matches!(error, profilescan_db::DbError::NotFound) {
        return ApiError::new(request_id, "not_found", "scan not found");
    }
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

/// Unwraps a JSON body, turning axum's rejection into a `validation_error`
/// envelope.
pub(super) fn json_body<T>(
    request_id: &str,
    body: Result<Json<T>, JsonRejection>,
) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        ApiError::new(request_id, "validation_error", rejection.body_text())
    })
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn rate_limited_router(rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/scan", post(scans::create_scan))
        .route("/api/v1/capture-lead", post(leads::capture_lead))
        .route(
            "/api/v1/generate-recommendations",
            post(recommendations::generate_recommendations),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            rate_limit,
            enforce_rate_limit,
        ))
}

pub fn build_app(state: AppState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/scans/{scan_id}", get(scans::get_scan))
        .route("/api/v1/scans/{scan_id}/events", get(scans::scan_events));

    Router::new()
        .merge(public_routes)
        .merge(rate_limited_router(rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use axum::Router;
    use tower::ServiceExt;

    use super::{build_app, AppState};
    use crate::events::ScanEvents;
    use crate::middleware::{MemoryRateLimitStore, RateLimitState};
    use crate::orchestrator::{PlaceLookup, ScanOrchestrator};
    use crate::recommender::{RecommendationEngine, Recommender};
    use crate::testing::MemoryScanStore;

    pub struct TestApp {
        pub app: Router,
        pub store: Arc<MemoryScanStore>,
        pub events: ScanEvents,
    }

    pub fn test_app(
        places: impl PlaceLookup + 'static,
        engine: impl RecommendationEngine + 'static,
        max_requests: u32,
    ) -> TestApp {
        let events = ScanEvents::new();
        let store = Arc::new(MemoryScanStore::with_events(events.clone()));
        let recommender = Arc::new(Recommender::new(
            Arc::new(engine),
            store.clone(),
            Duration::from_secs(15),
        ));
        let orchestrator = Arc::new(ScanOrchestrator::new(
            Arc::new(places),
            store.clone(),
            Arc::clone(&recommender),
        ));
        let state = AppState {
            store: store.clone(),
            orchestrator,
            recommender,
            events: events.clone(),
        };
        let rate_limit = RateLimitState::new(
            Arc::new(MemoryRateLimitStore::default()),
            max_requests,
            Duration::from_secs(60),
        );
        TestApp {
            app: build_app(state, rate_limit),
            store,
            events,
        }
    }

    pub async fn send(
        app: &Router,
        request: Request<Body>,
    ) -> (axum::http::StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).expect("json parse")
        };
        (status, json)
    }

    pub fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    pub fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }
}
