#[cfg(test)]
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use profilescan_db::DbError;

use crate::api::ApiError;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Shared fixed-window counters.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Counts one hit and returns the total for `bucket_key` in the window.
    async fn hit(&self, bucket_key: &str, window_start: DateTime<Utc>) -> Result<u32, DbError>;
}

/// Counters in Postgres, shared by every server instance.
pub struct PgRateLimitStore {
    pool: PgPool,
}

impl PgRateLimitStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitStore for PgRateLimitStore {
    async fn hit(&self, bucket_key: &str, window_start: DateTime<Utc>) -> Result<u32, DbError> {
        let hits = profilescan_db::record_rate_limit_hit(&self.pool, bucket_key, window_start).await?;
        Ok(u32::try_from(hits).unwrap_or(0))
    }
}

/// Process-local counters.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryRateLimitStore {
    hits: Mutex<HashMap<(String, DateTime<Utc>), u32>>,
}

#[cfg(test)]
#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn hit(&self, bucket_key: &str, window_start: DateTime<Utc>) -> Result<u32, DbError> {
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        hits.retain(|(_, start), _| *start >= window_start);
        let count = hits
            .entry((bucket_key.to_owned(), window_start))
            .or_insert(0);
        *count += 1;
        Ok(*count)
    }
}

/// Fixed-window limiter keyed by source address and endpoint.
#[derive(Clone)]
pub struct RateLimitState {
    store: Arc<dyn RateLimitStore>,
    max_requests: u32,
    window: Duration,
    trusted_proxies: Arc<[IpAddr]>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(store: Arc<dyn RateLimitStore>, max_requests: u32, window: Duration) -> Self {
        Self {
            store,
            max_requests,
            window: window.max(Duration::from_secs(1)),
            trusted_proxies: Arc::from([]),
        }
    }

    /// Peers allowed to name the client in `x-forwarded-for`.
    #[must_use]
    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = proxies.into();
        self
    }

    /// Start of the fixed window containing `now`.
    fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let secs = i64::try_from(self.window.as_secs()).unwrap_or(i64::MAX);
        let start = now.timestamp() - now.timestamp().rem_euclid(secs);
        Utc.timestamp_opt(start, 0).single().unwrap_or(now)
    }

    /// `true` when the request is within quota.
    ///
    /// A store failure lets the request through.
    async fn allow(&self, source: &str, endpoint: &str, now: DateTime<Utc>) -> bool {
        let key = bucket_key(source, endpoint);
        match self.store.hit(&key, self.window_start(now)).await {
            Ok(hits) => hits <= self.max_requests,
            Err(e) => {
                tracing::warn!(error = %e, endpoint, "rate limit store unavailable; allowing request");
                true
            }
        }
    }
}

/// Source addresses are hashed before they are stored.
fn bucket_key(source: &str, endpoint: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    let hex: String = digest[..12].iter().map(|b| format!("{b:02x}")).collect();
    format!("{hex}|{endpoint}")
}

/// Client address used for the quota.
///
/// The socket peer, unless the peer is a trusted proxy. Then the
/// `x-forwarded-for` chain is read from the right and the first hop that is
/// not itself a trusted proxy wins.
fn client_source(headers: &HeaderMap, peer: Option<SocketAddr>, trusted: &[IpAddr]) -> String {
    let Some(peer) = peer.map(|addr| addr.ip()) else {
        return "unknown".to_owned();
    };
    if !trusted.contains(&peer) {
        return peer.to_string();
    }
    headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|hop| hop.trim().parse::<IpAddr>())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .map_while(Result::ok)
        .find(|ip| !trusted.contains(ip))
        .unwrap_or(peer)
        .to_string()
}

/// Middleware enforcing a per-source, per-endpoint request quota.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let endpoint = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| req.uri().path().to_owned(), |p| p.as_str().to_owned());
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let source = client_source(req.headers(), peer, &rate_limit.trusted_proxies);

    if rate_limit.allow(&source, &endpoint, Utc::now()).await {
        return next.run(req).await;
    }

    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map_or_else(String::new, |id| id.0.clone());
    tracing::info!(endpoint, "rate limit exceeded");
    ApiError::new(
        request_id,
        "rate_limited",
        "Too many requests. Please wait a minute and try again.",
    )
    .into_response()
}
