//! Scan orchestration: resolve, score, persist, then hand off recommendations.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use profilescan_core::{score, PlaceRecord, ScanRequest, ScanResult};
use profilescan_db::DbError;
use profilescan_places::{PlacesClient, PlacesError};

use crate::recommender::Recommender;
use crate::store::ScanStore;

#[async_trait]
pub trait PlaceLookup: Send + Sync {
    async fn resolve(&self, name: &str, location: &str) -> Result<PlaceRecord, PlacesError>;
}

#[async_trait]
impl PlaceLookup for PlacesClient {
    async fn resolve(&self, name: &str, location: &str) -> Result<PlaceRecord, PlacesError> {
        PlacesClient::resolve(self, name, location).await
    }
}

/// Why a scan could not be started.
#[derive(Debug, Error)]
pub enum ScanError {
    /// No listing matched; the message is safe to show to the visitor.
    #[error("{0}")]
    NotFound(String),

    /// Credentials for the places provider are missing or rejected.
    #[error("places provider is misconfigured: {0}")]
    UpstreamConfiguration(String),

    /// The places provider could not be reached or failed temporarily.
    #[error("places provider unavailable: {0}")]
    TransientNetwork(#[source] PlacesError),

    /// The provider answered with something unusable.
    #[error("places provider error: {0}")]
    Upstream(#[source] PlacesError),

    /// The provider's quota is exhausted.
    #[error("places provider quota exceeded: {0}")]
    RateLimited(String),

    #[error("failed to store scan: {0}")]
    Persistence(#[from] DbError),
}

impl From<PlacesError> for ScanError {
    fn from(err: PlacesError) -> Self {
        if err.is_transient() {
            return ScanError::TransientNetwork(err);
        }
        match err {
            PlacesError::NotFound { message } => ScanError::NotFound(message),
            PlacesError::Configuration(message) => ScanError::UpstreamConfiguration(message),
            PlacesError::QuotaExceeded(message) => ScanError::RateLimited(message),
            other => ScanError::Upstream(other),
        }
    }
}

impl ScanError {
    /// Error code used in the API envelope.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            ScanError::NotFound(_) => "not_found",
            ScanError::UpstreamConfiguration(_) | ScanError::Upstream(_) => "service_unavailable",
            ScanError::TransientNetwork(_) => "upstream_unavailable",
            ScanError::RateLimited(_) => "rate_limited",
            ScanError::Persistence(_) => "internal_error",
        }
    }

    /// Visitor-facing message. Internal detail stays in the logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            ScanError::NotFound(message) => message.clone(),
            ScanError::UpstreamConfiguration(_) | ScanError::Upstream(_) => {
                "The scan service is temporarily unavailable. Please try again later.".to_owned()
            }
            ScanError::TransientNetwork(_) => {
                "We couldn't reach Google right now. Please try again in a moment.".to_owned()
            }
            ScanError::RateLimited(_) => {
                "We're handling a lot of scans right now. Please wait a minute and try again."
                    .to_owned()
            }
            ScanError::Persistence(_) => {
                "Something went wrong saving your scan. Please try again.".to_owned()
            }
        }
    }
}

pub struct ScanOrchestrator {
    places: Arc<dyn PlaceLookup>,
    store: Arc<dyn ScanStore>,
    recommender: Arc<Recommender>,
}

impl ScanOrchestrator {
    #[must_use]
    pub fn new(
        places: Arc<dyn PlaceLookup>,
        store: Arc<dyn ScanStore>,
        recommender: Arc<Recommender>,
    ) -> Self {
        Self {
            places,
            store,
            recommender,
        }
    }

    /// Resolves and scores the business, stores a pending scan, and starts
    /// recommendation generation in the background.
    ///
    /// Nothing is written unless lookup and scoring both succeed.
    ///
    /// # Errors
    ///
    /// Returns a classified [`ScanError`] when the lookup or the insert fails.
    pub async fn start_scan(&self, request: &ScanRequest) -> Result<ScanResult, ScanError> {
        let place = self
            .places
            .resolve(&request.business_name, &request.business_location)
            .await
            .map_err(|e| {
                let err = ScanError::from(e);
                match &err {
                    ScanError::NotFound(_) => tracing::info!(
                        business = %request.business_name,
                        location = %request.business_location,
                        "no matching place"
                    ),
                    ScanError::UpstreamConfiguration(_) => {
                        tracing::error!(error = %err, "places lookup misconfigured");
                    }
                    _ => tracing::warn!(error = %err, "places lookup failed"),
                }
                err
            })?;

        let scores = score(&place);
        let summary = place.summary();

        let record = self
            .store
            .insert_scan(request, scores, &summary)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "failed to persist scan"))?;

        tracing::info!(
            scan_id = %record.id,
            place_id = %record.place_id,
            overall = scores.overall,
            "scan stored"
        );

        self.recommender.dispatch(&record);

        Ok(ScanResult {
            scan_id: record.id,
            scores,
            place_summary: summary,
        })
    }
}
