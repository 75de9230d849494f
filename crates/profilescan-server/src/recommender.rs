//! Recommendation generation with AI-first, fallback-on-failure selection.
//!
//! Each pending scan gets at most one background task at a time. The task
//! asks the advisor, bounded by a timeout, and stores whichever payload it
//! ends up with through the status-guarded write. Any other writer that
//! already completed the scan wins; the late result is dropped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use profilescan_advisor::{AdvisorClient, AdvisorError, AdvisorRequest};
use profilescan_core::{
    fallback_recommendations, RecommendationPayload, RecommendationSource, ScanRecord,
};

use crate::store::ScanStore;

#[async_trait]
pub trait RecommendationEngine: Send + Sync {
    /// `false` means every request would fail without trying.
    fn is_configured(&self) -> bool;

    async fn generate(&self, request: &AdvisorRequest)
        -> Result<RecommendationPayload, AdvisorError>;
}

#[async_trait]
impl RecommendationEngine for AdvisorClient {
    fn is_configured(&self) -> bool {
        AdvisorClient::is_configured(self)
    }

    async fn generate(
        &self,
        request: &AdvisorRequest,
    ) -> Result<RecommendationPayload, AdvisorError> {
        AdvisorClient::generate(self, request).await
    }
}

/// Result of asking for recommendations on a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Started,
    AlreadyRunning,
}

/// What a generation run ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Stored(RecommendationSource),
    /// The scan had already left `pending`.
    AlreadyCompleted,
    Failed,
}

pub struct Recommender {
    engine: Arc<dyn RecommendationEngine>,
    store: Arc<dyn ScanStore>,
    timeout: Duration,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl Recommender {
    #[must_use]
    pub fn new(
        engine: Arc<dyn RecommendationEngine>,
        store: Arc<dyn ScanStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            engine,
            store,
            timeout,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Starts generation for `record` on a background task unless one is
    /// already running for the same scan.
    pub fn dispatch(self: &Arc<Self>, record: &ScanRecord) -> Dispatch {
        let Some(guard) = InFlight::claim(&self.in_flight, record.id) else {
            tracing::debug!(scan_id = %record.id, "recommendation generation already running");
            return Dispatch::AlreadyRunning;
        };

        let this = Arc::clone(self);
        let request = advisor_request(record);
        let scan_id = record.id;
        let scores = record.scores;
        tokio::spawn(async move {
            let _guard = guard;
            this.generate_and_store(scan_id, &request, &scores).await;
        });
        Dispatch::Started
    }

    /// Produces and stores recommendations for one scan.
    ///
    /// The advisor is skipped when unconfigured. An advisor error or a
    /// timeout falls back to the rule-based payload. When even that write
    /// fails the scan is marked failed.
    pub async fn generate_and_store(
        &self,
        scan_id: Uuid,
        request: &AdvisorRequest,
        scores: &profilescan_core::ScoreSet,
    ) -> Outcome {
        if self.engine.is_configured() {
            match tokio::time::timeout(self.timeout, self.engine.generate(request)).await {
                Ok(Ok(payload)) => {
                    match self.store_payload(scan_id, &payload, RecommendationSource::Ai).await {
                        Ok(outcome) => return outcome,
                        Err(()) => {
                            tracing::warn!(%scan_id, "storing AI recommendations failed; trying fallback");
                        }
                    }
                }
                Ok(Err(e)) => {
                    tracing::warn!(%scan_id, error = %e, "AI recommendations failed; using fallback");
                }
                Err(_) => {
                    tracing::warn!(
                        %scan_id,
                        timeout_secs = self.timeout.as_secs(),
                        "AI recommendations timed out; using fallback"
                    );
                }
            }
        } else {
            tracing::debug!(%scan_id, "advisor not configured; using fallback");
        }

        let payload = fallback_recommendations(scores);
        if let Ok(outcome) = self
            .store_payload(scan_id, &payload, RecommendationSource::Fallback)
            .await
        {
            return outcome;
        }

        match self.store.fail_if_pending(scan_id).await {
            Ok(true) => {
                tracing::error!(%scan_id, "no recommendations could be stored; scan marked failed");
            }
            Ok(false) => {
                tracing::info!(%scan_id, "scan settled by another writer; nothing to mark");
                return Outcome::AlreadyCompleted;
            }
            Err(e) => tracing::error!(%scan_id, error = %e, "failed to mark scan as failed"),
        }
        Outcome::Failed
    }

    async fn store_payload(
        &self,
        scan_id: Uuid,
        payload: &RecommendationPayload,
        source: RecommendationSource,
    ) -> Result<Outcome, ()> {
        match self.store.complete_if_pending(scan_id, payload, source).await {
            Ok(true) => {
                tracing::info!(%scan_id, source = source.as_str(), priority = %payload.priority, "recommendations stored");
                Ok(Outcome::Stored(source))
            }
            Ok(false) => {
                tracing::debug!(%scan_id, source = source.as_str(), "scan no longer pending; result dropped");
                Ok(Outcome::AlreadyCompleted)
            }
            Err(e) => {
                tracing::error!(%scan_id, error = %e, "failed to store recommendations");
                Err(())
            }
        }
    }
}

/// Membership of a scan id in the in-flight set, released on drop.
struct InFlight {
    set: Arc<Mutex<HashSet<Uuid>>>,
    id: Uuid,
}

impl InFlight {
    fn claim(set: &Arc<Mutex<HashSet<Uuid>>>, id: Uuid) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        inserted.then(|| Self {
            set: Arc::clone(set),
            id,
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

#[must_use]
pub fn advisor_request(record: &ScanRecord) -> AdvisorRequest {
    AdvisorRequest {
        business_name: record.business_name.clone(),
        business_location: record.business_location.clone(),
        scores: record.scores,
        place_summary: record.place_summary.clone(),
    }
}
