//! Persistence seam used by the orchestrator, the recommender and the API.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use profilescan_core::{
    LeadContact, PlaceSummary, RecommendationPayload, RecommendationSource, ScanRecord,
    ScanRequest, ScoreSet,
};
use profilescan_db::{DbError, LeadRow, NewLead, NewScan};

/// Contact details captured from the lead form.
#[derive(Debug, Clone)]
pub struct LeadInput {
    pub scan_id: Option<Uuid>,
    pub contact: LeadContact,
    pub source: String,
}

#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn insert_scan(
        &self,
        request: &ScanRequest,
        scores: ScoreSet,
        summary: &PlaceSummary,
    ) -> Result<ScanRecord, DbError>;

    async fn get_scan(&self, id: Uuid) -> Result<Option<ScanRecord>, DbError>;

    /// Writes recommendations only while the scan is still pending. Returns
    /// `true` when this call won.
    async fn complete_if_pending(
        &self,
        id: Uuid,
        payload: &RecommendationPayload,
        source: RecommendationSource,
    ) -> Result<bool, DbError>;

    async fn fail_if_pending(&self, id: Uuid) -> Result<bool, DbError>;

    /// Records a lead. With a scan id the scan's contact fields are updated
    /// too, and an unknown id is [`DbError::NotFound`].
    async fn capture_lead(&self, lead: &LeadInput) -> Result<Uuid, DbError>;

    async fn ping(&self) -> Result<(), DbError>;
}

pub struct PgScanStore {
    pool: PgPool,
}

impl PgScanStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScanStore for PgScanStore {
    async fn insert_scan(
        &self,
        request: &ScanRequest,
        scores: ScoreSet,
        summary: &PlaceSummary,
    ) -> Result<ScanRecord, DbError> {
        profilescan_db::insert_scan(
            &self.pool,
            &NewScan {
                business_name: &request.business_name,
                business_location: &request.business_location,
                scores,
                place_summary: summary,
            },
        )
        .await
    }

    async fn get_scan(&self, id: Uuid) -> Result<Option<ScanRecord>, DbError> {
        profilescan_db::get_scan(&self.pool, id).await
    }

    async fn complete_if_pending(
        &self,
        id: Uuid,
        payload: &RecommendationPayload,
        source: RecommendationSource,
    ) -> Result<bool, DbError> {
        profilescan_db::complete_scan_if_pending(&self.pool, id, payload, source).await
    }

    async fn fail_if_pending(&self, id: Uuid) -> Result<bool, DbError> {
        profilescan_db::fail_scan_if_pending(&self.pool, id).await
    }

    async fn capture_lead(&self, lead: &LeadInput) -> Result<Uuid, DbError> {
        let row: LeadRow = profilescan_db::capture_lead(
            &self.pool,
            &NewLead {
                scan_id: lead.scan_id,
                email: &lead.contact.email,
                phone: lead.contact.phone.as_deref(),
                postcode: lead.contact.postcode.as_deref(),
                source: &lead.source,
            },
        )
        .await?;
        Ok(row.id)
    }

    async fn ping(&self) -> Result<(), DbError> {
        profilescan_db::health_check(&self.pool).await
    }
}
