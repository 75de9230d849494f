//! In-memory fakes for the server's seams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use profilescan_advisor::{AdvisorError, AdvisorRequest};
use profilescan_core::{
    score, PlacePhoto, PlaceRecord, PlaceSummary, Priority, Recommendation,
    RecommendationPayload, RecommendationSource, ScanRecord, ScanRequest, ScanStatus, ScoreSet,
};
use profilescan_db::DbError;
use profilescan_places::PlacesError;

use crate::events::ScanEvents;
use crate::orchestrator::PlaceLookup;
use crate::recommender::RecommendationEngine;
use crate::store::{LeadInput, ScanStore};

pub fn joes_plumbing() -> PlaceRecord {
    PlaceRecord {
        place_id: "ChIJ-joes".to_owned(),
        name: "Joe's Plumbing & Heating".to_owned(),
        rating: Some(4.2),
        review_count: 18,
        address: "12 Deansgate, Manchester M3 2BW".to_owned(),
        phone: Some("0161 496 0000".to_owned()),
        website: None,
        opening_hours: Some(vec!["Monday: 8:00 AM – 6:00 PM".to_owned()]),
        photos: (0..4)
            .map(|i| PlacePhoto {
                reference: format!("ph-{i}"),
                width: None,
                height: None,
            })
            .collect(),
        location: None,
    }
}

pub fn sample_payload(priority: Priority) -> RecommendationPayload {
    RecommendationPayload {
        priority,
        recommendations: vec![Recommendation {
            category: "Reviews".to_owned(),
            action: "Ask for reviews".to_owned(),
            impact: "More trust".to_owned(),
            timeframe: "2 weeks".to_owned(),
            difficulty: "Easy".to_owned(),
        }],
        quick_wins: vec!["Reply to every review".to_owned()],
        revenue_impact: "Moderate".to_owned(),
        competitive_risk: None,
    }
}

/// A store holding one pending scan for [`joes_plumbing`].
pub async fn seeded_store() -> (Arc<MemoryScanStore>, ScanRecord) {
    let store = Arc::new(MemoryScanStore::default());
    let place = joes_plumbing();
    let record = store
        .insert_scan(
            &ScanRequest::new("Joe's Plumbing", "Manchester"),
            score(&place),
            &place.summary(),
        )
        .await
        .expect("memory insert");
    (store, record)
}

#[derive(Default)]
pub struct MemoryScanStore {
    scans: Mutex<HashMap<Uuid, ScanRecord>>,
    leads: Mutex<Vec<LeadInput>>,
    fail_writes: AtomicBool,
    fail_completions: AtomicBool,
    events: Option<ScanEvents>,
}

impl MemoryScanStore {
    /// Publishes to `events` whenever a scan leaves pending, like the
    /// database trigger.
    pub fn with_events(events: ScanEvents) -> Self {
        Self {
            events: Some(events),
            ..Self::default()
        }
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn fail_completions(&self) {
        self.fail_completions.store(true, Ordering::SeqCst);
    }

    pub fn get(&self, id: Uuid) -> Option<ScanRecord> {
        self.scans.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.scans.lock().unwrap().len()
    }

    pub fn leads(&self) -> Vec<LeadInput> {
        self.leads.lock().unwrap().clone()
    }

    fn unavailable() -> DbError {
        DbError::Sqlx(sqlx::Error::PoolTimedOut)
    }

    fn transition(&self, id: Uuid, apply: impl FnOnce(&mut ScanRecord)) -> bool {
        let changed = {
            let mut scans = self.scans.lock().unwrap();
            match scans.get_mut(&id) {
                Some(record) if record.status == ScanStatus::Pending => {
                    apply(record);
                    record.updated_at = Utc::now();
                    true
                }
                _ => false,
            }
        };
        if changed {
            if let Some(events) = &self.events {
                events.publish(id);
            }
        }
        changed
    }
}

#[async_trait]
impl ScanStore for MemoryScanStore {
    async fn insert_scan(
        &self,
        request: &ScanRequest,
        scores: ScoreSet,
        summary: &PlaceSummary,
    ) -> Result<ScanRecord, DbError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        let now = Utc::now();
        let record = ScanRecord {
            id: Uuid::new_v4(),
            business_name: request.business_name.clone(),
            business_location: request.business_location.clone(),
            place_id: summary.place_id.clone(),
            scores,
            place_summary: summary.clone(),
            status: ScanStatus::Pending,
            recommendations: None,
            recommendation_source: None,
            lead: None,
            created_at: now,
            updated_at: now,
        };
        self.scans
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_scan(&self, id: Uuid) -> Result<Option<ScanRecord>, DbError> {
        Ok(self.get(id))
    }

    async fn complete_if_pending(
        &self,
        id: Uuid,
        payload: &RecommendationPayload,
        source: RecommendationSource,
    ) -> Result<bool, DbError> {
        if self.fail_completions.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(self.transition(id, |record| {
            record.status = ScanStatus::Completed;
            record.recommendations = Some(payload.clone());
            record.recommendation_source = Some(source);
        }))
    }

    async fn fail_if_pending(&self, id: Uuid) -> Result<bool, DbError> {
        Ok(self.transition(id, |record| record.status = ScanStatus::Failed))
    }

    async fn capture_lead(&self, lead: &LeadInput) -> Result<Uuid, DbError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        if let Some(scan_id) = lead.scan_id {
            let mut scans = self.scans.lock().unwrap();
            let record = scans.get_mut(&scan_id).ok_or(DbError::NotFound)?;
            record.lead = Some(lead.contact.clone());
        }
        self.leads.lock().unwrap().push(lead.clone());
        Ok(Uuid::new_v4())
    }

    async fn ping(&self) -> Result<(), DbError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(())
    }
}

pub struct FakePlaces {
    result: Result<PlaceRecord, fn() -> PlacesError>,
    pub calls: AtomicUsize,
}

impl FakePlaces {
    pub fn found(place: PlaceRecord) -> Self {
        Self {
            result: Ok(place),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn not_found() -> Self {
        Self {
            result: Err(|| PlacesError::NotFound {
                message: "We couldn't find that business. Try adding the town or city, or the postcode."
                    .to_owned(),
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(make: fn() -> PlacesError) -> Self {
        Self {
            result: Err(make),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PlaceLookup for FakePlaces {
    async fn resolve(&self, _name: &str, _location: &str) -> Result<PlaceRecord, PlacesError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.result {
            Ok(place) => Ok(place.clone()),
            Err(make) => Err(make()),
        }
    }
}

/// Never answers.
pub struct SilentEngine;

#[async_trait]
impl RecommendationEngine for SilentEngine {
    fn is_configured(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        _request: &AdvisorRequest,
    ) -> Result<RecommendationPayload, AdvisorError> {
        std::future::pending().await
    }
}

pub struct ReadyEngine(pub RecommendationPayload);

#[async_trait]
impl RecommendationEngine for ReadyEngine {
    fn is_configured(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        _request: &AdvisorRequest,
    ) -> Result<RecommendationPayload, AdvisorError> {
        Ok(self.0.clone())
    }
}

pub struct FailingEngine;

#[async_trait]
impl RecommendationEngine for FailingEngine {
    fn is_configured(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        _request: &AdvisorRequest,
    ) -> Result<RecommendationPayload, AdvisorError> {
        Err(AdvisorError::EmptyReply)
    }
}

pub struct UnconfiguredEngine;

#[async_trait]
impl RecommendationEngine for UnconfiguredEngine {
    fn is_configured(&self) -> bool {
        false
    }

    async fn generate(
        &self,
        _request: &AdvisorRequest,
    ) -> Result<RecommendationPayload, AdvisorError> {
        Err(AdvisorError::NotConfigured("no key".to_owned()))
    }
}
