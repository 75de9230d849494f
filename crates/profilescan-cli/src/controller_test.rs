use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use profilescan_core::{
    priority_for, score, PlacePhoto, PlaceRecord, Priority, Recommendation, RecommendationPayload,
};

use super::*;

#[derive(Debug, Clone, Copy)]
enum Step {
    Transient,
    NotFound,
    Found,
}

#[derive(Debug, Clone)]
enum Stream {
    Silent,
    Deliver(Delivered),
}

struct FakeApi {
    steps: Vec<Step>,
    scan_delay: Duration,
    scan_calls: AtomicUsize,
    stream: Stream,
    trigger_fails: bool,
    trigger_calls: AtomicUsize,
    leads: Mutex<Vec<(Option<Uuid>, LeadContact)>>,
    result: ScanResult,
}

impl FakeApi {
    fn new(steps: &[Step]) -> Self {
        Self {
            steps: steps.to_vec(),
            scan_delay: Duration::ZERO,
            scan_calls: AtomicUsize::new(0),
            stream: Stream::Silent,
            trigger_fails: false,
            trigger_calls: AtomicUsize::new(0),
            leads: Mutex::new(Vec::new()),
            result: sample_result(),
        }
    }

    fn calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScanApi for FakeApi {
    async fn start_scan(&self, _request: &ScanRequest) -> Result<ScanResult, ClientError> {
        let call = self.scan_calls.fetch_add(1, Ordering::SeqCst);
        if !self.scan_delay.is_zero() {
            tokio::time::sleep(self.scan_delay).await;
        }
        let step = self
            .steps
            .get(call)
            .or(self.steps.last())
            .copied()
            .unwrap_or(Step::Found);
        match step {
            Step::Found => Ok(self.result.clone()),
            Step::Transient => Err(ClientError::Api {
                status: 502,
                code: "upstream_unavailable".to_owned(),
                message: "We couldn't reach Google right now.".to_owned(),
            }),
            Step::NotFound => Err(ClientError::Api {
                status: 404,
                code: "not_found".to_owned(),
                message: "We couldn't find \"Joe's Plumbing\" in \"Manchester\". Try adding the town or city, or the postcode.".to_owned(),
            }),
        }
    }

    async fn trigger_recommendations(&self, _result: &ScanResult) -> Result<(), ClientError> {
        self.trigger_calls.fetch_add(1, Ordering::SeqCst);
        if self.trigger_fails {
            return Err(ClientError::Api {
                status: 500,
                code: "internal_error".to_owned(),
                message: String::new(),
            });
        }
        Ok(())
    }

    async fn await_recommendations(&self, _scan_id: Uuid) -> Result<Delivered, ClientError> {
        match &self.stream {
            Stream::Silent => std::future::pending().await,
            Stream::Deliver(delivered) => Ok(delivered.clone()),
        }
    }

    async fn capture_lead(
        &self,
        scan_id: Option<Uuid>,
        contact: &LeadContact,
        _source: &str,
    ) -> Result<Uuid, ClientError> {
        self.leads.lock().unwrap().push((scan_id, contact.clone()));
        Ok(Uuid::new_v4())
    }
}

fn sample_result() -> ScanResult {
    let place = PlaceRecord {
        place_id: "ChIJ-joes".to_owned(),
        name: "Joe's Plumbing & Heating".to_owned(),
        rating: Some(3.9),
        review_count: 6,
        address: "12 Deansgate, Manchester".to_owned(),
        phone: Some("0161 496 0000".to_owned()),
        website: None,
        opening_hours: None,
        photos: vec![PlacePhoto {
            reference: "p0".to_owned(),
            width: None,
            height: None,
        }],
        location: None,
    };
    ScanResult {
        scan_id: Uuid::new_v4(),
        scores: score(&place),
        place_summary: place.summary(),
    }
}

fn ai_delivery() -> Delivered {
    Delivered {
        payload: RecommendationPayload {
            priority: Priority::High,
            recommendations: vec![Recommendation {
                category: "Reviews".to_owned(),
                action: "Ask for reviews".to_owned(),
                impact: "More trust".to_owned(),
                timeframe: "2 weeks".to_owned(),
                difficulty: "Easy".to_owned(),
            }],
            quick_wins: vec!["Add your website".to_owned()],
            revenue_impact: "Moderate".to_owned(),
            competitive_risk: None,
        },
        source: RecommendationSource::Ai,
    }
}

fn controller(api: FakeApi) -> (Arc<FakeApi>, ScanController) {
    let api = Arc::new(api);
    let controller = ScanController::new(api.clone(), ControllerConfig::default());
    (api, controller)
}

fn joes() -> ScanRequest {
    ScanRequest::new("Joe's Plumbing", "Manchester")
}

#[tokio::test(start_paused = true)]
async fn unknown_business_returns_to_form_with_zero_progress() {
    let (api, controller) = controller(FakeApi::new(&[Step::NotFound]));

    let err = controller.submit(joes()).await.expect_err("no match");

    assert!(matches!(err, ClientError::Api { status: 404, .. }));
    assert_eq!(api.calls(), 1, "not found is not retried");
    let state = controller.snapshot();
    assert_eq!(state.phase, Phase::Form);
    assert!(state.progress.abs() < f64::EPSILON);
    assert!(state.error.unwrap().contains("postcode"));
    assert!(state.result.is_none());
}

#[tokio::test(start_paused = true)]
async fn two_transient_failures_then_success() {
    let (api, controller) = controller(FakeApi::new(&[
        Step::Transient,
        Step::Transient,
        Step::Found,
    ]));
    let started = Instant::now();

    let result = controller.submit(joes()).await.expect("third attempt succeeds");

    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(api.calls(), 3);
    let state = controller.snapshot();
    assert_eq!(state.phase, Phase::Results);
    assert!((state.progress - 100.0).abs() < f64::EPSILON);
    assert_eq!(state.result.map(|r| r.scan_id), Some(result.scan_id));
}

#[tokio::test(start_paused = true)]
async fn persistent_transient_failure_gives_up_after_three_attempts() {
    let (api, controller) = controller(FakeApi::new(&[Step::Transient]));

    let err = controller.submit(joes()).await.expect_err("all attempts fail");

    assert!(err.is_transient());
    assert_eq!(api.calls(), 3);
    assert_eq!(controller.snapshot().phase, Phase::Form);
}

#[tokio::test(start_paused = true)]
async fn silent_advisor_falls_back_after_fifteen_seconds() {
    let (api, controller) = controller(FakeApi::new(&[Step::Found]));
    let started = Instant::now();

    let result = controller.submit(joes()).await.unwrap();
    assert_eq!(controller.snapshot().phase, Phase::Results);

    tokio::time::sleep_until(started + Duration::from_secs(14)).await;
    assert!(controller.snapshot().recommendations.is_none());

    tokio::time::sleep_until(started + Duration::from_secs(16)).await;
    let delivered = controller
        .snapshot()
        .recommendations
        .expect("fallback after timeout");
    assert_eq!(delivered.source, RecommendationSource::Fallback);
    assert_eq!(delivered.payload.priority, priority_for(result.scores.overall));
    assert_eq!(api.trigger_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn streamed_recommendations_win_the_race() {
    let mut api = FakeApi::new(&[Step::Found]);
    api.stream = Stream::Deliver(ai_delivery());
    let (_api, controller) = controller(api);
    let mut updates = controller.subscribe();

    controller.submit(joes()).await.unwrap();
    let state = updates
        .wait_for(|s| s.recommendations.is_some())
        .await
        .unwrap()
        .clone();

    assert_eq!(state.recommendations, Some(ai_delivery()));
}

#[tokio::test(start_paused = true)]
async fn trigger_failure_falls_back_immediately() {
    let mut api = FakeApi::new(&[Step::Found]);
    api.trigger_fails = true;
    let (_api, controller) = controller(api);
    let started = Instant::now();

    controller.submit(joes()).await.unwrap();
    let mut updates = controller.subscribe();
    updates
        .wait_for(|s| s.recommendations.is_some())
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(15));
    assert_eq!(
        controller.snapshot().recommendations.unwrap().source,
        RecommendationSource::Fallback
    );
}

#[tokio::test(start_paused = true)]
async fn progress_creeps_below_ceiling_while_scanning() {
    let mut api = FakeApi::new(&[Step::Found]);
    api.scan_delay = Duration::from_secs(5);
    let (_api, controller) = controller(api);
    let controller = Arc::new(controller);

    let running = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.submit(joes()).await }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;
    let state = controller.snapshot();
    assert_eq!(state.phase, Phase::Scanning);
    assert!(state.progress > 0.0 && state.progress < PROGRESS_CEILING);

    running.await.unwrap().unwrap();
    assert!((controller.snapshot().progress - 100.0).abs() < f64::EPSILON);
}

#[tokio::test(start_paused = true)]
async fn new_submission_cancels_the_previous_attempt() {
    let (api, controller) = controller(FakeApi::new(&[
        Step::Transient,
        Step::Transient,
        Step::Transient,
        Step::Found,
    ]));
    let controller = Arc::new(controller);

    let first = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.submit(joes()).await }
    });
    tokio::time::sleep(Duration::from_millis(500)).await;

    let second = controller.submit(joes()).await;

    assert!(matches!(first.await.unwrap(), Err(ClientError::Cancelled)));
    assert!(second.is_ok());
    assert_eq!(api.calls(), 4);
    assert_eq!(controller.snapshot().phase, Phase::Results);
}

#[tokio::test(start_paused = true)]
async fn lead_gate_completes_the_flow() {
    let (api, controller) = controller(FakeApi::new(&[Step::Found]));
    let result = controller.submit(joes()).await.unwrap();
    let contact = LeadContact {
        email: "jo@example.com".to_owned(),
        phone: None,
        postcode: Some("M3 2BW".to_owned()),
    };

    assert!(matches!(
        controller.submit_lead(contact.clone()).await,
        Err(ClientError::InvalidState { .. })
    ));

    controller.open_lead_gate().unwrap();
    assert_eq!(controller.snapshot().phase, Phase::LeadGate);

    let lead_id = controller.submit_lead(contact.clone()).await.unwrap();
    let state = controller.snapshot();
    assert_eq!(state.phase, Phase::Success);
    assert_eq!(state.lead_id, Some(lead_id));
    assert_eq!(
        api.leads.lock().unwrap().as_slice(),
        &[(Some(result.scan_id), contact)]
    );
}

#[test]
fn lead_gate_requires_results() {
    let controller = ScanController::new(
        Arc::new(FakeApi::new(&[Step::Found])),
        ControllerConfig::default(),
    );
    let err = controller.open_lead_gate().unwrap_err();
    assert!(matches!(
        err,
        ClientError::InvalidState { phase: "form", .. }
    ));
}
