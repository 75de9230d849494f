//! Client-side scan flow: `Form → Scanning → Results → LeadGate → Success`.
//!
//! Every [`ScanController::submit`] owns a [`CancellationToken`]; a newer
//! submission cancels it, which stops that attempt's retry loop, progress
//! ticker, display delay and recommendation race. State lives in a
//! [`watch`] channel so callers can both read and await it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use profilescan_core::{
    fallback_recommendations, LeadContact, RecommendationSource, ScanRequest, ScanResult,
};

use crate::api::{Delivered, ScanApi};
use crate::error::ClientError;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Progress creeps toward this ceiling while the scan is running.
const PROGRESS_CEILING: f64 = 95.0;
const LEAD_SOURCE: &str = "cli";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Form,
    Scanning,
    Results,
    LeadGate,
    Success,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Form => "form",
            Phase::Scanning => "scanning",
            Phase::Results => "results",
            Phase::LeadGate => "lead_gate",
            Phase::Success => "success",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub phase: Phase,
    /// `0..=100`; stays below 95 until the scan returns.
    pub progress: f64,
    pub result: Option<ScanResult>,
    pub recommendations: Option<Delivered>,
    /// User-readable message from the last failure.
    pub error: Option<String>,
    pub lead_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    pub retry: RetryPolicy,
    /// Pause between a successful scan and showing results.
    pub display_delay: Duration,
    pub recommendation_timeout: Duration,
    pub progress_tick: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            display_delay: Duration::from_secs(1),
            recommendation_timeout: Duration::from_secs(15),
            progress_tick: Duration::from_millis(200),
        }
    }
}

pub struct ScanController {
    api: Arc<dyn ScanApi>,
    config: ControllerConfig,
    state: Arc<watch::Sender<Snapshot>>,
    attempt: std::sync::Mutex<CancellationToken>,
}

impl ScanController {
    #[must_use]
    pub fn new(api: Arc<dyn ScanApi>, config: ControllerConfig) -> Self {
        Self {
            api,
            config,
            state: Arc::new(watch::Sender::new(Snapshot::default())),
            attempt: std::sync::Mutex::new(CancellationToken::new()),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.state.subscribe()
    }

    /// Cancels the previous attempt and returns a token for the new one.
    fn begin_attempt(&self) -> CancellationToken {
        let mut current = self
            .attempt
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        current.cancel();
        *current = CancellationToken::new();
        current.clone()
    }

    /// Runs one scan submission through to the results view.
    ///
    /// Recommendations arrive later on a background task; watch
    /// [`Snapshot::recommendations`] for them.
    ///
    /// # Errors
    ///
    /// Returns the classified failure after retries are exhausted, or
    /// [`ClientError::Cancelled`] when a newer submission superseded this
    /// one.
    pub async fn submit(&self, request: ScanRequest) -> Result<ScanResult, ClientError> {
        let token = self.begin_attempt();
        self.state.send_modify(|s| {
            *s = Snapshot {
                phase: Phase::Scanning,
                ..Snapshot::default()
            };
        });

        let ticker = token.child_token();
        tokio::spawn(simulate_progress(
            Arc::clone(&self.state),
            self.config.progress_tick,
            ticker.clone(),
        ));

        let api = Arc::clone(&self.api);
        let outcome = retry_with_backoff(&self.config.retry, &token, |attempt| {
            let api = Arc::clone(&api);
            let request = request.clone();
            async move {
                tracing::debug!(attempt, business = %request.business_name, "submitting scan");
                api.start_scan(&request).await
            }
        })
        .await;
        ticker.cancel();

        let result = match outcome {
            Ok(result) => result,
            Err(ClientError::Cancelled) => return Err(ClientError::Cancelled),
            Err(err) => {
                tracing::warn!(error = %err, "scan failed");
                if !token.is_cancelled() {
                    self.state.send_modify(|s| {
                        s.phase = Phase::Form;
                        s.progress = 0.0;
                        s.error = Some(err.user_message());
                    });
                }
                return Err(err);
            }
        };

        self.state.send_modify(|s| {
            s.progress = 100.0;
            s.result = Some(result.clone());
        });

        tokio::spawn(deliver_recommendations(
            Arc::clone(&self.api),
            Arc::clone(&self.state),
            result.clone(),
            self.config.recommendation_timeout,
            token.clone(),
        ));

        tokio::select! {
            () = token.cancelled() => return Err(ClientError::Cancelled),
            () = tokio::time::sleep(self.config.display_delay) => {}
        }
        self.state.send_modify(|s| s.phase = Phase::Results);
        Ok(result)
    }

    /// # Errors
    ///
    /// [`ClientError::InvalidState`] unless results are showing.
    pub fn open_lead_gate(&self) -> Result<(), ClientError> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|s| {
            if s.phase == Phase::Results {
                s.phase = Phase::LeadGate;
                true
            } else {
                outcome = Err(ClientError::InvalidState {
                    action: "open the lead form",
                    phase: s.phase.as_str(),
                });
                false
            }
        });
        outcome
    }

    /// Sends the lead form and finishes the flow.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidState`] outside the lead gate, or the capture
    /// failure (the gate stays open so the form can be resent).
    pub async fn submit_lead(&self, contact: LeadContact) -> Result<Uuid, ClientError> {
        let scan_id = {
            let s = self.state.borrow();
            if s.phase != Phase::LeadGate {
                return Err(ClientError::InvalidState {
                    action: "submit the lead form",
                    phase: s.phase.as_str(),
                });
            }
            s.result.as_ref().map(|r| r.scan_id)
        };

        match self.api.capture_lead(scan_id, &contact, LEAD_SOURCE).await {
            Ok(lead_id) => {
                tracing::info!(%lead_id, scan_id = ?scan_id, "lead captured");
                self.state.send_modify(|s| {
                    s.phase = Phase::Success;
                    s.lead_id = Some(lead_id);
                    s.error = None;
                });
                Ok(lead_id)
            }
            Err(err) => {
                tracing::warn!(error = %err, "lead capture failed");
                self.state.send_modify(|s| s.error = Some(err.user_message()));
                Err(err)
            }
        }
    }
}

async fn simulate_progress(
    state: Arc<watch::Sender<Snapshot>>,
    tick: Duration,
    stop: CancellationToken,
) {
    loop {
        tokio::select! {
            () = stop.cancelled() => return,
            () = tokio::time::sleep(tick) => {}
        }
        let mut running = true;
        state.send_if_modified(|s| {
            if stop.is_cancelled() || s.phase != Phase::Scanning {
                running = false;
                return false;
            }
            s.progress += (PROGRESS_CEILING - s.progress) * 0.1;
            true
        });
        if !running {
            return;
        }
    }
}

/// Fills the recommendation slot for `result` with whichever arrives first:
/// the server's stored recommendations or the local fallback.
async fn deliver_recommendations(
    api: Arc<dyn ScanApi>,
    state: Arc<watch::Sender<Snapshot>>,
    result: ScanResult,
    timeout: Duration,
    token: CancellationToken,
) {
    let delivered = tokio::select! {
        () = token.cancelled() => return,
        delivered = race_recommendations(api.as_ref(), &result, timeout) => delivered,
    };
    let delivered = delivered.unwrap_or_else(|| Delivered {
        payload: fallback_recommendations(&result.scores),
        source: RecommendationSource::Fallback,
    });
    if token.is_cancelled() {
        return;
    }

    let scan_id = result.scan_id;
    let stored = state.send_if_modified(|s| {
        let same_scan = s.result.as_ref().is_some_and(|r| r.scan_id == scan_id);
        if same_scan && s.recommendations.is_none() {
            s.recommendations = Some(delivered);
            true
        } else {
            false
        }
    });
    if !stored {
        tracing::debug!(%scan_id, "recommendations already present; late result dropped");
    }
}

/// `None` means the local fallback should be used.
async fn race_recommendations(
    api: &dyn ScanApi,
    result: &ScanResult,
    timeout: Duration,
) -> Option<Delivered> {
    let scan_id = result.scan_id;
    let subscription = api.await_recommendations(scan_id);
    let trigger = api.trigger_recommendations(result);
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(subscription, trigger, deadline);

    let mut triggered = false;
    loop {
        tokio::select! {
            delivered = &mut subscription => {
                return match delivered {
                    Ok(delivered) => Some(delivered),
                    Err(e) => {
                        tracing::warn!(%scan_id, error = %e, "recommendation stream failed; using fallback");
                        None
                    }
                };
            }
            sent = &mut trigger, if !triggered => {
                triggered = true;
                if let Err(e) = sent {
                    tracing::warn!(%scan_id, error = %e, "could not trigger recommendations; using fallback");
                    return None;
                }
            }
            () = &mut deadline => {
                tracing::warn!(
                    %scan_id,
                    timeout_secs = timeout.as_secs(),
                    "recommendations timed out; using fallback"
                );
                return None;
            }
        }
    }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;
