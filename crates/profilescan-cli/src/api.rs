//! HTTP client for the scan server.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use profilescan_core::{
    LeadContact, RecommendationPayload, RecommendationSource, ScanRequest, ScanResult, ScanStatus,
};

use crate::error::ClientError;

/// Recommendations as delivered by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub payload: RecommendationPayload,
    pub source: RecommendationSource,
}

#[async_trait]
pub trait ScanApi: Send + Sync {
    async fn start_scan(&self, request: &ScanRequest) -> Result<ScanResult, ClientError>;

    /// Asks the server to generate recommendations. Safe to repeat.
    async fn trigger_recommendations(&self, result: &ScanResult) -> Result<(), ClientError>;

    /// Resolves once recommendations for `scan_id` are stored.
    async fn await_recommendations(&self, scan_id: Uuid) -> Result<Delivered, ClientError>;

    async fn capture_lead(
        &self,
        scan_id: Option<Uuid>,
        contact: &LeadContact,
        source: &str,
    ) -> Result<Uuid, ClientError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerBody<'a> {
    scan_id: Uuid,
    scan_results: &'a profilescan_core::ScoreSet,
    place_details: &'a profilescan_core::PlaceSummary,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LeadBody<'a> {
    scan_id: Option<Uuid>,
    email: &'a str,
    phone: Option<&'a str>,
    postcode: Option<&'a str>,
    source: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeadCreated {
    lead_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendationEvent {
    status: ScanStatus,
    recommendations: Option<RecommendationPayload>,
    recommendation_source: Option<RecommendationSource>,
}

pub struct HttpScanApi {
    client: Client,
    base_url: Url,
}

impl HttpScanApi {
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] for an unparseable `base_url`, or
    /// [`ClientError::Network`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("profilescan-cli/0.1")
            .build()?;
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| ClientError::Decode {
            context: "server URL",
            reason: e.to_string(),
        })?;
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url.join(path).map_err(|e| ClientError::Decode {
            context: "server URL",
            reason: e.to_string(),
        })
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        context: &'static str,
    ) -> Result<T, ClientError> {
        let response = self.client.post(self.url(path)?).json(body).send().await?;
        read_envelope(response, context).await
    }
}

async fn error_from(response: Response) -> ClientError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(envelope) => ClientError::Api {
            status,
            code: envelope.error.code,
            message: envelope.error.message,
        },
        Err(_) => ClientError::Api {
            status,
            code: "http_error".to_owned(),
            message: String::new(),
        },
    }
}

async fn read_envelope<T: DeserializeOwned>(
    response: Response,
    context: &'static str,
) -> Result<T, ClientError> {
    if !response.status().is_success() {
        return Err(error_from(response).await);
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice::<Envelope<T>>(&bytes)
        .map(|envelope| envelope.data)
        .map_err(|e| ClientError::Decode {
            context,
            reason: e.to_string(),
        })
}

#[async_trait]
impl ScanApi for HttpScanApi {
    async fn start_scan(&self, request: &ScanRequest) -> Result<ScanResult, ClientError> {
        self.post("api/v1/scan", request, "scan").await
    }

    async fn trigger_recommendations(&self, result: &ScanResult) -> Result<(), ClientError> {
        let body = TriggerBody {
            scan_id: result.scan_id,
            scan_results: &result.scores,
            place_details: &result.place_summary,
        };
        let _: serde_json::Value = self
            .post("api/v1/generate-recommendations", &body, "generate-recommendations")
            .await?;
        Ok(())
    }

    async fn await_recommendations(&self, scan_id: Uuid) -> Result<Delivered, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("api/v1/scans/{scan_id}/events"))?)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from(response).await);
        }

        let mut parser = SseParser::default();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for event in parser.push(&chunk)? {
                if let Some(result) = delivered_from(&event) {
                    return result;
                }
            }
        }
        Err(ClientError::StreamClosed)
    }

    async fn capture_lead(
        &self,
        scan_id: Option<Uuid>,
        contact: &LeadContact,
        source: &str,
    ) -> Result<Uuid, ClientError> {
        let body = LeadBody {
            scan_id,
            email: &contact.email,
            phone: contact.phone.as_deref(),
            postcode: contact.postcode.as_deref(),
            source,
        };
        let created: LeadCreated = self.post("api/v1/capture-lead", &body, "capture-lead").await?;
        Ok(created.lead_id)
    }
}

/// `None` for events that do not settle the wait.
fn delivered_from(event: &SseEvent) -> Option<Result<Delivered, ClientError>> {
    match event.name.as_str() {
        "failed" => Some(Err(ClientError::GenerationFailed)),
        "recommendations" => {
            let parsed = serde_json::from_str::<RecommendationEvent>(&event.data)
                .map_err(|e| ClientError::Decode {
                    context: "recommendation event",
                    reason: e.to_string(),
                })
                .and_then(|ev| match (ev.status, ev.recommendations) {
                    (ScanStatus::Completed, Some(payload)) => Ok(Delivered {
                        payload,
                        source: ev.recommendation_source.unwrap_or(RecommendationSource::Ai),
                    }),
                    _ => Err(ClientError::GenerationFailed),
                });
            Some(parsed)
        }
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub name: String,
    pub data: String,
}

/// Incremental `text/event-stream` decoder. Comments and keep-alives are
/// skipped; an event without a name is reported as `message`.
///
/// Bytes are buffered until a blank line closes the event, so a UTF-8
/// sequence split across network chunks decodes intact.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    /// # Errors
    ///
    /// [`ClientError::Decode`] when a complete event is not valid UTF-8.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, ClientError> {
        self.buffer.extend(chunk.iter().filter(|&&b| b != b'\r'));
        let mut events = Vec::new();
        while let Some(end) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let block = String::from_utf8(block).map_err(|e| ClientError::Decode {
                context: "event stream",
                reason: e.to_string(),
            })?;
            if let Some(event) = parse_block(&block) {
                events.push(event);
            }
        }
        Ok(events)
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut name = None;
    let mut data: Vec<&str> = Vec::new();
    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => name = Some(value.to_owned()),
            "data" => data.push(value),
            _ => {}
        }
    }
    if name.is_none() && data.is_empty() {
        return None;
    }
    Some(SseEvent {
        name: name.unwrap_or_else(|| "message".to_owned()),
        data: data.join("\n"),
    })
}


#[cfg(test)]
#[path = "api_test.rs"]
mod wire_tests;
