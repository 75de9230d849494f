//! Scan data model shared by the server, the store, and the client controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Maximum number of quick wins a payload may carry.
pub const MAX_QUICK_WINS: usize = 3;

/// A visitor's scan submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub business_name: String,
    pub business_location: String,
}

impl ScanRequest {
    #[must_use]
    pub fn new(business_name: impl Into<String>, business_location: impl Into<String>) -> Self {
        Self {
            business_name: business_name.into(),
            business_location: business_location.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacePhoto {
    pub reference: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A resolved business listing from the places provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub place_id: String,
    pub name: String,
    /// Average star rating in `[0, 5]`, absent for unrated listings.
    pub rating: Option<f64>,
    pub review_count: u32,
    pub address: String,
    pub phone: Option<String>,
    pub website: Option<String>,
    /// Weekday description lines, e.g. `"Monday: 9:00 AM – 5:00 PM"`.
    pub opening_hours: Option<Vec<String>>,
    pub photos: Vec<PlacePhoto>,
    pub location: Option<LatLng>,
}

impl PlaceRecord {
    #[must_use]
    pub fn has_phone(&self) -> bool {
        is_present(self.phone.as_deref())
    }

    #[must_use]
    pub fn has_website(&self) -> bool {
        is_present(self.website.as_deref())
    }

    #[must_use]
    pub fn has_opening_hours(&self) -> bool {
        self.opening_hours
            .as_ref()
            .is_some_and(|lines| lines.iter().any(|l| !l.trim().is_empty()))
    }

    #[must_use]
    pub fn photo_count(&self) -> usize {
        self.photos.len()
    }

    /// Public projection returned to clients and sent to the advisor.
    #[must_use]
    pub fn summary(&self) -> PlaceSummary {
        PlaceSummary {
            place_id: self.place_id.clone(),
            name: self.name.clone(),
            address: self.address.clone(),
            rating: self.rating,
            review_count: self.review_count,
            phone: self.phone.clone(),
            website: self.website.clone(),
            photo_count: u32::try_from(self.photos.len()).unwrap_or(u32::MAX),
            has_opening_hours: self.has_opening_hours(),
        }
    }
}

pub(crate) fn is_present(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceSummary {
    pub place_id: String,
    pub name: String,
    pub address: String,
    pub rating: Option<f64>,
    pub review_count: u32,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub photo_count: u32,
    pub has_opening_hours: bool,
}

/// Business-health sub-scores, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSet {
    pub overall: u8,
    pub reviews: u8,
    pub engagement: u8,
    pub photos: u8,
    pub completeness: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
}

impl Priority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: String,
    pub action: String,
    pub impact: String,
    pub timeframe: String,
    pub difficulty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationPayload {
    pub priority: Priority,
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub quick_wins: Vec<String>,
    pub revenue_impact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competitive_risk: Option<String>,
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("recommendation payload is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("recommendation payload has unexpected shape: {0}")]
    UnexpectedShape(String),
}

impl RecommendationPayload {
    /// Parse a stored or generated payload.
    ///
    /// Accepts either a JSON object or a string holding JSON-encoded text.
    /// Quick wins beyond [`MAX_QUICK_WINS`] are dropped; a payload without
    /// any recommendation is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] when the value cannot be read as a payload.
    pub fn parse_json(value: &Value) -> Result<Self, PayloadError> {
        let mut payload: Self = match value {
            Value::Object(_) => serde_json::from_value(value.clone())?,
            Value::String(raw) => serde_json::from_str(raw.trim())?,
            Value::Null => return Err(PayloadError::UnexpectedShape("null".to_string())),
            Value::Bool(_) => return Err(PayloadError::UnexpectedShape("boolean".to_string())),
            Value::Number(_) => return Err(PayloadError::UnexpectedShape("number".to_string())),
            Value::Array(_) => return Err(PayloadError::UnexpectedShape("array".to_string())),
        };

        if payload.recommendations.is_empty() {
            return Err(PayloadError::UnexpectedShape(
                "no recommendations".to_string(),
            ));
        }
        payload.quick_wins.retain(|w| !w.trim().is_empty());
        payload.quick_wins.truncate(MAX_QUICK_WINS);
        Ok(payload)
    }
}

/// Which generator produced a stored payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationSource {
    Ai,
    Fallback,
}

impl RecommendationSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RecommendationSource::Ai => "ai",
            RecommendationSource::Fallback => "fallback",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ai" => Some(Self::Ai),
            "fallback" => Some(Self::Fallback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Completed,
    Failed,
}

impl ScanStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadContact {
    pub email: String,
    pub phone: Option<String>,
    pub postcode: Option<String>,
}

/// Synchronous result of a successful scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub scan_id: Uuid,
    pub scores: ScoreSet,
    pub place_summary: PlaceSummary,
}

/// The persisted unit of work for one business-profile scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub id: Uuid,
    pub business_name: String,
    pub business_location: String,
    pub place_id: String,
    pub scores: ScoreSet,
    pub place_summary: PlaceSummary,
    pub status: ScanStatus,
    pub recommendations: Option<RecommendationPayload>,
    pub recommendation_source: Option<RecommendationSource>,
    pub lead: Option<LeadContact>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
