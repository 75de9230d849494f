//! Database operations for `scans`.

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use profilescan_core::{
    LeadContact, PlaceSummary, RecommendationPayload, RecommendationSource, ScanRecord,
    ScanStatus, ScoreSet,
};

use crate::DbError;

const SCAN_COLUMNS: &str = "id, business_name, business_location, place_id, \
     overall_score, reviews_score, engagement_score, photos_score, completeness_score, \
     place_summary, status, recommendations, recommendation_source, \
     email, phone, postcode, created_at, updated_at";

/// A row from the `scans` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScanRow {
    pub id: Uuid,
    pub business_name: String,
    pub business_location: String,
    pub place_id: String,
    pub overall_score: i16,
    pub reviews_score: i16,
    pub engagement_score: i16,
    pub photos_score: i16,
    pub completeness_score: i16,
    pub place_summary: serde_json::Value,
    pub status: String,
    pub recommendations: Option<serde_json::Value>,
    pub recommendation_source: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub postcode: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScanRow {
    /// Decode the row into the domain record.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidRow`] if a score is out of range or a JSON or
    /// enum column cannot be read.
    pub fn into_record(self) -> Result<ScanRecord, DbError> {
        let id = self.id;
        let invalid = |column: &'static str, reason: String| DbError::InvalidRow {
            id,
            column,
            reason,
        };
        let to_score = |column: &'static str, v: i16| {
            u8::try_from(v)
                .ok()
                .filter(|s| *s <= 100)
                .ok_or_else(|| invalid(column, format!("{v} is not a score")))
        };

        let scores = ScoreSet {
            overall: to_score("overall_score", self.overall_score)?,
            reviews: to_score("reviews_score", self.reviews_score)?,
            engagement: to_score("engagement_score", self.engagement_score)?,
            photos: to_score("photos_score", self.photos_score)?,
            completeness: to_score("completeness_score", self.completeness_score)?,
        };

        let place_summary: PlaceSummary = serde_json::from_value(self.place_summary)
            .map_err(|e| invalid("place_summary", e.to_string()))?;

        let status = ScanStatus::parse(&self.status)
            .ok_or_else(|| invalid("status", format!("unknown status '{}'", self.status)))?;

        let recommendations = self
            .recommendations
            .as_ref()
            .map(RecommendationPayload::parse_json)
            .transpose()
            .map_err(|e| invalid("recommendations", e.to_string()))?;

        let recommendation_source = self
            .recommendation_source
            .as_deref()
            .map(|s| {
                RecommendationSource::parse(s)
                    .ok_or_else(|| invalid("recommendation_source", format!("unknown source '{s}'")))
            })
            .transpose()?;

        let lead = self.email.map(|email| LeadContact {
            email,
            phone: self.phone,
            postcode: self.postcode,
        });

        Ok(ScanRecord {
            id,
            business_name: self.business_name,
            business_location: self.business_location,
            place_id: self.place_id,
            scores,
            place_summary,
            status,
            recommendations,
            recommendation_source,
            lead,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Input for [`insert_scan`].
#[derive(Debug, Clone)]
pub struct NewScan<'a> {
    pub business_name: &'a str,
    pub business_location: &'a str,
    pub scores: ScoreSet,
    pub place_summary: &'a PlaceSummary,
}

/// Inserts a scored scan in `pending` status.
///
/// Generates the id in Rust and returns the stored record.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_scan(pool: &PgPool, scan: &NewScan<'_>) -> Result<ScanRecord, DbError> {
    let id = Uuid::new_v4();
    let summary = serde_json::to_value(scan.place_summary).map_err(|e| DbError::InvalidRow {
        id,
        column: "place_summary",
        reason: e.to_string(),
    })?;

    let row = sqlx::query_as::<_, ScanRow>(&format!(
        "INSERT INTO scans (id, business_name, business_location, place_id, \
             overall_score, reviews_score, engagement_score, photos_score, completeness_score, \
             place_summary, status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending') \
         RETURNING {SCAN_COLUMNS}"
    ))
    .bind(id)
    .bind(scan.business_name)
    .bind(scan.business_location)
    .bind(&scan.place_summary.place_id)
    .bind(i16::from(scan.scores.overall))
    .bind(i16::from(scan.scores.reviews))
    .bind(i16::from(scan.scores.engagement))
    .bind(i16::from(scan.scores.photos))
    .bind(i16::from(scan.scores.completeness))
    .bind(summary)
    .fetch_one(pool)
    .await?;

    row.into_record()
}

/// Fetches one scan, or `None` if the id is unknown.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::InvalidRow`]
/// if the stored row cannot be decoded.
pub async fn get_scan(pool: &PgPool, id: Uuid) -> Result<Option<ScanRecord>, DbError> {
    let row = sqlx::query_as::<_, ScanRow>(&format!("SELECT {SCAN_COLUMNS} FROM scans WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.map(ScanRow::into_record).transpose()
}

/// Stores a recommendation payload and moves the scan to `completed`, but
/// only while it is still `pending`.
///
/// Returns `true` when this call performed the write, `false` when another
/// writer got there first (or the scan already failed).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn complete_scan_if_pending(
    pool: &PgPool,
    id: Uuid,
    payload: &RecommendationPayload,
    source: RecommendationSource,
) -> Result<bool, DbError> {
    let value = serde_json::to_value(payload).map_err(|e| DbError::InvalidRow {
        id,
        column: "recommendations",
        reason: e.to_string(),
    })?;

    let result = sqlx::query(
        "UPDATE scans \
         SET recommendations = $2, recommendation_source = $3, status = 'completed', \
             updated_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .bind(value)
    .bind(source.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Moves a still-`pending` scan to `failed`.
///
/// Returns `true` when the status changed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn fail_scan_if_pending(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE scans SET status = 'failed', updated_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Attaches lead contact fields to an existing scan.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no scan has this id, or [`DbError::Sqlx`]
/// if the update fails.
pub async fn update_scan_contact<'e, E>(
    executor: E,
    id: Uuid,
    contact: &LeadContact,
) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    let result = sqlx::query(
        "UPDATE scans SET email = $2, phone = $3, postcode = $4, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(&contact.email)
    .bind(contact.phone.as_deref())
    .bind(contact.postcode.as_deref())
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
