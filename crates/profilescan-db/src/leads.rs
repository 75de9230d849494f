//! Database operations for `leads`.

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use profilescan_core::LeadContact;

use crate::scans::update_scan_contact;
use crate::DbError;

/// A row from the `leads` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LeadRow {
    pub id: Uuid,
    pub scan_id: Option<Uuid>,
    pub email: String,
    pub phone: Option<String>,
    pub postcode: Option<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// Input for [`insert_lead`].
#[derive(Debug, Clone)]
pub struct NewLead<'a> {
    pub scan_id: Option<Uuid>,
    pub email: &'a str,
    pub phone: Option<&'a str>,
    pub postcode: Option<&'a str>,
    pub source: &'a str,
}

/// Records a captured lead, optionally linked to a scan.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including a foreign-key
/// violation for an unknown `scan_id`).
pub async fn insert_lead<'e, E>(executor: E, lead: &NewLead<'_>) -> Result<LeadRow, DbError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, LeadRow>(
        "INSERT INTO leads (id, scan_id, email, phone, postcode, source) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id, scan_id, email, phone, postcode, source, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(lead.scan_id)
    .bind(lead.email)
    .bind(lead.phone)
    .bind(lead.postcode)
    .bind(lead.source)
    .fetch_one(executor)
    .await?;

    Ok(row)
}

/// Stores a lead and, when it names a scan, copies the contact details onto
/// that scan. Both writes commit together or not at all.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if `lead.scan_id` names no scan, or
/// [`DbError::Sqlx`] if either write fails.
pub async fn capture_lead(pool: &PgPool, lead: &NewLead<'_>) -> Result<LeadRow, DbError> {
    let mut tx = pool.begin().await?;

    if let Some(scan_id) = lead.scan_id {
        let contact = LeadContact {
            email: lead.email.to_owned(),
            phone: lead.phone.map(str::to_owned),
            postcode: lead.postcode.map(str::to_owned),
        };
        update_scan_contact(&mut *tx, scan_id, &contact).await?;
    }
    let row = insert_lead(&mut *tx, lead).await?;

    tx.commit().await?;
    Ok(row)
}

/// Lists leads attached to one scan, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_leads_for_scan(pool: &PgPool, scan_id: Uuid) -> Result<Vec<LeadRow>, DbError> {
    let rows = sqlx::query_as::<_, LeadRow>(
        "SELECT id, scan_id, email, phone, postcode, source, created_at \
         FROM leads WHERE scan_id = $1 ORDER BY created_at, id",
    )
    .bind(scan_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
