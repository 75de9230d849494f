//! Fixed-window request counters in `rate_limit_hits`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// Counts one request against `bucket_key` in the window starting at
/// `window_start` and returns the number of hits in that window so far,
/// including this one.
///
/// The upsert is atomic, so concurrent instances never lose a hit.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn record_rate_limit_hit(
    pool: &PgPool,
    bucket_key: &str,
    window_start: DateTime<Utc>,
) -> Result<i32, DbError> {
    let hits = sqlx::query_scalar::<_, i32>(
        "INSERT INTO rate_limit_hits (bucket_key, window_start, hits) \
         VALUES ($1, $2, 1) \
         ON CONFLICT (bucket_key, window_start) \
         DO UPDATE SET hits = rate_limit_hits.hits + 1 \
         RETURNING hits",
    )
    .bind(bucket_key)
    .bind(window_start)
    .fetch_one(pool)
    .await?;

    Ok(hits)
}

/// Deletes counters for windows that started before `cutoff`.
///
/// Returns the number of rows removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn prune_rate_limit_hits(pool: &PgPool, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM rate_limit_hits WHERE window_start < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
