//! `LISTEN` side of the scan update notifications.
//!
//! The `scans_notify_recommendations` trigger publishes the scan id on
//! [`SCAN_UPDATES_CHANNEL`] whenever a scan leaves `pending`.

use sqlx::postgres::PgListener;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

pub const SCAN_UPDATES_CHANNEL: &str = "scan_updates";

/// Opens a dedicated connection listening on [`SCAN_UPDATES_CHANNEL`].
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the connection or `LISTEN` fails.
pub async fn listen_scan_updates(pool: &PgPool) -> Result<PgListener, DbError> {
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(SCAN_UPDATES_CHANNEL).await?;
    Ok(listener)
}

/// Extracts the scan id from a notification payload.
#[must_use]
pub fn parse_scan_notification(payload: &str) -> Option<Uuid> {
    Uuid::parse_str(payload.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_uuid_payload() {
        let id = Uuid::new_v4();
        assert_eq!(parse_scan_notification(&id.to_string()), Some(id));
        assert_eq!(parse_scan_notification(&format!(" {id}\n")), Some(id));
    }

    #[test]
    fn rejects_garbage_payload() {
        assert_eq!(parse_scan_notification("not-a-uuid"), None);
        assert_eq!(parse_scan_notification(""), None);
    }
}
