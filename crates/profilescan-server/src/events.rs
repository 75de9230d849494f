//! In-process fan-out of scan updates.
//!
//! One Postgres `LISTEN` connection feeds a broadcast channel; every SSE
//! client subscribes to the channel and filters for its own scan id.

use sqlx::PgPool;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct ScanEvents {
    tx: broadcast::Sender<Uuid>,
}

impl Default for ScanEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanEvents {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Announce that `scan_id` left `pending`. A send with no subscribers is
    /// not an error.
    pub fn publish(&self, scan_id: Uuid) {
        let _ = self.tx.send(scan_id);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Uuid> {
        self.tx.subscribe()
    }
}

/// Relays `scan_updates` notifications into `events` until `shutdown` fires.
///
/// A dropped listener connection is reopened after a short pause.
pub async fn relay_scan_updates(pool: PgPool, events: ScanEvents, shutdown: CancellationToken) {
    const RECONNECT_DELAY: std::time::Duration = std::time::Duration::from_secs(2);

    while !shutdown.is_cancelled() {
        let mut listener = match profilescan_db::listen_scan_updates(&pool).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(error = %e, "failed to LISTEN for scan updates");
                tokio::select! {
                    () = shutdown.cancelled() => return,
                    () = tokio::time::sleep(RECONNECT_DELAY) => continue,
                }
            }
        };
        tracing::info!("listening for scan updates");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => return,
                received = listener.recv() => match received {
                    Ok(notification) => {
                        match profilescan_db::parse_scan_notification(notification.payload()) {
                            Some(scan_id) => events.publish(scan_id),
                            None => tracing::warn!(
                                payload = notification.payload(),
                                "ignoring malformed scan notification"
                            ),
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "scan update listener dropped; reconnecting");
                        break;
                    }
                },
            }
        }
    }
}
