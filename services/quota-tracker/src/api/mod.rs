use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

pub mod handlers;
pub mod router;
pub mod types;
pub mod websocket;

pub use router::create_router;
pub use types::*;

use crate::config::QuotaServiceConfig;
use crate::tracker::{QuotaError, ResetEvent, SharedQuotaTracker};

const RESET_CHANNEL_CAPACITY: usize = 256;

pub struct ApiState {
    pub tracker: SharedQuotaTracker,
    pub config: Arc<QuotaServiceConfig>,
    pub reset_tx: broadcast::Sender<ResetEvent>,
}

impl ApiState {
    /// Subscribes to reset notifications for every configured feature and
    /// forwards them to websocket listeners.
    pub fn new(tracker: SharedQuotaTracker, config: QuotaServiceConfig) -> Result<Self, QuotaError> {
        let (reset_tx, _) = broadcast::channel(RESET_CHANNEL_CAPACITY);

        for feature in tracker.features() {
            let tx = reset_tx.clone();
            tracker.on_reset(&feature, move |event| {
                info!(
                    feature = %event.feature,
                    remaining = event.remaining,
                    listeners = tx.receiver_count(),
                    "quota restored"
                );
                // No listeners is fine.
                let _ = tx.send(event.clone());
            })?;
        }

        Ok(Self {
            tracker,
            config: Arc::new(config),
            reset_tx,
        })
    }
}
