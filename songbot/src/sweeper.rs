//! Idle session sweeper
//!
//! Periodically drops sessions idle for longer than the configured limit,
//! strips the buttons from their result lists and purges expired cache
//! entries.

use crate::BotState;
use songbot_common::Keyboard;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Run one sweep; returns the number of sessions ended
pub async fn sweep_once(state: &BotState) -> usize {
    let expired = state.sessions.sweep_idle(state.tunables.session_idle);
    let purged = state.cache.purge_expired();

    for (session, ui_message) in &expired {
        let Some(message) = ui_message else {
            continue;
        };
        // Stale buttons would only answer "expired"
        if let Err(e) = state
            .transport
            .edit_keyboard(*session, *message, &Keyboard::empty())
            .await
        {
            debug!(session = %session, message = %message, "Failed to clear stale keyboard: {}", e);
        }
    }

    if !expired.is_empty() || purged > 0 {
        info!(sessions = expired.len(), cache_entries = purged, "Swept idle state");
    }

    expired.len()
}

/// Spawn the sweep loop; it exits when `shutdown` is cancelled
pub fn spawn_sweeper(state: BotState, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.tunables.sweep_interval);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    sweep_once(&state).await;
                }
            }
        }
    })
}
