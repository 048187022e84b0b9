//! Long-polling update loop
//!
//! Pulls updates from the Bot API and hands each event to the dispatcher on
//! its own task, so a slow download never blocks paging in another chat.
//! Poll failures back off exponentially (1s doubling up to 30s) and reset on
//! the first success.

use crate::dispatcher;
use crate::transport::TelegramClient;
use crate::BotState;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Next delay after a failed poll
pub fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}

/// Poll until `shutdown` is cancelled
pub async fn run_polling(state: BotState, client: Arc<TelegramClient>, shutdown: CancellationToken) {
    let mut offset = 0;
    let mut backoff = INITIAL_BACKOFF;

    info!("Polling for updates");

    loop {
        let polled = tokio::select! {
            _ = shutdown.cancelled() => break,
            polled = client.poll_updates(offset) => polled,
        };

        match polled {
            Ok((events, next_offset)) => {
                offset = next_offset;
                backoff = INITIAL_BACKOFF;

                for event in events {
                    debug!(session = %event.session(), "Dispatching event");
                    let state = state.clone();
                    tokio::spawn(async move {
                        dispatcher::handle_event(&state, event).await;
                    });
                }
            }
            Err(e) => {
                warn!(retry_in_secs = backoff.as_secs(), "Polling failed: {}", e);
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = next_backoff(backoff);
            }
        }
    }

    info!("Polling stopped");
}
