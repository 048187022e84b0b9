//! songbot library interface
//!
//! Exposes the dispatcher and its collaborators for the binary and for
//! integration tests.

pub mod dispatcher;
pub mod media;
pub mod poller;
pub mod sweeper;
pub mod transport;
pub mod worker_pool;

use chrono::{DateTime, Utc};
use media::MediaProvider;
use songbot_common::config::Tunables;
use songbot_common::{QueryCache, SessionStore};
use std::sync::Arc;
use transport::ChatTransport;
use worker_pool::WorkerPool;

/// State shared by every request handler
///
/// Built once at startup; clones share the same stores.
#[derive(Clone)]
pub struct BotState {
    /// Per-session query cache
    pub cache: QueryCache,
    /// Active result sets and page cursors
    pub sessions: SessionStore,
    /// Bounded pool for search and download jobs
    pub pool: WorkerPool,
    /// Search/download backend
    pub media: Arc<dyn MediaProvider>,
    /// Outbound chat calls
    pub transport: Arc<dyn ChatTransport>,
    /// Immutable tunables
    pub tunables: Arc<Tunables>,
    /// Service startup timestamp for uptime logging
    pub startup_time: DateTime<Utc>,
}

impl BotState {
    pub fn new(
        tunables: Tunables,
        media: Arc<dyn MediaProvider>,
        transport: Arc<dyn ChatTransport>,
    ) -> songbot_common::Result<Self> {
        Ok(Self {
            cache: QueryCache::new(tunables.cache_capacity, tunables.cache_ttl)?,
            sessions: SessionStore::new(tunables.page_size),
            pool: WorkerPool::new(tunables.workers, tunables.queue_depth),
            media,
            transport,
            tunables: Arc::new(tunables),
            startup_time: Utc::now(),
        })
    }

    pub fn page_size(&self) -> usize {
        self.sessions.page_size()
    }
}
