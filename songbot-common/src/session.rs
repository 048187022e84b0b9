//! Session store
//!
//! One entry per chat: the active result set, the page cursor, the message
//! carrying the result keyboard, and the user's query message.
//!
//! Sessions end on an explicit close or when the idle sweep removes them.

use crate::types::{MessageId, ResultSet, SessionId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

struct SessionState {
    results: ResultSet,
    page: usize,
    ui_message: Option<MessageId>,
    request_message: Option<MessageId>,
    last_activity: Instant,
}

/// Read-only copy of a session, handed to request handlers
#[derive(Debug, Clone)]
pub struct SessionView {
    pub results: ResultSet,
    pub page: usize,
    pub ui_message: Option<MessageId>,
}

/// Shared handle to all chat sessions
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<SessionId, SessionState>>>,
    page_size: usize,
}

impl SessionStore {
    pub fn new(page_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Replace any prior state for `id` and rewind to page 0
    pub fn start_session(&self, id: SessionId, results: ResultSet, request_message: Option<MessageId>) {
        let mut sessions = self.lock();
        let replaced = sessions.insert(
            id,
            SessionState {
                results,
                page: 0,
                ui_message: None,
                request_message,
                last_activity: Instant::now(),
            },
        );
        debug!(session = %id, replaced = replaced.is_some(), "Session started");
    }

    /// Record the message that carries the result keyboard
    pub fn set_ui_message(&self, id: SessionId, message: MessageId) -> bool {
        match self.lock().get_mut(&id) {
            Some(state) => {
                state.ui_message = Some(message);
                true
            }
            None => false,
        }
    }

    /// Move the cursor; false when the session is gone or `page` is out of range
    pub fn set_page(&self, id: SessionId, page: usize) -> bool {
        let mut sessions = self.lock();
        let Some(state) = sessions.get_mut(&id) else {
            return false;
        };

        if !page_in_bounds(page, self.page_size, state.results.len()) {
            return false;
        }

        state.page = page;
        state.last_activity = Instant::now();
        true
    }

    pub fn get_page(&self, id: SessionId) -> Option<usize> {
        self.lock().get(&id).map(|state| state.page)
    }

    /// Copy out the session and mark it active
    pub fn snapshot(&self, id: SessionId) -> Option<SessionView> {
        let mut sessions = self.lock();
        let state = sessions.get_mut(&id)?;
        state.last_activity = Instant::now();

        Some(SessionView {
            results: state.results.clone(),
            page: state.page,
            ui_message: state.ui_message,
        })
    }

    /// Drop all state for `id`
    ///
    /// Returns the messages to retract: the result keyboard first, then the
    /// user's query.
    pub fn end_session(&self, id: SessionId) -> Vec<MessageId> {
        match self.lock().remove(&id) {
            Some(state) => state
                .ui_message
                .into_iter()
                .chain(state.request_message)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Remove sessions idle for longer than `max_idle`
    ///
    /// Returns each removed session with its keyboard message, if any.
    pub fn sweep_idle(&self, max_idle: Duration) -> Vec<(SessionId, Option<MessageId>)> {
        self.sweep_idle_at(max_idle, Instant::now())
    }

    pub fn sweep_idle_at(&self, max_idle: Duration, now: Instant) -> Vec<(SessionId, Option<MessageId>)> {
        let mut sessions = self.lock();

        let idle: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, state)| now.saturating_duration_since(state.last_activity) > max_idle)
            .map(|(id, _)| *id)
            .collect();

        idle.into_iter()
            .filter_map(|id| sessions.remove(&id).map(|state| (id, state.ui_message)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, SessionState>> {
        self.inner.lock().expect("session store lock poisoned")
    }
}

/// Page 0 is always addressable; later pages must start inside the results
fn page_in_bounds(page: usize, page_size: usize, len: usize) -> bool {
    page == 0 || page.checked_mul(page_size).is_some_and(|start| start < len)
}
