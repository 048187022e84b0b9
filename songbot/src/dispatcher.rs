//! Request dispatcher
//!
//! Routes inbound chat events to the query cache, the session store, the
//! pager and the media provider, and turns every failure into a chat reply.
//! Nothing here returns an error: a handler always ends by replying,
//! editing, or logging.

use crate::media::{FetchedAudio, MediaError};
use crate::transport::{AudioUpload, InboundEvent, TextFormat};
use crate::worker_pool::PoolError;
use crate::BotState;
use songbot_common::pager::{self, build_keyboard};
use songbot_common::title::{dedupe, parse_artist_title};
use songbot_common::{Action, CacheKey, MessageId, ResultItem, ResultSet, SessionId};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const GREETING: &str = "Hi! Send me an artist or song name 🎵\n(Example: Coldplay Viva La Vida)";
pub const NO_RESULTS: &str = "❌ No results found.";
pub const EXPIRED: &str = "❌ Item not found (maybe expired). Try searching again.";
pub const RESTRICTED: &str = "❌ Cannot download this video (login/region restriction).";
pub const BUSY: &str = "⏳ Busy right now, please try again in a moment.";

/// Handle one inbound event to completion
pub async fn handle_event(state: &BotState, event: InboundEvent) {
    match event {
        InboundEvent::Text { session, message, text } => handle_text(state, session, message, &text).await,
        InboundEvent::Action {
            session,
            action_id,
            message,
            data,
        } => handle_action(state, session, &action_id, message, &data).await,
    }
}

async fn handle_text(state: &BotState, session: SessionId, message: MessageId, text: &str) {
    let text = text.trim();

    if let Some(command) = text.strip_prefix('/') {
        let name = command.split_whitespace().next().unwrap_or_default();
        // "/start@MyBot" in group chats
        if name.split('@').next() == Some("start") {
            reply(state, session, GREETING).await;
        } else {
            debug!(session = %session, command = name, "Ignoring unknown command");
        }
        return;
    }

    if text.is_empty() {
        return;
    }

    search(state, session, message, text).await;
}

/// Look up (or fetch) results for `query` and open a fresh session on page 0
async fn search(state: &BotState, session: SessionId, message: MessageId, query: &str) {
    let key = CacheKey::new(session, query);

    let results = match state.cache.get(&key) {
        Some(results) => {
            debug!(session = %session, query, hits = results.len(), "Query cache hit");
            results
        }
        None => {
            let media = Arc::clone(&state.media);
            let owned_query = query.to_string();
            let limit = state.tunables.max_results;

            let outcome = state
                .pool
                .run("search", async move { media.search(&owned_query, limit).await })
                .await;

            match outcome {
                Ok(Ok(items)) => {
                    let results = ResultSet::from(dedupe(items));
                    state.cache.put(key, results.clone());
                    info!(session = %session, query, hits = results.len(), "Search completed");
                    results
                }
                Ok(Err(e)) => {
                    warn!(session = %session, query, "Search failure: {}", e);
                    reply(state, session, &format!("❌ Search error: {}", e)).await;
                    return;
                }
                Err(PoolError::Saturated) => {
                    warn!(session = %session, query, "Search rejected, worker pool saturated");
                    reply(state, session, BUSY).await;
                    return;
                }
                Err(e) => {
                    warn!(session = %session, query, "Search not run: {}", e);
                    reply(state, session, &format!("❌ Search error: {}", e)).await;
                    return;
                }
            }
        }
    };

    if results.is_empty() {
        reply(state, session, NO_RESULTS).await;
        return;
    }

    state.sessions.start_session(session, results.clone(), Some(message));

    let page_size = state.page_size();
    let keyboard = build_keyboard(session, pager::page(&results, 0, page_size), results.len(), 0, page_size);
    let mut ui_message = None;
    if let Some(header) = markdown_header(query, results.len()) {
        match state
            .transport
            .send_text(session, &header, TextFormat::Markdown, Some(&keyboard))
            .await
        {
            Ok(id) => ui_message = Some(id),
            Err(e) => warn!(session = %session, "Result header rejected, resending as plain text: {}", e),
        }
    }

    if ui_message.is_none() {
        let header = format!("🎵 Results for {} (found {})", query, results.len());
        match state
            .transport
            .send_text(session, &header, TextFormat::Plain, Some(&keyboard))
            .await
        {
            Ok(id) => ui_message = Some(id),
            Err(e) => warn!(session = %session, "Failed to send result list: {}", e),
        }
    }

    if let Some(ui_message) = ui_message {
        state.sessions.set_ui_message(session, ui_message);
    }
}

async fn handle_action(
    state: &BotState,
    session: SessionId,
    action_id: &str,
    message: Option<MessageId>,
    data: &str,
) {
    if let Err(e) = state.transport.acknowledge(action_id).await {
        debug!(session = %session, "Failed to acknowledge button press: {}", e);
    }

    let action = match Action::decode(data) {
        Ok(action) if action.session() == session => action,
        Ok(action) => {
            warn!(
                session = %session,
                payload_session = %action.session(),
                "Button payload belongs to another chat"
            );
            reply(state, session, EXPIRED).await;
            return;
        }
        Err(e) => {
            warn!(session = %session, data, "Malformed button payload: {}", e);
            reply(state, session, EXPIRED).await;
            return;
        }
    };

    match action {
        Action::Page { page, .. } => show_page(state, session, message, page).await,
        Action::Close { .. } => close(state, session, message).await,
        Action::Select { page, index, .. } => select(state, session, page, index).await,
    }
}

async fn show_page(state: &BotState, session: SessionId, message: Option<MessageId>, page: usize) {
    if !state.sessions.set_page(session, page) {
        reply(state, session, EXPIRED).await;
        return;
    }
    let Some(view) = state.sessions.snapshot(session) else {
        reply(state, session, EXPIRED).await;
        return;
    };

    let page_size = state.page_size();
    let keyboard = build_keyboard(
        session,
        pager::page(&view.results, view.page, page_size),
        view.results.len(),
        view.page,
        page_size,
    );

    debug!(
        session = %session,
        page = view.page,
        pages = pager::page_count(view.results.len(), page_size),
        "Showing result page"
    );

    let Some(target) = view.ui_message.or(message) else {
        return;
    };
    if let Err(e) = state.transport.edit_keyboard(session, target, &keyboard).await {
        debug!(session = %session, message = %target, "Failed to edit result keyboard: {}", e);
    }
}

async fn close(state: &BotState, session: SessionId, message: Option<MessageId>) {
    let mut retract = state.sessions.end_session(session);
    if retract.is_empty() {
        retract.extend(message);
    }

    for target in retract {
        if let Err(e) = state.transport.delete_message(session, target).await {
            debug!(session = %session, message = %target, "Failed to delete message: {}", e);
        }
    }
}

async fn select(state: &BotState, session: SessionId, page: usize, index: usize) {
    let item = state
        .sessions
        .snapshot(session)
        .and_then(|view| pager::page(&view.results, page, state.page_size()).get(index).cloned());

    let Some(item) = item else {
        reply(state, session, EXPIRED).await;
        return;
    };

    let progress = state
        .transport
        .send_text(session, &format!("⏳ Downloading: {}", item.title), TextFormat::Plain, None)
        .await
        .map_err(|e| debug!(session = %session, "Failed to send progress message: {}", e))
        .ok();

    let media = Arc::clone(&state.media);
    let locator = item.locator.clone();
    let outcome = state
        .pool
        .run("download", async move { media.fetch_audio(&locator).await })
        .await;

    match outcome {
        Ok(Ok(fetched)) => deliver(state, session, &item, fetched).await,
        Ok(Err(MediaError::Restricted(reason))) => {
            info!(session = %session, locator = %item.locator, reason = %reason, "Download restricted");
            reply(state, session, RESTRICTED).await;
        }
        Ok(Err(e)) => {
            warn!(session = %session, locator = %item.locator, "Download/play error: {}", e);
            reply(state, session, &format!("❌ Error: {}", e)).await;
        }
        Err(PoolError::Saturated) => reply(state, session, BUSY).await,
        Err(e) => {
            warn!(session = %session, locator = %item.locator, "Download not run: {}", e);
            reply(state, session, &format!("❌ Error: {}", e)).await;
        }
    }

    if let Some(progress) = progress {
        if let Err(e) = state.transport.delete_message(session, progress).await {
            debug!(session = %session, "Failed to delete progress message: {}", e);
        }
    }
}

/// Upload the audio; the artifact is removed when `fetched` goes out of scope
async fn deliver(state: &BotState, session: SessionId, item: &ResultItem, fetched: FetchedAudio) {
    let raw_title = fetched.title.as_deref().unwrap_or(&item.title);
    let (performer, title) = parse_artist_title(raw_title);

    let upload = AudioUpload {
        path: fetched.artifact.path().to_path_buf(),
        title,
        performer,
    };

    match state.transport.send_audio(session, &upload).await {
        Ok(_) => info!(
            session = %session,
            title = %upload.title,
            performer = %upload.performer,
            uploader = fetched.uploader.as_deref().unwrap_or("unknown"),
            "Audio delivered"
        ),
        Err(e) => {
            warn!(session = %session, title = %upload.title, "Audio upload failed: {}", e);
            reply(state, session, &format!("❌ Error: {}", e)).await;
        }
    }
}

/// Best-effort plain reply
async fn reply(state: &BotState, session: SessionId, text: &str) {
    if let Err(e) = state.transport.send_text(session, text, TextFormat::Plain, None).await {
        warn!(session = %session, "Failed to send reply: {}", e);
    }
}

/// Result header with the query in a legacy Markdown bold span
///
/// Backslash escapes are not honoured inside an entity, so the query goes in
/// verbatim except for `*`, which would close the span. `None` when nothing
/// is left to embolden.
pub fn markdown_header(query: &str, found: usize) -> Option<String> {
    let shown: String = query.chars().filter(|&c| c != '*').collect();
    let shown = shown.trim();
    if shown.is_empty() {
        return None;
    }
    Some(format!("🎵 Results for *{}* (found {})", shown, found))
}
