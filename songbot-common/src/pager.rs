//! Pagination and keyboard layout for search results
//!
//! Pages are 0-indexed. Out-of-range pages yield an empty window instead of
//! an error; the navigation controls are derived from the total count alone.

use crate::action::Action;
use crate::types::{ResultItem, SessionId};

/// Maximum characters of a title shown on a result button
pub const BUTTON_TITLE_CHARS: usize = 40;

pub const PREV_LABEL: &str = "⬅ Prev";
pub const NEXT_LABEL: &str = "Next ➡";
pub const CLOSE_LABEL: &str = "❌ Close";

/// One interactive control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: Action,
}

impl Button {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Rows of controls attached to a message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    /// A keyboard with no controls, used to strip a stale one
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Window `[page*page_size, page*page_size + page_size)` clamped to `results`
pub fn page(results: &[ResultItem], page: usize, page_size: usize) -> &[ResultItem] {
    let start = page.saturating_mul(page_size).min(results.len());
    let end = start.saturating_add(page_size).min(results.len());
    &results[start..end]
}

/// Number of non-empty pages
pub fn page_count(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

/// True when a page after `page` has at least one item
pub fn has_next(page: usize, page_size: usize, total: usize) -> bool {
    page.saturating_add(1).saturating_mul(page_size) < total
}

/// Build the result keyboard for one page
///
/// One row per item, then a navigation row holding Prev (not on the first
/// page), Next (only when items remain) and Close.
pub fn build_keyboard(
    session: SessionId,
    items: &[ResultItem],
    total: usize,
    page: usize,
    page_size: usize,
) -> Keyboard {
    let mut rows: Vec<Vec<Button>> = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            vec![Button::new(
                button_label(item),
                Action::Select { session, page, index },
            )]
        })
        .collect();

    let mut nav = Vec::new();
    if page > 0 {
        nav.push(Button::new(PREV_LABEL, Action::Page { session, page: page - 1 }));
    }
    if has_next(page, page_size, total) {
        nav.push(Button::new(NEXT_LABEL, Action::Page { session, page: page + 1 }));
    }
    nav.push(Button::new(CLOSE_LABEL, Action::Close { session }));

    if !nav.is_empty() {
        rows.push(nav);
    }

    Keyboard { rows }
}

/// Truncated title, or the item id when the title is blank
///
/// The chat service rejects a whole keyboard if any button has no text.
fn button_label(item: &ResultItem) -> String {
    let title = item.title.trim();
    let source = if title.is_empty() { item.id.as_str() } else { title };
    source.chars().take(BUTTON_TITLE_CHARS).collect()
}
