//! Identifiers and search result types

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use std::sync::Arc;

/// Chat conversation identifier
///
/// One session per chat. Travels inside button payloads, hence the
/// `Display`/`FromStr` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub i64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(SessionId)
    }
}

/// Chat message identifier, unique within one chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultItem {
    /// Provider identifier (video id)
    pub id: String,
    /// Display title as returned by the provider
    pub title: String,
    /// Locator handed to the download provider
    pub locator: String,
}

impl ResultItem {
    pub fn new(id: impl Into<String>, title: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            locator: locator.into(),
        }
    }
}

/// Ordered, immutable list of search hits
///
/// Cloning is cheap: the cache entry and the session populated from it
/// share one allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSet {
    items: Arc<[ResultItem]>,
}

impl ResultSet {
    pub fn new(items: Vec<ResultItem>) -> Self {
        Self {
            items: items.into(),
        }
    }

    /// True when both handles point at the same allocation
    pub fn ptr_eq(&self, other: &ResultSet) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }
}

impl Deref for ResultSet {
    type Target = [ResultItem];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl From<Vec<ResultItem>> for ResultSet {
    fn from(items: Vec<ResultItem>) -> Self {
        Self::new(items)
    }
}
