//! Title cleanup helpers
//!
//! Search providers return many uploads of the same song ("(Official Video)",
//! "[HD]", "(Lyrics)" …). These helpers fold such variants together and split
//! "Artist - Title" strings for audio metadata.

use crate::types::ResultItem;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]").expect("bracket pattern is valid"));

/// Performer used when a title has no "Artist - " prefix
pub const UNKNOWN_ARTIST: &str = "Unknown";

/// Lowercase, drop bracketed segments, collapse whitespace
pub fn clean_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped = BRACKETED.replace_all(&lowered, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep the first item for each cleaned title, preserving order
pub fn dedupe(items: Vec<ResultItem>) -> Vec<ResultItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(clean_title(&item.title)))
        .collect()
}

/// Split "Artist - Title" into (artist, title)
///
/// Bracketed segments are removed first. Only the first dash separates;
/// later dashes stay in the title.
pub fn parse_artist_title(raw: &str) -> (String, String) {
    let stripped = BRACKETED.replace_all(raw, "");

    match stripped.split_once('-') {
        Some((artist, title)) => (artist.trim().to_string(), title.trim().to_string()),
        None => (UNKNOWN_ARTIST.to_string(), stripped.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, title: &str) -> ResultItem {
        ResultItem::new(id, title, format!("https://x/{id}"))
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(
            clean_title("Coldplay - Viva La Vida (Official Video) [HD]"),
            "coldplay - viva la vida"
        );
        assert_eq!(clean_title("  A   B  "), "a b");
    }

    #[test]
    fn test_dedupe_keeps_first_variant() {
        let items = vec![
            item("1", "Coldplay - Viva La Vida (Official Video)"),
            item("2", "Coldplay - Viva La Vida [Lyrics]"),
            item("3", "Coldplay - Yellow"),
            item("4", "coldplay -  viva la vida"),
        ];
        let ids: Vec<_> = dedupe(items).into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_parse_artist_title() {
        assert_eq!(
            parse_artist_title("Coldplay - Viva La Vida (Official Video)"),
            ("Coldplay".to_string(), "Viva La Vida".to_string())
        );
        assert_eq!(
            parse_artist_title("Jay-Z - Empire State of Mind"),
            ("Jay".to_string(), "Z - Empire State of Mind".to_string())
        );
        assert_eq!(
            parse_artist_title("Untitled track [4K]"),
            (UNKNOWN_ARTIST.to_string(), "Untitled track".to_string())
        );
    }
}
