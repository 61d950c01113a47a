//! Tag token extraction for comment text: `@handle` mentions and `#hashtags`
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use threadline_types::Comment;

/// @handle preceded by start of text or a non-word character, so email
/// addresses do not match
static MENTION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^@\w])@([a-zA-Z0-9_]+)").expect("Failed to compile mention regex")
});

/// #tag with at least 2 word characters
static HASHTAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"#(\w{2,})").expect("Failed to compile hashtag regex")
});

/// Unique lowercased mentions, in order of first appearance
pub fn extract_mentions(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    MENTION_REGEX
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().to_lowercase())
        .filter(|handle| seen.insert(handle.clone()))
        .collect()
}

/// Unique lowercased hashtags, in order of first appearance
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    HASHTAG_REGEX
        .captures_iter(text)
        .map(|cap| cap[1].to_lowercase())
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

/// Whether `text` already mentions `handle` (case-insensitive)
pub fn mentions(text: &str, handle: &str) -> bool {
    let handle = handle.to_lowercase();
    extract_mentions(text).iter().any(|m| *m == handle)
}

/// Tag accessors for anything that carries comment text
pub trait Tagged {
    fn mentions(&self) -> Vec<String>;
    fn hashtags(&self) -> Vec<String>;
}

impl Tagged for Comment {
    fn mentions(&self) -> Vec<String> {
        extract_mentions(&self.text)
    }

    fn hashtags(&self) -> Vec<String> {
        extract_hashtags(&self.text)
    }
}
