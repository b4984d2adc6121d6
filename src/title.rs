//! Title normalization helpers shared by the cache key and candidate scoring.
//!
//! Two normal forms exist:
//! - [`normalize_whitespace_lower`] - lowercased, whitespace-collapsed text. This is
//!   what a [`CacheKey`](crate::CacheKey) is built from, so it stays close to the raw title.
//! - [`match_form`] - the aggressive comparison form used when scoring candidates
//!   (punctuation removed, `&` spelled out).

use std::sync::LazyLock;

use regex::Regex;

/// Matches a trailing `(2010)` or `[2010]` year marker.
#[allow(clippy::expect_used)]
static TRAILING_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<title>.*?)\s*[\(\[](?P<year>\d{4})[\)\]]\s*$")
        .expect("trailing year regex is valid")
});

/// Characters stripped by [`fallback_query`].
const FALLBACK_STRIP: &[char] = &['[', ']', '"', '(', ')', '–', '-'];

/// Lowercases, trims and collapses internal whitespace runs to a single space.
///
/// # Examples
///
/// ```
/// use titlesync_core::title::normalize_whitespace_lower;
///
/// assert_eq!(normalize_whitespace_lower("  The   Office "), "the office");
/// ```
#[must_use]
pub fn normalize_whitespace_lower(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Returns the comparison form of a title.
///
/// Lowercases, spells out `&`, drops every character that is not alphanumeric or
/// whitespace, then collapses whitespace. Apostrophes vanish rather than splitting
/// words, so `Schindler's List` and `Schindlers List` compare equal.
///
/// # Examples
///
/// ```
/// use titlesync_core::title::match_form;
///
/// assert_eq!(match_form("Law & Order: SVU"), "law and order svu");
/// assert_eq!(match_form("Schindler's List"), "schindlers list");
/// ```
#[must_use]
pub fn match_form(title: &str) -> String {
    let spelled = title.replace('&', " and ");
    let mut cleaned = String::with_capacity(spelled.len());
    for ch in spelled.chars() {
        if ch.is_alphanumeric() {
            cleaned.extend(ch.to_lowercase());
        } else if ch.is_whitespace() || matches!(ch, '-' | '–' | ':' | '/' | '.' | ',') {
            cleaned.push(' ');
        }
    }
    normalize_whitespace_lower(&cleaned)
}

/// Builds the retry query used when a search returns nothing.
///
/// Strips brackets, quotes and dashes; returns `None` when that changes nothing
/// (repeating the same query would be pointless).
#[must_use]
pub fn fallback_query(title: &str) -> Option<String> {
    let stripped: String = title.chars().filter(|c| !FALLBACK_STRIP.contains(c)).collect();
    let stripped = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if stripped.is_empty() || stripped == title.trim() {
        None
    } else {
        Some(stripped)
    }
}

/// Splits a trailing parenthesised or bracketed year off a title.
///
/// # Examples
///
/// ```
/// use titlesync_core::title::split_trailing_year;
///
/// assert_eq!(split_trailing_year("Inception (2010)"), ("Inception".to_string(), Some(2010)));
/// assert_eq!(split_trailing_year("Heat [1995]"), ("Heat".to_string(), Some(1995)));
/// assert_eq!(split_trailing_year("1917"), ("1917".to_string(), None));
/// ```
#[must_use]
pub fn split_trailing_year(title: &str) -> (String, Option<i32>) {
    let trimmed = title.trim();
    if let Some(caps) = TRAILING_YEAR.captures(trimmed) {
        let base = caps.name("title").map_or("", |m| m.as_str()).trim();
        let year = caps.name("year").and_then(|m| m.as_str().parse::<i32>().ok());
        if !base.is_empty() {
            return (base.to_string(), year);
        }
    }
    (trimmed.to_string(), None)
}
