use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

pub const DEFAULT_SLUG: &str = "page";

static UNDERSCORE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_+").unwrap());

/// Filesystem-safe name for a title: `"Home Page!"` becomes `home_page`.
pub fn slug(text: &str) -> String {
    slug_or(text, DEFAULT_SLUG)
}

pub fn slug_or(text: &str, fallback: &str) -> String {
    // NFKD splits accented letters into base + combining mark; the mark is non-ascii and dropped
    let ascii: String = text.nfkd().filter(char::is_ascii).collect();
    let replaced: String = ascii
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let collapsed = UNDERSCORE_RUN_RE.replace_all(&replaced, "_");
    let trimmed = collapsed.trim_matches('_');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

// ── Tests ──
