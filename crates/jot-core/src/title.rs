//! Display titles for notes.
//!
//! Content may be plain text or rich-text markup from the editor widget. The
//! title is the first non-empty line once block tags and line breaks have been
//! turned into newlines and every other tag has been removed.

use std::sync::LazyLock;

use regex::Regex;

/// Label used when content has no visible text.
pub const UNTITLED_NOTE: &str = "Untitled Note";

/// Opening/closing block-level tags and `<br>` markers.
static BLOCK_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)</?(?:p|div|h[1-6]|li|ul|ol|blockquote|pre|section|article|header|footer|table|tr)(?:\s[^>]*)?>|<br\s*/?>",
    )
    .expect("hardcoded block tag regex")
});

/// Any remaining markup tag.
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("hardcoded tag regex"));

const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    // Must stay last so `&amp;lt;` decodes to `&lt;` and not `<`.
    ("&amp;", "&"),
];

/// Derive a non-empty display title from note content.
///
/// ```
/// use jot_core::title::derive_title;
///
/// assert_eq!(derive_title("<p>Hello</p><p>World</p>"), "Hello");
/// assert_eq!(derive_title(""), "Untitled Note");
/// ```
#[must_use]
pub fn derive_title(content: &str) -> String {
    let with_breaks = BLOCK_BREAK_RE.replace_all(content, "\n");
    let text = TAG_RE.replace_all(&with_breaks, "");

    text.lines()
        .map(|line| decode_entities(line).trim().to_string())
        .find(|line| !line.is_empty())
        .unwrap_or_else(|| UNTITLED_NOTE.to_string())
}

fn decode_entities(line: &str) -> String {
    ENTITIES
        .iter()
        .fold(line.to_string(), |acc, (entity, replacement)| {
            acc.replace(entity, replacement)
        })
}
