//! Plain-text conversion for length-limited target fields.

use std::sync::LazyLock;

/// Maximum length of a group's native description field.
pub const MAX_DESCRIPTION_LENGTH: usize = 512;

static LINE_BREAK_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)<br\s*/?>|</p\s*>|</div\s*>|</li\s*>")
        .expect("LINE_BREAK_RE is a valid regex pattern")
});

static TAG_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"<[^>]*>").expect("TAG_RE is a valid regex pattern"));

static BLANK_RUN_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"[ \t]+").expect("BLANK_RUN_RE is a valid regex pattern"));

const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&apos;", "'"),
    ("&amp;", "&"),
];

/// Convert simple HTML to plain text and cap it at `max_chars` characters.
///
/// Block-closing tags become line breaks, every other tag is dropped and the
/// common named entities are decoded.
#[must_use]
pub fn html_to_plain_text(html: &str, max_chars: usize) -> String {
    let text = LINE_BREAK_RE.replace_all(html, "\n");
    let text = TAG_RE.replace_all(&text, "");
    let mut text = BLANK_RUN_RE.replace_all(&text, " ").into_owned();
    for (entity, replacement) in ENTITIES {
        text = text.replace(entity, replacement);
    }
    let text = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    truncate_chars(&text, max_chars)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}
