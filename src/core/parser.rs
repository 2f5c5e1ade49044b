//! Manifest text → ordered content items.
//!
//! A line is an image when it starts with `http` and ends with one of the
//! known extensions, both case-insensitively. The suffix is matched against
//! the literal line, so `https://x.com/b.webp?x=1` is text.

use crate::domain::ContentItem;

/// Extensions that mark a URL line as an image
pub const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".webp", ".gif"];

/// Parse manifest text, one item per non-empty trimmed line, in order
pub fn parse_manifest(content: &str) -> Vec<ContentItem> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(classify_line)
        .collect()
}

/// Classify a single trimmed line
pub fn classify_line(line: &str) -> ContentItem {
    if is_image_url(line) {
        ContentItem::image(line)
    } else {
        ContentItem::text(line)
    }
}

/// Case-insensitive `http` prefix and image-extension suffix
pub fn is_image_url(value: &str) -> bool {
    starts_with_ignore_case(value, "http")
        && IMAGE_EXTENSIONS
            .iter()
            .any(|ext| ends_with_ignore_case(value, ext))
}

fn starts_with_ignore_case(value: &str, prefix: &str) -> bool {
    value
        .as_bytes()
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix.as_bytes()))
}

fn ends_with_ignore_case(value: &str, suffix: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() >= suffix.len()
        && bytes[bytes.len() - suffix.len()..].eq_ignore_ascii_case(suffix.as_bytes())
}
