//! Local name rules for downloaded files and folders.
//!
//! Remote names are kept as-is apart from path separators, which would
//! otherwise escape the destination directory. Names longer than the common
//! 255-byte file system limit are shortened while keeping the extension.

/// Maximum encoded length of a single path component.
pub const MAX_NAME_BYTES: usize = 255;

const FALLBACK_NAME: &str = "unnamed";

/// Strips path separators from a remote name.
///
/// A name that is empty afterwards becomes `unnamed`.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| !matches!(c, '/' | '\\')).collect();
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned
    }
}

/// Appends the export extension (`report` + `pdf` -> `report.pdf`).
#[must_use]
pub fn with_export_extension(name: &str, extension: &str) -> String {
    format!("{name}.{extension}")
}

/// Shortens `name` to at most `limit` UTF-8 bytes.
///
/// The extension (text after the last dot, dot included) is preserved and the
/// base is cut on a char boundary. When the extension alone does not fit, the
/// whole name is cut instead.
#[must_use]
pub fn truncate_to_byte_limit(name: &str, limit: usize) -> String {
    if name.len() <= limit {
        return name.to_string();
    }
    let (base, extension) = split_extension(name);
    if extension.len() >= limit {
        return take_bytes(name, limit).to_string();
    }
    let base = take_bytes(base, limit - extension.len());
    format!("{base}{extension}")
}

/// Splits `archive.tar.gz` into (`archive.tar`, `.gz`). Dotfiles have no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) if index > 0 => name.split_at(index),
        _ => (name, ""),
    }
}

/// Longest prefix of `value` no longer than `max_bytes` that ends on a char boundary.
fn take_bytes(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Whether the trimmed, lowercased name ends with any excluded suffix.
///
/// Suffixes are expected in lowercase already.
#[must_use]
pub fn is_excluded<'a, I>(name: &str, excluded_suffixes: I) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    let lowered = name.trim().to_lowercase();
    excluded_suffixes
        .into_iter()
        .any(|suffix| !suffix.is_empty() && lowered.ends_with(suffix.as_str()))
}
