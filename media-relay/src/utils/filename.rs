//! Filename helpers for client-supplied names.
//!
//! Uploaded files are never stored under the name the client sent. Only a
//! sanitized extension survives, because the converters sniff the input
//! format from it.

/// Characters that are invalid in Windows filenames
const WINDOWS_INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved filenames (case-insensitive)
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Longest extension kept from an uploaded filename.
const MAX_EXTENSION_LEN: usize = 10;

/// Sanitize a string for use in filenames across all platforms.
///
/// Control characters and Windows-invalid characters become a single `_`,
/// leading/trailing spaces and dots are trimmed, reserved names are prefixed
/// with `_`, and an empty result becomes `"unnamed"`.
pub fn sanitize_filename(input: &str) -> String {
    if input.is_empty() {
        return "unnamed".to_string();
    }

    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || WINDOWS_INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let upper = trimmed.to_uppercase();
    for reserved in WINDOWS_RESERVED_NAMES {
        if upper == *reserved || upper.starts_with(&format!("{}.", reserved)) {
            return format!("_{}", trimmed);
        }
    }

    trimmed.to_string()
}

/// Extract a safe, lowercase extension from a client-supplied filename.
///
/// Returns `None` when the name has no usable extension. Anything that is not
/// ASCII alphanumeric disqualifies the extension.
pub fn safe_extension(original_name: &str) -> Option<String> {
    let sanitized = sanitize_filename(original_name);
    let (stem, ext) = sanitized.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > MAX_EXTENSION_LEN {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
