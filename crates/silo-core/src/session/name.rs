//! Display attribute validation.
//!
//! Normalization and validation rules for session display names and colors.
//! Validation happens before any mutation; a rejected attribute never
//! reaches the durable store.

use crate::error::{Result, SiloError};
use unicode_segmentation::UnicodeSegmentation;

/// Maximum display name length, counted in grapheme clusters so multi-byte
/// glyphs count as one unit.
pub const MAX_NAME_GRAPHEMES: usize = 50;

/// Characters rejected because they are markup-significant.
const FORBIDDEN_CHARS: [char; 5] = ['<', '>', '"', '\'', '`'];

/// Normalizes and validates a display name.
///
/// Leading/trailing whitespace is trimmed and internal whitespace runs are
/// collapsed to a single space before the length check.
///
/// # Errors
///
/// Returns `SiloError::Validation` if the normalized name is empty, longer
/// than [`MAX_NAME_GRAPHEMES`] grapheme clusters, or contains a
/// markup-significant character.
pub fn normalize_display_name(raw: &str) -> Result<String> {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    if normalized.is_empty() {
        return Err(SiloError::validation("display name must not be empty"));
    }

    if let Some(c) = normalized.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(SiloError::validation(format!(
            "display name must not contain '{c}'"
        )));
    }

    let length = normalized.graphemes(true).count();
    if length > MAX_NAME_GRAPHEMES {
        return Err(SiloError::validation(format!(
            "display name is {length} characters, maximum is {MAX_NAME_GRAPHEMES}"
        )));
    }

    Ok(normalized)
}

/// Returns the case-insensitive comparison key used for duplicate detection.
pub fn name_comparison_key(name: &str) -> String {
    name.to_lowercase()
}

/// Validates a display color in `#RRGGBB` form.
///
/// # Errors
///
/// Returns `SiloError::Validation` if the color is not a `#` followed by
/// exactly six hex digits.
pub fn validate_display_color(color: &str) -> Result<()> {
    let hex = color
        .strip_prefix('#')
        .ok_or_else(|| SiloError::validation("display color must start with '#'"))?;

    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SiloError::validation(format!(
            "display color '{color}' is not in #RRGGBB form"
        )));
    }

    Ok(())
}
