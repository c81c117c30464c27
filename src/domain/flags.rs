//! Validation rules for flag payloads and tag attributes.

use crate::domain::error::DomainError;
use crate::domain::types::FlagType;

/// Maximum number of characters a flag value may hold.
pub const MAX_FLAG_VALUE_CHARS: usize = 10_000;

/// Color assigned to tags created without one.
pub const DEFAULT_TAG_COLOR: &str = "#6366f1";

/// Check a flag value against the rules of its declared type.
///
/// The value stays an opaque string; only `JSON` flags get their payload
/// parsed, and nothing is rewritten.
pub fn validate_flag_value(flag_type: FlagType, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation("value must not be blank"));
    }

    let length = value.chars().count();
    if length > MAX_FLAG_VALUE_CHARS {
        return Err(DomainError::validation(format!(
            "value is {length} characters long; the limit is {MAX_FLAG_VALUE_CHARS}"
        )));
    }

    if flag_type == FlagType::Json
        && let Err(err) = serde_json::from_str::<serde_json::Value>(value)
    {
        return Err(DomainError::validation(format!(
            "value is not valid JSON: {err}"
        )));
    }

    Ok(())
}

/// Normalize a tag color, falling back to the default palette entry.
pub fn normalize_tag_color(color: Option<&str>) -> Result<String, DomainError> {
    let Some(raw) = color.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(DEFAULT_TAG_COLOR.to_string());
    };

    let digits = raw.strip_prefix('#').unwrap_or_default();
    let valid = raw.starts_with('#')
        && matches!(digits.len(), 3 | 6)
        && digits.chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(DomainError::validation(format!(
            "color `{raw}` must be a hex color such as #6366f1"
        )));
    }

    Ok(raw.to_ascii_lowercase())
}
