use std::sync::LazyLock;

use regex::Regex;

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+(?:[.,]\d+)?").unwrap());

/// Placeholders the model writes when a value could not be read off the images.
pub const ABSENCE_PHRASES: &[&str] = &[
    "no observado en imágenes",
    "no disponible",
    "no disponible en imágenes",
    "sin dato",
    "not observed in images",
    "not available",
    "no data",
];

pub fn is_absence_phrase(value: &str) -> bool {
    let lower = value.trim().to_lowercase();
    ABSENCE_PHRASES.contains(&lower.as_str())
}

/// Pull the first number out of a details value.
///
/// Returns `None` for blanks, absence phrases and values without digits.
/// A comma decimal separator is rewritten to a dot. In integer mode the
/// number is truncated toward zero; values outside `i64` give `None`.
pub fn normalize_numeric(value: Option<&str>, integer: bool) -> Option<String> {
    let v = value?.trim();
    if v.is_empty() || is_absence_phrase(v) {
        return None;
    }

    let num = NUMBER_RE.find(v)?.as_str().replace(',', ".");
    if !integer {
        return Some(num);
    }

    let parsed: f64 = num.parse().ok()?;
    let truncated = parsed.trunc();
    // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
    if !truncated.is_finite() || truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return None;
    }
    Some(format!("{}", truncated as i64))
}

/// Trimmed text, or `None` when blank or an absence phrase.
pub fn normalize_text(value: Option<&str>) -> Option<String> {
    let v = value?.trim();
    if v.is_empty() || is_absence_phrase(v) {
        None
    } else {
        Some(v.to_string())
    }
}
