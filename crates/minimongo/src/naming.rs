//! Collection name derivation

use once_cell::sync::Lazy;
use regex::Regex;

static WORD_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("valid regex"));
static LOWER_UPPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid regex"));

/// Converts a CamelCase name to under_score.
///
/// ```
/// assert_eq!(minimongo::to_underscore("FooBar"), "foo_bar");
/// assert_eq!(minimongo::to_underscore("FOOBar"), "foo_bar");
/// ```
pub fn to_underscore(name: &str) -> String {
    let first = WORD_BOUNDARY.replace_all(name, "${1}_${2}");
    LOWER_UPPER
        .replace_all(&first, "${1}_${2}")
        .to_lowercase()
}
