//! Place-name folding shared by the parser, aggregator and geocoder.

use deunicode::deunicode;

/// City names analytics vendors and Clustrmaps use for "no city resolved".
const PLACEHOLDERS: [&str; 5] = ["unknown location", "(not set)", "unknown", "unspecified", "-"];

/// Lowercased ASCII key: `"  Zürich "` and `"zurich"` both fold to `"zurich"`.
///
/// Inner runs of whitespace collapse to one space.
pub fn fold_key(name: &str) -> String {
    deunicode(name)
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether `city` is a placeholder rather than a real place.
pub fn is_placeholder_city(city: &str) -> bool {
    let city = city.trim();
    PLACEHOLDERS.iter().any(|p| city.eq_ignore_ascii_case(p))
}
