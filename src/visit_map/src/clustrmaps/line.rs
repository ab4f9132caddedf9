//! Line classification for Clustrmaps dumps.
//!
//! Dumps come from copy-pasting the dashboard, so the same table shows up
//! tab-separated, colon-separated, or aligned with runs of spaces:
//!
//! ```text
//! ====== 2025-01-01
//! Country	Visits	Uniques
//! United States	40	17
//! 	Seattle, WA	20	12
//! 	Unknown location	6	5
//! France: 3
//!   - Paris: 3
//! ```

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*={6,}\s*(\d{4}-\d{2}-\d{2}|\S+)").expect("marker pattern compiles")
});

static SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":|\s{2,}").expect("separator pattern compiles"));

static TRAILING_COUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*?\S)\s+([\d,]+)$").expect("trailing count pattern compiles")
});

const BULLETS: [char; 3] = ['-', '*', '•'];

/// What a single non-blank line is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    /// `====== 2025-01-01`. `Err` carries the text that should have been a date.
    Marker(Result<NaiveDate, &'a str>),
    /// Table column titles (`Country`, `Top 10 locations`, ...).
    ColumnHeader,
    /// Non-indented row: a country and its fields after the name.
    Country { name: &'a str, count: Option<u64> },
    /// Indented or bulleted row under a country.
    City { name: &'a str, count: Option<u64> },
}

/// Classify one line. Blank lines give `None`.
pub fn classify(line: &str) -> Option<Line<'_>> {
    if line.trim().is_empty() {
        return None;
    }
    if let Some(caps) = MARKER.captures(line) {
        let raw = caps.get(1).map_or("", |m| m.as_str());
        return Some(Line::Marker(
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| raw),
        ));
    }

    let indented = line.starts_with(char::is_whitespace);
    let trimmed = line.trim();
    let (bulleted, body) = strip_bullet(trimmed);

    let fields = split_fields(body);
    let name = fields.first().copied().unwrap_or(body);
    if is_column_header(name) {
        return Some(Line::ColumnHeader);
    }
    let count = uniques_count(&fields[1.min(fields.len())..]);

    if indented || bulleted {
        Some(Line::City { name, count })
    } else {
        Some(Line::Country { name, count })
    }
}

fn strip_bullet(s: &str) -> (bool, &str) {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(b), Some(next)) if BULLETS.contains(&b) && next.is_whitespace() => {
            (true, s[b.len_utf8()..].trim_start())
        }
        _ => (false, s),
    }
}

/// Split a row into trimmed, non-empty fields.
///
/// Tab-separated rows split on tabs only, since their date columns contain `:`.
pub fn split_fields(body: &str) -> Vec<&str> {
    let fields: Vec<&str> = if body.contains('\t') {
        body.split('\t').map(str::trim).filter(|f| !f.is_empty()).collect()
    } else {
        SEPARATOR
            .split(body)
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect()
    };
    if fields.len() == 1 {
        if let Some(caps) = TRAILING_COUNT.captures(fields[0]) {
            if let (Some(name), Some(count)) = (caps.get(1), caps.get(2)) {
                return vec![name.as_str(), count.as_str()];
            }
        }
    }
    fields
}

/// The uniques column of a row's fields after the name.
///
/// When the first two fields are both counts the row is the dashboard table
/// (`visits, uniques, depth, last visit`) and uniques is the second, whatever the
/// depth column holds. Otherwise it is the last field made only of digits
/// (thousands separators allowed).
pub fn uniques_count(fields: &[&str]) -> Option<u64> {
    if let [visits, uniques, ..] = fields {
        if let (Some(_), Some(n)) = (parse_count(visits), parse_count(uniques)) {
            return Some(n);
        }
    }
    fields.iter().rev().find_map(|f| parse_count(f))
}

fn parse_count(field: &str) -> Option<u64> {
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_digit() || c == ',') {
        return None;
    }
    field.replace(',', "").parse().ok()
}

fn is_column_header(first: &str) -> bool {
    let lower = first.to_lowercase();
    matches!(
        lower.as_str(),
        "country" | "countries" | "city" | "cities" | "location" | "locations"
    ) || lower.starts_with("top ")
}

/// `"Seattle, WA"` -> `"Seattle"`.
pub fn city_without_region(name: &str) -> &str {
    name.split_once(',').map_or(name, |(city, _)| city).trim()
}
