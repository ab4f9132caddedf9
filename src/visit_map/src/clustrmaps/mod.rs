//! Historical Clustrmaps dumps.
//!
//! A dump is plain text pasted from the Clustrmaps dashboard, one block per period:
//!
//! ```text
//! ====== 2025-01-01
//! United States	5
//! 	Seattle	3
//! 	Unknown location	2
//! ```
//!
//! [`parse`] turns it into dated [`VisitRecord`](crate::record::VisitRecord)s: one per
//! (country, city) and period, stamped at the period's midnight. "Unknown location" and
//! similar placeholders count toward the country itself ([`Locality::CountryLevel`]).
//! Malformed lines never stop the parse; they are reported as [`ParseWarning`]s.
//!
//! [`summary`] collapses a whole dump into per-location totals and reads/writes them
//! as CSV for use as a render overlay.
//!
//! [`Locality::CountryLevel`]: crate::record::Locality::CountryLevel

pub mod line;
mod parser;
pub mod summary;

use std::fmt;

use chrono_tz::Tz;

pub use parser::ClustrmapsParser;

/// Source id used for dump imports unless configured otherwise.
pub const DEFAULT_SOURCE: &str = "clustrmaps";

#[derive(Debug, Clone)]
pub struct ParserOptions {
    /// Recorded in each record's provenance and used as the cursor key.
    pub source: String,
    /// Add `header total - sum(city lines)` to the country-level bucket.
    pub fold_header_residual: bool,
    /// Zone whose midnight starts each period.
    pub timezone: Tz,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            fold_header_residual: true,
            timezone: Tz::UTC,
        }
    }
}

/// A skipped dump line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based line number.
    pub line: usize,
    pub kind: WarningKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    BadMarkerDate(String),
    HeaderWithoutCount(String),
    CityWithoutCount(String),
    ZeroCount(String),
    OrphanCity(String),
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::BadMarkerDate(d) => write!(f, "date marker with invalid date '{d}'"),
            WarningKind::HeaderWithoutCount(c) => write!(f, "country header '{c}' has no count"),
            WarningKind::CityWithoutCount(c) => write!(f, "city line '{c}' has no count"),
            WarningKind::ZeroCount(c) => write!(f, "city line '{c}' has a zero count"),
            WarningKind::OrphanCity(c) => write!(f, "city line '{c}' has no country above it"),
        }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

/// Parse with default options.
pub fn parse(text: &str) -> ClustrmapsParser<'_> {
    ClustrmapsParser::new(text, ParserOptions::default())
}

pub fn parse_with(text: &str, options: ParserOptions) -> ClustrmapsParser<'_> {
    ClustrmapsParser::new(text, options)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    use super::*;
    use crate::record::{Locality, Provenance, VisitRecord};

    fn triples(records: &[VisitRecord]) -> Vec<(String, String, u64)> {
        records
            .iter()
            .map(|r| (r.country().to_string(), r.city().to_string(), r.num_unique.get()))
            .collect()
    }

    #[test]
    fn seattle_and_unknown_location() {
        let dump = "====== 2025-01-01\nUnited States: 5\n  Seattle: 3\n  Unknown location: 2\n";
        let records: Vec<_> = parse(dump).collect();
        assert_eq!(
            triples(&records),
            vec![
                ("United States".into(), "Seattle".into(), 3),
                ("United States".into(), "".into(), 2),
            ]
        );
        let day = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert!(records.iter().all(|r| r.timestamp == day));
        assert_eq!(
            records[0].provenance,
            Provenance::Historical {
                source: "clustrmaps".into()
            }
        );
        assert_eq!(records[1].locality, Locality::CountryLevel);
    }

    #[test]
    fn residual_duplicates_and_regions() {
        let dump = "\
====== 2025-02-01
Country\tVisits\tUniques
France\t20\t10
\tParis, Ile-de-France\t5\t3
\tParis\t2\t1
\tLyon\t3\t2
";
        let got = triples(&parse(dump).collect::<Vec<_>>());
        assert_eq!(
            got,
            vec![
                ("France".into(), "Paris".into(), 4),
                ("France".into(), "Lyon".into(), 2),
                ("France".into(), "".into(), 4),
            ]
        );

        let opts = ParserOptions {
            fold_header_residual: false,
            ..ParserOptions::default()
        };
        let got = triples(&parse_with(dump, opts).collect::<Vec<_>>());
        assert_eq!(got.iter().map(|t| t.2).sum::<u64>(), 6);
    }

    #[test]
    fn warnings_do_not_abort() {
        let dump = "\
preamble that is ignored	99
====== 2025-03-01
Germany
\tBerlin\t4
Spain\t3
\tMadrid\tlots
\tSeville\t0
====== 2025-13-01
Italy\t7
====== 2025-03-02
Spain\t1
";
        let mut parser = parse(dump);
        let records: Vec<_> = parser.by_ref().collect();
        assert_eq!(
            triples(&records),
            vec![
                ("Germany".into(), "Berlin".into(), 4),
                ("Spain".into(), "".into(), 3),
                ("Spain".into(), "".into(), 1),
            ]
        );
        let kinds: Vec<_> = parser.warnings().iter().map(|w| (w.line, w.kind.clone())).collect();
        assert_eq!(
            kinds,
            vec![
                (3, WarningKind::HeaderWithoutCount("Germany".into())),
                (6, WarningKind::CityWithoutCount("Madrid".into())),
                (7, WarningKind::ZeroCount("Seville".into())),
                (8, WarningKind::BadMarkerDate("2025-13-01".into())),
            ]
        );
    }

    #[test]
    fn header_without_count_keeps_its_cities() {
        let dump = "\
====== 2025-01-01
\tLima\t2
United States
  Seattle: 3
  Unknown location: 2
";
        let mut parser = parse(dump);
        let records: Vec<_> = parser.by_ref().collect();
        assert_eq!(
            triples(&records),
            vec![
                ("United States".into(), "Seattle".into(), 3),
                ("United States".into(), "".into(), 2),
            ]
        );
        let kinds: Vec<_> = parser.warnings().iter().map(|w| (w.line, w.kind.clone())).collect();
        assert_eq!(
            kinds,
            vec![
                (2, WarningKind::OrphanCity("Lima".into())),
                (3, WarningKind::HeaderWithoutCount("United States".into())),
            ]
        );
    }

    #[test]
    fn integer_depth_column_is_not_read_as_uniques() {
        let dump = "\
====== 2025-01-01
Country\tVisits\tUniques\tDepth\tLast visit
United States\t40\t17\t2\t2025-01-01 10:22
\tSeattle\t20\t12\t3\t2025-01-01 10:22
";
        let got = triples(&parse(dump).collect::<Vec<_>>());
        assert_eq!(
            got,
            vec![
                ("United States".into(), "Seattle".into(), 12),
                ("United States".into(), "".into(), 5),
            ]
        );
    }

    #[test]
    fn no_marker_yields_nothing_and_reparse_is_identical() {
        assert_eq!(parse("United States\t5\n\tSeattle\t5\n").count(), 0);

        let dump = "====== 2025-01-01\nPeru\t2\n\tLima\t2\n====== 2025-01-02\nPeru\t1\n";
        let first: Vec<_> = parse(dump).collect();
        let second: Vec<_> = parse(dump).collect();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn period_midnight_follows_timezone() {
        let opts = ParserOptions {
            timezone: "America/Los_Angeles".parse().unwrap(),
            ..ParserOptions::default()
        };
        let r = parse_with("====== 2025-01-01\nChile\t1\n", opts)
            .next()
            .unwrap();
        assert_eq!(r.timestamp, Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap());
    }

    proptest! {
        #[test]
        fn period_sums_match_header_totals(
            periods in proptest::collection::vec(
                proptest::collection::vec(
                    (proptest::collection::vec(1u64..500, 0..4), 0u64..50),
                    1..4,
                ),
                1..4,
            )
        ) {
            let mut text = String::new();
            let mut expected = BTreeMap::new();
            for (p, countries) in periods.iter().enumerate() {
                let day = Utc.with_ymd_and_hms(2025, 1, p as u32 + 1, 0, 0, 0).unwrap();
                text.push_str(&format!("====== 2025-01-{:02}\n", p + 1));
                for (c, (cities, extra)) in countries.iter().enumerate() {
                    let header = cities.iter().sum::<u64>() + extra;
                    text.push_str(&format!("Land{c}\t{header}\n"));
                    for (i, n) in cities.iter().enumerate() {
                        text.push_str(&format!("\tTown{i}\t{n}\n"));
                    }
                    if header > 0 {
                        *expected.entry(day).or_insert(0u64) += header;
                    }
                }
            }

            let mut got = BTreeMap::new();
            for r in parse(&text) {
                *got.entry(r.timestamp).or_insert(0u64) += r.num_unique.get();
            }
            prop_assert_eq!(got, expected);
        }
    }
}
