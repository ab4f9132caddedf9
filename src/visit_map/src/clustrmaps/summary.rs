//! Whole-dump totals, written as `country,city,uniques` CSV.
//!
//! The CSV is what the renderer loads as its overlay: pre-aggregated counts from a
//! dump that were never imported into the ledger.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shared_utils::fs::ensure_parent_dir;
use tracing::{info, warn};

use crate::aggregate::Aggregate;
use crate::clustrmaps::{ParserOptions, parse_with};
use crate::record::Locality;

/// `(country, city)` -> uniques across every period. Country-level rows have an empty city.
pub type Summary = BTreeMap<(String, String), u64>;

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("summary CSV {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("summary CSV {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct SummaryRow {
    country: String,
    #[serde(default)]
    city: String,
    uniques: u64,
}

/// Sum every period of a dump per location.
pub fn summarize(text: &str, options: ParserOptions) -> Summary {
    let mut summary = Summary::new();
    for record in parse_with(text, options) {
        let key = (record.country().to_string(), record.city().to_string());
        let slot = summary.entry(key).or_insert(0);
        *slot = slot.saturating_add(record.num_unique.get());
    }
    summary
}

/// Write `summary` as CSV. Returns the number of rows written.
pub fn export_summary(summary: &Summary, path: &Path) -> Result<usize, SummaryError> {
    let csv_err = |source| SummaryError::Csv {
        path: path.to_path_buf(),
        source,
    };
    ensure_parent_dir(path).map_err(|source| SummaryError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for ((country, city), uniques) in summary {
        writer
            .serialize(SummaryRow {
                country: country.clone(),
                city: city.clone(),
                uniques: *uniques,
            })
            .map_err(csv_err)?;
    }
    writer.flush().map_err(|source| SummaryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), rows = summary.len(), "exported dump summary");
    Ok(summary.len())
}

/// Load a summary CSV as overlay totals. Zero rows are dropped; extra columns
/// (older exports carry `region`) are ignored.
pub fn load_summary(path: &Path) -> Result<Vec<Aggregate>, SummaryError> {
    let csv_err = |source| SummaryError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let mut out = Vec::new();
    for row in reader.deserialize::<SummaryRow>() {
        let row = row.map_err(csv_err)?;
        let country = row.country.trim();
        if row.uniques == 0 || country.is_empty() {
            warn!(path = %path.display(), country, "skipping empty overlay row");
            continue;
        }
        out.push(Aggregate {
            country: country.to_string(),
            locality: Locality::from_city_column(&row.city),
            total: row.uniques,
            last_seen: None,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const DUMP: &str = "\
====== 2025-01-01
United States\t5
\tSeattle\t3
\tUnknown location\t2
====== 2025-01-02
United States\t4
\tSeattle, WA\t4
";

    #[test]
    fn summarize_spans_periods() {
        let s = summarize(DUMP, ParserOptions::default());
        assert_eq!(s[&("United States".to_string(), "Seattle".to_string())], 7);
        assert_eq!(s[&("United States".to_string(), String::new())], 2);
    }

    #[test]
    fn csv_roundtrip_and_legacy_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/summary.csv");
        let n = export_summary(&summarize(DUMP, ParserOptions::default()), &path).unwrap();
        assert_eq!(n, 2);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "country,city,uniques\nUnited States,,2\nUnited States,Seattle,7\n"
        );

        let loaded = load_summary(&path).unwrap();
        assert_eq!(loaded[0].locality, Locality::CountryLevel);
        assert_eq!(loaded[1].total, 7);

        let legacy = dir.path().join("legacy.csv");
        std::fs::write(&legacy, "country,city,region,uniques\nJapan,Tokyo,,4\nJapan,,,0\n").unwrap();
        let loaded = load_summary(&legacy).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].locality, Locality::City("Tokyo".into()));
    }
}
