//! Flat-file ledger: one tab-separated row per record.
//!
//! ```text
//! timestamp	country	city	num_unique	provenance
//! 2025-01-01T00:00:00Z	United States	Seattle	12	historical:clustrmaps
//! 2025-01-01T00:00:00Z	United States		5	historical:clustrmaps
//! 2025-01-03T17:22:09Z	France	Paris	1	live:ga4
//! ```
//!
//! An empty city column is a country-level aggregate. Files written before the
//! provenance column existed have four columns (and sometimes `NULL` cities); those
//! rows read back as [`Provenance::Unknown`].
//!
//! Every row ends in `\n`. A file whose last byte is not a newline has a torn tail
//! from an interrupted append: [`TsvLedger::open`] truncates it, and scans skip it.
//!
//! Only the writer repairs. A reader from [`TsvLedger::open_read`] may run while an
//! ingest is mid-row, so it leaves the file alone and stops before the partial row.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use shared_utils::fs::ensure_parent_dir;
use tracing::{debug, warn};

use crate::ledger::{LedgerError, LedgerScan, VisitLedger};
use crate::record::{Locality, Provenance, VisitRecord};
use crate::tz::{parse_ts_to_utc, to_rfc3339};

/// Header row written to a fresh ledger.
pub const HEADER: &str = "timestamp\tcountry\tcity\tnum_unique\tprovenance";

pub struct TsvLedger {
    path: PathBuf,
    /// `None` for read-only handles.
    file: Option<File>,
}

impl TsvLedger {
    /// Open (or create) the ledger at `path`, dropping any torn trailing row.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let io = |source| LedgerError::Io {
            path: path.clone(),
            source,
        };

        ensure_parent_dir(&path).map_err(io)?;
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(io)?;

        let valid_len = truncate_torn_tail(&file).map_err(io)?;
        if valid_len == 0 {
            file.write_all(format!("{HEADER}\n").as_bytes())
                .map_err(io)?;
            file.sync_data().map_err(io)?;
        }
        debug!(path = %path.display(), bytes = valid_len, "opened ledger");

        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Read-only handle: no directory or header creation, no truncation, and appends
    /// fail with [`LedgerError::ReadOnly`]. A missing file scans as empty.
    pub fn open_read(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_durable(&mut self, bytes: &[u8]) -> Result<(), LedgerError> {
        let io = |source| LedgerError::Io {
            path: self.path.clone(),
            source,
        };
        let Some(file) = self.file.as_mut() else {
            return Err(LedgerError::ReadOnly {
                path: self.path.clone(),
            });
        };
        file.write_all(bytes).map_err(io)?;
        file.sync_data().map_err(io)
    }
}

impl VisitLedger for TsvLedger {
    fn append(&mut self, record: &VisitRecord) -> Result<(), LedgerError> {
        let line = encode_row(record);
        self.write_durable(line.as_bytes())
    }

    fn append_batch(&mut self, records: &[VisitRecord]) -> Result<(), LedgerError> {
        if records.is_empty() {
            return Ok(());
        }
        let buf: String = records.iter().map(encode_row).collect();
        self.write_durable(buf.as_bytes())
    }

    fn scan(&self) -> Result<LedgerScan<'_>, LedgerError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound && self.file.is_none() => {
                debug!(path = %self.path.display(), "no ledger yet");
                return Ok(Box::new(std::iter::empty()));
            }
            Err(source) => {
                return Err(LedgerError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        Ok(Box::new(TsvScan {
            path: self.path.clone(),
            reader: BufReader::new(file),
            line_no: 0,
            buf: Vec::new(),
        }))
    }
}

/// Length of the newline-terminated prefix. Anything after it is cut off.
fn truncate_torn_tail(file: &File) -> std::io::Result<u64> {
    let len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let mut valid = 0u64;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 || buf.last() != Some(&b'\n') {
            break;
        }
        valid += n as u64;
    }
    if valid < len {
        warn!(dropped = len - valid, "truncating torn ledger tail");
        file.set_len(valid)?;
        file.sync_data()?;
    }
    Ok(valid)
}

/// Tabs and newlines inside a field would break the row, so they become spaces.
fn clean_field(s: &str) -> String {
    s.replace(['\t', '\n', '\r'], " ")
}

/// One complete row, newline included.
pub fn encode_row(record: &VisitRecord) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\n",
        to_rfc3339(record.timestamp),
        clean_field(record.country()),
        clean_field(record.city()),
        record.num_unique,
        record.provenance.to_column(),
    )
}

/// Why a row was skipped.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RowError {
    #[error("expected 4 or 5 columns, found {0}")]
    Columns(usize),
    #[error("bad timestamp '{0}'")]
    Timestamp(String),
    #[error("bad num_unique '{0}'")]
    Count(String),
    #[error(transparent)]
    Record(#[from] crate::record::RecordError),
}

/// Parse one row (without its newline).
pub fn decode_row(line: &str) -> Result<VisitRecord, RowError> {
    let cols: Vec<&str> = line.trim_end_matches('\r').split('\t').collect();
    let provenance = match cols.len() {
        4 => Provenance::Unknown,
        5 => Provenance::from_column(cols[4]),
        n => return Err(RowError::Columns(n)),
    };
    let timestamp =
        parse_ts_to_utc(cols[0]).map_err(|_| RowError::Timestamp(cols[0].to_string()))?;
    let num_unique: u64 = cols[3]
        .trim()
        .parse()
        .map_err(|_| RowError::Count(cols[3].to_string()))?;
    Ok(VisitRecord::new(
        timestamp,
        cols[1],
        Locality::from_city_column(cols[2]),
        num_unique,
        provenance,
    )?)
}

struct TsvScan {
    path: PathBuf,
    reader: BufReader<File>,
    line_no: usize,
    buf: Vec<u8>,
}

impl Iterator for TsvScan {
    type Item = Result<VisitRecord, LedgerError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(source) => {
                    return Some(Err(LedgerError::Io {
                        path: self.path.clone(),
                        source,
                    }));
                }
            }
            self.line_no += 1;
            if self.buf.last() != Some(&b'\n') {
                debug!(line = self.line_no, "ignoring partial ledger row");
                return None;
            }

            let line = String::from_utf8_lossy(&self.buf[..self.buf.len() - 1]);
            if line.trim().is_empty() || line.starts_with("timestamp\t") {
                continue;
            }
            match decode_row(&line) {
                Ok(record) => return Some(Ok(record)),
                Err(e) => {
                    warn!(path = %self.path.display(), line = self.line_no, error = %e, "skipping ledger row");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    use super::*;
    use crate::ledger::read_all;

    fn rec(city: Option<&str>, n: u64) -> VisitRecord {
        VisitRecord::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            "United States",
            city.map_or(Locality::CountryLevel, |c| Locality::City(c.into())),
            n,
            Provenance::Historical {
                source: "clustrmaps".into(),
            },
        )
        .unwrap()
    }

    #[test]
    fn encodes_country_level_as_empty_city() {
        assert_eq!(
            encode_row(&rec(None, 5)),
            "2025-01-01T00:00:00Z\tUnited States\t\t5\thistorical:clustrmaps\n"
        );
    }

    #[test]
    fn decodes_legacy_rows() {
        let r = decode_row("2024-06-01T10:00:00\tFrance\tNULL\t3").unwrap();
        assert!(r.locality.is_country_level());
        assert_eq!(r.provenance, Provenance::Unknown);
        assert_eq!(r.num_unique.get(), 3);

        assert_eq!(decode_row("a\tb"), Err(RowError::Columns(2)));
        assert!(matches!(
            decode_row("2024-06-01\tFrance\tParis\t0\t"),
            Err(RowError::Record(_))
        ));
    }

    #[test]
    fn append_scan_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger/visits.tsv");
        {
            let mut ledger = TsvLedger::open(&path).unwrap();
            ledger.append(&rec(Some("Seattle"), 12)).unwrap();
            ledger
                .append_batch(&[rec(None, 5), rec(Some("Portland"), 2)])
                .unwrap();
        }
        let ledger = TsvLedger::open(&path).unwrap();
        let all = read_all(&ledger).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].city(), "Seattle");
        assert!(all[1].locality.is_country_level());

        // restartable
        assert_eq!(read_all(&ledger).unwrap(), all);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next(), Some(HEADER));
    }
}
