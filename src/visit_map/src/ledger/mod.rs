//! The append-only visit ledger.
//!
//! Every ingestion path writes through [`VisitLedger`]; rendering reads the whole
//! history back with [`VisitLedger::scan`] on a handle from
//! [`TsvLedger::open_read`], which never modifies the file. Appends are durable before they return,
//! which is what lets the ingestion cursor advance right after them.
//!
//! Backends:
//! - [`TsvLedger`]: flat tab-separated file, one row per record.
//! - [`MemoryLedger`]: a `Vec`, for tests and dry runs.

pub mod tsv;

use std::path::PathBuf;

pub use tsv::TsvLedger;

use crate::record::VisitRecord;

/// Errors raised by a ledger backend.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger I/O on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger {} was opened read-only", path.display())]
    ReadOnly { path: PathBuf },
}

/// Lazy, in-order view over the full ledger history.
pub type LedgerScan<'a> = Box<dyn Iterator<Item = Result<VisitRecord, LedgerError>> + 'a>;

/// Durable, append-only store of visit records.
pub trait VisitLedger {
    /// Append one record. The row is durable when this returns `Ok`.
    fn append(&mut self, record: &VisitRecord) -> Result<(), LedgerError>;

    /// Append several records with a single write and a single flush to disk.
    fn append_batch(&mut self, records: &[VisitRecord]) -> Result<(), LedgerError>;

    /// Iterate every record in append order.
    ///
    /// Each call starts from the beginning. A trailing partial row (a crash or a
    /// concurrent writer mid-line) is never yielded.
    fn scan(&self) -> Result<LedgerScan<'_>, LedgerError>;
}

/// In-memory ledger.
#[derive(Debug, Default, Clone)]
pub struct MemoryLedger {
    records: Vec<VisitRecord>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[VisitRecord] {
        &self.records
    }
}

impl VisitLedger for MemoryLedger {
    fn append(&mut self, record: &VisitRecord) -> Result<(), LedgerError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn append_batch(&mut self, records: &[VisitRecord]) -> Result<(), LedgerError> {
        self.records.extend_from_slice(records);
        Ok(())
    }

    fn scan(&self) -> Result<LedgerScan<'_>, LedgerError> {
        Ok(Box::new(self.records.iter().cloned().map(Ok)))
    }
}

/// Collect a full scan, stopping at the first I/O error.
pub fn read_all(ledger: &dyn VisitLedger) -> Result<Vec<VisitRecord>, LedgerError> {
    ledger.scan()?.collect()
}
