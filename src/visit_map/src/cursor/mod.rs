//! Per-source ingestion cursors.
//!
//! A cursor is the timestamp of the newest record a source has durably appended to
//! the ledger. Ingestion asks for everything strictly newer, appends, then advances.
//! Cursors never move backwards: see [`CursorError::Stale`].

pub mod file;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

pub use file::FileCursorStore;

#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    /// An advance would move the cursor backwards. The stored value is unchanged.
    #[error("stale cursor for '{source_id}': stored {stored}, attempted {attempted}")]
    Stale {
        source_id: String,
        stored: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },
    #[error("cursor state I/O on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt cursor state in {}: {message}", path.display())]
    Corrupt { path: PathBuf, message: String },
}

/// Keyed store of `source -> last_seen`.
pub trait CursorStore {
    fn get(&self, source: &str) -> Result<Option<DateTime<Utc>>, CursorError>;

    /// Move `source` to `ts`. Equal timestamps are accepted; older ones are
    /// rejected with [`CursorError::Stale`].
    fn advance(&mut self, source: &str, ts: DateTime<Utc>) -> Result<(), CursorError>;

    /// Every stored cursor, ordered by source.
    fn all(&self) -> Result<BTreeMap<String, DateTime<Utc>>, CursorError>;
}

/// Shared monotonicity check for store implementations.
pub(crate) fn check_advance(
    source: &str,
    stored: Option<DateTime<Utc>>,
    attempted: DateTime<Utc>,
) -> Result<(), CursorError> {
    match stored {
        Some(stored) if attempted < stored => Err(CursorError::Stale {
            source_id: source.to_string(),
            stored,
            attempted,
        }),
        _ => Ok(()),
    }
}

/// Cursor store held in memory only.
#[derive(Debug, Default, Clone)]
pub struct MemoryCursorStore {
    cursors: BTreeMap<String, DateTime<Utc>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CursorStore for MemoryCursorStore {
    fn get(&self, source: &str) -> Result<Option<DateTime<Utc>>, CursorError> {
        Ok(self.cursors.get(source).copied())
    }

    fn advance(&mut self, source: &str, ts: DateTime<Utc>) -> Result<(), CursorError> {
        check_advance(source, self.cursors.get(source).copied(), ts)?;
        self.cursors.insert(source.to_string(), ts);
        Ok(())
    }

    fn all(&self) -> Result<BTreeMap<String, DateTime<Utc>>, CursorError> {
        Ok(self.cursors.clone())
    }
}
