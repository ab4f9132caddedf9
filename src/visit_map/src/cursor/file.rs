//! JSON-file cursor store: `{"ga4": "2025-01-05T12:00:00Z", ...}`.
//!
//! The whole map is rewritten on every advance through a fsynced temp file and a
//! rename, so a crash leaves either the previous state or the new one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use shared_utils::fs::write_atomic;
use tracing::debug;

use crate::cursor::{CursorError, CursorStore, check_advance};
use crate::tz::{parse_ts_to_utc, to_rfc3339};

pub struct FileCursorStore {
    path: PathBuf,
    cursors: BTreeMap<String, DateTime<Utc>>,
}

impl FileCursorStore {
    /// Load the store at `path`. A missing or empty file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CursorError> {
        let path = path.as_ref().to_path_buf();
        let cursors = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => decode(&path, &text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(CursorError::Io { path, source }),
        };
        Ok(Self { path, cursors })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, cursors: &BTreeMap<String, DateTime<Utc>>) -> Result<(), CursorError> {
        let raw: BTreeMap<&str, String> = cursors
            .iter()
            .map(|(k, v)| (k.as_str(), to_rfc3339(*v)))
            .collect();
        let bytes = serde_json::to_vec_pretty(&raw).map_err(|e| CursorError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        write_atomic(&self.path, &bytes).map_err(|source| CursorError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

fn decode(path: &Path, text: &str) -> Result<BTreeMap<String, DateTime<Utc>>, CursorError> {
    let corrupt = |message: String| CursorError::Corrupt {
        path: path.to_path_buf(),
        message,
    };
    let raw: BTreeMap<String, String> =
        serde_json::from_str(text).map_err(|e| corrupt(e.to_string()))?;
    raw.into_iter()
        .map(|(k, v)| {
            let ts = parse_ts_to_utc(&v).map_err(|e| corrupt(format!("{k}: {e}")))?;
            Ok((k, ts))
        })
        .collect()
}

impl CursorStore for FileCursorStore {
    fn get(&self, source: &str) -> Result<Option<DateTime<Utc>>, CursorError> {
        Ok(self.cursors.get(source).copied())
    }

    fn advance(&mut self, source: &str, ts: DateTime<Utc>) -> Result<(), CursorError> {
        check_advance(source, self.cursors.get(source).copied(), ts)?;
        let mut next = self.cursors.clone();
        next.insert(source.to_string(), ts);
        // memory only changes once the file does
        self.persist(&next)?;
        self.cursors = next;
        debug!(source, cursor = %to_rfc3339(ts), "advanced cursor");
        Ok(())
    }

    fn all(&self) -> Result<BTreeMap<String, DateTime<Utc>>, CursorError> {
        Ok(self.cursors.clone())
    }
}
