//! Ingestion protocols: live analytics events and historical dumps.
//!
//! Both follow append-then-advance: a record (or a whole dump period) is durably in
//! the ledger before the source's cursor moves past it. A failure at any point leaves
//! the cursor at or behind what the ledger holds, so the next run picks up where
//! this one stopped.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use event_ingestor::models::request_params::FetchParams;
use event_ingestor::providers::EventSource;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clustrmaps::{ParseWarning, ParserOptions, parse_with};
use crate::cursor::{CursorError, CursorStore};
use crate::ledger::{LedgerError, VisitLedger};
use crate::record::{Provenance, VisitRecord};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The event source failed or timed out. Everything appended before the failure
    /// is committed and covered by the cursor.
    #[error("source '{source_id}' unavailable: {reason}")]
    SourceUnavailable {
        source_id: String,
        reason: String,
        retryable: bool,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Cursor(#[from] CursorError),
}

impl IngestError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::SourceUnavailable { retryable: true, .. })
    }
}

#[derive(Debug, Clone)]
pub struct EventIngestOptions {
    /// Cursor key, also written into each record's provenance.
    pub source_id: String,
    /// Bound on the whole fetch.
    pub timeout: Duration,
    pub page_size: Option<u32>,
}

impl EventIngestOptions {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            timeout: Duration::from_secs(60),
            page_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub fetched: usize,
    pub appended: usize,
    /// Events at or before the cursor that the source returned anyway.
    pub skipped: usize,
    pub cursor: Option<DateTime<Utc>>,
}

/// Timestamp of the newest live row the ledger holds for `source_id`.
pub fn newest_live(
    ledger: &dyn VisitLedger,
    source_id: &str,
) -> Result<Option<DateTime<Utc>>, LedgerError> {
    let mut newest = None;
    for record in ledger.scan()? {
        let record = record?;
        let ours = matches!(&record.provenance, Provenance::Live { source } if source == source_id);
        if ours && newest.is_none_or(|n| record.timestamp > n) {
            newest = Some(record.timestamp);
        }
    }
    Ok(newest)
}

/// Pull new events from `source` into the ledger.
///
/// Without a stored cursor, the newest live row for this source in the ledger is
/// used (and stored) as the starting point.
pub async fn ingest_events(
    source: &dyn EventSource,
    ledger: &mut dyn VisitLedger,
    cursor: &mut dyn CursorStore,
    opts: &EventIngestOptions,
) -> Result<IngestReport, IngestError> {
    let source_id = opts.source_id.as_str();
    let mut since = cursor.get(source_id)?;
    if since.is_none() {
        since = newest_live(&*ledger, source_id)?;
        if let Some(ts) = since {
            info!(source = source_id, cursor = %ts, "bootstrapped cursor from ledger");
            cursor.advance(source_id, ts)?;
        }
    }

    let params = FetchParams {
        since,
        page_size: opts.page_size,
    };
    let events = match tokio::time::timeout(opts.timeout, source.fetch(params)).await {
        Ok(Ok(events)) => events,
        Ok(Err(e)) => {
            warn!(source = source_id, error = ?e, "event fetch failed");
            return Err(IngestError::SourceUnavailable {
                source_id: source_id.to_string(),
                retryable: e.is_retryable(),
                reason: e.to_string(),
            });
        }
        Err(_) => {
            warn!(source = source_id, timeout = ?opts.timeout, "event fetch timed out");
            return Err(IngestError::SourceUnavailable {
                source_id: source_id.to_string(),
                reason: format!("no response within {:?}", opts.timeout),
                retryable: true,
            });
        }
    };

    let fetched = events.len();
    let mut fresh: Vec<_> = events
        .into_iter()
        .filter(|e| since.is_none_or(|s| e.timestamp > s))
        .collect();
    let skipped = fetched - fresh.len();
    fresh.sort_by_key(|e| e.timestamp);

    let mut report = IngestReport {
        fetched,
        appended: 0,
        skipped,
        cursor: since,
    };
    for event in fresh {
        let record = VisitRecord::live(
            event.timestamp,
            event.city.as_deref(),
            event.country.as_deref(),
            source_id,
        );
        ledger.append(&record)?;
        cursor.advance(source_id, record.timestamp)?;
        debug!(record = %record, "appended live visit");
        report.appended += 1;
        report.cursor = Some(record.timestamp);
    }

    info!(
        source = source_id,
        fetched = report.fetched,
        appended = report.appended,
        skipped = report.skipped,
        "ingested analytics events"
    );
    Ok(report)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DumpReport {
    pub periods: usize,
    pub imported: usize,
    /// Periods at or before the cursor, already in the ledger.
    pub skipped: usize,
    pub appended: usize,
    #[serde(skip)]
    pub warnings: Vec<ParseWarning>,
    pub cursor: Option<DateTime<Utc>>,
}

/// Import a Clustrmaps dump, one period at a time in date order.
///
/// Periods dated at or before the source's cursor are skipped, so importing the same
/// dump again appends nothing.
pub fn ingest_dump(
    text: &str,
    options: ParserOptions,
    ledger: &mut dyn VisitLedger,
    cursor: &mut dyn CursorStore,
) -> Result<DumpReport, IngestError> {
    let source_id = options.source.clone();
    let mut parser = parse_with(text, options);
    let mut periods: BTreeMap<DateTime<Utc>, Vec<VisitRecord>> = BTreeMap::new();
    for record in parser.by_ref() {
        periods.entry(record.timestamp).or_default().push(record);
    }

    let mut report = DumpReport {
        periods: periods.len(),
        warnings: parser.warnings().to_vec(),
        cursor: cursor.get(&source_id)?,
        ..DumpReport::default()
    };
    for (ts, batch) in periods {
        if report.cursor.is_some_and(|c| ts <= c) {
            debug!(source = %source_id, period = %ts, "period already imported");
            report.skipped += 1;
            continue;
        }
        ledger.append_batch(&batch)?;
        cursor.advance(&source_id, ts)?;
        report.imported += 1;
        report.appended += batch.len();
        report.cursor = Some(ts);
    }

    info!(
        source = %source_id,
        periods = report.periods,
        imported = report.imported,
        skipped = report.skipped,
        appended = report.appended,
        warnings = report.warnings.len(),
        "ingested dump"
    );
    Ok(report)
}
