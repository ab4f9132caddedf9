mod common;

use std::time::Duration;

use chrono::{TimeZone, Utc};
use common::{FailingSource, FlakyLedger, SEATTLE_DUMP, StalledSource, TWO_PERIOD_DUMP, at, event};
use event_ingestor::providers::memory::MemoryEventSource;
use tempfile::TempDir;
use visit_map::clustrmaps::ParserOptions;
use visit_map::cursor::{CursorStore, FileCursorStore};
use visit_map::ingest::{EventIngestOptions, IngestError, ingest_dump, ingest_events};
use visit_map::ledger::{TsvLedger, read_all};
use visit_map::record::Locality;

struct Workspace {
    _dir: TempDir,
    ledger: std::path::PathBuf,
    cursors: std::path::PathBuf,
}

fn workspace() -> Workspace {
    let dir = TempDir::new().unwrap();
    Workspace {
        ledger: dir.path().join("visits.tsv"),
        cursors: dir.path().join("cursors.json"),
        _dir: dir,
    }
}

#[test]
fn seattle_dump_lands_in_the_ledger() {
    let ws = workspace();
    let mut ledger = TsvLedger::open(&ws.ledger).unwrap();
    let mut cursors = FileCursorStore::open(&ws.cursors).unwrap();

    let report = ingest_dump(SEATTLE_DUMP, ParserOptions::default(), &mut ledger, &mut cursors).unwrap();
    assert_eq!((report.imported, report.appended), (1, 2));
    assert!(report.warnings.is_empty());

    let rows = std::fs::read_to_string(&ws.ledger).unwrap();
    assert_eq!(
        rows,
        "timestamp\tcountry\tcity\tnum_unique\tprovenance\n\
         2025-01-01T00:00:00Z\tUnited States\tSeattle\t3\thistorical:clustrmaps\n\
         2025-01-01T00:00:00Z\tUnited States\t\t2\thistorical:clustrmaps\n"
    );
}

#[test]
fn reimporting_a_dump_after_restart_appends_nothing() {
    let ws = workspace();
    {
        let mut ledger = TsvLedger::open(&ws.ledger).unwrap();
        let mut cursors = FileCursorStore::open(&ws.cursors).unwrap();
        ingest_dump(TWO_PERIOD_DUMP, ParserOptions::default(), &mut ledger, &mut cursors).unwrap();
    }

    let mut ledger = TsvLedger::open(&ws.ledger).unwrap();
    let mut cursors = FileCursorStore::open(&ws.cursors).unwrap();
    let report = ingest_dump(TWO_PERIOD_DUMP, ParserOptions::default(), &mut ledger, &mut cursors).unwrap();
    assert_eq!((report.periods, report.skipped, report.appended), (2, 2, 0));

    let records = read_all(&ledger).unwrap();
    assert_eq!(records.len(), 6);
    assert_eq!(records.iter().map(|r| r.num_unique.get()).sum::<u64>(), 16);
    assert!(records.iter().any(|r| r.city() == "Paris"));
}

#[test]
fn interrupted_dump_resumes_at_the_missing_period() {
    let ws = workspace();
    {
        let mut ledger = FlakyLedger {
            inner: TsvLedger::open(&ws.ledger).unwrap(),
            budget: 1,
        };
        let mut cursors = FileCursorStore::open(&ws.cursors).unwrap();
        let err = ingest_dump(TWO_PERIOD_DUMP, ParserOptions::default(), &mut ledger, &mut cursors)
            .unwrap_err();
        assert!(matches!(err, IngestError::Ledger(_)));
        assert!(!err.is_retryable());
        assert_eq!(
            cursors.get("clustrmaps").unwrap(),
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
        );
    }

    let mut ledger = TsvLedger::open(&ws.ledger).unwrap();
    let mut cursors = FileCursorStore::open(&ws.cursors).unwrap();
    let report = ingest_dump(TWO_PERIOD_DUMP, ParserOptions::default(), &mut ledger, &mut cursors).unwrap();
    assert_eq!((report.skipped, report.imported, report.appended), (1, 1, 3));

    let day_two: Vec<_> = read_all(&ledger)
        .unwrap()
        .into_iter()
        .filter(|r| r.timestamp == Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap())
        .collect();
    assert_eq!(day_two.len(), 3);
    assert!(day_two.iter().any(|r| r.locality == Locality::CountryLevel && r.num_unique.get() == 4));
}

#[tokio::test]
async fn interrupted_event_batch_resumes_without_duplicates() {
    let ws = workspace();
    let source = MemoryEventSource::new(vec![
        event(1, 9, "Seattle", "United States"),
        event(1, 10, "Portland", "United States"),
        event(1, 11, "Paris", "France"),
    ]);
    let opts = EventIngestOptions::new("ga4");
    {
        let mut ledger = FlakyLedger {
            inner: TsvLedger::open(&ws.ledger).unwrap(),
            budget: 2,
        };
        let mut cursors = FileCursorStore::open(&ws.cursors).unwrap();
        let err = ingest_events(&source, &mut ledger, &mut cursors, &opts)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Ledger(_)));
        assert_eq!(cursors.get("ga4").unwrap(), Some(at(1, 10)));
    }

    let mut ledger = TsvLedger::open(&ws.ledger).unwrap();
    let mut cursors = FileCursorStore::open(&ws.cursors).unwrap();
    let report = ingest_events(&source, &mut ledger, &mut cursors, &opts).await.unwrap();
    assert_eq!((report.fetched, report.appended), (1, 1));

    let cities: Vec<_> = read_all(&ledger)
        .unwrap()
        .iter()
        .map(|r| r.city().to_string())
        .collect();
    assert_eq!(cities, vec!["Seattle", "Portland", "Paris"]);
}

#[tokio::test]
async fn lost_cursor_file_is_rebuilt_from_the_ledger() {
    let ws = workspace();
    let source = MemoryEventSource::new(vec![
        event(1, 9, "Seattle", "United States"),
        event(2, 9, "Paris", "France"),
    ]);
    let opts = EventIngestOptions::new("ga4");
    {
        let mut ledger = TsvLedger::open(&ws.ledger).unwrap();
        let mut cursors = FileCursorStore::open(&ws.cursors).unwrap();
        ingest_events(&source, &mut ledger, &mut cursors, &opts).await.unwrap();
    }
    std::fs::remove_file(&ws.cursors).unwrap();

    let mut ledger = TsvLedger::open(&ws.ledger).unwrap();
    let mut cursors = FileCursorStore::open(&ws.cursors).unwrap();
    let report = ingest_events(&source, &mut ledger, &mut cursors, &opts).await.unwrap();
    assert_eq!(report.appended, 0);
    assert_eq!(read_all(&ledger).unwrap().len(), 2);
    assert_eq!(cursors.get("ga4").unwrap(), Some(at(2, 9)));
}

#[tokio::test]
async fn slow_source_times_out_as_retryable() {
    let ws = workspace();
    let mut ledger = TsvLedger::open(&ws.ledger).unwrap();
    let mut cursors = FileCursorStore::open(&ws.cursors).unwrap();
    let mut opts = EventIngestOptions::new("ga4");
    opts.timeout = Duration::from_millis(50);

    let err = ingest_events(
        &StalledSource(Duration::from_secs(30)),
        &mut ledger,
        &mut cursors,
        &opts,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, IngestError::SourceUnavailable { .. }));
    assert!(err.is_retryable());
    assert!(read_all(&ledger).unwrap().is_empty());
    assert_eq!(cursors.get("ga4").unwrap(), None);
}

#[tokio::test]
async fn vendor_errors_keep_their_retry_class() {
    let ws = workspace();
    let mut ledger = TsvLedger::open(&ws.ledger).unwrap();
    let mut cursors = FileCursorStore::open(&ws.cursors).unwrap();
    let opts = EventIngestOptions::new("ga4");

    let busy = ingest_events(&FailingSource(503), &mut ledger, &mut cursors, &opts)
        .await
        .unwrap_err();
    assert!(busy.is_retryable());

    let denied = ingest_events(&FailingSource(403), &mut ledger, &mut cursors, &opts)
        .await
        .unwrap_err();
    assert!(matches!(denied, IngestError::SourceUnavailable { retryable: false, .. }));
}
