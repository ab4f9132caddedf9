#![allow(dead_code)]

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use event_ingestor::models::event::AnalyticsEvent;
use event_ingestor::models::request_params::FetchParams;
use event_ingestor::providers::{ApiSnafu, EventSource, SourceError};
use visit_map::geocode::{Coord, Geocoder, StaticDataset};
use visit_map::ledger::{LedgerError, LedgerScan, TsvLedger, VisitLedger};
use visit_map::record::VisitRecord;

pub const SEATTLE_DUMP: &str = "\
====== 2025-01-01
Country\tVisitors
United States\t5
\tSeattle\t3
\tUnknown location\t2
";

pub const TWO_PERIOD_DUMP: &str = "\
====== 2025-01-01
United States: 5
  Seattle: 3
  Unknown location: 2
France: 4
  Paris, Ile-de-France: 4
====== 2025-01-02
United States: 7
  Seattle: 1
  Portland: 2
";

pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).unwrap()
}

pub fn event(day: u32, hour: u32, city: &str, country: &str) -> AnalyticsEvent {
    AnalyticsEvent::new(at(day, hour), Some(city), Some(country))
}

pub fn geocoder() -> Geocoder {
    Geocoder::new(Box::new(
        StaticDataset::new()
            .with_country("United States", Coord::new(38.9, -77.0))
            .with_country("France", Coord::new(46.6, 2.4))
            .with_city("Seattle", "United States", Coord::new(47.61, -122.33))
            .with_city("Portland", "United States", Coord::new(45.52, -122.68))
            .with_city("Paris", "France", Coord::new(48.85, 2.35)),
    ))
}

/// Wraps a [`TsvLedger`] and fails every append after the first `budget` ones.
pub struct FlakyLedger {
    pub inner: TsvLedger,
    pub budget: usize,
}

impl FlakyLedger {
    fn spend(&mut self) -> Result<(), LedgerError> {
        if self.budget == 0 {
            return Err(LedgerError::Io {
                path: self.inner.path().to_path_buf(),
                source: io::Error::other("disk full"),
            });
        }
        self.budget -= 1;
        Ok(())
    }
}

impl VisitLedger for FlakyLedger {
    fn append(&mut self, record: &VisitRecord) -> Result<(), LedgerError> {
        self.spend()?;
        self.inner.append(record)
    }

    fn append_batch(&mut self, records: &[VisitRecord]) -> Result<(), LedgerError> {
        self.spend()?;
        self.inner.append_batch(records)
    }

    fn scan(&self) -> Result<LedgerScan<'_>, LedgerError> {
        self.inner.scan()
    }
}

/// Never answers within any reasonable timeout.
pub struct StalledSource(pub Duration);

#[async_trait]
impl EventSource for StalledSource {
    async fn fetch(&self, _params: FetchParams) -> Result<Vec<AnalyticsEvent>, SourceError> {
        tokio::time::sleep(self.0).await;
        Ok(vec![])
    }
}

/// Answers every fetch with the given HTTP status.
pub struct FailingSource(pub u16);

#[async_trait]
impl EventSource for FailingSource {
    async fn fetch(&self, _params: FetchParams) -> Result<Vec<AnalyticsEvent>, SourceError> {
        ApiSnafu {
            status: self.0,
            message: "maintenance",
        }
        .fail()
    }
}
