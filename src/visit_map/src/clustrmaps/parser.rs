use std::collections::VecDeque;
use std::iter::Enumerate;
use std::str::Lines;

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::clustrmaps::line::{Line, city_without_region, classify};
use crate::clustrmaps::{ParseWarning, ParserOptions, WarningKind};
use crate::record::{Locality, Provenance, VisitRecord};
use crate::text::is_placeholder_city;
use crate::tz::period_start_utc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Scanning,
    InPeriod,
}

/// One dump period being accumulated.
#[derive(Debug)]
struct ParsedPeriod {
    date: NaiveDate,
    timestamp: DateTime<Utc>,
    entries: IndexMap<(String, Locality), u64>,
}

impl ParsedPeriod {
    fn add(&mut self, country: &str, locality: Locality, uniques: u64) {
        let slot = self
            .entries
            .entry((country.to_string(), locality))
            .or_insert(0);
        *slot = slot.saturating_add(uniques);
    }
}

/// The country block currently open, with its header total and what its city lines
/// have accounted for so far.
#[derive(Debug)]
struct CountrySlot {
    name: String,
    reported: u64,
    attributed: u64,
}

/// Lazy record stream over a Clustrmaps dump.
///
/// Two states plus a country slot: `Scanning` until the first date marker, then
/// `InPeriod` until the end. A marker whose date does not parse flushes the open
/// period and drops back to `Scanning`, since nothing after it could be dated.
pub struct ClustrmapsParser<'a> {
    lines: Enumerate<Lines<'a>>,
    options: ParserOptions,
    state: State,
    period: Option<ParsedPeriod>,
    country: Option<CountrySlot>,
    ready: VecDeque<VisitRecord>,
    warnings: Vec<ParseWarning>,
    finished: bool,
}

impl<'a> ClustrmapsParser<'a> {
    pub fn new(text: &'a str, options: ParserOptions) -> Self {
        Self {
            lines: text.lines().enumerate(),
            options,
            state: State::Scanning,
            period: None,
            country: None,
            ready: VecDeque::new(),
            warnings: Vec::new(),
            finished: false,
        }
    }

    /// Warnings collected so far. Complete once the iterator is exhausted.
    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    fn warn(&mut self, line: usize, kind: WarningKind) {
        warn!(line, warning = %kind, "skipping dump line");
        self.warnings.push(ParseWarning { line, kind });
    }

    fn feed(&mut self, line_no: usize, raw: &str) {
        let Some(line) = classify(raw) else {
            return;
        };
        match line {
            Line::Marker(Ok(date)) => {
                self.flush_period();
                self.open_period(line_no, date);
            }
            Line::Marker(Err(bad)) => {
                self.flush_period();
                self.state = State::Scanning;
                self.warn(line_no, WarningKind::BadMarkerDate(bad.to_string()));
            }
            _ if self.state == State::Scanning => {}
            Line::ColumnHeader => {}
            Line::Country { name, count } => {
                self.close_country();
                if count.is_none() {
                    self.warn(line_no, WarningKind::HeaderWithoutCount(name.to_string()));
                }
                // The block stays open so its city lines still count.
                self.country = Some(CountrySlot {
                    name: name.to_string(),
                    reported: count.unwrap_or(0),
                    attributed: 0,
                });
            }
            Line::City { name, count } => self.city_line(line_no, name, count),
        }
    }

    fn open_period(&mut self, line_no: usize, date: NaiveDate) {
        match period_start_utc(date, self.options.timezone) {
            Ok(timestamp) => {
                debug!(%date, "opening dump period");
                self.period = Some(ParsedPeriod {
                    date,
                    timestamp,
                    entries: IndexMap::new(),
                });
                self.state = State::InPeriod;
            }
            Err(_) => {
                self.state = State::Scanning;
                self.warn(line_no, WarningKind::BadMarkerDate(date.to_string()));
            }
        }
    }

    fn city_line(&mut self, line_no: usize, name: &str, count: Option<u64>) {
        if self.country.is_none() {
            self.warn(line_no, WarningKind::OrphanCity(name.to_string()));
            return;
        }
        let uniques = match count {
            Some(0) => {
                self.warn(line_no, WarningKind::ZeroCount(name.to_string()));
                return;
            }
            Some(n) => n,
            None => {
                self.warn(line_no, WarningKind::CityWithoutCount(name.to_string()));
                return;
            }
        };

        let city = city_without_region(name);
        let locality = if city.is_empty() || is_placeholder_city(city) {
            Locality::CountryLevel
        } else {
            Locality::City(city.to_string())
        };
        if let (Some(country), Some(period)) = (self.country.as_mut(), self.period.as_mut()) {
            country.attributed = country.attributed.saturating_add(uniques);
            period.add(&country.name, locality, uniques);
        }
    }

    /// Fold the header's unattributed remainder into the country-level bucket.
    fn close_country(&mut self) {
        let Some(slot) = self.country.take() else {
            return;
        };
        if !self.options.fold_header_residual || slot.reported <= slot.attributed {
            return;
        }
        if let Some(period) = self.period.as_mut() {
            period.add(
                &slot.name,
                Locality::CountryLevel,
                slot.reported - slot.attributed,
            );
        }
    }

    fn flush_period(&mut self) {
        self.close_country();
        let Some(period) = self.period.take() else {
            return;
        };
        let before = self.ready.len();
        for ((country, locality), uniques) in period.entries {
            let provenance = Provenance::Historical {
                source: self.options.source.clone(),
            };
            match VisitRecord::new(period.timestamp, &country, locality, uniques, provenance) {
                Ok(record) => self.ready.push_back(record),
                Err(e) => warn!(%country, error = %e, "dropping dump entry"),
            }
        }
        debug!(date = %period.date, records = self.ready.len() - before, "flushed dump period");
    }
}

impl Iterator for ClustrmapsParser<'_> {
    type Item = VisitRecord;

    fn next(&mut self) -> Option<VisitRecord> {
        loop {
            if let Some(record) = self.ready.pop_front() {
                return Some(record);
            }
            if self.finished {
                return None;
            }
            match self.lines.next() {
                Some((idx, raw)) => self.feed(idx + 1, raw),
                None => {
                    self.flush_period();
                    self.finished = true;
                }
            }
        }
    }
}
