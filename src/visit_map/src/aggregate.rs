//! Grouping ledger records into per-location totals.
//!
//! Keys are folded (see [`fold_key`]) so `"Zürich"` and `"zurich"` land together.
//! Each group keeps the lexicographically smallest spelling it saw for display,
//! which makes the result independent of input order. Country-level records form
//! their own group per country and never merge into a city.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::record::{Locality, VisitRecord};
use crate::text::fold_key;

/// Folded grouping key. `city: None` is the country-level bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AggregateKey {
    pub country: String,
    pub city: Option<String>,
}

/// Total uniques for one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Aggregate {
    pub country: String,
    pub locality: Locality,
    pub total: u64,
    /// Newest record timestamp in the group. Summary overlays carry none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Aggregate {
    pub fn key(&self) -> AggregateKey {
        key_of(&self.country, &self.locality)
    }
}

pub type Aggregates = BTreeMap<AggregateKey, Aggregate>;

fn key_of(country: &str, locality: &Locality) -> AggregateKey {
    AggregateKey {
        country: fold_key(country),
        city: match locality {
            Locality::City(c) => Some(fold_key(c)),
            Locality::CountryLevel => None,
        },
    }
}

fn min_spelling(current: &mut String, candidate: &str) {
    if candidate < current.as_str() {
        *current = candidate.to_string();
    }
}

/// Streaming accumulator, so a ledger scan never has to be collected first.
#[derive(Debug, Default)]
pub struct Aggregator {
    groups: Aggregates,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, record: &VisitRecord) {
        self.add_total(
            record.country(),
            &record.locality,
            record.num_unique.get(),
            Some(record.timestamp),
        );
    }

    pub fn add_total(
        &mut self,
        country: &str,
        locality: &Locality,
        total: u64,
        seen: Option<DateTime<Utc>>,
    ) {
        let key = key_of(country, locality);
        match self.groups.get_mut(&key) {
            Some(group) => {
                group.total = group.total.saturating_add(total);
                group.last_seen = group.last_seen.max(seen);
                min_spelling(&mut group.country, country);
                if let (Locality::City(shown), Locality::City(seen)) = (&mut group.locality, locality) {
                    min_spelling(shown, seen);
                }
            }
            None => {
                self.groups.insert(
                    key,
                    Aggregate {
                        country: country.to_string(),
                        locality: locality.clone(),
                        total,
                        last_seen: seen,
                    },
                );
            }
        }
    }

    pub fn finish(self) -> Aggregates {
        self.groups
    }
}

/// Group `records` by (country, locality) and sum their uniques.
pub fn aggregate<'a>(records: impl IntoIterator<Item = &'a VisitRecord>) -> Aggregates {
    let mut agg = Aggregator::new();
    for record in records {
        agg.add(record);
    }
    agg.finish()
}

/// Sum of every group's total.
pub fn grand_total(aggregates: &Aggregates) -> u64 {
    aggregates
        .values()
        .fold(0u64, |acc, a| acc.saturating_add(a.total))
}
