//! Placing aggregates on the map.
//!
//! Every aggregate (and every overlay entry) is geocoded, then entries that land on
//! the same 1e-4 degree cell are merged by summing. Summation makes the result
//! independent of which stream an entry came from or the order it arrived in.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared_utils::fs::write_atomic;
use tracing::info;

use crate::aggregate::{Aggregate, Aggregates};
use crate::geocode::{Coord, GeocodeMiss, Geocoder, Resolution};
use crate::record::Locality;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hotspot {
    /// City, or the country for country-level entries.
    pub name: String,
    pub country: String,
    pub coord: Coord,
    pub total: u64,
    /// At least one member is an unresolved city drawn at its country's centroid.
    pub fallback: bool,
    /// Number of aggregates merged into this point.
    pub members: usize,
    /// Newest ledger visit among the members.
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct HotspotSet {
    /// Largest first, ties by name.
    pub hotspots: Vec<Hotspot>,
    /// Entries whose country could not be located. Still part of `total`.
    pub unplaced: Vec<Aggregate>,
    pub misses: Vec<GeocodeMiss>,
    pub total: u64,
}

impl HotspotSet {
    pub fn placed_total(&self) -> u64 {
        self.hotspots
            .iter()
            .fold(0u64, |acc, h| acc.saturating_add(h.total))
    }
}

fn display_name(a: &Aggregate) -> &str {
    match &a.locality {
        Locality::City(c) => c,
        Locality::CountryLevel => &a.country,
    }
}

/// Geocode and merge `aggregates` plus `overlay` into drawable hotspots.
pub fn resolve_hotspots(
    aggregates: &Aggregates,
    overlay: &[Aggregate],
    geocoder: &mut Geocoder,
) -> HotspotSet {
    let mut cells: BTreeMap<(i64, i64), Hotspot> = BTreeMap::new();
    let mut odd: Vec<Hotspot> = Vec::new();
    let mut set = HotspotSet::default();

    for entry in aggregates.values().chain(overlay.iter()) {
        set.total = set.total.saturating_add(entry.total);
        let resolution = geocoder.resolve(&entry.country, &entry.locality);
        let Some(coord) = resolution.coord() else {
            set.unplaced.push(entry.clone());
            continue;
        };
        if let Resolution::Fallback { miss, .. } = &resolution {
            if !set.misses.contains(miss) {
                set.misses.push(miss.clone());
            }
        }

        let point = Hotspot {
            name: display_name(entry).to_string(),
            country: entry.country.clone(),
            coord,
            total: entry.total,
            fallback: resolution.is_fallback(),
            members: 1,
            last_seen: entry.last_seen,
        };
        if !coord.is_finite() {
            odd.push(point);
            continue;
        }
        match cells.get_mut(&coord.bucket()) {
            Some(h) => {
                h.total = h.total.saturating_add(point.total);
                h.fallback |= point.fallback;
                h.members += 1;
                h.last_seen = h.last_seen.max(point.last_seen);
                if (point.name.as_str(), point.country.as_str()) < (h.name.as_str(), h.country.as_str()) {
                    h.name = point.name;
                    h.country = point.country;
                }
            }
            None => {
                cells.insert(coord.bucket(), point);
            }
        }
    }

    set.hotspots = cells.into_values().chain(odd).collect();
    set.hotspots
        .sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
    info!(
        hotspots = set.hotspots.len(),
        unplaced = set.unplaced.len(),
        misses = set.misses.len(),
        total = set.total,
        "resolved hotspots"
    );
    set
}

/// Write `set` as pretty JSON: every hotspot with its coordinates, total and last
/// visit, plus the unplaced entries and geocoding misses.
pub fn export_hotspots_json(set: &HotspotSet, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(set).map_err(std::io::Error::other)?;
    write_atomic(path, &json)
}
