//! Ledger to hotspots, in one pass over the ledger.

use std::collections::VecDeque;

use tracing::info;

use crate::aggregate::{Aggregate, Aggregator, aggregate};
use crate::geocode::Geocoder;
use crate::hotspot::{HotspotSet, resolve_hotspots};
use crate::ledger::{LedgerError, VisitLedger};
use crate::record::VisitRecord;

/// Everything the renderer draws.
#[derive(Debug, Clone, PartialEq)]
pub struct MapInputs {
    pub all: HotspotSet,
    /// The last N ledger rows on their own, when a highlight was asked for.
    pub recent: Option<HotspotSet>,
    pub rows: usize,
}

/// Aggregate the whole ledger (plus `overlay`) and, if `most_recent > 0`, the last
/// `most_recent` rows separately.
pub fn build_hotspots(
    ledger: &dyn VisitLedger,
    overlay: &[Aggregate],
    most_recent: usize,
    geocoder: &mut Geocoder,
) -> Result<MapInputs, LedgerError> {
    let mut totals = Aggregator::new();
    let mut tail: VecDeque<VisitRecord> = VecDeque::new();
    let mut rows = 0usize;
    for record in ledger.scan()? {
        let record = record?;
        rows += 1;
        totals.add(&record);
        if most_recent > 0 {
            if tail.len() == most_recent {
                tail.pop_front();
            }
            tail.push_back(record);
        }
    }
    info!(rows, overlay = overlay.len(), "aggregated ledger");

    let all = resolve_hotspots(&totals.finish(), overlay, geocoder);
    let recent = (most_recent > 0).then(|| resolve_hotspots(&aggregate(&tail), &[], geocoder));
    Ok(MapInputs { all, recent, rows })
}
