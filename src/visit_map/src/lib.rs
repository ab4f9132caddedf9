//! Visitor hotspot maps from web analytics and Clustrmaps history.
//!
//! Data flows one way:
//!
//! 1. [`ingest`] pulls live events (through an
//!    [`EventSource`](event_ingestor::providers::EventSource)) or parses a historical
//!    [`clustrmaps`] dump, appends [`record::VisitRecord`]s to the [`ledger`], and moves
//!    the per-source [`cursor`] forward only after the append is durable.
//! 2. [`aggregate`] folds the ledger into per-location totals.
//! 3. [`geocode`] and [`hotspot`] place those totals on the globe.
//! 4. [`render`] draws one SVG per configured scale.
//!
//! [`config`] loads the TOML that wires these together for the `visit-map` binary.

pub mod aggregate;
pub mod clustrmaps;
pub mod config;
pub mod cursor;
pub mod geocode;
pub mod hotspot;
pub mod ingest;
pub mod ledger;
pub mod pipeline;
pub mod record;
pub mod render;
pub mod text;
pub mod tz;
