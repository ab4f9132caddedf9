//! Analytics event ingestion: the [`EventSource`](providers::EventSource) contract
//! and the providers that implement it.
//!
//! The crate only knows how to *fetch* raw visit events. Turning them into ledger
//! rows, cursor bookkeeping and deduplication live in `visit_map::ingest`.

pub mod models;
pub mod providers;
