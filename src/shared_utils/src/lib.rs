//! Small helpers shared by the `event_ingestor` and `visit_map` crates.

pub mod env;
pub mod fs;
