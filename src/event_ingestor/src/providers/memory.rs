//! In-memory event source.
//!
//! Replays a fixed list of events, honouring `since` the same way a real feed
//! does. Used for offline replays of exported events (`--from-file`) and as the
//! test double for the ingestion protocol.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::models::{event::AnalyticsEvent, request_params::FetchParams};
use crate::providers::{DecodeSnafu, EventSource, SourceError};

/// Replays a fixed set of events.
#[derive(Debug, Default)]
pub struct MemoryEventSource {
    events: Vec<AnalyticsEvent>,
    fetches: AtomicUsize,
}

impl MemoryEventSource {
    pub fn new(events: Vec<AnalyticsEvent>) -> Self {
        Self {
            events,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Load a JSON array of events (the same shape the HTTP feed returns per page).
    pub fn from_json_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DecodeSnafu {
                message: format!("read {}: {e}", path.display()),
            }
            .build()
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, SourceError> {
        let events: Vec<AnalyticsEvent> = serde_json::from_str(text).map_err(|e| {
            DecodeSnafu {
                message: e.to_string(),
            }
            .build()
        })?;
        Ok(Self::new(events))
    }

    /// Number of `fetch` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventSource for MemoryEventSource {
    async fn fetch(&self, params: FetchParams) -> Result<Vec<AnalyticsEvent>, SourceError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let out = self
            .events
            .iter()
            .filter(|e| params.since.is_none_or(|since| e.timestamp > since))
            .cloned()
            .collect();
        Ok(out)
    }
}
