//! Canonical in-memory representation of one raw analytics event.
//!
//! This struct is the standard output of every [`EventSource`](crate::providers::EventSource),
//! regardless of which analytics vendor produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single observed page visit, as reported upstream.
///
/// Location fields are kept raw: vendors report missing values as `None`, `""`,
/// or placeholders like `"(not set)"`, and cleaning them is the consumer's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    /// When the visit was recorded (UTC).
    pub timestamp: DateTime<Utc>,
    /// City name, if the vendor resolved one.
    #[serde(default)]
    pub city: Option<String>,
    /// Country name, if the vendor resolved one.
    #[serde(default)]
    pub country: Option<String>,
}

impl AnalyticsEvent {
    /// Convenience constructor used by providers and tests.
    pub fn new(timestamp: DateTime<Utc>, city: Option<&str>, country: Option<&str>) -> Self {
        Self {
            timestamp,
            city: city.map(str::to_string),
            country: country.map(str::to_string),
        }
    }
}
