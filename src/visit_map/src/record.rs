//! The visit record: one ledger row.
//!
//! A record is either a city-level observation or a country-level aggregate
//! ([`Locality::CountryLevel`]). The distinction is decided once, where the record is
//! created, so nothing downstream re-detects "Unknown location" strings.

use std::fmt;
use std::num::NonZeroU64;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::text::is_placeholder_city;

/// Country used when a live event arrives without one.
pub const UNKNOWN_COUNTRY: &str = "Unknown";

/// Errors raised when building a record that would violate its invariants.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("country must not be empty")]
    EmptyCountry,
    #[error("num_unique must be at least 1")]
    ZeroUniques,
}

/// Where inside a country a record is attributed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locality {
    /// A named city.
    City(String),
    /// No city resolved: counts toward the country as a whole.
    CountryLevel,
}

impl Locality {
    /// Build from a raw city column: blank, `NULL`, and placeholder names are country-level.
    pub fn from_city_column(raw: &str) -> Self {
        let city = raw.trim();
        if city.is_empty() || city == "NULL" || is_placeholder_city(city) {
            Locality::CountryLevel
        } else {
            Locality::City(city.to_string())
        }
    }

    /// The ledger column form: the city name, or `""` for country-level.
    pub fn as_column(&self) -> &str {
        match self {
            Locality::City(c) => c,
            Locality::CountryLevel => "",
        }
    }

    pub fn is_country_level(&self) -> bool {
        matches!(self, Locality::CountryLevel)
    }
}

/// Where a record came from.
///
/// Kept explicit so "one live visitor" and "one historical aggregate unit" are never
/// told apart by `num_unique == 1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// A live analytics event from the named source.
    Live { source: String },
    /// A historical dump period imported under the named source.
    Historical { source: String },
    /// Rows written before provenance was recorded.
    Unknown,
}

impl Provenance {
    /// Column form: `live:<source>`, `historical:<source>`, or `""`.
    pub fn to_column(&self) -> String {
        match self {
            Provenance::Live { source } => format!("live:{source}"),
            Provenance::Historical { source } => format!("historical:{source}"),
            Provenance::Unknown => String::new(),
        }
    }

    /// Inverse of [`Provenance::to_column`]; anything unrecognised is `Unknown`.
    pub fn from_column(raw: &str) -> Self {
        match raw.trim().split_once(':') {
            Some(("live", s)) if !s.is_empty() => Provenance::Live { source: s.to_string() },
            Some(("historical", s)) if !s.is_empty() => Provenance::Historical {
                source: s.to_string(),
            },
            _ => Provenance::Unknown,
        }
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            Provenance::Live { source } | Provenance::Historical { source } => Some(source),
            Provenance::Unknown => None,
        }
    }
}

/// One observed visit, or many visitors collapsed into one dump period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub timestamp: DateTime<Utc>,
    country: String,
    pub locality: Locality,
    pub num_unique: NonZeroU64,
    pub provenance: Provenance,
}

impl VisitRecord {
    /// Build a record, enforcing a non-empty country and `num_unique >= 1`.
    pub fn new(
        timestamp: DateTime<Utc>,
        country: &str,
        locality: Locality,
        num_unique: u64,
        provenance: Provenance,
    ) -> Result<Self, RecordError> {
        let country = country.trim();
        if country.is_empty() {
            return Err(RecordError::EmptyCountry);
        }
        let num_unique = NonZeroU64::new(num_unique).ok_or(RecordError::ZeroUniques)?;
        Ok(Self {
            timestamp,
            country: country.to_string(),
            locality,
            num_unique,
            provenance,
        })
    }

    /// A single live visit. Missing or blank countries become [`UNKNOWN_COUNTRY`].
    pub fn live(
        timestamp: DateTime<Utc>,
        city: Option<&str>,
        country: Option<&str>,
        source: &str,
    ) -> Self {
        let country = country
            .map(str::trim)
            .filter(|c| !c.is_empty() && !is_placeholder_city(c))
            .unwrap_or(UNKNOWN_COUNTRY);
        Self {
            timestamp,
            country: country.to_string(),
            locality: Locality::from_city_column(city.unwrap_or("")),
            num_unique: NonZeroU64::MIN,
            provenance: Provenance::Live {
                source: source.to_string(),
            },
        }
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    /// City column form (`""` for country-level aggregates).
    pub fn city(&self) -> &str {
        self.locality.as_column()
    }
}

impl fmt::Display for VisitRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.locality {
            Locality::City(c) => write!(f, "{c}, {}", self.country)?,
            Locality::CountryLevel => write!(f, "{} (country)", self.country)?,
        }
        write!(f, " x{} @ {}", self.num_unique, self.timestamp.format("%Y-%m-%d"))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn rejects_empty_country_and_zero_uniques() {
        let err = VisitRecord::new(ts(), "  ", Locality::CountryLevel, 1, Provenance::Unknown);
        assert_eq!(err.unwrap_err(), RecordError::EmptyCountry);
        let err = VisitRecord::new(ts(), "France", Locality::CountryLevel, 0, Provenance::Unknown);
        assert_eq!(err.unwrap_err(), RecordError::ZeroUniques);
    }

    #[test]
    fn live_record_cleans_location() {
        let r = VisitRecord::live(ts(), Some("(not set)"), Some("Germany"), "ga");
        assert!(r.locality.is_country_level());
        assert_eq!(r.num_unique.get(), 1);

        let r = VisitRecord::live(ts(), Some(" Berlin "), None, "ga");
        assert_eq!(r.city(), "Berlin");
        assert_eq!(r.country(), UNKNOWN_COUNTRY);
    }

    #[test]
    fn provenance_column_roundtrip() {
        for p in [
            Provenance::Live { source: "ga4".into() },
            Provenance::Historical {
                source: "clustrmaps".into(),
            },
            Provenance::Unknown,
        ] {
            assert_eq!(Provenance::from_column(&p.to_column()), p);
        }
        assert_eq!(Provenance::from_column("live:"), Provenance::Unknown);
        assert_eq!(Provenance::from_column("garbage"), Provenance::Unknown);
    }

    #[test]
    fn null_city_column_is_country_level() {
        assert_eq!(Locality::from_city_column("NULL"), Locality::CountryLevel);
        assert_eq!(Locality::from_city_column(""), Locality::CountryLevel);
        assert_eq!(
            Locality::from_city_column("Seattle"),
            Locality::City("Seattle".into())
        );
    }
}
