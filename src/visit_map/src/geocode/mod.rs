//! Place names to coordinates.
//!
//! [`GeoDataset`] is the lookup boundary: a city within a country, or a country's
//! representative point. [`Geocoder`] sits on top of one, caches answers per folded
//! name, and decides what happens when a lookup fails:
//!
//! - a country-level entry goes to the country's centroid;
//! - a city that cannot be found also goes to the centroid, flagged as a fallback and
//!   recorded as a [`GeocodeMiss`], so its count is never lost;
//! - a country that cannot be found has no point at all ([`Resolution::Unplaced`]).

pub mod geonames;

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, warn};

pub use geonames::GeoNamesDataset;

use crate::record::Locality;
use crate::text::fold_key;

/// Latitude/longitude in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lon.is_finite()
    }

    /// Grid cell at 1e-4 degrees (about 11 m). Points in the same cell are one hotspot.
    pub fn bucket(&self) -> (i64, i64) {
        ((self.lat * 1e4).round() as i64, (self.lon * 1e4).round() as i64)
    }
}

/// A coordinate source.
pub trait GeoDataset: Send + Sync {
    fn lookup(&self, city: &str, country: &str) -> Option<Coord>;
    fn centroid(&self, country: &str) -> Option<Coord>;
}

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("geocoding dataset {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("geocoding dataset {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("geocoding dataset {} has no usable rows", path.display())]
    Empty { path: PathBuf },
    #[error("loading the geocoding dataset took longer than {secs}s")]
    Timeout { secs: u64 },
    #[error("geocoding dataset loader failed: {0}")]
    Join(String),
}

impl GeocodeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GeocodeError::Timeout { .. })
    }
}

/// A city that had to be placed at its country's centroid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GeocodeMiss {
    pub city: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The city itself was found.
    City(Coord),
    /// A country-level entry at its centroid.
    Country(Coord),
    /// An unknown city kept at its country's centroid.
    Fallback { coord: Coord, miss: GeocodeMiss },
    /// The country is unknown.
    Unplaced,
}

impl Resolution {
    pub fn coord(&self) -> Option<Coord> {
        match self {
            Resolution::City(c) | Resolution::Country(c) => Some(*c),
            Resolution::Fallback { coord, .. } => Some(*coord),
            Resolution::Unplaced => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolution::Fallback { .. })
    }
}

type CacheKey = (String, Option<String>);

/// Caching resolver over a [`GeoDataset`].
pub struct Geocoder {
    dataset: Box<dyn GeoDataset>,
    cache: HashMap<CacheKey, Resolution>,
}

impl Geocoder {
    pub fn new(dataset: Box<dyn GeoDataset>) -> Self {
        Self {
            dataset,
            cache: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, country: &str, locality: &Locality) -> Resolution {
        let key = (
            fold_key(country),
            match locality {
                Locality::City(c) => Some(fold_key(c)),
                Locality::CountryLevel => None,
            },
        );
        if let Some(hit) = self.cache.get(&key) {
            return hit.clone();
        }

        let resolution = self.resolve_uncached(country, locality);
        if let Resolution::Fallback { miss, .. } = &resolution {
            warn!(city = %miss.city, country = %miss.country, "city not found, using country centroid");
        }
        if resolution == Resolution::Unplaced {
            warn!(country, "country not found, entry left off the map");
        }
        self.cache.insert(key, resolution.clone());
        resolution
    }

    fn resolve_uncached(&self, country: &str, locality: &Locality) -> Resolution {
        let centroid = self.dataset.centroid(country);
        match locality {
            Locality::CountryLevel => centroid.map_or(Resolution::Unplaced, Resolution::Country),
            Locality::City(city) => match (self.dataset.lookup(city, country), centroid) {
                (Some(coord), _) => {
                    debug!(city = %city, country, lat = coord.lat, lon = coord.lon, "resolved city");
                    Resolution::City(coord)
                }
                (None, Some(coord)) => Resolution::Fallback {
                    coord,
                    miss: GeocodeMiss {
                        city: city.clone(),
                        country: country.to_string(),
                    },
                },
                (None, None) => Resolution::Unplaced,
            },
        }
    }
}

/// In-memory dataset keyed by folded names.
#[derive(Debug, Default, Clone)]
pub struct StaticDataset {
    countries: HashMap<String, Coord>,
    cities: HashMap<(String, String), Coord>,
}

impl StaticDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_country(mut self, country: &str, centroid: Coord) -> Self {
        self.countries.insert(fold_key(country), centroid);
        self
    }

    pub fn with_city(mut self, city: &str, country: &str, coord: Coord) -> Self {
        self.cities.insert((fold_key(city), fold_key(country)), coord);
        self
    }
}

impl GeoDataset for StaticDataset {
    fn lookup(&self, city: &str, country: &str) -> Option<Coord> {
        self.cities.get(&(fold_key(city), fold_key(country))).copied()
    }

    fn centroid(&self, country: &str) -> Option<Coord> {
        self.countries.get(&fold_key(country)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geocoder() -> Geocoder {
        let data = StaticDataset::new()
            .with_country("United States", Coord::new(38.9, -77.0))
            .with_city("Seattle", "United States", Coord::new(47.6, -122.3));
        Geocoder::new(Box::new(data))
    }

    #[test]
    fn city_country_and_fallback() {
        let mut g = geocoder();
        let us = "United States";
        assert_eq!(
            g.resolve(us, &Locality::City("seattle".into())),
            Resolution::City(Coord::new(47.6, -122.3))
        );
        assert_eq!(
            g.resolve(us, &Locality::CountryLevel),
            Resolution::Country(Coord::new(38.9, -77.0))
        );

        let r = g.resolve(us, &Locality::City("Springfield".into()));
        assert!(r.is_fallback());
        assert_eq!(r.coord(), Some(Coord::new(38.9, -77.0)));
        assert_eq!(g.resolve("Atlantis", &Locality::CountryLevel), Resolution::Unplaced);
    }

    #[test]
    fn fallbacks_are_cached() {
        let mut g = geocoder();
        let first = g.resolve("United States", &Locality::City("Springfield".into()));
        let again = g.resolve("united states", &Locality::City("SPRINGFIELD".into()));
        assert_eq!(first, again);
        assert_eq!(
            again,
            Resolution::Fallback {
                coord: Coord::new(38.9, -77.0),
                miss: GeocodeMiss {
                    city: "Springfield".into(),
                    country: "United States".into()
                }
            }
        );
    }

    #[test]
    fn bucket_rounds_to_ten_thousandths() {
        assert_eq!(Coord::new(47.60621, -122.33207).bucket(), (476062, -1223321));
        assert_eq!(
            Coord::new(47.606209, -122.332071).bucket(),
            Coord::new(47.60621, -122.33207).bucket()
        );
    }
}
