//! GeoNames dump files (`cities15000.txt`, `countryInfo.txt`).
//!
//! Both are tab-separated without headers; `countryInfo.txt` has `#` comment lines.
//! Cities are indexed by every name GeoNames lists for them (name, ASCII name and
//! alternate names). When two places in one country share a name, the more populous
//! one wins. A country's centroid is its capital, or failing that, the first city
//! listed for it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use csv::{ReaderBuilder, StringRecord};
use tracing::info;

use crate::geocode::{Coord, GeoDataset, GeocodeError};
use crate::text::fold_key;

// cities*.txt columns
const CITY_NAME: usize = 1;
const CITY_ASCII: usize = 2;
const CITY_ALTERNATES: usize = 3;
const CITY_LAT: usize = 4;
const CITY_LON: usize = 5;
const CITY_COUNTRY: usize = 8;
const CITY_POPULATION: usize = 14;

// countryInfo.txt columns
const COUNTRY_ISO: usize = 0;
const COUNTRY_ISO3: usize = 1;
const COUNTRY_NAME: usize = 4;
const COUNTRY_CAPITAL: usize = 5;

/// Names analytics vendors use that GeoNames spells differently.
const COUNTRY_ALIASES: [(&str, &str); 10] = [
    ("united states", "US"),
    ("united states of america", "US"),
    ("usa", "US"),
    ("united kingdom", "GB"),
    ("uk", "GB"),
    ("russia", "RU"),
    ("south korea", "KR"),
    ("north korea", "KP"),
    ("czech republic", "CZ"),
    ("viet nam", "VN"),
];

#[derive(Debug, Default)]
pub struct GeoNamesDataset {
    /// folded name or code -> ISO-2
    countries: HashMap<String, String>,
    /// (folded city, ISO-2) -> (coord, population)
    cities: HashMap<(String, String), (Coord, u64)>,
    /// ISO-2 -> centroid
    centroids: HashMap<String, Coord>,
}

fn reader(path: &Path) -> Result<csv::Reader<std::fs::File>, GeocodeError> {
    ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|source| GeocodeError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

fn field<'r>(row: &'r StringRecord, idx: usize) -> &'r str {
    row.get(idx).unwrap_or("").trim()
}

impl GeoNamesDataset {
    /// Load and index both files. Blocking; see [`GeoNamesDataset::load_with_timeout`].
    pub fn load(cities_path: &Path, countries_path: &Path) -> Result<Self, GeocodeError> {
        let mut ds = Self::default();
        let mut capitals: Vec<(String, String)> = Vec::new();

        for row in reader(countries_path)?.records() {
            let row = row.map_err(|source| GeocodeError::Csv {
                path: countries_path.to_path_buf(),
                source,
            })?;
            let iso = field(&row, COUNTRY_ISO).to_uppercase();
            if iso.len() != 2 {
                continue;
            }
            for name in [field(&row, COUNTRY_ISO), field(&row, COUNTRY_ISO3), field(&row, COUNTRY_NAME)] {
                if !name.is_empty() {
                    ds.countries.insert(fold_key(name), iso.clone());
                }
            }
            let capital = field(&row, COUNTRY_CAPITAL);
            if !capital.is_empty() {
                capitals.push((fold_key(capital), iso));
            }
        }
        for (alias, iso) in COUNTRY_ALIASES {
            ds.countries.insert(alias.to_string(), iso.to_string());
        }
        if ds.countries.is_empty() {
            return Err(GeocodeError::Empty {
                path: countries_path.to_path_buf(),
            });
        }

        let mut first_city: HashMap<String, Coord> = HashMap::new();
        for row in reader(cities_path)?.records() {
            let row = row.map_err(|source| GeocodeError::Csv {
                path: cities_path.to_path_buf(),
                source,
            })?;
            let iso = field(&row, CITY_COUNTRY).to_uppercase();
            let (Ok(lat), Ok(lon)) = (
                field(&row, CITY_LAT).parse::<f64>(),
                field(&row, CITY_LON).parse::<f64>(),
            ) else {
                continue;
            };
            if iso.is_empty() {
                continue;
            }
            let coord = Coord::new(lat, lon);
            let population = field(&row, CITY_POPULATION).parse::<u64>().unwrap_or(0);
            first_city.entry(iso.clone()).or_insert(coord);

            let alternates = field(&row, CITY_ALTERNATES).split(',');
            let names = [field(&row, CITY_NAME), field(&row, CITY_ASCII)]
                .into_iter()
                .chain(alternates);
            for name in names {
                let key = fold_key(name);
                if key.is_empty() {
                    continue;
                }
                let slot = ds
                    .cities
                    .entry((key, iso.clone()))
                    .or_insert((coord, population));
                if population > slot.1 {
                    *slot = (coord, population);
                }
            }
        }
        if ds.cities.is_empty() {
            return Err(GeocodeError::Empty {
                path: cities_path.to_path_buf(),
            });
        }

        ds.centroids = first_city;
        for (capital, iso) in capitals {
            if let Some((coord, _)) = ds.cities.get(&(capital, iso.clone())) {
                ds.centroids.insert(iso, *coord);
            }
        }

        info!(
            countries = ds.centroids.len(),
            city_names = ds.cities.len(),
            "indexed GeoNames dataset"
        );
        Ok(ds)
    }

    /// [`GeoNamesDataset::load`] on the blocking pool, bounded by `timeout`.
    pub async fn load_with_timeout(
        cities_path: PathBuf,
        countries_path: PathBuf,
        timeout: Duration,
    ) -> Result<Self, GeocodeError> {
        let task = tokio::task::spawn_blocking(move || Self::load(&cities_path, &countries_path));
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(GeocodeError::Join(join.to_string())),
            Err(_) => Err(GeocodeError::Timeout {
                secs: timeout.as_secs(),
            }),
        }
    }

    fn country_code(&self, country: &str) -> Option<&str> {
        self.countries.get(&fold_key(country)).map(String::as_str)
    }
}

impl GeoDataset for GeoNamesDataset {
    fn lookup(&self, city: &str, country: &str) -> Option<Coord> {
        let iso = self.country_code(country)?;
        self.cities
            .get(&(fold_key(city), iso.to_string()))
            .map(|(coord, _)| *coord)
    }

    fn centroid(&self, country: &str) -> Option<Coord> {
        let iso = self.country_code(country)?;
        self.centroids.get(iso).copied()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const COUNTRIES: &str = "\
# ISO\tISO3\tISO-Numeric\tfips\tCountry\tCapital
US\tUSA\t840\tUS\tUnited States\tWashington\t9629091\t327167434\tNA
FR\tFRA\t250\tFR\tFrance\tParis\t547030\t66987244\tEU
NZ\tNZL\t554\tNZ\tNew Zealand\t\t268680\t4885500\tOC
";

    const CITIES: &str = "\
5809844\tSeattle\tSeattle\tSEA,Seattle WA\t47.60621\t-122.33207\tP\tPPLA2\tUS\t\tWA\t\t\t\t737015\t\t56\tAmerica/Los_Angeles\t2024-01-01
4140963\tWashington\tWashington\tWashington D.C.\t38.89511\t-77.03637\tP\tPPLC\tUS\t\tDC\t\t\t\t689545\t\t7\tAmerica/New_York\t2024-01-01
4720131\tPortland\tPortland\t\t43.66147\t-70.25533\tP\tPPLA2\tUS\t\tME\t\t\t\t68408\t\t14\tAmerica/New_York\t2024-01-01
5746545\tPortland\tPortland\t\t45.52345\t-122.67621\tP\tPPLA2\tUS\t\tOR\t\t\t\t652503\t\t15\tAmerica/Los_Angeles\t2024-01-01
2988507\tParis\tParis\tParigi\t48.85341\t2.3488\tP\tPPLC\tFR\t\t11\t\t\t\t2138551\t\t42\tEurope/Paris\t2024-01-01
2193733\tAuckland\tAuckland\t\t-36.84853\t174.76349\tP\tPPLA\tNZ\t\t\t\t\t\t417910\t\t26\tPacific/Auckland\t2024-01-01
";

    fn load() -> GeoNamesDataset {
        let dir = TempDir::new().unwrap();
        let cities = dir.path().join("cities15000.txt");
        let countries = dir.path().join("countryInfo.txt");
        std::fs::write(&cities, CITIES).unwrap();
        std::fs::write(&countries, COUNTRIES).unwrap();
        GeoNamesDataset::load(&cities, &countries).unwrap()
    }

    #[test]
    fn lookups_use_aliases_and_alternate_names() {
        let ds = load();
        assert_eq!(ds.lookup("seattle", "USA"), Some(Coord::new(47.60621, -122.33207)));
        assert_eq!(ds.lookup("Parigi", "france"), ds.lookup("Paris", "FR"));
        assert_eq!(ds.lookup("Seattle", "France"), None);
        assert_eq!(ds.lookup("Seattle", "Narnia"), None);
    }

    #[test]
    fn larger_namesake_wins() {
        let ds = load();
        assert_eq!(
            ds.lookup("Portland", "United States"),
            Some(Coord::new(45.52345, -122.67621))
        );
    }

    #[test]
    fn centroid_is_capital_or_first_city() {
        let ds = load();
        assert_eq!(ds.centroid("United States"), Some(Coord::new(38.89511, -77.03637)));
        assert_eq!(ds.centroid("New Zealand"), Some(Coord::new(-36.84853, 174.76349)));
        assert_eq!(ds.centroid("Narnia"), None);
    }

    #[tokio::test]
    async fn missing_files_error_through_the_blocking_loader() {
        let err = GeoNamesDataset::load_with_timeout(
            PathBuf::from("/nonexistent/cities.txt"),
            PathBuf::from("/nonexistent/countryInfo.txt"),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GeocodeError::Csv { .. }));
        assert!(!err.is_retryable());
    }
}
