//! Run configuration: parsing, normalization, and loading.
//!
//! One TOML file describes where the ledger and cursors live, how to reach the
//! analytics feed and the geocoding dataset, and which maps to draw:
//!
//! ```toml
//! [ledger]
//! path = "data/visits.tsv"
//!
//! [analytics]
//! source_id = "ga4"
//! endpoint = "https://stats.example.org/events"
//!
//! [geocoder]
//! cities_path = "geonames/cities15000.txt"
//! countries_path = "geonames/countryInfo.txt"
//!
//! [[renderer.scales]]
//! name = "world"
//! width = 1200
//! height = 600
//! zoom_bounds = { west = -180.0, south = -90.0, east = 180.0, north = 90.0 }
//! base_radius = 2.0
//! k = 1.2
//! ```
//!
//! Everything except `[analytics]` and `[geocoder]` has defaults. Normalization trims
//! source ids, lowercases scale names and drops repeated scales (first one wins).
//! Validation then checks the zoom ladder with [`validate_scales`].
//!
//! Entrypoints: [`load_config_str`], [`load_config_path`], and [`load_config`] which
//! also consults [`CONFIG_ENV`].

use std::collections::HashSet;
use std::mem;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use chrono_tz::Tz;
use event_ingestor::providers::http_feed::provider::HttpFeedConfig;
use serde::{Deserialize, Serialize};
use shared_utils::env::path_or_env;
use tracing::{debug, info};

use crate::clustrmaps::{DEFAULT_SOURCE, ParserOptions};
use crate::render::{ScaleConfig, Theme, validate_scales};

/// Env var naming the config file when `--config` is not given.
pub const CONFIG_ENV: &str = "VISIT_MAP_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerCfg,
    #[serde(default)]
    pub cursor: CursorCfg,
    #[serde(default)]
    pub dump: DumpCfg,
    pub analytics: Option<AnalyticsCfg>,
    pub geocoder: Option<GeocoderCfg>,
    #[serde(default)]
    pub renderer: RendererCfg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerCfg {
    pub path: PathBuf,
}

impl Default for LedgerCfg {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/visits.tsv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CursorCfg {
    pub path: PathBuf,
}

impl Default for CursorCfg {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/cursors.json"),
        }
    }
}

/// Clustrmaps dump import settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DumpCfg {
    pub source_id: String,
    pub fold_header_residual: bool,
    /// IANA zone whose midnight starts each dump period.
    pub timezone: String,
}

impl Default for DumpCfg {
    fn default() -> Self {
        Self {
            source_id: DEFAULT_SOURCE.to_string(),
            fold_header_residual: true,
            timezone: "UTC".to_string(),
        }
    }
}

impl DumpCfg {
    pub fn timezone(&self) -> anyhow::Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("dump.timezone '{}': {e}", self.timezone))
    }

    pub fn parser_options(&self) -> anyhow::Result<ParserOptions> {
        Ok(ParserOptions {
            source: self.source_id.clone(),
            fold_header_residual: self.fold_header_residual,
            timezone: self.timezone()?,
        })
    }
}

fn default_analytics_source() -> String {
    "analytics".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyticsCfg {
    #[serde(default = "default_analytics_source")]
    pub source_id: String,
    pub endpoint: String,
    pub page_size: Option<u32>,
    pub max_pages: Option<u32>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl AnalyticsCfg {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn feed_config(&self) -> HttpFeedConfig {
        let mut feed = HttpFeedConfig::new(self.endpoint.clone());
        if let Some(n) = self.page_size {
            feed.page_size = n;
        }
        if let Some(n) = self.max_pages {
            feed.max_pages = n;
        }
        feed.timeout = self.timeout();
        feed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeocoderCfg {
    /// GeoNames `cities*.txt`.
    pub cities_path: PathBuf,
    /// GeoNames `countryInfo.txt`.
    pub countries_path: PathBuf,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl GeocoderCfg {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererCfg {
    pub output_dir: PathBuf,
    pub background_href: Option<String>,
    /// Summary CSV (`country,city,uniques`) summed into the ledger's totals.
    pub overlay_path: Option<PathBuf>,
    /// Highlight the last N ledger rows. 0 disables the layer.
    pub most_recent_visits: usize,
    /// GeoJSON land polygons (Natural Earth `land`) drawn under the hotspots.
    pub land_path: Option<PathBuf>,
    pub theme: Theme,
    pub scales: Vec<ScaleConfig>,
}

impl Default for RendererCfg {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("out"),
            background_href: None,
            overlay_path: None,
            most_recent_visits: 0,
            land_path: None,
            theme: Theme::default(),
            scales: vec![
                ScaleConfig::world(),
                ScaleConfig::europe(),
                ScaleConfig::north_america(),
            ],
        }
    }
}

/// What [`normalize_config`] changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct NormalizationReport {
    pub source_ids_trimmed: usize,
    pub scales_renamed: usize,
    pub scales_deduped: usize,
}

fn trim_in_place(s: &mut String, what: &str, report: &mut NormalizationReport) -> anyhow::Result<()> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        bail!("{what} cannot be empty after trimming");
    }
    if trimmed.len() != s.len() {
        *s = trimmed.to_string();
        report.source_ids_trimmed += 1;
    }
    Ok(())
}

/// Trim source ids, lowercase scale names and drop repeated scales in place.
///
/// Errors on ids or names that are empty after trimming.
pub fn normalize_config(cfg: &mut Config) -> anyhow::Result<NormalizationReport> {
    let mut report = NormalizationReport::default();

    trim_in_place(&mut cfg.dump.source_id, "dump.source_id", &mut report)?;
    if let Some(analytics) = cfg.analytics.as_mut() {
        trim_in_place(&mut analytics.source_id, "analytics.source_id", &mut report)?;
        analytics.endpoint = analytics.endpoint.trim().to_string();
    }

    let mut seen = HashSet::new();
    let mut scales = Vec::with_capacity(cfg.renderer.scales.len());
    for mut scale in mem::take(&mut cfg.renderer.scales) {
        let name = scale.name.trim().to_lowercase();
        if name.is_empty() {
            bail!("scale name cannot be empty after trimming");
        }
        if name != scale.name {
            report.scales_renamed += 1;
            scale.name = name;
        }
        if seen.insert(scale.name.clone()) {
            scales.push(scale);
        } else {
            report.scales_deduped += 1;
        }
    }
    cfg.renderer.scales = scales;
    Ok(report)
}

/// Reject configs that would fail later at run time.
/// Upper bound on the recent-visits layer. Its tail is held in memory during a scan.
pub const MAX_RECENT_VISITS: usize = 100_000;

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.renderer.scales.is_empty() {
        bail!("renderer.scales must list at least one scale");
    }
    if let Some(bad) = cfg
        .renderer
        .scales
        .iter()
        .find(|s| s.name.contains(['/', '\\']) || s.name.starts_with('.'))
    {
        bail!("scale name '{}' is not usable in a file name", bad.name);
    }
    validate_scales(&cfg.renderer.scales).context("invalid renderer.scales")?;

    let opacity = cfg.renderer.theme.hotspot_opacity;
    if !(0.0..=1.0).contains(&opacity) {
        bail!("renderer.theme.hotspot_opacity must be within 0..=1, got {opacity}");
    }
    if cfg.renderer.most_recent_visits > MAX_RECENT_VISITS {
        bail!(
            "renderer.most_recent_visits must be at most {MAX_RECENT_VISITS}, got {}",
            cfg.renderer.most_recent_visits
        );
    }
    cfg.dump.timezone()?;

    if let Some(a) = &cfg.analytics {
        if a.endpoint.is_empty() {
            bail!("analytics.endpoint cannot be empty");
        }
        if a.timeout_secs == 0 {
            bail!("analytics.timeout_secs must be positive");
        }
    }
    if cfg.geocoder.as_ref().is_some_and(|g| g.timeout_secs == 0) {
        bail!("geocoder.timeout_secs must be positive");
    }
    Ok(())
}

/// Parse, normalize and validate a config from a TOML string.
pub fn load_config_str(toml_str: &str) -> anyhow::Result<Config> {
    let mut cfg: Config = toml::from_str(toml_str).context("failed to parse config TOML")?;
    let report = normalize_config(&mut cfg).context("normalize_config failed")?;
    debug!(?report, "normalized config");
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Read a config TOML file from disk, then parse and check it like [`load_config_str`].
pub fn load_config_path(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read config file {}", path.as_ref().display()))?;
    load_config_str(&text).with_context(|| format!("config file {}", path.as_ref().display()))
}

/// Load from `explicit`, else from [`CONFIG_ENV`], else fall back to the defaults.
pub fn load_config(explicit: Option<PathBuf>) -> anyhow::Result<Config> {
    match path_or_env(explicit, CONFIG_ENV) {
        Ok(path) => {
            info!(path = %path.display(), "loading config");
            load_config_path(path)
        }
        Err(_) => {
            info!("no config file given, using defaults");
            load_config_str("")
        }
    }
}
