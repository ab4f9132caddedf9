//! Map scales: bounds, projection and hotspot sizing.
//!
//! A scale is one output image. Zoomed-in scales should make the same count look
//! bigger, so [`validate_scales`] requires `base_radius` and `k` to grow (never
//! shrink) with the zoom factor.

use serde::{Deserialize, Serialize};

use crate::geocode::Coord;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoomBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl ZoomBounds {
    pub const WORLD: ZoomBounds = ZoomBounds {
        west: -180.0,
        south: -90.0,
        east: 180.0,
        north: 90.0,
    };

    pub fn contains(&self, c: Coord) -> bool {
        (self.west..=self.east).contains(&c.lon) && (self.south..=self.north).contains(&c.lat)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScaleConfig {
    /// Output is written as `visitors-{name}.svg`.
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub zoom_bounds: ZoomBounds,
    pub base_radius: f64,
    pub k: f64,
    /// Hotspots below this total are drawn without a label.
    #[serde(default)]
    pub min_label_count: u64,
    /// Land outline simplification in degrees. Defaults to `0.5 / zoom_factor`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub land_simplify: Option<f64>,
}

impl ScaleConfig {
    /// `360 / (east - west)`: 1.0 for a whole-world view.
    pub fn zoom_factor(&self) -> f64 {
        360.0 / (self.zoom_bounds.east - self.zoom_bounds.west)
    }

    /// `base_radius + k * ln(1 + total)`.
    pub fn radius(&self, total: u64) -> f64 {
        self.base_radius + self.k * (total as f64).ln_1p()
    }

    pub fn land_tolerance(&self) -> f64 {
        self.land_simplify.unwrap_or(0.5 / self.zoom_factor())
    }

    /// Equirectangular projection into the map area. `None` for points outside the
    /// bounds or with non-finite coordinates.
    pub fn project(&self, c: Coord) -> Option<(f64, f64)> {
        if !c.is_finite() || !self.zoom_bounds.contains(c) {
            return None;
        }
        Some(self.to_screen(c))
    }

    /// The same projection without the bounds check, for outlines that cross the edge.
    pub fn to_screen(&self, c: Coord) -> (f64, f64) {
        let b = &self.zoom_bounds;
        let x = (c.lon - b.west) / (b.east - b.west) * f64::from(self.width);
        let y = (b.north - c.lat) / (b.north - b.south) * f64::from(self.height);
        (x, y)
    }

    pub fn world() -> Self {
        Self {
            name: "world".into(),
            width: 1200,
            height: 600,
            zoom_bounds: ZoomBounds::WORLD,
            base_radius: 2.0,
            k: 1.2,
            min_label_count: 50,
            land_simplify: None,
        }
    }

    pub fn europe() -> Self {
        Self {
            name: "europe".into(),
            width: 1000,
            height: 800,
            zoom_bounds: ZoomBounds {
                west: -25.0,
                south: 34.0,
                east: 45.0,
                north: 72.0,
            },
            base_radius: 3.0,
            k: 1.8,
            min_label_count: 10,
            land_simplify: None,
        }
    }

    pub fn north_america() -> Self {
        Self {
            name: "north-america".into(),
            width: 1100,
            height: 700,
            zoom_bounds: ZoomBounds {
                west: -170.0,
                south: 10.0,
                east: -50.0,
                north: 75.0,
            },
            base_radius: 2.5,
            k: 1.5,
            min_label_count: 20,
            land_simplify: None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ScaleError {
    #[error("scale '{0}': bounds must satisfy -180 <= west < east <= 180 and -90 <= south < north <= 90")]
    Bounds(String),
    #[error("scale '{0}': width and height must be positive")]
    Size(String),
    #[error("scale '{0}': base_radius and k must be finite and non-negative")]
    Radius(String),
    #[error("scales '{0}' and '{1}' have the same zoom factor")]
    SameZoom(String, String),
    #[error("scale '{bigger}' zooms in further than '{smaller}' but does not draw larger hotspots")]
    Ladder { smaller: String, bigger: String },
}

fn validate_one(s: &ScaleConfig) -> Result<(), ScaleError> {
    let b = &s.zoom_bounds;
    let finite = [b.west, b.south, b.east, b.north].iter().all(|v| v.is_finite());
    if !finite
        || b.west < -180.0
        || b.east > 180.0
        || b.west >= b.east
        || b.south < -90.0
        || b.north > 90.0
        || b.south >= b.north
    {
        return Err(ScaleError::Bounds(s.name.clone()));
    }
    if s.width == 0 || s.height == 0 {
        return Err(ScaleError::Size(s.name.clone()));
    }
    if !(s.base_radius.is_finite() && s.k.is_finite() && s.base_radius >= 0.0 && s.k >= 0.0) {
        return Err(ScaleError::Radius(s.name.clone()));
    }
    Ok(())
}

/// Check each scale, then the zoom ladder: ordered by zoom factor, `base_radius`
/// and `k` never decrease and at least one of them increases at every step. That
/// makes the radius for any fixed total strictly increase with zoom.
pub fn validate_scales(scales: &[ScaleConfig]) -> Result<(), ScaleError> {
    scales.iter().try_for_each(validate_one)?;

    let mut ladder: Vec<&ScaleConfig> = scales.iter().collect();
    ladder.sort_by(|a, b| a.zoom_factor().total_cmp(&b.zoom_factor()));
    for pair in ladder.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if lo.zoom_factor() == hi.zoom_factor() {
            return Err(ScaleError::SameZoom(lo.name.clone(), hi.name.clone()));
        }
        let non_decreasing = hi.base_radius >= lo.base_radius && hi.k >= lo.k;
        let grows = hi.base_radius > lo.base_radius || hi.k > lo.k;
        if !(non_decreasing && grows) {
            return Err(ScaleError::Ladder {
                smaller: lo.name.clone(),
                bigger: hi.name.clone(),
            });
        }
    }
    Ok(())
}

/// Short label: `999`, `1.2k`, `3.4M`, `1B`.
pub fn format_count(n: u64) -> String {
    if n < 1_000 {
        return n.to_string();
    }
    let (value, suffix) = if n < 999_950 {
        (n as f64 / 1e3, "k")
    } else if n < 999_950_000 {
        (n as f64 / 1e6, "M")
    } else {
        (n as f64 / 1e9, "B")
    };
    let digits = format!("{value:.1}");
    let digits = digits.strip_suffix(".0").unwrap_or(&digits);
    format!("{digits}{suffix}")
}

/// `1234567` -> `"1,234,567"`.
pub fn group_thousands(n: u64) -> String {
    let raw = n.to_string();
    let mut out = String::with_capacity(raw.len() + raw.len() / 3);
    for (i, ch) in raw.chars().enumerate() {
        if i > 0 && (raw.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
