//! Hotspot maps, one SVG per configured scale.
//!
//! Layout, top to bottom: a title banner ("N visits as of DATE"), then the map area
//! with a background (colour, optionally an image), land outlines when
//! [`RenderMeta::land`] is set, a 30 degree graticule, and the hotspots. Hotspots are
//! drawn largest first so small ones stay visible; the recent visits layer goes on
//! top of them. The banner is painted last so outlines crossing the north edge stay
//! under it.
//!
//! Rendering never fails on data. Points outside a scale's bounds or with broken
//! coordinates are skipped for that scale and counted in [`RenderStats`].

pub mod land;
pub mod scale;
pub mod surface;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use shared_utils::fs::write_atomic;
use tracing::{debug, info};

pub use land::{LandError, LandPolygons};
pub use scale::{ScaleConfig, ZoomBounds, format_count, validate_scales};
pub use surface::{DrawingSurface, Paint, SvgSurface, TextStyle};

use crate::hotspot::{Hotspot, HotspotSet};

/// Height of the title banner above the map.
pub const BANNER_HEIGHT: f64 = 44.0;
const TITLE_FONT_SIZE: f64 = 18.0;
const LABEL_FONT_SIZE: f64 = 10.0;
const GRATICULE_STEP: f64 = 30.0;

/// Colours and fonts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Theme {
    pub background: String,
    pub graticule: String,
    pub land_fill: String,
    pub land_stroke: String,
    pub hotspot_fill: String,
    pub hotspot_stroke: String,
    pub hotspot_opacity: f64,
    pub recent_fill: String,
    pub recent_stroke: String,
    pub label_color: String,
    pub title_color: String,
    pub title_background: String,
    pub font_family: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: "#0b1d2a".into(),
            graticule: "#27445a".into(),
            land_fill: "#1d3b50".into(),
            land_stroke: "#2f5873".into(),
            hotspot_fill: "#ff6b35".into(),
            hotspot_stroke: "#ffffff".into(),
            hotspot_opacity: 0.7,
            recent_fill: "#4ecdc4".into(),
            recent_stroke: "#0b1d2a".into(),
            label_color: "#f4f4f4".into(),
            title_color: "#ffffff".into(),
            title_background: "#13293d".into(),
            font_family: "Helvetica, Arial, sans-serif".into(),
        }
    }
}

/// Per-run inputs that are not hotspots.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderMeta {
    pub as_of: NaiveDate,
    pub background_href: Option<String>,
    pub land: Option<LandPolygons>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RenderStats {
    /// Land outlines drawn.
    pub land: usize,
    pub drawn: usize,
    pub labelled: usize,
    pub skipped: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Title text, e.g. `"1,234 visits as of 2025-01-01"`.
pub fn title(total: u64, as_of: NaiveDate) -> String {
    format!(
        "{} visits as of {}",
        scale::group_thousands(total),
        as_of.format("%Y-%m-%d")
    )
}

/// Draw one scale onto `surface`.
pub fn draw<S: DrawingSurface>(
    surface: &mut S,
    set: &HotspotSet,
    recent: Option<&HotspotSet>,
    scale: &ScaleConfig,
    theme: &Theme,
    meta: &RenderMeta,
) -> RenderStats {
    let width = f64::from(scale.width);
    let height = f64::from(scale.height);
    let no_stroke = Paint {
        fill: &theme.background,
        stroke: "none",
        stroke_width: 0.0,
        opacity: 1.0,
    };

    surface.rect(0.0, 0.0, width, height + BANNER_HEIGHT, no_stroke);

    let mut stats = RenderStats::default();
    surface.begin_group("map");
    if let Some(href) = meta.background_href.as_deref() {
        surface.image(href, 0.0, BANNER_HEIGHT, width, height);
    }
    if let Some(land) = &meta.land {
        stats.land = draw_land(surface, land, scale, theme);
    }
    draw_graticule(surface, scale, theme);

    let main = Paint {
        fill: &theme.hotspot_fill,
        stroke: &theme.hotspot_stroke,
        stroke_width: 1.0,
        opacity: theme.hotspot_opacity,
    };
    draw_layer(surface, "hotspots", &set.hotspots, scale, theme, main, &mut stats);
    if let Some(recent) = recent {
        let paint = Paint {
            fill: &theme.recent_fill,
            stroke: &theme.recent_stroke,
            stroke_width: 1.0,
            opacity: 0.9,
        };
        draw_layer(surface, "recent", &recent.hotspots, scale, theme, paint, &mut stats);
    }
    surface.end_group();

    surface.begin_group("banner");
    surface.rect(0.0, 0.0, width, BANNER_HEIGHT, no_stroke);
    let title = title(set.total, meta.as_of);
    let banner_w = (title.chars().count() as f64 * TITLE_FONT_SIZE * 0.6 + 40.0).min(width);
    surface.rect(
        (width - banner_w) / 2.0,
        6.0,
        banner_w,
        BANNER_HEIGHT - 12.0,
        Paint {
            fill: &theme.title_background,
            opacity: 0.85,
            ..no_stroke
        },
    );
    surface.text(
        width / 2.0,
        BANNER_HEIGHT / 2.0 + TITLE_FONT_SIZE / 3.0,
        &title,
        TextStyle {
            fill: &theme.title_color,
            font_family: &theme.font_family,
            font_size: TITLE_FONT_SIZE,
            bold: true,
        },
    );
    surface.end_group();
    stats
}

/// Rings whose bounding box touches the scale, simplified for it.
fn draw_land<S: DrawingSurface>(
    surface: &mut S,
    land: &LandPolygons,
    scale: &ScaleConfig,
    theme: &Theme,
) -> usize {
    let paint = Paint {
        fill: &theme.land_fill,
        stroke: &theme.land_stroke,
        stroke_width: 0.5,
        opacity: 1.0,
    };
    let tolerance = scale.land_tolerance();
    let mut drawn = 0;
    surface.begin_group("land");
    for ring in land.rings().iter().filter(|r| r.overlaps(&scale.zoom_bounds)) {
        let outline = land::simplify(&ring.points, tolerance);
        if outline.len() < 4 {
            continue;
        }
        let points: Vec<(f64, f64)> = outline
            .iter()
            .map(|c| {
                let (x, y) = scale.to_screen(*c);
                (x, y + BANNER_HEIGHT)
            })
            .collect();
        surface.polygon(&points, paint);
        drawn += 1;
    }
    surface.end_group();
    debug!(scale = %scale.name, drawn, "drew land");
    drawn
}

fn draw_graticule<S: DrawingSurface>(surface: &mut S, scale: &ScaleConfig, theme: &Theme) {
    let b = scale.zoom_bounds;
    let paint = Paint {
        fill: "none",
        stroke: &theme.graticule,
        stroke_width: 0.5,
        opacity: 0.6,
    };
    let width = f64::from(scale.width);
    let height = f64::from(scale.height);

    surface.begin_group("graticule");
    let mut lon = (b.west / GRATICULE_STEP).ceil() * GRATICULE_STEP;
    while lon <= b.east {
        let x = (lon - b.west) / (b.east - b.west) * width;
        surface.line(x, BANNER_HEIGHT, x, BANNER_HEIGHT + height, paint);
        lon += GRATICULE_STEP;
    }
    let mut lat = (b.south / GRATICULE_STEP).ceil() * GRATICULE_STEP;
    while lat <= b.north {
        let y = BANNER_HEIGHT + (b.north - lat) / (b.north - b.south) * height;
        surface.line(0.0, y, width, y, paint);
        lat += GRATICULE_STEP;
    }
    surface.end_group();
}

fn draw_layer<S: DrawingSurface>(
    surface: &mut S,
    id: &str,
    hotspots: &[Hotspot],
    scale: &ScaleConfig,
    theme: &Theme,
    paint: Paint<'_>,
    stats: &mut RenderStats,
) {
    let label_style = TextStyle {
        fill: &theme.label_color,
        font_family: &theme.font_family,
        font_size: LABEL_FONT_SIZE,
        bold: false,
    };

    // largest first, so smaller circles land on top
    let mut order: Vec<&Hotspot> = hotspots.iter().collect();
    order.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));

    surface.begin_group(id);
    for h in order {
        let Some((x, y)) = scale.project(h.coord) else {
            debug!(name = %h.name, lat = h.coord.lat, lon = h.coord.lon, scale = %scale.name, "hotspot outside scale");
            stats.skipped += 1;
            continue;
        };
        let y = y + BANNER_HEIGHT;
        let r = scale.radius(h.total);
        surface.circle(x, y, r, paint);
        stats.drawn += 1;
        if h.total >= scale.min_label_count {
            surface.text(x, y - r - 2.0, &format_count(h.total), label_style);
            stats.labelled += 1;
        }
    }
    surface.end_group();
}

/// Render one scale to an SVG string.
pub fn render(
    set: &HotspotSet,
    recent: Option<&HotspotSet>,
    scale: &ScaleConfig,
    theme: &Theme,
    meta: &RenderMeta,
) -> (String, RenderStats) {
    let total_height = (f64::from(scale.height) + BANNER_HEIGHT).ceil() as u32;
    let mut surface = SvgSurface::new(scale.width, total_height);
    let stats = draw(&mut surface, set, recent, scale, theme, meta);
    (surface.finish(), stats)
}

/// `{output_dir}/visitors-{name}.svg`.
pub fn output_path(output_dir: &Path, scale: &ScaleConfig) -> PathBuf {
    output_dir.join(format!("visitors-{}.svg", scale.name))
}

/// Render every scale and write the files. Returns the written paths in scale order.
pub fn render_all(
    set: &HotspotSet,
    recent: Option<&HotspotSet>,
    scales: &[ScaleConfig],
    theme: &Theme,
    meta: &RenderMeta,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, RenderError> {
    let mut written = Vec::with_capacity(scales.len());
    for scale in scales {
        let (svg, stats) = render(set, recent, scale, theme, meta);
        let path = output_path(output_dir, scale);
        write_atomic(&path, svg.as_bytes()).map_err(|source| RenderError::Io {
            path: path.clone(),
            source,
        })?;
        info!(
            path = %path.display(),
            land = stats.land,
            drawn = stats.drawn,
            labelled = stats.labelled,
            skipped = stats.skipped,
            "rendered scale"
        );
        written.push(path);
    }
    Ok(written)
}
