//! Land outlines drawn under the hotspots.
//!
//! Input is GeoJSON (Natural Earth `ne_110m_land` and friends). Only the exterior
//! ring of each polygon is kept; lakes and other holes are drawn as land. Each scale
//! simplifies the rings with its own tolerance, so the world map stays small while
//! zoomed maps keep their coastlines.

use std::path::{Path, PathBuf};

use geojson::{GeoJson, Value};
use tracing::{debug, info};

use crate::geocode::Coord;
use crate::render::scale::ZoomBounds;

#[derive(Debug, thiserror::Error)]
pub enum LandError {
    #[error("reading land geometry {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("land geometry {} is not valid GeoJSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: geojson::Error,
    },
}

/// One closed exterior ring and its bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct LandRing {
    pub points: Vec<Coord>,
    bbox: ZoomBounds,
}

impl LandRing {
    /// `None` for rings with fewer than three distinct corners or broken coordinates.
    pub fn new(mut points: Vec<Coord>) -> Option<Self> {
        if points.iter().any(|c| !c.is_finite()) {
            return None;
        }
        if points.first() != points.last() {
            let first = *points.first()?;
            points.push(first);
        }
        if points.len() < 4 {
            return None;
        }
        let mut bbox = ZoomBounds {
            west: f64::INFINITY,
            south: f64::INFINITY,
            east: f64::NEG_INFINITY,
            north: f64::NEG_INFINITY,
        };
        for c in &points {
            bbox.west = bbox.west.min(c.lon);
            bbox.east = bbox.east.max(c.lon);
            bbox.south = bbox.south.min(c.lat);
            bbox.north = bbox.north.max(c.lat);
        }
        Some(Self { points, bbox })
    }

    pub fn overlaps(&self, view: &ZoomBounds) -> bool {
        self.bbox.west <= view.east
            && self.bbox.east >= view.west
            && self.bbox.south <= view.north
            && self.bbox.north >= view.south
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct LandPolygons {
    rings: Vec<LandRing>,
}

impl LandPolygons {
    pub fn new(rings: Vec<LandRing>) -> Self {
        Self { rings }
    }

    pub fn rings(&self) -> &[LandRing] {
        &self.rings
    }

    pub fn from_geojson_str(text: &str) -> Result<Self, geojson::Error> {
        let doc: GeoJson = text.parse()?;
        let mut rings = Vec::new();
        match doc {
            GeoJson::FeatureCollection(fc) => {
                for feature in fc.features {
                    if let Some(geometry) = feature.geometry {
                        collect_rings(&geometry.value, &mut rings);
                    }
                }
            }
            GeoJson::Feature(feature) => {
                if let Some(geometry) = feature.geometry {
                    collect_rings(&geometry.value, &mut rings);
                }
            }
            GeoJson::Geometry(geometry) => collect_rings(&geometry.value, &mut rings),
        }
        Ok(Self { rings })
    }

    pub fn load(path: &Path) -> Result<Self, LandError> {
        let text = std::fs::read_to_string(path).map_err(|source| LandError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let land = Self::from_geojson_str(&text).map_err(|source| LandError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), rings = land.rings.len(), "loaded land polygons");
        Ok(land)
    }
}

fn ring_from_positions(positions: &[Vec<f64>]) -> Option<LandRing> {
    let points = positions
        .iter()
        .filter_map(|p| match p.as_slice() {
            [lon, lat, ..] => Some(Coord::new(*lat, *lon)),
            _ => None,
        })
        .collect();
    LandRing::new(points)
}

fn collect_rings(value: &Value, out: &mut Vec<LandRing>) {
    match value {
        Value::Polygon(polygon) => {
            out.extend(polygon.first().and_then(|ring| ring_from_positions(ring)));
        }
        Value::MultiPolygon(polygons) => {
            for polygon in polygons {
                out.extend(polygon.first().and_then(|ring| ring_from_positions(ring)));
            }
        }
        Value::GeometryCollection(geometries) => {
            for geometry in geometries {
                collect_rings(&geometry.value, out);
            }
        }
        _ => debug!("skipping non-polygon land geometry"),
    }
}

/// Distance in degrees from `p` to the segment line through `a` and `b`.
fn offset(p: Coord, a: Coord, b: Coord) -> f64 {
    let (dx, dy) = (b.lon - a.lon, b.lat - a.lat);
    let len = dx.hypot(dy);
    if len == 0.0 {
        return (p.lon - a.lon).hypot(p.lat - a.lat);
    }
    (dy * p.lon - dx * p.lat + b.lon * a.lat - b.lat * a.lon).abs() / len
}

/// Douglas-Peucker. Endpoints always survive, so a closed ring stays closed.
pub fn simplify(points: &[Coord], tolerance: f64) -> Vec<Coord> {
    if points.len() < 3 || tolerance.is_nan() || tolerance <= 0.0 {
        return points.to_vec();
    }
    let last = points.len() - 1;
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[last] = true;

    let mut stack = vec![(0, last)];
    while let Some((start, end)) = stack.pop() {
        let mut far = (0.0, start);
        for i in start + 1..end {
            let d = offset(points[i], points[start], points[end]);
            if d > far.0 {
                far = (d, i);
            }
        }
        if far.0 > tolerance {
            keep[far.1] = true;
            stack.push((start, far.1));
            stack.push((far.1, end));
        }
    }
    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE_WITH_NOISE: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        {"type": "Feature", "properties": {}, "geometry": {
          "type": "Polygon",
          "coordinates": [
            [[0, 0], [5, 0.01], [10, 0], [10, 10], [0, 10], [0, 0]],
            [[2, 2], [3, 2], [3, 3], [2, 2]]
          ]}},
        {"type": "Feature", "properties": {}, "geometry": {
          "type": "MultiPolygon",
          "coordinates": [
            [[[100, -10], [110, -10], [110, -5]]],
            [[[1, 1], [2, 2]]]
          ]}},
        {"type": "Feature", "properties": {}, "geometry": {
          "type": "Point", "coordinates": [1, 1]}}
      ]
    }"#;

    #[test]
    fn keeps_exterior_rings_and_closes_them() {
        let land = LandPolygons::from_geojson_str(SQUARE_WITH_NOISE).unwrap();
        assert_eq!(land.rings().len(), 2);
        assert_eq!(land.rings()[0].points.len(), 6);
        // the open triangle got its closing point
        let tri = &land.rings()[1].points;
        assert_eq!(tri.len(), 4);
        assert_eq!(tri.first(), tri.last());
        assert!(LandPolygons::from_geojson_str("{\"type\": \"Nope\"}").is_err());
    }

    #[test]
    fn simplify_drops_small_wiggles_only() {
        let land = LandPolygons::from_geojson_str(SQUARE_WITH_NOISE).unwrap();
        let square = &land.rings()[0].points;
        let coarse = simplify(square, 0.5);
        assert_eq!(coarse.len(), 5);
        assert!(!coarse.contains(&Coord::new(0.01, 5.0)));
        assert_eq!(coarse.first(), coarse.last());
        assert_eq!(simplify(square, 0.001), *square);
        assert_eq!(simplify(square, 0.0), *square);
    }

    #[test]
    fn overlap_uses_bounding_boxes() {
        let land = LandPolygons::from_geojson_str(SQUARE_WITH_NOISE).unwrap();
        let europe = ZoomBounds {
            west: -25.0,
            south: 34.0,
            east: 45.0,
            north: 72.0,
        };
        assert!(land.rings()[0].overlaps(&ZoomBounds::WORLD));
        assert!(!land.rings()[0].overlaps(&europe));
        assert!(!land.rings()[1].overlaps(&europe));
    }
}
