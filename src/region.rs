use std::{
    f64::consts::PI,
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// WGS84 equatorial radius, used for geodesic ring areas.
const WGS84_RADIUS_M: f64 = 6_378_137.0;
/// Mean earth radius, used to turn a circle radius into degrees.
const MEAN_EARTH_RADIUS_M: f64 = 6_371_008.8;
/// Twice the planar ring area, in square degrees, below which a ring is a line.
const MIN_RING_AREA_DEG2: f64 = 1e-12;

static REGION_SEQUENCE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Axis-aligned box in degrees: west, south, east, north.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Geometry {
    Polygon {
        ring: Vec<Coordinates>,
    },
    Rectangle {
        south_west: Coordinates,
        north_east: Coordinates,
    },
    Circle {
        center: Coordinates,
        radius_m: f64,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("polygon needs at least 3 distinct vertices, got {0}")]
    TooFewVertices(usize),
    #[error("circle radius must be positive, got {0}")]
    NonPositiveRadius(f64),
    #[error("rectangle corners are inverted or collapsed")]
    DegenerateRectangle,
    #[error("polygon vertices are collinear and enclose no area")]
    DegenerateRing,
    #[error("coordinate out of range: lat {lat}, lng {lng}")]
    OutOfRange { lat: f64, lng: f64 },
}

impl Geometry {
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Polygon { .. } => "polygon",
            Geometry::Rectangle { .. } => "rectangle",
            Geometry::Circle { .. } => "circle",
        }
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        match self {
            Geometry::Polygon { ring } => {
                let vertices = distinct_vertices(ring);
                if vertices.len() < 3 {
                    return Err(GeometryError::TooFewVertices(vertices.len()));
                }
                vertices.iter().try_for_each(check_range)?;
                if planar_area_deg2(&vertices) < MIN_RING_AREA_DEG2 {
                    return Err(GeometryError::DegenerateRing);
                }
                Ok(())
            }
            Geometry::Rectangle {
                south_west,
                north_east,
            } => {
                check_range(south_west)?;
                check_range(north_east)?;
                if south_west.lat >= north_east.lat || south_west.lng >= north_east.lng {
                    return Err(GeometryError::DegenerateRectangle);
                }
                Ok(())
            }
            Geometry::Circle { center, radius_m } => {
                check_range(center)?;
                if !(*radius_m > 0.0) {
                    return Err(GeometryError::NonPositiveRadius(*radius_m));
                }
                Ok(())
            }
        }
    }

    /// Outline vertices without a closing duplicate. A circle yields its center.
    pub fn coordinates(&self) -> Vec<Coordinates> {
        match self {
            Geometry::Polygon { ring } => distinct_vertices(ring),
            Geometry::Rectangle {
                south_west,
                north_east,
            } => vec![
                *south_west,
                Coordinates::new(south_west.lat, north_east.lng),
                *north_east,
                Coordinates::new(north_east.lat, south_west.lng),
            ],
            Geometry::Circle { center, .. } => vec![*center],
        }
    }

    /// Point used to query point-based upstreams (weather, soil, land cover).
    pub fn query_point(&self) -> Coordinates {
        match self {
            Geometry::Circle { center, .. } => *center,
            Geometry::Polygon { .. } | Geometry::Rectangle { .. } => {
                let vertices = self.coordinates();
                let n = vertices.len().max(1) as f64;
                let (lat, lng) = vertices
                    .iter()
                    .fold((0.0, 0.0), |(lat, lng), c| (lat + c.lat, lng + c.lng));
                Coordinates::new(lat / n, lng / n)
            }
        }
    }

    pub fn bounding_box(&self) -> BoundingBox {
        match self {
            Geometry::Circle { center, radius_m } => {
                let d_lat = (radius_m / MEAN_EARTH_RADIUS_M).to_degrees();
                let d_lng = d_lat / center.lat.to_radians().cos().abs().max(1e-12);
                BoundingBox {
                    west: center.lng - d_lng,
                    south: center.lat - d_lat,
                    east: center.lng + d_lng,
                    north: center.lat + d_lat,
                }
            }
            Geometry::Polygon { .. } | Geometry::Rectangle { .. } => {
                let vertices = self.coordinates();
                vertices.iter().fold(
                    BoundingBox {
                        west: f64::INFINITY,
                        south: f64::INFINITY,
                        east: f64::NEG_INFINITY,
                        north: f64::NEG_INFINITY,
                    },
                    |bbox, c| BoundingBox {
                        west: bbox.west.min(c.lng),
                        south: bbox.south.min(c.lat),
                        east: bbox.east.max(c.lng),
                        north: bbox.north.max(c.lat),
                    },
                )
            }
        }
    }

    /// Area in square kilometres. Rings use the spherical-excess approximation.
    pub fn area_km2(&self) -> f64 {
        match self {
            Geometry::Circle { radius_m, .. } => PI * (radius_m / 1_000.0).powi(2),
            Geometry::Polygon { .. } | Geometry::Rectangle { .. } => {
                geodesic_area_m2(&self.coordinates()) / 1_000_000.0
            }
        }
    }
}

/// Ring vertices with repeated neighbours and the closing duplicate removed.
fn distinct_vertices(ring: &[Coordinates]) -> Vec<Coordinates> {
    let mut vertices = ring.to_vec();
    vertices.dedup();
    while vertices.len() > 1 && vertices.first() == vertices.last() {
        vertices.pop();
    }
    vertices
}

/// Absolute shoelace sum over raw degrees (twice the planar area).
fn planar_area_deg2(vertices: &[Coordinates]) -> f64 {
    vertices
        .iter()
        .zip(vertices.iter().cycle().skip(1))
        .map(|(a, b)| a.lng * b.lat - b.lng * a.lat)
        .sum::<f64>()
        .abs()
}

fn check_range(c: &Coordinates) -> Result<(), GeometryError> {
    if (-90.0..=90.0).contains(&c.lat) && (-180.0..=180.0).contains(&c.lng) {
        Ok(())
    } else {
        Err(GeometryError::OutOfRange {
            lat: c.lat,
            lng: c.lng,
        })
    }
}

fn geodesic_area_m2(vertices: &[Coordinates]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for (i, p1) in vertices.iter().enumerate() {
        let p2 = &vertices[(i + 1) % vertices.len()];
        area += (p2.lng - p1.lng).to_radians()
            * (2.0 + p1.lat.to_radians().sin() + p2.lat.to_radians().sin());
    }
    (area * WGS84_RADIUS_M * WGS84_RADIUS_M / 2.0).abs()
}

/// A user-selected analysis area. Replaced wholesale on every new selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub name: Option<String>,
    pub geometry: Geometry,
    pub coordinates: Vec<Coordinates>,
    pub area_km2: Option<f64>,
}

impl Region {
    pub fn new(name: Option<String>, geometry: Geometry) -> Result<Self, GeometryError> {
        geometry.validate()?;
        let seq = REGION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let id = format!("region-{}-{seq}", Utc::now().timestamp_millis());
        Ok(Self::with_id(id, name, geometry))
    }

    pub fn with_id(id: String, name: Option<String>, geometry: Geometry) -> Self {
        Self {
            id,
            name,
            coordinates: geometry.coordinates(),
            area_km2: Some(geometry.area_km2().round()),
            geometry,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Selected Region")
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn square() -> Geometry {
        Geometry::Polygon {
            ring: vec![
                Coordinates::new(0.0, 0.0),
                Coordinates::new(0.0, 1.0),
                Coordinates::new(1.0, 1.0),
                Coordinates::new(1.0, 0.0),
                Coordinates::new(0.0, 0.0),
            ],
        }
    }

    #[test]
    fn closed_ring_drops_duplicate_vertex() {
        assert_eq!(square().coordinates().len(), 4);
    }

    #[test]
    fn polygon_centroid_is_vertex_mean() {
        let point = square().query_point();
        assert_relative_eq!(point.lat, 0.5);
        assert_relative_eq!(point.lng, 0.5);
    }

    #[test]
    fn rectangle_behaves_like_its_corner_ring() {
        let rect = Geometry::Rectangle {
            south_west: Coordinates::new(0.0, 0.0),
            north_east: Coordinates::new(1.0, 1.0),
        };
        assert_eq!(rect.coordinates().len(), 4);
        assert_relative_eq!(rect.area_km2(), square().area_km2(), max_relative = 1e-12);
        assert!(rect.area_km2() > 12_000.0, "a 1x1 degree cell at the equator is ~12,300 km2");
        assert_eq!(rect.bounding_box(), square().bounding_box());
    }

    #[test]
    fn circle_area_and_box() {
        let circle = Geometry::Circle {
            center: Coordinates::new(0.0, 10.0),
            radius_m: 1_000.0,
        };
        assert_relative_eq!(circle.area_km2(), PI);
        let bbox = circle.bounding_box();
        assert!(bbox.west < 10.0 && bbox.east > 10.0);
        assert_relative_eq!(bbox.north, -bbox.south);
        assert_eq!(circle.query_point(), Coordinates::new(0.0, 10.0));
    }

    #[test]
    fn validation_rejects_degenerate_shapes() {
        let line = Geometry::Polygon {
            ring: vec![Coordinates::new(0.0, 0.0), Coordinates::new(1.0, 1.0)],
        };
        assert_eq!(line.validate(), Err(GeometryError::TooFewVertices(2)));

        let dot = Geometry::Circle {
            center: Coordinates::new(0.0, 0.0),
            radius_m: 0.0,
        };
        assert_eq!(dot.validate(), Err(GeometryError::NonPositiveRadius(0.0)));

        let flipped = Geometry::Rectangle {
            south_west: Coordinates::new(1.0, 1.0),
            north_east: Coordinates::new(0.0, 0.0),
        };
        assert_eq!(flipped.validate(), Err(GeometryError::DegenerateRectangle));
    }

    #[test]
    fn repeated_points_do_not_count_as_vertices() {
        let stacked = Geometry::Polygon {
            ring: vec![Coordinates::new(1.0, 1.0); 4],
        };
        assert_eq!(stacked.validate(), Err(GeometryError::TooFewVertices(1)));

        let stuttering = Geometry::Polygon {
            ring: vec![
                Coordinates::new(0.0, 0.0),
                Coordinates::new(0.0, 0.0),
                Coordinates::new(1.0, 1.0),
                Coordinates::new(1.0, 1.0),
                Coordinates::new(0.0, 0.0),
            ],
        };
        assert_eq!(stuttering.validate(), Err(GeometryError::TooFewVertices(2)));
    }

    #[test]
    fn collinear_ring_is_rejected() {
        let diagonal = Geometry::Polygon {
            ring: vec![
                Coordinates::new(0.0, 0.0),
                Coordinates::new(1.0, 1.0),
                Coordinates::new(2.0, 2.0),
            ],
        };
        assert_eq!(diagonal.validate(), Err(GeometryError::DegenerateRing));
        assert_eq!(
            Region::new(None, diagonal).unwrap_err(),
            GeometryError::DegenerateRing
        );
    }

    #[test]
    fn back_to_back_regions_get_distinct_ids() {
        let a = Region::new(None, square()).expect("valid square");
        let b = Region::new(None, square()).expect("valid square");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn region_ids_and_area_are_filled() {
        let region = Region::new(None, square()).expect("valid square");
        assert!(region.id.starts_with("region-"));
        assert_eq!(region.display_name(), "Selected Region");
        assert_eq!(region.coordinates.len(), 4);
        assert!(region.area_km2.unwrap_or_default() > 0.0);
    }

    #[test]
    fn geometry_tag_round_trips_through_json() {
        let json = r#"{"type":"circle","center":{"lat":1.5,"lng":2.5},"radius_m":250.0}"#;
        let geometry: Geometry = serde_json::from_str(json).expect("circle parses");
        assert_eq!(geometry.kind(), "circle");
    }
}
