//! Space-time volumes.
//!
//! Volume intersection is treated as an opaque predicate behind
//! [`VolumeIntersection`]. The bundled [`BoundingBoxIntersection`] is
//! conservative: it may report an intersection for volumes that only share a
//! bounding box, never the other way round.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metres per degree of latitude (and of longitude at the equator).
const METRES_PER_DEGREE: f64 = 111_320.0;

/// A WGS84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLngPoint {
    pub lat: f64,
    pub lng: f64,
}

impl LatLngPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A closed polygon given by its vertices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: Vec<LatLngPoint>,
}

/// A circle on the ground.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: LatLngPoint,
    pub radius_m: f64,
}

/// Horizontal footprint of a volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outline {
    Polygon(Polygon),
    Circle(Circle),
}

/// Axis-aligned lat/lng box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLngBounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
}

impl LatLngBounds {
    pub fn overlaps(&self, other: &LatLngBounds) -> bool {
        self.lat_min <= other.lat_max
            && other.lat_min <= self.lat_max
            && self.lng_min <= other.lng_max
            && other.lng_min <= self.lng_max
    }

    pub fn union(&self, other: &LatLngBounds) -> LatLngBounds {
        LatLngBounds {
            lat_min: self.lat_min.min(other.lat_min),
            lat_max: self.lat_max.max(other.lat_max),
            lng_min: self.lng_min.min(other.lng_min),
            lng_max: self.lng_max.max(other.lng_max),
        }
    }

    /// Rectangle polygon covering these bounds.
    pub fn to_polygon(&self) -> Polygon {
        Polygon {
            vertices: vec![
                LatLngPoint::new(self.lat_min, self.lng_min),
                LatLngPoint::new(self.lat_min, self.lng_max),
                LatLngPoint::new(self.lat_max, self.lng_max),
                LatLngPoint::new(self.lat_max, self.lng_min),
            ],
        }
    }
}

impl Outline {
    /// Vertex count for complexity limits. A circle counts as one.
    pub fn vertex_count(&self) -> usize {
        match self {
            Outline::Polygon(p) => p.vertices.len(),
            Outline::Circle(_) => 1,
        }
    }

    /// Bounding box. `None` for a polygon without vertices.
    pub fn bounds(&self) -> Option<LatLngBounds> {
        match self {
            Outline::Polygon(p) => {
                let first = p.vertices.first()?;
                let init = LatLngBounds {
                    lat_min: first.lat,
                    lat_max: first.lat,
                    lng_min: first.lng,
                    lng_max: first.lng,
                };
                Some(p.vertices.iter().fold(init, |b, v| LatLngBounds {
                    lat_min: b.lat_min.min(v.lat),
                    lat_max: b.lat_max.max(v.lat),
                    lng_min: b.lng_min.min(v.lng),
                    lng_max: b.lng_max.max(v.lng),
                }))
            }
            Outline::Circle(c) => {
                let dlat = c.radius_m / METRES_PER_DEGREE;
                let cos_lat = c.center.lat.to_radians().cos().abs().max(1e-6);
                let dlng = c.radius_m / (METRES_PER_DEGREE * cos_lat);
                Some(LatLngBounds {
                    lat_min: c.center.lat - dlat,
                    lat_max: c.center.lat + dlat,
                    lng_min: c.center.lng - dlng,
                    lng_max: c.center.lng + dlng,
                })
            }
        }
    }
}

/// A footprint extruded between two altitudes (metres WGS84, `None` = unbounded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume3D {
    pub outline: Outline,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude_lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude_upper: Option<f64>,
}

/// A 3-D volume active during a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume4D {
    pub volume: Volume3D,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
}

impl Volume4D {
    /// Whether the time window contains `t`.
    pub fn is_active_at(&self, t: DateTime<Utc>) -> bool {
        self.time_start <= t && t <= self.time_end
    }

    pub fn vertex_count(&self) -> usize {
        self.volume.outline.vertex_count()
    }
}

/// Total vertex count across `volumes`.
pub fn vertex_count(volumes: &[Volume4D]) -> usize {
    volumes.iter().map(Volume4D::vertex_count).sum()
}

/// Earliest start across `volumes`.
pub fn time_start(volumes: &[Volume4D]) -> Option<DateTime<Utc>> {
    volumes.iter().map(|v| v.time_start).min()
}

/// Latest end across `volumes`.
pub fn time_end(volumes: &[Volume4D]) -> Option<DateTime<Utc>> {
    volumes.iter().map(|v| v.time_end).max()
}

/// Smallest single volume (rectangle footprint) enclosing all of `volumes`.
pub fn bounding_volume(volumes: &[Volume4D]) -> Option<Volume4D> {
    let bounds = volumes
        .iter()
        .filter_map(|v| v.volume.outline.bounds())
        .reduce(|a, b| a.union(&b))?;

    let altitude_lower = volumes
        .iter()
        .map(|v| v.volume.altitude_lower)
        .try_fold(f64::INFINITY, |acc, alt| alt.map(|a| acc.min(a)));
    let altitude_upper = volumes
        .iter()
        .map(|v| v.volume.altitude_upper)
        .try_fold(f64::NEG_INFINITY, |acc, alt| alt.map(|a| acc.max(a)));

    Some(Volume4D {
        volume: Volume3D {
            outline: Outline::Polygon(bounds.to_polygon()),
            altitude_lower,
            altitude_upper,
        },
        time_start: time_start(volumes)?,
        time_end: time_end(volumes)?,
    })
}

/// Predicate deciding whether two space-time volumes intersect.
pub trait VolumeIntersection: Send + Sync {
    fn intersects(&self, a: &Volume4D, b: &Volume4D) -> bool;

    /// Whether any volume in `a` intersects any volume in `b`.
    fn any_intersect(&self, a: &[Volume4D], b: &[Volume4D]) -> bool {
        a.iter().any(|va| b.iter().any(|vb| self.intersects(va, vb)))
    }
}

/// Conservative intersection on time windows, altitude bands and bounding boxes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundingBoxIntersection;

impl VolumeIntersection for BoundingBoxIntersection {
    fn intersects(&self, a: &Volume4D, b: &Volume4D) -> bool {
        if a.time_start > b.time_end || b.time_start > a.time_end {
            return false;
        }

        let a_lower = a.volume.altitude_lower.unwrap_or(f64::NEG_INFINITY);
        let a_upper = a.volume.altitude_upper.unwrap_or(f64::INFINITY);
        let b_lower = b.volume.altitude_lower.unwrap_or(f64::NEG_INFINITY);
        let b_upper = b.volume.altitude_upper.unwrap_or(f64::INFINITY);
        if a_lower > b_upper || b_lower > a_upper {
            return false;
        }

        match (a.volume.outline.bounds(), b.volume.outline.bounds()) {
            (Some(ba), Some(bb)) => ba.overlaps(&bb),
            _ => false,
        }
    }
}
