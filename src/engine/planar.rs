//! Planar helpers on top of `geo`.
//!
//! Two frames are used:
//!
//! - raw coordinate space, where the offset engine works so that the offset
//!   distance is in input units;
//! - a local metric frame ([`LocalProjection`]) used for spatial matching,
//!   where distances are meters.

use geo::{Coord, Intersects, LineString, MapCoords};

/// Mean Earth radius, meters.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// True when any two non-adjacent segments of `line` touch.
///
/// Adjacent segments always share a vertex, so they are left to the fold
/// check in the offset engine.
pub(crate) fn self_intersects(line: &LineString<f64>) -> bool {
    let segments: Vec<_> = line.lines().collect();
    let n = segments.len();
    let closed = line.is_closed();
    for i in 0..n {
        for j in (i + 2)..n {
            // First and last segment of a closed ring share an endpoint legitimately.
            if closed && i == 0 && j == n - 1 {
                continue;
            }
            if segments[i].intersects(&segments[j]) {
                return true;
            }
        }
    }
    false
}

pub(crate) fn is_finite(c: Coord<f64>) -> bool {
    c.x.is_finite() && c.y.is_finite()
}

/// Equirectangular projection around a fixed origin, output in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LocalProjection {
    origin: Coord<f64>,
    m_per_deg_lon: f64,
    m_per_deg_lat: f64,
}

impl LocalProjection {
    pub(crate) fn new(origin: Coord<f64>) -> Self {
        let m_per_deg_lat = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        let m_per_deg_lon = m_per_deg_lat * origin.y.to_radians().cos();
        LocalProjection { origin, m_per_deg_lon, m_per_deg_lat }
    }

    pub(crate) fn project(&self, c: Coord<f64>) -> Coord<f64> {
        Coord { x: (c.x - self.origin.x) * self.m_per_deg_lon, y: (c.y - self.origin.y) * self.m_per_deg_lat }
    }

    pub(crate) fn project_line(&self, line: &LineString<f64>) -> LineString<f64> {
        line.map_coords(|c| self.project(c))
    }
}
