//! Geohash encoding and the spherical geometry the radius search needs
//!
//! Cells are addressed by base-32 strings. Bits alternate starting with
//! longitude, five bits per character.

use std::collections::{HashSet, VecDeque};
use crate::{Error, Result};

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

pub const PRECISION_156KM: usize = 3;
pub const PRECISION_40KM: usize = 4;
pub const PRECISION_4KM: usize = 5;
pub const PRECISION_1KM: usize = 6;
pub const PRECISION_150M: usize = 7;

pub const MAX_PRECISION: usize = 12;

/// Mean earth radius used by [`distance`]
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Latitude/longitude rectangle covered by a cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    #[inline]
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    #[inline]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max_lon - self.min_lon
    }
}

fn check_coordinates(lat: f64, lon: f64) -> Result<()> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(Error::encoding("geo", format!("latitude {} out of range", lat)));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(Error::encoding("geo", format!("longitude {} out of range", lon)));
    }
    Ok(())
}

fn interleave(lat: f64, lon: f64, bits: u32) -> u64 {
    let (mut lat_lo, mut lat_hi) = (-90.0, 90.0);
    let (mut lon_lo, mut lon_hi) = (-180.0, 180.0);
    let mut out = 0u64;

    for i in 0..bits {
        out <<= 1;
        if i % 2 == 0 {
            let mid = (lon_lo + lon_hi) / 2.0;
            if lon >= mid {
                out |= 1;
                lon_lo = mid;
            } else {
                lon_hi = mid;
            }
        } else {
            let mid = (lat_lo + lat_hi) / 2.0;
            if lat >= mid {
                out |= 1;
                lat_lo = mid;
            } else {
                lat_hi = mid;
            }
        }
    }
    out
}

/// Base-32 geohash of `precision` characters
pub fn encode(lat: f64, lon: f64, precision: usize) -> Result<String> {
    if !(1..=MAX_PRECISION).contains(&precision) {
        return Err(Error::encoding("geo", format!("invalid precision {}", precision)));
    }
    check_coordinates(lat, lon)?;

    let bits = (precision * 5) as u32;
    let hash = interleave(lat, lon, bits);
    let mut out = String::with_capacity(precision);
    for i in (0..precision).rev() {
        let idx = ((hash >> (i * 5)) & 0x1F) as usize;
        out.push(BASE32[idx] as char);
    }
    Ok(out)
}

/// Right-aligned integer geohash of `bits` bits (at most 64)
pub fn encode_bits(lat: f64, lon: f64, bits: u32) -> Result<u64> {
    if bits == 0 || bits > 64 {
        return Err(Error::encoding("geo", format!("invalid bit count {}", bits)));
    }
    check_coordinates(lat, lon)?;
    Ok(interleave(lat, lon, bits))
}

/// Bounding box of a cell
pub fn decode_bbox(hash: &str) -> Result<BoundingBox> {
    if hash.is_empty() {
        return Err(Error::encoding("geo", "empty geohash"));
    }

    let (mut lat_lo, mut lat_hi) = (-90.0, 90.0);
    let (mut lon_lo, mut lon_hi) = (-180.0, 180.0);
    let mut even = true;

    for c in hash.bytes() {
        let idx = BASE32
            .iter()
            .position(|&b| b == c)
            .ok_or_else(|| Error::encoding("geo", format!("invalid geohash character '{}'", c as char)))?;

        for shift in (0..5).rev() {
            let bit = (idx >> shift) & 1 == 1;
            if even {
                let mid = (lon_lo + lon_hi) / 2.0;
                if bit {
                    lon_lo = mid;
                } else {
                    lon_hi = mid;
                }
            } else {
                let mid = (lat_lo + lat_hi) / 2.0;
                if bit {
                    lat_lo = mid;
                } else {
                    lat_hi = mid;
                }
            }
            even = !even;
        }
    }

    Ok(BoundingBox {
        min_lat: lat_lo,
        max_lat: lat_hi,
        min_lon: lon_lo,
        max_lon: lon_hi,
    })
}

/// The up to eight cells around `hash` at the same precision. Longitude
/// wraps around the antimeridian; cells past a pole are left out.
pub fn neighbors(hash: &str) -> Result<Vec<String>> {
    let bbox = decode_bbox(hash)?;
    let (lat, lon) = bbox.center();
    let (dlat, dlon) = (bbox.height(), bbox.width());

    let mut out = Vec::with_capacity(8);
    for i in [-1.0, 0.0, 1.0] {
        for j in [-1.0, 0.0, 1.0] {
            if i == 0.0 && j == 0.0 {
                continue;
            }
            let nlat = lat + i * dlat;
            if !(-90.0..=90.0).contains(&nlat) {
                continue;
            }
            let mut nlon = lon + j * dlon;
            if nlon > 180.0 {
                nlon -= 360.0;
            } else if nlon < -180.0 {
                nlon += 360.0;
            }
            let cell = encode(nlat, nlon, hash.len())?;
            if cell != hash && !out.contains(&cell) {
                out.push(cell);
            }
        }
    }
    Ok(out)
}

/// Great-circle distance in meters (haversine)
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (p1, p2) = (lat1.to_radians(), lat2.to_radians());
    let dp = p2 - p1;
    let dl = (lon2 - lon1).to_radians();

    let a = (dp / 2.0).sin().powi(2) + p1.cos() * p2.cos() * (dl / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
}

/// Shortest distance in meters from a point to any point of `bbox`; zero
/// when the point is inside.
pub fn min_distance_to_box(lat: f64, lon: f64, bbox: &BoundingBox) -> f64 {
    if bbox.contains(lat, lon) {
        return 0.0;
    }

    let mut best = f64::INFINITY;

    // meridian edges: the closest point on a meridian lies at the foot of the
    // perpendicular great circle, clamped into the edge
    let phi = lat.to_radians();
    for edge_lon in [bbox.min_lon, bbox.max_lon] {
        let dl = (lon - edge_lon).to_radians();
        let foot = phi.sin().atan2(phi.cos() * dl.cos()).to_degrees();
        let clamped = foot.clamp(bbox.min_lat, bbox.max_lat);
        best = best.min(distance(lat, lon, clamped, edge_lon));
        best = best.min(distance(lat, lon, bbox.min_lat, edge_lon));
        best = best.min(distance(lat, lon, bbox.max_lat, edge_lon));
    }

    // parallel edges: closest at the point's own longitude when it is in range
    if lon >= bbox.min_lon && lon <= bbox.max_lon {
        for edge_lat in [bbox.min_lat, bbox.max_lat] {
            best = best.min(distance(lat, lon, edge_lat, lon));
        }
    }

    best
}

/// Every cell at `precision` that intersects the circle of `radius_m` meters
/// around the point, found by a breadth-first walk from the centre cell.
pub fn cells_within(lat: f64, lon: f64, radius_m: f64, precision: usize) -> Result<Vec<String>> {
    if !radius_m.is_finite() || radius_m < 0.0 {
        return Err(Error::encoding("geo", format!("invalid radius {}", radius_m)));
    }

    let start = encode(lat, lon, precision)?;
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue = VecDeque::new();
    let mut cells = Vec::new();

    visited.insert(start.clone());
    queue.push_back(start);

    while let Some(cell) = queue.pop_front() {
        for n in neighbors(&cell)? {
            if visited.contains(&n) {
                continue;
            }
            visited.insert(n.clone());
            let bbox = decode_bbox(&n)?;
            if min_distance_to_box(lat, lon, &bbox) <= radius_m {
                queue.push_back(n);
            }
        }
        cells.push(cell);
    }

    Ok(cells)
}
