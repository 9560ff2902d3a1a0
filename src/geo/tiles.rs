//! Web-mercator (slippy map) tile math

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::bbox::BoundingBox;
use crate::errors::{ExploreError, ExploreResult};

/// Highest latitude representable in web mercator
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_779_806_59;

/// Tile coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl Tile {
    /// Parses a `z/x/y` key
    pub fn parse(key: &str) -> ExploreResult<Self> {
        let invalid = || ExploreError::invalid_parameter(format!("Invalid tile key '{}'", key));
        let mut parts = key.trim().split('/');
        let z: u8 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        let x: u32 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        let y: u32 = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        if parts.next().is_some() || z > 29 {
            return Err(invalid());
        }
        let n = 1u64 << z;
        if u64::from(x) >= n || u64::from(y) >= n {
            return Err(invalid());
        }
        Ok(Self { x, y, z })
    }

    pub fn bbox(&self) -> BoundingBox {
        tile_to_bbox(self.x, self.y, self.z)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

fn tile_lon(x: f64, n: f64) -> f64 {
    x / n * 360.0 - 180.0
}

fn tile_lat(y: f64, n: f64) -> f64 {
    (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees()
}

/// Bounding box of tile `x/y` at zoom `z`
pub fn tile_to_bbox(x: u32, y: u32, z: u8) -> BoundingBox {
    let n = 2f64.powi(i32::from(z));
    let x = f64::from(x);
    let y = f64::from(y);
    BoundingBox::new(
        tile_lon(x, n),
        tile_lat(y + 1.0, n),
        tile_lon(x + 1.0, n),
        tile_lat(y, n),
    )
}

/// Tile containing `(lat, lon)` at zoom `z`
pub fn bbox_to_tile(lat: f64, lon: f64, z: u8) -> Tile {
    let n = 2f64.powi(i32::from(z));
    let max_index = (n - 1.0).max(0.0);
    let lat = lat.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
    let lat_rad = lat.to_radians();

    let x = ((lon + 180.0) / 360.0 * n).floor().clamp(0.0, max_index);
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n)
        .floor()
        .clamp(0.0, max_index);

    Tile {
        x: x as u32,
        y: y as u32,
        z,
    }
}
