//! Geographic bounding boxes

use geo_types::{coord, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};

/// A rectangle in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Center of the box as a point (x = lon, y = lat)
    pub fn centroid(&self) -> Point<f64> {
        Point::new((self.west + self.east) / 2.0, (self.south + self.north) / 2.0)
    }

    /// Inclusive containment test
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south && lat <= self.north && lon >= self.west && lon <= self.east
    }

    /// Strict containment test
    pub fn strictly_contains(&self, lat: f64, lon: f64) -> bool {
        lat > self.south && lat < self.north && lon > self.west && lon < self.east
    }

    /// Closed counter-clockwise ring polygon
    pub fn to_polygon(&self) -> Polygon<f64> {
        Rect::new(
            coord! { x: self.west, y: self.south },
            coord! { x: self.east, y: self.north },
        )
        .to_polygon()
    }
}

/// Center of a bounding box
pub fn centroid(bbox: &BoundingBox) -> Point<f64> {
    bbox.centroid()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid() {
        let bbox = BoundingBox::new(-10.0, 40.0, 10.0, 50.0);
        let c = centroid(&bbox);
        assert_eq!(c.x(), 0.0);
        assert_eq!(c.y(), 45.0);
        assert!(bbox.strictly_contains(c.y(), c.x()));
    }

    #[test]
    fn test_contains_edges() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert!(bbox.contains(1.0, 0.0));
        assert!(!bbox.strictly_contains(1.0, 0.0));
        assert!(!bbox.contains(1.5, 0.5));
    }

    #[test]
    fn test_polygon_ring_is_closed() {
        let polygon = BoundingBox::new(0.0, 0.0, 2.0, 1.0).to_polygon();
        let ring: Vec<_> = polygon.exterior().coords().collect();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());
    }
}
