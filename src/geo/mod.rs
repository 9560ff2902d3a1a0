//! Geospatial tile math and shape helpers
//!
//! Pure functions: no state, no I/O, safe to call concurrently.

mod bbox;
mod geohash;
mod shapes;
mod tiles;

pub use bbox::{centroid, BoundingBox};
pub use geohash::{encode_geohash, geohash_to_bbox, MAX_GEOHASH_PRECISION};
pub use shapes::{
    feature_collection, normalize_geometry, parse_shape, parse_wkt, point, to_geojson, to_wkt,
};
pub use tiles::{bbox_to_tile, tile_to_bbox, Tile, MAX_MERCATOR_LATITUDE};
