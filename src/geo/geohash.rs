//! Geohash cell encoding and decoding

use super::bbox::BoundingBox;
use crate::errors::{ExploreError, ExploreResult};

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Longest geohash the engine accepts
pub const MAX_GEOHASH_PRECISION: usize = 12;

fn char_index(c: u8) -> Option<u8> {
    BASE32.iter().position(|&b| b == c).map(|i| i as u8)
}

/// Decodes a geohash into its cell bounding box
pub fn geohash_to_bbox(hash: &str) -> ExploreResult<BoundingBox> {
    if hash.is_empty() || hash.len() > MAX_GEOHASH_PRECISION {
        return Err(ExploreError::invalid_parameter(format!(
            "Invalid geohash '{}'",
            hash
        )));
    }

    let (mut west, mut east) = (-180.0_f64, 180.0_f64);
    let (mut south, mut north) = (-90.0_f64, 90.0_f64);
    let mut even = true;

    for c in hash.bytes() {
        let bits = char_index(c.to_ascii_lowercase()).ok_or_else(|| {
            ExploreError::invalid_parameter(format!("Invalid geohash '{}'", hash))
        })?;
        for shift in (0..5).rev() {
            let bit = (bits >> shift) & 1 == 1;
            if even {
                let mid = (west + east) / 2.0;
                if bit {
                    west = mid;
                } else {
                    east = mid;
                }
            } else {
                let mid = (south + north) / 2.0;
                if bit {
                    south = mid;
                } else {
                    north = mid;
                }
            }
            even = !even;
        }
    }

    Ok(BoundingBox::new(west, south, east, north))
}

/// Encodes a position as a geohash of `precision` characters
pub fn encode_geohash(lat: f64, lon: f64, precision: usize) -> String {
    let precision = precision.clamp(1, MAX_GEOHASH_PRECISION);
    let (mut west, mut east) = (-180.0_f64, 180.0_f64);
    let (mut south, mut north) = (-90.0_f64, 90.0_f64);
    let mut even = true;
    let mut hash = String::with_capacity(precision);
    let mut bits = 0u8;
    let mut count = 0;

    while hash.len() < precision {
        bits <<= 1;
        if even {
            let mid = (west + east) / 2.0;
            if lon >= mid {
                bits |= 1;
                west = mid;
            } else {
                east = mid;
            }
        } else {
            let mid = (south + north) / 2.0;
            if lat >= mid {
                bits |= 1;
                south = mid;
            } else {
                north = mid;
            }
        }
        even = !even;
        count += 1;
        if count == 5 {
            hash.push(BASE32[bits as usize] as char);
            bits = 0;
            count = 0;
        }
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_u09t() {
        let bbox = geohash_to_bbox("u09t").unwrap();
        assert!((bbox.west - 2.109375).abs() < 1e-9);
        assert!((bbox.east - 2.4609375).abs() < 1e-9);
        assert!((bbox.south - 48.69140625).abs() < 1e-9);
        assert!((bbox.north - 48.8671875).abs() < 1e-9);

        let c = bbox.centroid();
        assert!(bbox.strictly_contains(c.y(), c.x()));
    }

    #[test]
    fn test_encode_matches_decode() {
        let hash = encode_geohash(48.8566, 2.3522, 4);
        assert_eq!(hash, "u09t");
        let bbox = geohash_to_bbox(&hash).unwrap();
        assert!(bbox.contains(48.8566, 2.3522));
    }

    #[test]
    fn test_invalid_hashes() {
        assert!(geohash_to_bbox("").is_err());
        assert!(geohash_to_bbox("u09a").is_err());
        assert!(geohash_to_bbox("u09tu09tu09tu").is_err());
    }

    #[test]
    fn test_single_char_cells() {
        let bbox = geohash_to_bbox("s").unwrap();
        assert_eq!(bbox.west, 0.0);
        assert_eq!(bbox.east, 45.0);
        assert_eq!(bbox.south, 0.0);
        assert_eq!(bbox.north, 45.0);
    }
}
