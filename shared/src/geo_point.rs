/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const NUM_COORDINATE_BITS: u32 = 30;
const COORDINATE_MASK: u64 = (1u64 << NUM_COORDINATE_BITS) - 1;
const MAX_COORDINATE_ENCODED: f64 = COORDINATE_MASK as f64;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateOutOfRange {
    #[error("latitude {0} is outside of [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} is outside of [-180, 180]")]
    Longitude(f64),
}

/// A WGS84 point that fits into the 60-bit payload of an `Id`.
///
/// Latitude and longitude are each quantised to 30 bits, which keeps
/// a precision of roughly two centimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeoPoint {
    lat_bits: u32,
    lng_bits: u32,
}

fn encode(value: f64, range: f64) -> u32 {
    (((value + range) / (2.0 * range)) * MAX_COORDINATE_ENCODED).round() as u32
}

fn decode(bits: u32, range: f64) -> f64 {
    (bits as f64 / MAX_COORDINATE_ENCODED) * 2.0 * range - range
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<GeoPoint, CoordinateOutOfRange> {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(CoordinateOutOfRange::Latitude(lat));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(CoordinateOutOfRange::Longitude(lng));
        }
        Ok(GeoPoint {
            lat_bits: encode(lat, 90.0),
            lng_bits: encode(lng, 180.0),
        })
    }

    pub fn lat(&self) -> f64 {
        decode(self.lat_bits, 90.0)
    }

    pub fn lng(&self) -> f64 {
        decode(self.lng_bits, 180.0)
    }

    pub fn to_bit_representation(&self) -> u64 {
        ((self.lat_bits as u64) << NUM_COORDINATE_BITS) | self.lng_bits as u64
    }

    pub fn from_bit_representation(bits: u64) -> GeoPoint {
        GeoPoint {
            lat_bits: ((bits >> NUM_COORDINATE_BITS) & COORDINATE_MASK) as u32,
            lng_bits: (bits & COORDINATE_MASK) as u32,
        }
    }

    /// Parses `POINT(lng lat)`, optionally wrapped as a typed literal.
    pub fn parse_wkt_point(literal: &str) -> Option<GeoPoint> {
        let body = strip_literal_quotes(literal).trim();
        let upper = body.get(..5)?;
        if !upper.eq_ignore_ascii_case("POINT") {
            return None;
        }
        let inner = body[5..].trim().strip_prefix('(')?.strip_suffix(')')?;
        let mut coordinates = inner.split_whitespace();
        let lng = coordinates.next()?.parse::<f64>().ok()?;
        let lat = coordinates.next()?.parse::<f64>().ok()?;
        if coordinates.next().is_some() {
            return None;
        }
        GeoPoint::new(lat, lng).ok()
    }
}

/// Returns the lexical form of `"..."^^<...>` literals and the input otherwise.
pub fn strip_literal_quotes(literal: &str) -> &str {
    if let Some(rest) = literal.strip_prefix('"') {
        if let Some(end) = rest.rfind('"') {
            return &rest[..end];
        }
    }
    literal
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "POINT({} {})", self.lng(), self.lat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_representation_round_trip() {
        let point = GeoPoint::new(48.0, 7.85).unwrap();
        let restored = GeoPoint::from_bit_representation(point.to_bit_representation());
        assert_eq!(point, restored);
        assert!((restored.lat() - 48.0).abs() < 1e-6);
        assert!((restored.lng() - 7.85).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(GeoPoint::new(91.0, 0.0), Err(CoordinateOutOfRange::Latitude(91.0)));
        assert_eq!(GeoPoint::new(0.0, -181.0), Err(CoordinateOutOfRange::Longitude(-181.0)));
    }

    #[test]
    fn test_parse_wkt_point() {
        let point = GeoPoint::parse_wkt_point(
            "\"POINT(7.85 48.0)\"^^<http://www.opengis.net/ont/geosparql#wktLiteral>",
        )
        .unwrap();
        assert!((point.lat() - 48.0).abs() < 1e-6);
        assert!(GeoPoint::parse_wkt_point("LINESTRING(0 0, 1 1)").is_none());
        assert!(GeoPoint::parse_wkt_point("POINT(1 2 3)").is_none());
    }
}
