/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Precomputed information about a WKT literal, stored as a fixed-size record.

use geo::{BoundingRect, Centroid, GeodesicArea};
use geo_types::{Geometry, Polygon};
use shared::geo_point::{strip_literal_quotes, GeoPoint};
use std::str::FromStr;

/// Incremented whenever the record layout changes.
pub const GEOMETRY_INFO_VERSION: u64 = 2;

/// Size of an encoded `GeometryInfo` in bytes.
pub const GEOMETRY_INFO_SIZE: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GeometryType {
    Point = 1,
    LineString = 2,
    Polygon = 3,
    MultiPoint = 4,
    MultiLineString = 5,
    MultiPolygon = 6,
    GeometryCollection = 7,
}

impl GeometryType {
    fn from_geometry(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::Line(_) | Geometry::LineString(_) => GeometryType::LineString,
            Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => GeometryType::Polygon,
            Geometry::MultiPoint(_) => GeometryType::MultiPoint,
            Geometry::MultiLineString(_) => GeometryType::MultiLineString,
            Geometry::MultiPolygon(_) => GeometryType::MultiPolygon,
            Geometry::GeometryCollection(_) => GeometryType::GeometryCollection,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(GeometryType::Point),
            2 => Some(GeometryType::LineString),
            3 => Some(GeometryType::Polygon),
            4 => Some(GeometryType::MultiPoint),
            5 => Some(GeometryType::MultiLineString),
            6 => Some(GeometryType::MultiPolygon),
            7 => Some(GeometryType::GeometryCollection),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lower_left: GeoPoint,
    pub upper_right: GeoPoint,
}

/// Geodesic area in square metres. Negative values mark polygons whose area
/// could not be computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricArea(f64);

impl MetricArea {
    const INVALID: MetricArea = MetricArea(-1.0);

    pub fn square_metres(&self) -> f64 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_finite() && self.0 >= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryInfo {
    geometry_type: GeometryType,
    bounding_box: BoundingBox,
    centroid: GeoPoint,
    metric_area: MetricArea,
}

fn polygon_area(polygon: &Polygon<f64>) -> Option<f64> {
    // A closed ring needs at least three distinct points plus the closing one.
    let rings_are_valid = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .all(|ring| ring.0.len() >= 4);
    if !rings_are_valid {
        return None;
    }
    let area = polygon.geodesic_area_unsigned();
    area.is_finite().then_some(area)
}

fn metric_area(geometry: &Geometry<f64>) -> Option<f64> {
    match geometry {
        Geometry::Polygon(polygon) => polygon_area(polygon),
        Geometry::MultiPolygon(polygons) => polygons.0.iter().map(polygon_area).sum(),
        Geometry::Rect(rect) => polygon_area(&rect.to_polygon()),
        Geometry::Triangle(triangle) => polygon_area(&triangle.to_polygon()),
        Geometry::GeometryCollection(collection) => collection.0.iter().map(metric_area).sum(),
        _ => Some(0.0),
    }
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut buffer = [0u8; 8];
    buffer.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(buffer)
}

impl GeometryInfo {
    /// Computes the info for a WKT literal, given either as the bare WKT or
    /// as a quoted typed literal. Returns `None` if the WKT can not be parsed
    /// or lies outside of the WGS84 coordinate range.
    pub fn from_wkt_literal(literal: &str) -> Option<GeometryInfo> {
        let wkt = wkt::Wkt::<f64>::from_str(strip_literal_quotes(literal).trim()).ok()?;
        let geometry: Geometry<f64> = wkt.try_into().ok()?;
        let rect = geometry.bounding_rect()?;
        let centroid = geometry.centroid()?;
        let bounding_box = BoundingBox {
            lower_left: GeoPoint::new(rect.min().y, rect.min().x).ok()?,
            upper_right: GeoPoint::new(rect.max().y, rect.max().x).ok()?,
        };
        Some(GeometryInfo {
            geometry_type: GeometryType::from_geometry(&geometry),
            bounding_box,
            centroid: GeoPoint::new(centroid.y(), centroid.x()).ok()?,
            metric_area: metric_area(&geometry).map_or(MetricArea::INVALID, MetricArea),
        })
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.geometry_type
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    pub fn centroid(&self) -> GeoPoint {
        self.centroid
    }

    pub fn metric_area(&self) -> MetricArea {
        self.metric_area
    }

    /// The encoded record. The geometry type is never zero, so no valid info
    /// encodes to the all-zero record that marks invalid geometries.
    pub fn to_bytes(&self) -> [u8; GEOMETRY_INFO_SIZE] {
        let mut bytes = [0u8; GEOMETRY_INFO_SIZE];
        bytes[0] = self.geometry_type as u8;
        let words = [
            self.bounding_box.lower_left.to_bit_representation(),
            self.bounding_box.upper_right.to_bit_representation(),
            self.centroid.to_bit_representation(),
            self.metric_area.0.to_bits(),
        ];
        for (i, word) in words.iter().enumerate() {
            let offset = 8 * (i + 1);
            bytes[offset..offset + 8].copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    /// Decodes a record. The all-zero record and unknown geometry types
    /// yield `None`.
    pub fn from_bytes(bytes: &[u8; GEOMETRY_INFO_SIZE]) -> Option<GeometryInfo> {
        let geometry_type = GeometryType::from_u8(bytes[0])?;
        Some(GeometryInfo {
            geometry_type,
            bounding_box: BoundingBox {
                lower_left: GeoPoint::from_bit_representation(read_u64(bytes, 8)),
                upper_right: GeoPoint::from_bit_representation(read_u64(bytes, 16)),
            },
            centroid: GeoPoint::from_bit_representation(read_u64(bytes, 24)),
            metric_area: MetricArea(f64::from_bits(read_u64(bytes, 32))),
        })
    }
}
