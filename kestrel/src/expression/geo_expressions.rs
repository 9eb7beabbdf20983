/*
 * Copyright © 2024 Volodymyr Kadzhaia
 * Copyright © 2024 Pieter Bonte
 * KU Leuven — Stream Intelligence Lab, Belgium
 *
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this file,
 * you can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::*;
use crate::vocabulary::geometry_info::GeometryInfo;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance between two points in metres.
pub fn haversine_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat().to_radians();
    let lat2 = b.lat().to_radians();
    let delta_lat = (b.lat() - a.lat()).to_radians();
    let delta_lng = (b.lng() - a.lng()).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
    EARTH_RADIUS_METERS * 2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

// The geometry info of a WKT literal that is not a plain point.
fn geometry_info(value: &ExpressionValue) -> Option<GeometryInfo> {
    match value {
        ExpressionValue::Literal {
            value,
            datatype: Some(datatype),
            ..
        } if datatype == GEO_WKT_LITERAL => GeometryInfo::from_wkt_literal(value),
        _ => None,
    }
}

// Points stand for themselves, other geometries for their centroid.
fn representative_point(value: &ExpressionValue) -> Option<GeoPoint> {
    match value {
        ExpressionValue::GeoPoint(point) => Some(*point),
        other => geometry_info(other).map(|info| info.centroid()),
    }
}

pub fn make_latitude_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("latitude", vec![child], |args| match &args[0] {
        ExpressionValue::GeoPoint(point) => ExpressionValue::Double(point.lat()),
        _ => ExpressionValue::Undefined,
    })
}

pub fn make_longitude_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("longitude", vec![child], |args| match &args[0] {
        ExpressionValue::GeoPoint(point) => ExpressionValue::Double(point.lng()),
        _ => ExpressionValue::Undefined,
    })
}

/// Distance in kilometres.
pub fn make_dist_expression(a: Box<dyn SparqlExpression>, b: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("dist", vec![a, b], |args| {
        match (representative_point(&args[0]), representative_point(&args[1])) {
            (Some(a), Some(b)) => ExpressionValue::Double(haversine_distance(&a, &b) / 1000.0),
            _ => ExpressionValue::Undefined,
        }
    })
}

/// Distance in metres.
pub fn make_metric_dist_expression(a: Box<dyn SparqlExpression>, b: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("metricDist", vec![a, b], |args| {
        match (representative_point(&args[0]), representative_point(&args[1])) {
            (Some(a), Some(b)) => ExpressionValue::Double(haversine_distance(&a, &b)),
            _ => ExpressionValue::Undefined,
        }
    })
}

pub fn make_centroid_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("centroid", vec![child], |args| {
        representative_point(&args[0]).map_or(ExpressionValue::Undefined, ExpressionValue::GeoPoint)
    })
}

/// Geodesic area in square metres. Undefined for malformed polygons.
pub fn make_metric_area_expression(child: Box<dyn SparqlExpression>) -> Box<dyn SparqlExpression> {
    nary("metricArea", vec![child], |args| match &args[0] {
        ExpressionValue::GeoPoint(_) => ExpressionValue::Double(0.0),
        other => match geometry_info(other).map(|info| info.metric_area()) {
            Some(area) if area.is_valid() => ExpressionValue::Double(area.square_metres()),
            _ => ExpressionValue::Undefined,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::*;
    use super::*;

    fn point(wkt: &str) -> TripleComponent {
        TripleComponent::typed_literal(wkt, GEO_WKT_LITERAL)
    }

    #[test]
    fn test_coordinates() {
        let latitude = make_latitude_expression(var("?p"));
        let value = evaluate_with(latitude.as_ref(), &[("?p", point("POINT(7.8 48.0)"))]);
        let ExpressionValue::Double(lat) = value else {
            panic!("expected a latitude, got {:?}", value);
        };
        assert!((lat - 48.0).abs() < 1e-6);
        assert!(evaluate_with(latitude.as_ref(), &[("?p", TripleComponent::Int(1))]).is_undefined());
    }

    #[test]
    fn test_distance() {
        let dist = make_dist_expression(var("?a"), var("?b"));
        let value = evaluate_with(
            dist.as_ref(),
            &[("?a", point("POINT(0 0)")), ("?b", point("POINT(0 1)"))],
        );
        let ExpressionValue::Double(km) = value else {
            panic!("expected a distance, got {:?}", value);
        };
        assert!((km - 111.19).abs() < 0.1, "{}", km);
    }

    #[test]
    fn test_centroid_of_polygon() {
        let centroid = make_centroid_expression(var("?g"));
        let value = evaluate_with(
            centroid.as_ref(),
            &[("?g", point("POLYGON((0 0, 2 0, 2 2, 0 2, 0 0))"))],
        );
        let ExpressionValue::GeoPoint(p) = value else {
            panic!("expected a point, got {:?}", value);
        };
        assert!((p.lat() - 1.0).abs() < 1e-6 && (p.lng() - 1.0).abs() < 1e-6);
    }
}
