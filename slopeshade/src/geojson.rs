//! GeoJSON elevation enrichment and track extraction.
//!
//! Enable the `geojson` feature to use this module.
//!
//! # Example
//!
//! ```ignore
//! use slopeshade::geojson::add_elevations_to_geometry;
//! use geojson::Geometry;
//!
//! let geometry: Geometry = r#"{"type": "Point", "coordinates": [11.70, 47.45]}"#
//!     .parse()
//!     .unwrap();
//!
//! let enriched = add_elevations_to_geometry(&service, geometry, 13)?;
//! // Result: {"type": "Point", "coordinates": [11.70, 47.45, 1523.0]}
//! ```

use geojson::{Geometry, Value as GeoJsonValue};

use crate::error::{Result, TerrainError};
use crate::route::TrackPoint;
use crate::service::TerrainService;

/// Add elevations to all coordinates in a GeoJSON geometry.
///
/// Tiles are loaded on demand at `zoom`. Coordinates are in GeoJSON order,
/// `[longitude, latitude]` or `[longitude, latitude, altitude]`; any existing
/// altitude is replaced.
///
/// Supported geometry types:
/// - Point
/// - MultiPoint
/// - LineString
/// - MultiLineString
/// - Polygon
/// - MultiPolygon
/// - GeometryCollection
///
/// # Errors
///
/// - [`TerrainError::NoData`] if a coordinate has no elevation data
/// - [`TerrainError::InvalidCoordinate`] if a coordinate has fewer than 2 elements
pub fn add_elevations_to_geometry(
    service: &TerrainService,
    geometry: Geometry,
    zoom: u8,
) -> Result<Geometry> {
    let new_value = match geometry.value {
        GeoJsonValue::Point(coord) => {
            GeoJsonValue::Point(add_elevation_to_coord(service, &coord, zoom)?)
        }
        GeoJsonValue::MultiPoint(coords) => {
            GeoJsonValue::MultiPoint(add_elevation_to_coords(service, &coords, zoom)?)
        }
        GeoJsonValue::LineString(coords) => {
            GeoJsonValue::LineString(add_elevation_to_coords(service, &coords, zoom)?)
        }
        GeoJsonValue::MultiLineString(lines) => {
            let elevated: Result<Vec<_>> = lines
                .iter()
                .map(|line| add_elevation_to_coords(service, line, zoom))
                .collect();
            GeoJsonValue::MultiLineString(elevated?)
        }
        GeoJsonValue::Polygon(rings) => {
            let elevated: Result<Vec<_>> = rings
                .iter()
                .map(|ring| add_elevation_to_coords(service, ring, zoom))
                .collect();
            GeoJsonValue::Polygon(elevated?)
        }
        GeoJsonValue::MultiPolygon(polygons) => {
            let elevated: Result<Vec<_>> = polygons
                .iter()
                .map(|polygon| {
                    polygon
                        .iter()
                        .map(|ring| add_elevation_to_coords(service, ring, zoom))
                        .collect::<Result<Vec<_>>>()
                })
                .collect();
            GeoJsonValue::MultiPolygon(elevated?)
        }
        GeoJsonValue::GeometryCollection(geometries) => {
            let elevated: Result<Vec<_>> = geometries
                .into_iter()
                .map(|g| add_elevations_to_geometry(service, g, zoom))
                .collect();
            GeoJsonValue::GeometryCollection(elevated?)
        }
    };

    Ok(Geometry::new(new_value))
}

fn lon_lat(coord: &[f64]) -> Result<(f64, f64)> {
    if coord.len() < 2 {
        return Err(TerrainError::InvalidCoordinate {
            message: "Coordinate must have at least 2 elements (lon, lat)".to_string(),
        });
    }
    Ok((coord[0], coord[1]))
}

/// Add elevation to a single `[lon, lat, ...]` coordinate.
pub fn add_elevation_to_coord(
    service: &TerrainService,
    coord: &[f64],
    zoom: u8,
) -> Result<Vec<f64>> {
    let (lon, lat) = lon_lat(coord)?;
    let elevation = service
        .elevation_at_loading(lat, lon, zoom)
        .ok_or(TerrainError::NoData { lat, lon })?;
    Ok(vec![lon, lat, elevation])
}

/// Add elevations to a list of coordinates.
pub fn add_elevation_to_coords(
    service: &TerrainService,
    coords: &[Vec<f64>],
    zoom: u8,
) -> Result<Vec<Vec<f64>>> {
    coords
        .iter()
        .map(|coord| add_elevation_to_coord(service, coord, zoom))
        .collect()
}

/// Track points of a LineString or MultiLineString.
///
/// Coordinates without a Z value get elevation 0. Other geometry types
/// yield an empty track.
pub fn track_from_geometry(geometry: &Geometry) -> Result<Vec<TrackPoint>> {
    let to_point = |coord: &Vec<f64>| -> Result<TrackPoint> {
        let (lon, lat) = lon_lat(coord)?;
        Ok(TrackPoint::new(lat, lon, coord.get(2).copied().unwrap_or(0.0)))
    };

    match &geometry.value {
        GeoJsonValue::LineString(coords) => coords.iter().map(to_point).collect(),
        GeoJsonValue::MultiLineString(lines) => lines.iter().flatten().map(to_point).collect(),
        GeoJsonValue::GeometryCollection(geometries) => {
            let mut points = Vec::new();
            for g in geometries {
                points.extend(track_from_geometry(g)?);
            }
            Ok(points)
        }
        _ => Ok(Vec::new()),
    }
}
