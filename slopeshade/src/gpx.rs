//! GPX track reading.
//!
//! Enable the `gpx` feature to use this module.

use std::io::Read;

use crate::error::{Result, TerrainError};
use crate::route::TrackPoint;

/// Read every track point of a GPX document, in document order.
///
/// Points of all tracks and segments are concatenated into one track.
/// Points without an `<ele>` get elevation 0. Waypoints and routes are
/// ignored.
///
/// # Errors
///
/// [`TerrainError::InvalidTrack`] if the document is not valid GPX.
pub fn track_from_gpx(reader: impl Read) -> Result<Vec<TrackPoint>> {
    let document = ::gpx::read(reader).map_err(|e| TerrainError::InvalidTrack(e.to_string()))?;

    let points = document
        .tracks
        .iter()
        .flat_map(|track| &track.segments)
        .flat_map(|segment| &segment.points)
        .map(|waypoint| {
            let point = waypoint.point();
            TrackPoint::new(point.y(), point.x(), waypoint.elevation.unwrap_or(0.0))
        })
        .collect();
    Ok(points)
}
