//! Track statistics: distance, elevation gain, slope and aspect exposure.
//!
//! Segment aspect is derived from the direction of travel. On a climbing
//! segment the slope faces away from the direction of travel, so its aspect
//! is the travel bearing turned by 180°.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::terrain::AspectBucket;

/// Mean earth radius used for great-circle distances, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Segments at least this steep (degrees) count towards aspect exposure.
pub const EXPOSURE_MIN_SLOPE: f64 = 15.0;

/// One recorded position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lon: f64,
    /// Elevation in meters.
    pub ele: f64,
}

impl TrackPoint {
    pub fn new(lat: f64, lon: f64, ele: f64) -> Self {
        Self { lat, lon, ele }
    }
}

/// Great-circle distance in meters.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial compass bearing from `p1` to `p2`, in `[0, 360)`.
pub fn initial_bearing(p1: &TrackPoint, p2: &TrackPoint) -> f64 {
    let lat1 = p1.lat.to_radians();
    let lat2 = p2.lat.to_radians();
    let d_lambda = (p2.lon - p1.lon).to_radians();

    let y = d_lambda.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lambda.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Slope (degrees, unsigned) and slope aspect of the segment `p1 → p2`.
///
/// `distance` is the horizontal length of the segment in meters and must be
/// positive.
pub fn segment_slope_aspect(p1: &TrackPoint, p2: &TrackPoint, distance: f64) -> (f64, f64) {
    let rise = p2.ele - p1.ele;
    let slope = (rise / distance).atan().to_degrees().abs();
    let mut aspect = initial_bearing(p1, p2);
    if rise > 0.0 {
        aspect = (aspect + 180.0) % 360.0;
    }
    (slope, aspect)
}

/// Summary of a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStats {
    /// Total length in kilometers, 2 decimals.
    pub distance_km: f64,
    /// Summed elevation gain, whole meters.
    pub ascent: f64,
    /// Summed elevation loss, whole meters.
    pub descent: f64,
    pub elevation_min: f64,
    pub elevation_max: f64,
    /// Steepest segment, whole degrees.
    pub max_slope: f64,
    /// Distance-weighted mean slope, 1 decimal.
    pub avg_slope: f64,
    /// Share of steep distance (percent, 1 decimal) per aspect.
    pub aspect_breakdown: BTreeMap<AspectBucket, f64>,
    /// Same as `aspect_breakdown`, descending segments only.
    pub descent_breakdown: BTreeMap<AspectBucket, f64>,
    /// Aspect with the most steep descent, else the most steep distance.
    pub primary_aspect: AspectBucket,
}

#[derive(Default)]
struct Exposure {
    by_aspect: [f64; 8],
    total: f64,
}

impl Exposure {
    fn add(&mut self, bucket: AspectBucket, distance: f64) {
        self.by_aspect[bucket.index()] += distance;
        self.total += distance;
    }

    fn percentages(&self) -> BTreeMap<AspectBucket, f64> {
        AspectBucket::ALL
            .iter()
            .map(|&b| {
                let pct = if self.total > 0.0 {
                    round_to(self.by_aspect[b.index()] / self.total * 100.0, 1)
                } else {
                    0.0
                };
                (b, pct)
            })
            .collect()
    }

    /// First bucket, clockwise from north, with the largest positive distance.
    fn dominant(&self) -> Option<AspectBucket> {
        let mut best: Option<(AspectBucket, f64)> = None;
        for &b in &AspectBucket::ALL {
            let d = self.by_aspect[b.index()];
            if d > best.map_or(0.0, |(_, m)| m) {
                best = Some((b, d));
            }
        }
        best.map(|(b, _)| b)
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Analyze a track. Returns `None` for fewer than two points.
///
/// Zero-length segments contribute to elevation gain and loss but not to
/// slope or aspect statistics.
pub fn analyze_track(points: &[TrackPoint]) -> Option<RouteStats> {
    if points.len() < 2 {
        return None;
    }

    let mut total_distance = 0.0;
    let mut ascent = 0.0;
    let mut descent = 0.0;
    let mut elevation_min = f64::INFINITY;
    let mut elevation_max = f64::NEG_INFINITY;
    let mut max_slope: f64 = 0.0;
    let mut slope_distance = 0.0;
    let mut all = Exposure::default();
    let mut downhill = Exposure::default();

    for pair in points.windows(2) {
        let (p1, p2) = (&pair[0], &pair[1]);
        let distance = haversine_distance(p1.lat, p1.lon, p2.lat, p2.lon);
        total_distance += distance;

        let rise = p2.ele - p1.ele;
        if rise > 0.0 {
            ascent += rise;
        } else {
            descent -= rise;
        }
        elevation_min = elevation_min.min(p1.ele).min(p2.ele);
        elevation_max = elevation_max.max(p1.ele).max(p2.ele);

        if distance <= 0.0 {
            continue;
        }

        let (slope, aspect) = segment_slope_aspect(p1, p2, distance);
        max_slope = max_slope.max(slope);
        slope_distance += slope * distance;

        if slope >= EXPOSURE_MIN_SLOPE {
            let bucket = AspectBucket::from_degrees(aspect);
            all.add(bucket, distance);
            if rise < 0.0 {
                downhill.add(bucket, distance);
            }
        }
    }

    let avg_slope = if total_distance > 0.0 {
        slope_distance / total_distance
    } else {
        0.0
    };

    let primary_aspect = downhill
        .dominant()
        .or_else(|| all.dominant())
        .unwrap_or(AspectBucket::N);

    Some(RouteStats {
        distance_km: round_to(total_distance / 1000.0, 2),
        ascent: ascent.round(),
        descent: descent.round(),
        elevation_min: elevation_min.round(),
        elevation_max: elevation_max.round(),
        max_slope: max_slope.round(),
        avg_slope: round_to(avg_slope, 1),
        aspect_breakdown: all.percentages(),
        descent_breakdown: downhill.percentages(),
        primary_aspect,
    })
}
