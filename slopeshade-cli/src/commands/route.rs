use anyhow::{Context, Result};
use geojson::{GeoJson, Geometry};
use slopeshade::{
    analyze_track, geojson::track_from_geometry, gpx::track_from_gpx, AspectBucket, RouteStats,
    TerrainService, TrackPoint,
};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::SourceOptions;

pub fn run(
    source: &SourceOptions,
    input: PathBuf,
    dem_elevation: bool,
    zoom: u8,
    json: bool,
) -> Result<()> {
    let mut track = read_track(&input)?;
    if dem_elevation {
        let service = source.build_service()?;
        dem_elevations(&service, &mut track, zoom).context("Failed to add elevations from tiles")?;
    }

    let stats = analyze_track(&track).with_context(|| {
        format!(
            "Track in {} has {} points, at least 2 are needed",
            input.display(),
            track.len()
        )
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(&stats);
    }
    Ok(())
}

/// Track points from a `.gpx` file, or from GeoJSON otherwise.
fn read_track(input: &Path) -> Result<Vec<TrackPoint>> {
    let file = File::open(input).context("Failed to open input file")?;
    let reader = BufReader::new(file);

    let is_gpx = input
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gpx"));
    if is_gpx {
        return track_from_gpx(reader).context("Failed to parse GPX");
    }

    let geojson: GeoJson = serde_json::from_reader(reader).context("Failed to parse GeoJSON")?;
    let mut track = Vec::new();
    for geometry in &geometries(geojson) {
        track.extend(track_from_geometry(geometry)?);
    }
    Ok(track)
}

/// Replace recorded elevations with elevations from the tiles.
fn dem_elevations(service: &TerrainService, track: &mut [TrackPoint], zoom: u8) -> Result<()> {
    for point in track.iter_mut() {
        point.ele = service
            .elevation_at_loading(point.lat, point.lon, zoom)
            .with_context(|| format!("No elevation data at {}, {}", point.lat, point.lon))?;
    }
    Ok(())
}

fn geometries(geojson: GeoJson) -> Vec<Geometry> {
    match geojson {
        GeoJson::Geometry(geometry) => vec![geometry],
        GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
        GeoJson::FeatureCollection(fc) => fc
            .features
            .into_iter()
            .filter_map(|f| f.geometry)
            .collect(),
    }
}

fn print_stats(stats: &RouteStats) {
    println!("Distance: {:.2} km", stats.distance_km);
    println!("Ascent: {}m", stats.ascent);
    println!("Descent: {}m", stats.descent);
    println!(
        "Elevation: {}m - {}m",
        stats.elevation_min, stats.elevation_max
    );
    println!("Max slope: {}°", stats.max_slope);
    println!("Avg slope: {:.1}°", stats.avg_slope);
    println!("Primary aspect: {}", stats.primary_aspect);
    println!();
    println!("{:<6} {:>10} {:>10}", "ASPECT", "STEEP %", "DESCENT %");
    println!("{}", "-".repeat(28));
    for bucket in AspectBucket::ALL {
        println!(
            "{:<6} {:>10.1} {:>10.1}",
            bucket.as_str(),
            stats.aspect_breakdown.get(&bucket).copied().unwrap_or(0.0),
            stats.descent_breakdown.get(&bucket).copied().unwrap_or(0.0)
        );
    }
}
