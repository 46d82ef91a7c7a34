use anyhow::{Context, Result};
use slopeshade::{
    coords::meters_per_pixel,
    render::ASPECT_MIN_SLOPE,
    terrain::{slope_grid, TerrainSample},
    AspectBucket,
};

use super::{parse_tile_id, SourceOptions};

/// Lower edges of the slope classes, in degrees.
const SLOPE_CLASSES: [f64; 6] = [0.0, 27.0, 30.0, 35.0, 40.0, 45.0];

pub fn run(source: &SourceOptions, tile: &str) -> Result<()> {
    let id = parse_tile_id(tile)?;
    let service = source.build_service()?;

    let elevation = service.load_tile(id.clamped()).with_context(|| {
        format!(
            "Tile {} is not available from {}",
            id,
            service.source_description()
        )
    })?;
    let bounds = elevation.id().bounds();
    let (min_elev, max_elev) = elevation.min_max();
    let samples = slope_grid(&elevation);

    println!("Tile: {}", elevation.id());
    if elevation.id() != id {
        println!("Requested: {} (rendered from its zoom {} ancestor)", id, elevation.id().z);
    }
    println!("Source: {}", service.source_description());
    println!();
    println!(
        "Coverage: {:.4}°N to {:.4}°N, {:.4}°E to {:.4}°E",
        bounds.south, bounds.north, bounds.west, bounds.east
    );
    println!(
        "Resolution: {:.1} m/pixel",
        meters_per_pixel(elevation.id().z, elevation.id().y)
    );
    println!("Min elevation: {:.0}m", min_elev);
    println!("Max elevation: {:.0}m", max_elev);
    println!();

    println!("{:<10} {:>8}", "SLOPE", "SHARE");
    println!("{}", "-".repeat(19));
    for (label, share) in slope_histogram(&samples) {
        println!("{:<10} {:>7.1}%", label, share);
    }
    println!();

    println!("{:<10} {:>8}", "ASPECT", "SHARE");
    println!("{}", "-".repeat(19));
    let aspects = aspect_histogram(&samples);
    for bucket in AspectBucket::ALL {
        println!("{:<10} {:>7.1}%", bucket.as_str(), aspects[bucket.index()]);
    }
    println!("(pixels steeper than {}°)", ASPECT_MIN_SLOPE);

    Ok(())
}

/// Percentage of pixels in each slope class.
fn slope_histogram(samples: &[TerrainSample]) -> Vec<(String, f64)> {
    let mut counts = [0u64; SLOPE_CLASSES.len()];
    for sample in samples {
        let class = SLOPE_CLASSES
            .iter()
            .rposition(|&lower| sample.slope_degrees >= lower)
            .unwrap_or(0);
        counts[class] += 1;
    }

    let total = samples.len().max(1) as f64;
    SLOPE_CLASSES
        .iter()
        .enumerate()
        .map(|(i, &lower)| {
            let label = match SLOPE_CLASSES.get(i + 1) {
                Some(upper) => format!("{}-{}°", lower, upper),
                None => format!(">={}°", lower),
            };
            (label, counts[i] as f64 / total * 100.0)
        })
        .collect()
}

/// Percentage of steep pixels facing each aspect bucket.
fn aspect_histogram(samples: &[TerrainSample]) -> [f64; 8] {
    let mut counts = [0u64; 8];
    let mut steep = 0u64;
    for sample in samples.iter().filter(|s| s.slope_degrees >= ASPECT_MIN_SLOPE) {
        counts[sample.bucket().index()] += 1;
        steep += 1;
    }

    let mut shares = [0.0; 8];
    if steep > 0 {
        for (share, count) in shares.iter_mut().zip(counts) {
            *share = count as f64 / steep as f64 * 100.0;
        }
    }
    shares
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(slope_degrees: f64, aspect_degrees: f64) -> TerrainSample {
        TerrainSample {
            slope_degrees,
            aspect_degrees,
        }
    }

    #[test]
    fn test_slope_histogram() {
        let samples = [sample(5.0, 0.0), sample(28.0, 0.0), sample(45.0, 0.0), sample(50.0, 0.0)];
        let histogram = slope_histogram(&samples);
        assert_eq!(histogram.len(), 6);
        assert_eq!(histogram[0], ("0-27°".to_string(), 25.0));
        assert_eq!(histogram[1].1, 25.0);
        assert_eq!(histogram[5], (">=45°".to_string(), 50.0));
    }

    #[test]
    fn test_aspect_histogram_ignores_gentle_slopes() {
        let samples = [sample(10.0, 90.0), sample(30.0, 0.0), sample(35.0, 180.0)];
        let shares = aspect_histogram(&samples);
        assert_eq!(shares[AspectBucket::N.index()], 50.0);
        assert_eq!(shares[AspectBucket::S.index()], 50.0);
        assert_eq!(shares[AspectBucket::E.index()], 0.0);
    }
}
