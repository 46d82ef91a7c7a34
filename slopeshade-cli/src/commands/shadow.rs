use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use slopeshade::{BoundingBox, CancelToken, SpaSun, ShadowLayerGenerator};
use std::path::PathBuf;

use super::SourceOptions;

pub fn run(
    source: &SourceOptions,
    [north, south, east, west]: [f64; 4],
    at: DateTime<Utc>,
    zoom: u8,
    resolution: u32,
    output: PathBuf,
) -> Result<()> {
    if resolution == 0 {
        anyhow::bail!("Resolution must be at least 1");
    }

    let bounds = BoundingBox::new(north, south, east, west);
    bounds.validate()?;

    let service = source.build_service()?;
    let generator = ShadowLayerGenerator::new(&service, &SpaSun);

    let layer = generator
        .generate(&bounds, zoom, at, resolution, &CancelToken::new())
        .context("Failed to generate shadow layer")?;

    let png = layer.to_png()?;
    std::fs::write(&output, png)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Time: {}", at.to_rfc3339());
    println!(
        "Sun: azimuth {:.1}°, altitude {:.1}°",
        layer.sun.azimuth_degrees(),
        layer.sun.altitude_degrees()
    );
    if !layer.sun.is_above_horizon() {
        println!("Sun is below the horizon, raster is fully shadowed");
    }
    println!(
        "Shadowed: {:.1}% of {}x{} pixels",
        layer.shadowed_fraction() * 100.0,
        layer.width,
        layer.height
    );
    println!("Output written to: {}", output.display());
    Ok(())
}
