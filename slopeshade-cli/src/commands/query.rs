use anyhow::{Context, Result};
use serde::Serialize;
use slopeshade::PointTerrain;

use super::SourceOptions;

#[derive(Serialize)]
struct QueryResponse {
    lat: f64,
    lon: f64,
    #[serde(flatten)]
    terrain: Option<PointTerrain>,
}

pub fn run(source: &SourceOptions, lat: f64, lon: f64, zoom: u8, json: bool) -> Result<()> {
    let service = source.build_service()?;

    let terrain = service.terrain_at_loading(lat, lon, zoom);

    if json {
        let response = QueryResponse { lat, lon, terrain };
        println!("{}", serde_json::to_string(&response)?);
        return Ok(());
    }

    let terrain = terrain.with_context(|| format!("No elevation data at {}, {}", lat, lon))?;
    println!("Elevation: {:.1}m", terrain.elevation);
    println!("Slope: {:.1}°", terrain.slope_degrees);
    println!(
        "Aspect: {:.0}° ({})",
        terrain.aspect_degrees, terrain.aspect
    );
    println!("Tile: {}", terrain.tile);

    Ok(())
}
