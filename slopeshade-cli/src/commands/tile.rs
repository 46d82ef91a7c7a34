use anyhow::{Context, Result};
use slopeshade::LayerRegistry;
use std::path::PathBuf;

use super::{format_size, parse_tile_id, SourceOptions};

pub fn run(source: &SourceOptions, layer: &str, tile: &str, output: PathBuf) -> Result<()> {
    let id = parse_tile_id(tile)?;
    let service = source.build_service()?;
    let registry = LayerRegistry::with_defaults();

    if registry.get(layer).is_none() {
        anyhow::bail!(
            "Unknown layer '{}'. Available: {}",
            layer,
            registry.names().join(", ")
        );
    }

    let png = registry
        .render_tile(&service, layer, id)
        .with_context(|| format!("Failed to render {} tile {}", layer, id))?;
    std::fs::write(&output, &png)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "{} tile {} written to: {} ({})",
        layer,
        id,
        output.display(),
        format_size(png.len() as u64)
    );
    Ok(())
}
