//! Basic example demonstrating slopeshade library usage.
//!
//! Run with: cargo run --example basic -- /path/to/terrarium/mirror

use slopeshade::{DirTileSource, TerrainError, TerrainService};
use std::env;

fn main() -> Result<(), TerrainError> {
    // Get mirror directory from command line
    let data_dir = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --example basic -- /path/to/terrarium/mirror");
        std::process::exit(1);
    });

    // Create service with up to 32 cached tiles
    let service = TerrainService::builder(DirTileSource::new(&data_dir))
        .cache_size(32)
        .build();

    // Query some Alpine summits at zoom 13
    let locations = [
        ("Zugspitze", 47.4211, 10.9853),
        ("Großglockner", 47.0745, 12.6941),
        ("Hochvogel", 47.3787, 10.4384),
    ];

    println!("Elevation queries (zoom 13):");
    println!("{:-<50}", "");

    for (name, lat, lon) in &locations {
        match service.elevation_at_loading(*lat, *lon, 13) {
            Some(elevation) => println!("{}: {:.1}m", name, elevation),
            None => println!("{}: tile not available locally", name),
        }
    }

    // Show cache statistics
    let stats = service.cache_stats();
    println!("\nCache statistics:");
    println!("  Cached tiles: {}", stats.entry_count);
    println!("  Fetches: {}", stats.fetch_count);
    println!("  Unavailable: {}", stats.unavailable_count);
    println!("  Hit rate: {:.1}%", stats.hit_rate() * 100.0);

    Ok(())
}
