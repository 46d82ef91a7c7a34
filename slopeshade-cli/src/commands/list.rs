use anyhow::{Context, Result};
use slopeshade::TileId;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::format_size;

pub fn run(tile_dir: Option<PathBuf>, zoom: Option<u8>) -> Result<()> {
    let dir = tile_dir.context(
        "SLOPESHADE_TILE_DIR environment variable not set. Use --tile-dir or set SLOPESHADE_TILE_DIR",
    )?;

    if !dir.exists() {
        anyhow::bail!("Tile directory does not exist: {}", dir.display());
    }

    let tiles = scan_mirror(&dir, zoom)?;
    if tiles.is_empty() {
        println!("No tiles found in: {}", dir.display());
        return Ok(());
    }

    println!("{:<18} {:>10} {:>28}", "TILE", "SIZE", "CENTER");
    println!("{}", "-".repeat(58));

    let mut per_zoom: BTreeMap<u8, usize> = BTreeMap::new();
    let mut total_size: u64 = 0;
    for (id, size) in &tiles {
        total_size += size;
        *per_zoom.entry(id.z).or_default() += 1;
        let (lat, lon) = id.center();
        println!(
            "{:<18} {:>10} {:>28}",
            id.to_string(),
            format_size(*size),
            format!("{:.4}, {:.4}", lat, lon)
        );
    }

    // Summary
    println!();
    println!("Summary:");
    println!("  Total tiles: {}", tiles.len());
    for (z, count) in &per_zoom {
        println!("  Zoom {}: {}", z, count);
    }
    println!("  Total size: {}", format_size(total_size));
    println!("  Tile directory: {}", dir.display());

    Ok(())
}

/// Tiles stored as `{z}/{x}/{y}.png` under `root`, sorted, with file sizes.
///
/// Entries that do not parse as a valid tile address are skipped.
fn scan_mirror(root: &Path, zoom: Option<u8>) -> Result<Vec<(TileId, u64)>> {
    let mut tiles = Vec::new();

    for z_entry in read_dirs(root)? {
        let Some(z) = file_name(&z_entry).and_then(|s| s.parse::<u8>().ok()) else {
            continue;
        };
        if zoom.is_some_and(|wanted| wanted != z) {
            continue;
        }

        for x_entry in read_dirs(&z_entry)? {
            let Some(x) = file_name(&x_entry) else {
                continue;
            };

            for entry in fs::read_dir(&x_entry).context("Failed to read tile directory")? {
                let path = entry?.path();
                if path.extension().map_or(true, |e| e != "png") {
                    continue;
                }
                let Some(y) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if let Ok(id) = format!("{}/{}/{}", z, x, y).parse::<TileId>() {
                    let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                    tiles.push((id, size));
                }
            }
        }
    }

    tiles.sort_by_key(|(id, _)| *id);
    Ok(tiles)
}

fn read_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    Ok(dirs)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"png").unwrap();
    }

    #[test]
    fn test_scan_mirror() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "11/1090/716.png");
        touch(temp_dir.path(), "11/1090/715.png");
        touch(temp_dir.path(), "12/2180/1432.png");
        // Not tiles
        touch(temp_dir.path(), "11/1090/notes.txt");
        touch(temp_dir.path(), "11/5000/1.png");
        touch(temp_dir.path(), "cache/1/2.png");

        let tiles = scan_mirror(temp_dir.path(), None).unwrap();
        let ids: Vec<TileId> = tiles.iter().map(|(id, _)| *id).collect();
        assert_eq!(
            ids,
            vec![
                TileId::new(11, 1090, 715),
                TileId::new(11, 1090, 716),
                TileId::new(12, 2180, 1432),
            ]
        );
        assert!(tiles.iter().all(|(_, size)| *size == 3));

        let z12 = scan_mirror(temp_dir.path(), Some(12)).unwrap();
        assert_eq!(z12.len(), 1);
    }
}
