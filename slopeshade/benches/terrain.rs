use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{ImageBuffer, ImageFormat, Rgb};
use tempfile::TempDir;

use slopeshade::render::{render_slope, render_slope_aspect};
use slopeshade::source::tile_path;
use slopeshade::{
    BoundingBox, CancelToken, DirTileSource, ElevationTile, FixedSun, ShadowLayerGenerator,
    SunPosition, TerrainService, TileId,
};

/// Synthetic Terrarium PNG: a ridge running north-south through the tile.
fn ridge_png() -> Vec<u8> {
    let img = ImageBuffer::from_fn(256, 256, |col, _row| {
        let elevation = 2500.0 - (col as f64 - 128.0).abs() * 12.0;
        let v = ((elevation + 32768.0) * 256.0) as u32;
        Rgb([(v >> 16) as u8, (v >> 8) as u8, v as u8])
    });
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Write the same tile for every id around `bounds`.
fn create_mirror(dir: &std::path::Path, bounds: &BoundingBox, zoom: u8) {
    let png = ridge_png();
    for id in bounds.expand(0.05).tile_range(zoom, 1) {
        let path = tile_path(dir, id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, &png).unwrap();
    }
}

fn bench_decode(c: &mut Criterion) {
    let png = ridge_png();
    let id = TileId::new(13, 4362, 2866);

    c.bench_function("decode_terrarium_png", |b| {
        b.iter(|| black_box(ElevationTile::from_png(id, black_box(&png)).unwrap()));
    });
}

fn bench_render_tiles(c: &mut Criterion) {
    let tile = ElevationTile::from_png(TileId::new(13, 4362, 2866), &ridge_png()).unwrap();

    c.bench_function("render_slope_tile", |b| {
        b.iter(|| black_box(render_slope(black_box(&tile))));
    });

    c.bench_function("render_slope_aspect_tile", |b| {
        b.iter(|| black_box(render_slope_aspect(black_box(&tile))));
    });
}

fn bench_shadow_layer(c: &mut Criterion) {
    let bounds = BoundingBox::new(47.46, 47.42, 11.74, 11.66);
    let zoom = 12;
    let tmp = TempDir::new().unwrap();
    create_mirror(tmp.path(), &bounds, zoom);

    let service = TerrainService::new(DirTileSource::new(tmp.path()));
    let sun = FixedSun(SunPosition::from_degrees(120.0, 15.0));
    let generator = ShadowLayerGenerator::new(&service, &sun);
    let at = chrono::Utc::now();

    // Warm the cache
    generator
        .generate(&bounds, zoom, at, 64, &CancelToken::new())
        .unwrap();

    c.bench_function("shadow_layer_64_cached", |b| {
        b.iter(|| {
            black_box(
                generator
                    .generate(black_box(&bounds), zoom, at, 64, &CancelToken::new())
                    .unwrap(),
            );
        });
    });
}

criterion_group!(benches, bench_decode, bench_render_tiles, bench_shadow_layer);
criterion_main!(benches);
