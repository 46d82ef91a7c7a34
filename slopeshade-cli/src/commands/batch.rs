use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use slopeshade::{geojson::add_elevations_to_geometry, TerrainService};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use super::SourceOptions;

/// Value written for coordinates without elevation data.
const VOID: &str = "void";

pub fn run(
    source: &SourceOptions,
    input: PathBuf,
    output: Option<PathBuf>,
    lat_col: &str,
    lon_col: &str,
    zoom: u8,
) -> Result<()> {
    let service = source.build_service()?;

    // Detect file format
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match extension.as_str() {
        "csv" => {
            let output_path = output.unwrap_or_else(|| derived_path(&input, "terrain", "csv"));
            let file = File::open(&input).context("Failed to open input file")?;
            let out = File::create(&output_path).context("Failed to create output file")?;
            let (reader, writer) = (BufReader::new(file), BufWriter::new(out));
            process_csv(&service, reader, writer, lat_col, lon_col, zoom)?;
            println!("Output written to: {}", output_path.display());
            Ok(())
        }
        "geojson" | "json" => {
            let output_path =
                output.unwrap_or_else(|| derived_path(&input, "elevation", "geojson"));
            process_geojson(&service, &input, &output_path, zoom)?;
            println!("Output written to: {}", output_path.display());
            Ok(())
        }
        _ => bail!(
            "Unsupported file format: {}. Use .csv or .geojson",
            extension
        ),
    }
}

/// `dir/name.csv` to `dir/name_{suffix}.{extension}`.
fn derived_path(input: &Path, suffix: &str, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_{}.{}", stem, suffix, extension))
}

fn progress_bar(total: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// Append `elevation`, `slope` and `aspect` columns to every CSV record.
fn process_csv<R: Read, W: Write>(
    service: &TerrainService,
    input: R,
    output: W,
    lat_col: &str,
    lon_col: &str,
    zoom: u8,
) -> Result<()> {
    let mut reader = csv::Reader::from_reader(input);

    // Find column indices
    let headers = reader.headers()?.clone();
    let lat_idx = headers
        .iter()
        .position(|h| h == lat_col)
        .with_context(|| format!("Column '{}' not found in CSV", lat_col))?;
    let lon_idx = headers
        .iter()
        .position(|h| h == lon_col)
        .with_context(|| format!("Column '{}' not found in CSV", lon_col))?;

    // Collect records for progress bar
    let records: Vec<_> = reader.records().collect::<Result<_, _>>()?;
    let pb = progress_bar(records.len() as u64)?;

    let mut writer = csv::Writer::from_writer(output);

    let mut new_headers: Vec<&str> = headers.iter().collect();
    new_headers.extend(["elevation", "slope", "aspect"]);
    writer.write_record(&new_headers)?;

    for record in records {
        let lat: f64 = record
            .get(lat_idx)
            .context("Missing latitude")?
            .trim()
            .parse()
            .context("Invalid latitude")?;
        let lon: f64 = record
            .get(lon_idx)
            .context("Missing longitude")?
            .trim()
            .parse()
            .context("Invalid longitude")?;

        let columns = match service.terrain_at_loading(lat, lon, zoom) {
            Some(t) => [
                format!("{:.1}", t.elevation),
                format!("{:.1}", t.slope_degrees),
                t.aspect.to_string(),
            ],
            None => [VOID.to_string(), VOID.to_string(), VOID.to_string()],
        };

        let mut new_record: Vec<&str> = record.iter().collect();
        new_record.extend(columns.iter().map(String::as_str));
        writer.write_record(&new_record)?;

        pb.inc(1);
    }

    pb.finish_with_message("done");
    writer.flush()?;
    Ok(())
}

fn process_geojson(
    service: &TerrainService,
    input: &Path,
    output_path: &Path,
    zoom: u8,
) -> Result<()> {
    let file = File::open(input).context("Failed to open input file")?;
    let reader = BufReader::new(file);

    let geojson: geojson::GeoJson =
        serde_json::from_reader(reader).context("Failed to parse GeoJSON")?;

    let enrich = |geometry: geojson::Geometry| {
        add_elevations_to_geometry(service, geometry, zoom).context("Failed to add elevations")
    };

    let result = match geojson {
        geojson::GeoJson::Geometry(geometry) => geojson::GeoJson::Geometry(enrich(geometry)?),
        geojson::GeoJson::Feature(mut feature) => {
            if let Some(geometry) = feature.geometry.take() {
                feature.geometry = Some(enrich(geometry)?);
            }
            geojson::GeoJson::Feature(feature)
        }
        geojson::GeoJson::FeatureCollection(mut fc) => {
            let pb = progress_bar(fc.features.len() as u64)?;
            for feature in &mut fc.features {
                if let Some(geometry) = feature.geometry.take() {
                    feature.geometry = Some(enrich(geometry)?);
                }
                pb.inc(1);
            }
            pb.finish_with_message("done");
            geojson::GeoJson::FeatureCollection(fc)
        }
    };

    let output_file = File::create(output_path).context("Failed to create output file")?;
    let mut writer = BufWriter::new(output_file);
    serde_json::to_writer_pretty(&mut writer, &result)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use slopeshade::{DirTileSource, TileId};
    use tempfile::TempDir;

    fn write_flat_tile(root: &Path, id: TileId, elevation: f64) {
        let v = elevation + 32768.0;
        let r = (v / 256.0).floor();
        let g = (v - r * 256.0).floor();
        let img = image::RgbImage::from_pixel(256, 256, image::Rgb([r as u8, g as u8, 0]));

        let dir = root.join(id.z.to_string()).join(id.x.to_string());
        std::fs::create_dir_all(&dir).unwrap();
        img.save(dir.join(format!("{}.png", id.y))).unwrap();
    }

    #[test]
    fn test_derived_path() {
        assert_eq!(
            derived_path(Path::new("/tmp/points.csv"), "terrain", "csv"),
            PathBuf::from("/tmp/points_terrain.csv")
        );
    }

    #[test]
    fn test_process_csv() {
        let temp_dir = TempDir::new().unwrap();
        let id = TileId::new(11, 1090, 716);
        write_flat_tile(temp_dir.path(), id, 1500.0);
        let service = TerrainService::new(DirTileSource::new(temp_dir.path()));

        let (lat, lon) = id.center();
        let input = format!("name,lat,lon\nhut,{lat},{lon}\nsea,30.0,-40.0\n");
        let mut output = Vec::new();
        process_csv(&service, input.as_bytes(), &mut output, "lat", "lon", 11).unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "name,lat,lon,elevation,slope,aspect");
        assert!(lines[1].starts_with("hut,"));
        assert!(lines[1].contains(",1500.0,0.0,"));
        assert!(lines[2].ends_with(",void,void,void"));
    }

    #[test]
    fn test_process_csv_missing_column() {
        let temp_dir = TempDir::new().unwrap();
        let service = TerrainService::new(DirTileSource::new(temp_dir.path()));

        let input = "name,latitude,lon\nhut,47.4,11.7\n";
        let result = process_csv(&service, input.as_bytes(), Vec::<u8>::new(), "lat", "lon", 11);
        assert!(result.unwrap_err().to_string().contains("'lat'"));
    }
}
