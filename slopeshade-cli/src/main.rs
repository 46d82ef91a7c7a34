use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

use commands::SourceOptions;

/// Slope, aspect and terrain shadow tool for Terrarium elevation tiles
#[derive(Parser)]
#[command(name = "slopeshade")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Local Terrarium mirror laid out as z/x/y.png
    #[arg(short = 'd', long, env = "SLOPESHADE_TILE_DIR", global = true)]
    tile_dir: Option<PathBuf>,

    /// Tile URL template with {z}, {x} and {y} placeholders
    #[arg(short = 'u', long, env = "SLOPESHADE_TILE_URL", global = true)]
    tile_url: Option<String>,

    /// Download missing tiles from the AWS Terrarium dataset
    #[arg(short, long, global = true)]
    auto_download: bool,

    /// Maximum tiles in cache
    #[arg(
        short,
        long,
        env = "SLOPESHADE_CACHE_SIZE",
        default_value = "512",
        global = true
    )]
    cache_size: u64,

    /// HTTP timeout in seconds
    #[arg(long, env = "SLOPESHADE_TIMEOUT_SECS", default_value = "30", global = true)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query elevation, slope and aspect for a single coordinate
    Query {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Tile zoom level (clamped to 15)
        #[arg(short, long, default_value = "13")]
        zoom: u8,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Render one raster layer tile to PNG
    Tile {
        /// Layer name (slope, slope-aspect)
        layer: String,

        /// Tile address as z/x/y
        tile: String,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Render the terrain shadow overlay for a bounding box
    Shadow {
        #[arg(long, allow_hyphen_values = true)]
        north: f64,

        #[arg(long, allow_hyphen_values = true)]
        south: f64,

        #[arg(long, allow_hyphen_values = true)]
        east: f64,

        #[arg(long, allow_hyphen_values = true)]
        west: f64,

        /// RFC 3339 timestamp (default: now)
        #[arg(short, long)]
        time: Option<DateTime<Utc>>,

        /// Tile zoom level (clamped to 15)
        #[arg(short, long, default_value = "12")]
        zoom: u8,

        /// Raster edge in pixels
        #[arg(short, long, default_value = "64")]
        resolution: u32,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Add elevation, slope and aspect to coordinates from a file
    Batch {
        /// Input file (CSV or GeoJSON)
        input: PathBuf,

        /// Output file (same format as input if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Column name for latitude (CSV only)
        #[arg(long, default_value = "lat")]
        lat_col: String,

        /// Column name for longitude (CSV only)
        #[arg(long, default_value = "lon")]
        lon_col: String,

        /// Tile zoom level (clamped to 15)
        #[arg(short, long, default_value = "13")]
        zoom: u8,
    },

    /// Slope and aspect exposure statistics of a GPX or GeoJSON track
    Route {
        /// GPX file, or GeoJSON with LineString or MultiLineString geometries
        input: PathBuf,

        /// Replace recorded elevations with elevations from the tiles
        #[arg(long)]
        dem_elevation: bool,

        /// Tile zoom level used with --dem-elevation
        #[arg(short, long, default_value = "13")]
        zoom: u8,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Display information about an elevation tile
    Info {
        /// Tile address as z/x/y
        tile: String,
    },

    /// List tiles in the local mirror
    List {
        /// Only list tiles at this zoom level
        #[arg(short, long)]
        zoom: Option<u8>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let source = SourceOptions {
        tile_dir: cli.tile_dir,
        tile_url: cli.tile_url,
        auto_download: cli.auto_download,
        cache_size: cli.cache_size,
        timeout_secs: cli.timeout_secs,
    };

    match cli.command {
        Commands::Query {
            lat,
            lon,
            zoom,
            json,
        } => commands::query::run(&source, lat, lon, zoom, json),
        Commands::Tile {
            layer,
            tile,
            output,
        } => commands::tile::run(&source, &layer, &tile, output),
        Commands::Shadow {
            north,
            south,
            east,
            west,
            time,
            zoom,
            resolution,
            output,
        } => commands::shadow::run(
            &source,
            [north, south, east, west],
            time.unwrap_or_else(Utc::now),
            zoom,
            resolution,
            output,
        ),
        Commands::Batch {
            input,
            output,
            lat_col,
            lon_col,
            zoom,
        } => commands::batch::run(&source, input, output, &lat_col, &lon_col, zoom),
        Commands::Route {
            input,
            dem_elevation,
            zoom,
            json,
        } => commands::route::run(&source, input, dem_elevation, zoom, json),
        Commands::Info { tile } => commands::info::run(&source, &tile),
        Commands::List { zoom } => commands::list::run(source.tile_dir, zoom),
    }
}
