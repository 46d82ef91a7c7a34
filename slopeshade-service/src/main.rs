//! slopeshade service - HTTP tile server for terrain layers.
//!
//! Serves slope, slope-aspect and shadow rasters rendered from Terrarium
//! elevation tiles.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SLOPESHADE_TILE_URL` | Terrarium URL template with `{z}`, `{x}`, `{y}` | None |
//! | `SLOPESHADE_TILE_DIR` | Local tile mirror (HTTP cache dir when a URL is set) | None |
//! | `SLOPESHADE_CACHE_SIZE` | Maximum tiles in cache | 512 |
//! | `SLOPESHADE_TIMEOUT_SECS` | HTTP fetch timeout | 30 |
//! | `SLOPESHADE_PORT` | HTTP server port | 8080 |
//! | `SLOPESHADE_PRELOAD` | `north,south,east,west[,zoom]` warmed at startup | None |
//! | `RUST_LOG` | Log level (e.g., "info", "debug") | "info" |
//!
//! ## Endpoints
//!
//! - `GET /tiles/{layer}/{z}/{x}/{y}` - Rendered raster layer tile
//! - `GET /shadow?north&south&east&west&time` - Shadow overlay
//! - `GET /elevation?lat=X&lon=Y` - Terrain at coordinates
//! - `POST /elevation` - Add elevations to a GeoJSON geometry
//! - `POST /route` - Route slope and aspect statistics
//! - `GET /layers` - Registered layers
//! - `GET /health` - Health check
//! - `GET /stats` - Cache statistics
//! - `GET /docs` - OpenAPI documentation (Swagger UI)

use std::net::SocketAddr;
use std::sync::Arc;

use slopeshade::{BoundingBox, DirTileSource, TerrainServiceBuilder};
use slopeshade_service::{router, AppState};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Zoom used for `SLOPESHADE_PRELOAD` when the value has no fifth field.
const DEFAULT_PRELOAD_ZOOM: u8 = 12;

// The blocking HTTP tile client must be created outside the async runtime.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slopeshade_service=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load port from environment (service-specific config)
    let port: u16 = std::env::var("SLOPESHADE_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    // The library handles SLOPESHADE_TILE_URL, SLOPESHADE_TILE_DIR,
    // SLOPESHADE_CACHE_SIZE and SLOPESHADE_TIMEOUT_SECS
    let service = match TerrainServiceBuilder::from_env() {
        Ok(builder) => builder.build(),
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Invalid tile source configuration, using current directory"
            );
            TerrainServiceBuilder::new(DirTileSource::new(".")).build()
        }
    };

    tracing::info!(
        source = %service.source_description(),
        cache_capacity = service.cache_capacity(),
        port = port,
        "Starting slopeshade service"
    );

    if let Ok(preload_val) = std::env::var("SLOPESHADE_PRELOAD") {
        match parse_preload(&preload_val) {
            Some((bounds, zoom)) => {
                let stats = service.preload_area(&bounds, zoom);
                tracing::info!(
                    tiles_loaded = stats.tiles_loaded,
                    tiles_already_cached = stats.tiles_already_cached,
                    tiles_failed = stats.tiles_failed,
                    tiles_matched = stats.tiles_matched,
                    elapsed_ms = stats.elapsed_ms,
                    "Preload complete"
                );
            }
            None => tracing::warn!(
                value = preload_val.as_str(),
                "Invalid SLOPESHADE_PRELOAD, expected north,south,east,west[,zoom]"
            ),
        }
    }

    let state = Arc::new(AppState::new(service));

    let app = router(state).layer(
        ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        ),
    );

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(serve(app, port))
}

async fn serve(app: axum::Router, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Parse the `SLOPESHADE_PRELOAD` value.
///
/// Format: `north,south,east,west` with an optional fifth `zoom` field.
fn parse_preload(value: &str) -> Option<(BoundingBox, u8)> {
    let parts: Vec<&str> = value.trim().split(',').map(str::trim).collect();
    if parts.len() != 4 && parts.len() != 5 {
        return None;
    }

    let edges: Vec<f64> = parts[..4]
        .iter()
        .map(|s| s.parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    let zoom = match parts.get(4) {
        Some(z) => z.parse().ok()?,
        None => DEFAULT_PRELOAD_ZOOM,
    };

    let bounds = BoundingBox::new(edges[0], edges[1], edges[2], edges[3]);
    bounds.validate().ok()?;
    Some((bounds, zoom))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preload() {
        let (bounds, zoom) = parse_preload("47.5, 47.4, 11.8, 11.6").unwrap();
        assert_eq!(bounds, BoundingBox::new(47.5, 47.4, 11.8, 11.6));
        assert_eq!(zoom, DEFAULT_PRELOAD_ZOOM);

        let (_, zoom) = parse_preload("47.5,47.4,11.8,11.6,10").unwrap();
        assert_eq!(zoom, 10);
    }

    #[test]
    fn test_parse_preload_invalid() {
        assert!(parse_preload("true").is_none());
        assert!(parse_preload("47.5,47.4,11.8").is_none());
        assert!(parse_preload("47.5,47.4,11.8,abc").is_none());
        // Inverted box
        assert!(parse_preload("47.4,47.5,11.8,11.6").is_none());
    }
}
