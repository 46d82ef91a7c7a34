//! HTTP request handlers for the terrain service.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use geojson::Geometry;
use serde::{Deserialize, Serialize};
use slopeshade::{
    analyze_track,
    geojson::{add_elevations_to_geometry, track_from_geometry},
    gpx::track_from_gpx,
    shadow::DEFAULT_RESOLUTION,
    BoundingBox, CancelToken, ShadowLayerGenerator, TerrainError, TileId,
};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::AppState;

/// Zoom used for point queries when none is given.
pub const DEFAULT_QUERY_ZOOM: u8 = 13;

/// Zoom used for the shadow overlay when none is given.
pub const DEFAULT_SHADOW_ZOOM: u8 = 12;

/// Largest accepted shadow raster edge.
pub const MAX_SHADOW_RESOLUTION: u32 = 512;

/// Web Mercator latitude limit.
const MAX_LATITUDE: f64 = 85.051_128_78;

/// Query parameters for the elevation endpoint.
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ElevationQuery {
    /// Latitude in decimal degrees (-85.05 to 85.05).
    pub lat: f64,
    /// Longitude in decimal degrees (-180 to 180).
    pub lon: f64,
    /// Tile zoom level, clamped to 15. Default is 13.
    pub zoom: Option<u8>,
}

/// Terrain at a single point.
#[derive(Debug, Serialize, ToSchema)]
pub struct ElevationResponse {
    /// Latitude queried.
    pub lat: f64,
    /// Longitude queried.
    pub lon: f64,
    /// Tile the value was read from, as `z/x/y`.
    pub tile: String,
    /// Elevation in meters.
    pub elevation: f64,
    /// Slope in degrees (0 to 90).
    pub slope_degrees: f64,
    /// Aspect in degrees clockwise from north.
    pub aspect_degrees: f64,
    /// Aspect bucket (N, NE, ... NW).
    pub aspect: String,
}

/// Query parameters for the shadow overlay.
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ShadowQuery {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    /// Backing tile zoom. Default is 12.
    pub zoom: Option<u8>,
    /// RFC 3339 timestamp. Default is now.
    pub time: Option<DateTime<Utc>>,
    /// Raster edge in pixels (1 to 512). Default is 64.
    pub resolution: Option<u32>,
}

/// Zoom parameter for GeoJSON enrichment.
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ZoomQuery {
    /// Tile zoom level. Default is 13.
    pub zoom: Option<u8>,
}

/// Registered raster layers.
#[derive(Debug, Serialize, ToSchema)]
pub struct LayersResponse {
    pub layers: Vec<String>,
}

/// Error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Cache statistics response.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Number of tiles in cache, ready or unavailable.
    pub cached_tiles: u64,
    /// Maximum number of cached tiles.
    pub cache_capacity: u64,
    /// Cache hit count.
    pub cache_hits: u64,
    /// Cache miss count.
    pub cache_misses: u64,
    /// Tiles fetched from the source.
    pub fetches: u64,
    /// Tiles that failed to load.
    pub unavailable: u64,
    /// Cache hit rate (0.0 to 1.0).
    pub hit_rate: f64,
}

/// Render a raster layer tile.
///
/// # Returns
///
/// - `200 OK` with an `image/png` body
/// - `400 Bad Request` if the tile address is invalid
/// - `404 Not Found` if the layer is unknown or the elevation tile is unavailable
#[utoipa::path(
    get,
    path = "/tiles/{layer}/{z}/{x}/{y}",
    tag = "tiles",
    params(
        ("layer" = String, Path, description = "Layer name, see /layers"),
        ("z" = u8, Path, description = "Zoom level"),
        ("x" = u32, Path, description = "Tile column"),
        ("y" = String, Path, description = "Tile row, optionally with a .png suffix"),
    ),
    responses(
        (status = 200, description = "Rendered tile", content_type = "image/png", body = Vec<u8>),
        (status = 400, description = "Invalid tile address", body = ErrorResponse),
        (status = 404, description = "Unknown layer or unavailable tile", body = ErrorResponse),
    )
)]
pub async fn get_tile(
    State(state): State<Arc<AppState>>,
    Path((layer, z, x, y)): Path<(String, String, String, String)>,
) -> Response {
    let id: TileId = match format!("{z}/{x}/{y}").parse() {
        Ok(id) => id,
        Err(e) => return error_response(e),
    };
    tracing::debug!(layer = %layer, tile = %id, "Tile request");

    let rendered = run_blocking(move || {
        state
            .registry
            .render_tile(&state.service, &layer, id)
    })
    .await;

    match rendered {
        Ok(png) => png_response(png),
        Err(response) => response,
    }
}

/// Render the terrain shadow overlay for a bounding box.
///
/// # Returns
///
/// - `200 OK` with an `image/png` body
/// - `400 Bad Request` for an inverted box or an out of range resolution
/// - `404 Not Found` if none of the backing elevation tiles could be loaded
#[utoipa::path(
    get,
    path = "/shadow",
    tag = "tiles",
    params(ShadowQuery),
    responses(
        (status = 200, description = "Shadow overlay", content_type = "image/png", body = Vec<u8>),
        (status = 400, description = "Invalid parameters", body = ErrorResponse),
        (status = 404, description = "No elevation data for the area", body = ErrorResponse),
    )
)]
pub async fn get_shadow(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ShadowQuery>,
) -> Response {
    let resolution = query.resolution.unwrap_or(DEFAULT_RESOLUTION);
    if resolution == 0 || resolution > MAX_SHADOW_RESOLUTION {
        return bad_request(format!(
            "resolution must be between 1 and {MAX_SHADOW_RESOLUTION}, got {resolution}"
        ));
    }

    let bounds = BoundingBox::new(query.north, query.south, query.east, query.west);
    let zoom = query.zoom.unwrap_or(DEFAULT_SHADOW_ZOOM);
    let at = query.time.unwrap_or_else(Utc::now);
    tracing::debug!(?bounds, zoom, %at, resolution, "Shadow request");

    let rendered = run_blocking(move || {
        let generator = ShadowLayerGenerator::new(&state.service, state.sun.as_ref());
        let layer = generator.generate(&bounds, zoom, at, resolution, &CancelToken::new())?;
        tracing::info!(
            altitude = layer.sun.altitude_degrees(),
            azimuth = layer.sun.azimuth_degrees(),
            shadowed = layer.shadowed_fraction(),
            "Shadow layer rendered"
        );
        layer.to_png()
    })
    .await;

    match rendered {
        Ok(png) => png_response(png),
        Err(response) => response,
    }
}

/// Get elevation, slope and aspect at given coordinates.
///
/// # Returns
///
/// - `200 OK` with terrain data on success
/// - `400 Bad Request` if coordinates are invalid
/// - `404 Not Found` if tile data is unavailable
#[utoipa::path(
    get,
    path = "/elevation",
    tag = "terrain",
    params(ElevationQuery),
    responses(
        (status = 200, description = "Terrain at the point", body = ElevationResponse),
        (status = 400, description = "Coordinates out of bounds", body = ErrorResponse),
        (status = 404, description = "No elevation data", body = ErrorResponse),
    )
)]
#[axum::debug_handler]
pub async fn get_elevation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ElevationQuery>,
) -> Response {
    let (lat, lon) = (query.lat, query.lon);
    let zoom = query.zoom.unwrap_or(DEFAULT_QUERY_ZOOM);
    tracing::debug!(lat, lon, zoom, "Elevation query");

    if !(-MAX_LATITUDE..=MAX_LATITUDE).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return error_response(TerrainError::InvalidCoordinate {
            message: format!("lat={lat}, lon={lon} out of bounds"),
        });
    }

    let point = run_blocking(move || {
        state
            .service
            .terrain_at_loading(lat, lon, zoom)
            .ok_or(TerrainError::NoData { lat, lon })
    })
    .await;

    match point {
        Ok(point) => {
            tracing::info!(lat, lon, elevation = point.elevation, "Elevation found");
            Json(ElevationResponse {
                lat,
                lon,
                tile: point.tile.to_string(),
                elevation: point.elevation,
                slope_degrees: point.slope_degrees,
                aspect_degrees: point.aspect_degrees,
                aspect: point.aspect.to_string(),
            })
            .into_response()
        }
        Err(response) => response,
    }
}

/// Add elevations to every coordinate of a GeoJSON geometry.
#[utoipa::path(
    post,
    path = "/elevation",
    tag = "terrain",
    params(ZoomQuery),
    request_body(content = Object, description = "GeoJSON geometry"),
    responses(
        (status = 200, description = "Geometry with Z coordinates", body = Object),
        (status = 400, description = "Malformed coordinate", body = ErrorResponse),
        (status = 404, description = "No elevation data for a coordinate", body = ErrorResponse),
    )
)]
pub async fn post_elevation(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ZoomQuery>,
    Json(geometry): Json<Geometry>,
) -> Response {
    let zoom = query.zoom.unwrap_or(DEFAULT_QUERY_ZOOM);
    let enriched =
        run_blocking(move || add_elevations_to_geometry(&state.service, geometry, zoom)).await;

    match enriched {
        Ok(geometry) => Json(geometry).into_response(),
        Err(response) => response,
    }
}

/// Slope and aspect exposure statistics of a recorded track.
///
/// The body is either a GPX document (`Content-Type: application/gpx+xml`
/// or any XML type) or a GeoJSON LineString or MultiLineString whose Z
/// values are elevations in meters.
#[utoipa::path(
    post,
    path = "/route",
    tag = "terrain",
    request_body(
        content = Object,
        description = "GeoJSON LineString or MultiLineString, or a GPX document"
    ),
    responses(
        (status = 200, description = "Route statistics", body = Object),
        (
            status = 400,
            description = "Unreadable track or fewer than two points",
            body = ErrorResponse
        ),
    )
)]
pub async fn post_route(headers: HeaderMap, body: Bytes) -> Response {
    let parsed = if is_xml(&headers) {
        track_from_gpx(body.as_ref())
    } else {
        serde_json::from_slice::<Geometry>(&body)
            .map_err(|e| TerrainError::InvalidTrack(e.to_string()))
            .and_then(|geometry| track_from_geometry(&geometry))
    };
    let track = match parsed {
        Ok(track) => track,
        Err(e) => return error_response(e),
    };

    match analyze_track(&track) {
        Some(stats) => Json(stats).into_response(),
        None => bad_request(format!(
            "route needs at least 2 points, got {}",
            track.len()
        )),
    }
}

/// Whether the request declares an XML body.
fn is_xml(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("xml"))
}

/// List registered raster layers.
#[utoipa::path(
    get,
    path = "/layers",
    tag = "tiles",
    responses((status = 200, description = "Layer names", body = LayersResponse))
)]
pub async fn get_layers(State(state): State<Arc<AppState>>) -> Json<LayersResponse> {
    Json(LayersResponse {
        layers: state.registry.names(),
    })
}

/// Health check endpoint.
///
/// Returns service status and version.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Get cache statistics.
///
/// Returns information about the tile cache.
#[utoipa::path(
    get,
    path = "/stats",
    tag = "system",
    responses((status = 200, description = "Cache statistics", body = StatsResponse))
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let stats = state.service.cache_stats();

    Json(StatsResponse {
        cached_tiles: stats.entry_count,
        cache_capacity: state.service.cache_capacity(),
        cache_hits: stats.hit_count,
        cache_misses: stats.miss_count,
        fetches: stats.fetch_count,
        unavailable: stats.unavailable_count,
        hit_rate: stats.hit_rate(),
    })
}

/// Run tile loading and rendering off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce() -> slopeshade::Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(error_response(e)),
        Err(e) => {
            tracing::error!(error = %e, "Blocking task failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal error".to_string(),
                }),
            )
                .into_response())
        }
    }
}

fn png_response(png: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        png,
    )
        .into_response()
}

fn bad_request(message: String) -> Response {
    tracing::warn!(error = %message, "Rejected request");
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message })).into_response()
}

/// HTTP status for a library error.
pub fn status_for(e: &TerrainError) -> StatusCode {
    match e {
        TerrainError::InvalidTileId(_)
        | TerrainError::InvalidBounds { .. }
        | TerrainError::AreaTooLarge { .. }
        | TerrainError::InvalidCoordinate { .. }
        | TerrainError::InvalidTrack(_)
        | TerrainError::SunUnavailable(_) => StatusCode::BAD_REQUEST,
        TerrainError::UnknownLayer(_)
        | TerrainError::TileUnavailable { .. }
        | TerrainError::TileNotFound { .. }
        | TerrainError::LayerUnavailable { .. }
        | TerrainError::NoData { .. } => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Create an error response from a library error.
fn error_response(e: TerrainError) -> Response {
    let status = status_for(&e);
    tracing::warn!(status = status.as_u16(), error = %e, "Request failed");
    (status, Json(ErrorResponse { error: e.to_string() })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevation_query_deserialize() {
        let json = r#"{"lat": 47.45, "lon": 11.7}"#;
        let query: ElevationQuery = serde_json::from_str(json).unwrap();
        assert_eq!(query.lat, 47.45);
        assert_eq!(query.lon, 11.7);
        assert_eq!(query.zoom, None);
    }

    #[test]
    fn test_shadow_query_time() {
        let json = r#"{"north": 47.5, "south": 47.4, "east": 11.8, "west": 11.6,
                       "time": "2024-03-20T11:23:00Z"}"#;
        let query: ShadowQuery = serde_json::from_str(json).unwrap();
        assert_eq!(
            query.time.unwrap().to_rfc3339(),
            "2024-03-20T11:23:00+00:00"
        );
        assert_eq!(query.resolution, None);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&TerrainError::InvalidTileId("1/2".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&TerrainError::UnknownLayer("hillshade".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&TerrainError::TileUnavailable {
                id: TileId::new(11, 1090, 716)
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&TerrainError::AreaTooLarge {
                tiles: 4096,
                max: 512
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&TerrainError::Cancelled),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_is_xml() {
        let mut headers = HeaderMap::new();
        assert!(!is_xml(&headers));
        headers.insert(header::CONTENT_TYPE, "application/gpx+xml".parse().unwrap());
        assert!(is_xml(&headers));
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        assert!(!is_xml(&headers));
    }

    #[test]
    fn test_health_response_serialize() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("0.1.0"));
    }
}
