//! slopeshade service library
//!
//! HTTP handlers, router and OpenAPI document for the terrain tile server.
//! This library is used by both the slopeshade-service binary and integration tests.

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use slopeshade::{LayerRegistry, SunProvider, TerrainService};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared across handlers.
pub struct AppState {
    /// Tile cache backing every layer.
    pub service: TerrainService,
    /// Raster layers served under `/tiles/{layer}`.
    pub registry: LayerRegistry,
    /// Sun position source for the shadow overlay.
    pub sun: Box<dyn SunProvider>,
}

impl AppState {
    /// State with the default layers and the SPA sun model.
    pub fn new(service: TerrainService) -> Self {
        Self {
            service,
            registry: LayerRegistry::with_defaults(),
            sun: Box::new(slopeshade::SpaSun),
        }
    }
}

/// OpenAPI documentation for the slopeshade service.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "slopeshade Terrain Service",
        version = "0.1.0",
        description = "Slope, aspect and terrain shadow layers rendered from Terrarium elevation tiles.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT"),
        contact(name = "Pedro Sanz Martinez", url = "https://github.com/pedrosanzmtz/slopeshade")
    ),
    paths(
        handlers::get_tile,
        handlers::get_shadow,
        handlers::get_elevation,
        handlers::post_elevation,
        handlers::post_route,
        handlers::get_layers,
        handlers::health_check,
        handlers::get_stats,
    ),
    components(
        schemas(
            handlers::ElevationQuery,
            handlers::ElevationResponse,
            handlers::ShadowQuery,
            handlers::ZoomQuery,
            handlers::LayersResponse,
            handlers::ErrorResponse,
            handlers::HealthResponse,
            handlers::StatsResponse,
        )
    ),
    tags(
        (name = "tiles", description = "Raster layer endpoints"),
        (name = "terrain", description = "Point and route terrain queries"),
        (name = "system", description = "System and health endpoints")
    )
)]
pub struct ApiDoc;

/// Build the application router, including Swagger UI at `/docs`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/tiles/:layer/:z/:x/:y", get(handlers::get_tile))
        .route("/shadow", get(handlers::get_shadow))
        .route(
            "/elevation",
            get(handlers::get_elevation).post(handlers::post_elevation),
        )
        .route("/route", post(handlers::post_route))
        .route("/layers", get(handlers::get_layers))
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats))
        .with_state(state)
}

// Re-export commonly used types for convenience
pub use handlers::{
    ElevationQuery, ElevationResponse, ErrorResponse, HealthResponse, LayersResponse,
    ShadowQuery, StatsResponse,
};
