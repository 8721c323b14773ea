//! HTTP API layer

mod error;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::service::MigrationService;
use crate::site::SiteRegistry;

pub use error::AppError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SiteRegistry>,
    pub migrations: MigrationService,
}

impl AppState {
    pub fn new(migrations: MigrationService) -> Self {
        Self {
            registry: migrations.context().registry.clone(),
            migrations,
        }
    }
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check
        .route("/health", get(handlers::health))

        // Sites
        .route("/sites", get(handlers::site::list))
        .route("/sites/{id}/details/{torrent_id}", get(handlers::site::details))

        // Parsing
        .route("/title/parse", post(handlers::parse::parse_title))

        // Migrations
        .route("/migrations", post(handlers::migration::submit))
        .route("/migrations/{id}", get(handlers::migration::get_one))
        .route("/migrations/{id}/cancel", post(handlers::migration::cancel))
        .route("/migrations/{id}/events", get(handlers::migration::events));

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}
