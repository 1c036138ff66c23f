//! Axum Router Configuration

use crate::{handlers, state::AppState};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/ra", post(handlers::synthesize))
        .route("/formats", get(handlers::list_formats))
        .with_state(app_state);

    Router::new().nest("/api", api_router)
}
