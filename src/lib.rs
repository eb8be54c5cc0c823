pub mod config;
pub mod db;
pub mod engine;
pub mod logging;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;

use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::services::generator::LlmGenerator;
use crate::state::AppState;

pub async fn create_app() -> axum::Router {
    let store = db::store_from_env().await;
    let generator = Arc::new(LlmGenerator::from_env());
    let state = AppState::new(store, generator);

    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
