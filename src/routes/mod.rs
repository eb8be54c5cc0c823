mod answers;
mod health;
mod sets;

use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;

use crate::response::AppError;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::status))
        .route("/api/sets", post(sets::create_set))
        .route("/api/sets/:setId/round", get(sets::get_round))
        .route("/api/sets/:setId/reset", post(sets::reset_round))
        .route("/api/items/:itemId/answer", post(answers::submit_answer))
        .fallback(fallback_handler)
        .with_state(state)
}

async fn fallback_handler() -> Response {
    AppError::not_found("route not found").into_response()
}
