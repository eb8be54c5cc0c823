use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::response::{ok, AppError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswerRequest {
    pub answer: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

pub async fn submit_answer(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    axum::Json(payload): axum::Json<SubmitAnswerRequest>,
) -> Result<Response, AppError> {
    if payload.answer.trim().is_empty() {
        return Err(AppError::validation("missing answer"));
    }
    if let Some(confidence) = payload.confidence {
        if !confidence.is_finite() {
            return Err(AppError::validation("confidence must be a finite number"));
        }
    }

    let outcome = state
        .engine()
        .submit_answer(&item_id, &payload.answer, payload.confidence)
        .await?;
    Ok(ok(outcome).into_response())
}
