use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::engine::types::{AssessmentItem, AssessmentSet, QuizSize, Round};
use crate::response::{ok, AppError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSetRequest {
    #[serde(default)]
    pub title: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub size: Option<QuizSize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSetResponse {
    set: AssessmentSet,
    items: Vec<AssessmentItem>,
}

pub async fn create_set(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<CreateSetRequest>,
) -> Result<Response, AppError> {
    let title = payload
        .title
        .as_deref()
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .unwrap_or("Untitled assessment");
    let size = payload.size.unwrap_or(QuizSize::Small);

    let (set, items) = state
        .engine()
        .create_set(title, &payload.summary, size)
        .await?;
    Ok(ok(CreateSetResponse { set, items }).into_response())
}

pub async fn get_round(
    State(state): State<AppState>,
    Path(set_id): Path<String>,
) -> Result<Response, AppError> {
    let round: Round = state.engine().get_round(&set_id).await?;
    Ok(ok(round).into_response())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResetResponse {
    score: i64,
}

pub async fn reset_round(
    State(state): State<AppState>,
    Path(set_id): Path<String>,
) -> Result<Response, AppError> {
    state.engine().reset_round(&set_id).await?;
    Ok(ok(ResetResponse { score: 0 }).into_response())
}
