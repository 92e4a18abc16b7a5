//! Public leaderboard.

use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use domain::models::LeaderboardEntry;
use serde::Serialize;

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub success: bool,
    pub data: Vec<LeaderboardEntry>,
}

/// `GET /api/v1/leaderboard`: recomputed from raw events on every read.
pub async fn get_leaderboard(State(state): State<AppState>) -> Result<Response, ApiError> {
    let data = state.leaderboard.leaderboard(Utc::now()).await?;

    let mut response = Json(LeaderboardResponse {
        success: true,
        data,
    })
    .into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, max-age=0"),
    );
    Ok(response)
}
