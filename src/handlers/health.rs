use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::{error::Result, state::AppState};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Answers once the database is reachable.
pub async fn health(State(state): State<AppState>) -> Result<(StatusCode, Json<HealthResponse>)> {
    let client = state.db.get().await?;
    client.simple_query("SELECT 1").await?;
    Ok((StatusCode::OK, Json(HealthResponse { status: "ok" })))
}
