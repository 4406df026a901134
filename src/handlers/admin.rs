use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    models::{session::AuthUser, user::DeletionCandidate},
    services::{admin as admin_service, lifecycle::LifecycleState},
    state::AppState,
};

/// `suspension_date` is optional; dates earlier than the minimum are raised to it.
#[derive(Deserialize, Debug, Default)]
pub struct SuspensionRequest {
    pub suspension_date: Option<NaiveDate>,
}

/// Reads the optional suspension body. An empty body means no date was given.
pub fn parse_suspension_request(body: &[u8]) -> Result<SuspensionRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SuspensionRequest::default());
    }
    sonic_rs::from_slice(body)
        .map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))
}

#[derive(Serialize)]
pub struct DeletedResponse {
    pub success: bool,
    pub user_id: i64,
}

/// Suspends an active account or lifts an existing suspension.
pub async fn toggle_suspension(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(user_id): Path<i64>,
    body: Bytes,
) -> Result<Json<LifecycleState>> {
    let request = parse_suspension_request(&body)?;

    let lifecycle_state = admin_service::toggle_suspension(
        &state.db,
        admin.user_id,
        user_id,
        request.suspension_date,
        Utc::now(),
    )
    .await?;

    Ok(Json(lifecycle_state))
}

pub async fn list_scheduled_deletions(
    State(state): State<AppState>,
) -> Result<Json<Vec<DeletionCandidate>>> {
    let candidates =
        admin_service::list_deletion_candidates(&state.db, Utc::now().date_naive()).await?;
    Ok(Json(candidates))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(user_id): Path<i64>,
) -> Result<Response> {
    admin_service::delete_user(&state.db, admin.user_id, user_id, Utc::now().date_naive()).await?;

    let response = DeletedResponse {
        success: true,
        user_id,
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}
