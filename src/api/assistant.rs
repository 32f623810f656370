use axum::{extract::State, Json};
use serde::Deserialize;

use crate::error::ApiError;
use crate::matcher::MatchOutcome;

use super::{ApiJson, AppState, CurrentUser};

#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    pub query: String,
}

/// `POST /api/assistant/match`: run the item matcher for the caller.
pub async fn match_items(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<MatchRequest>,
) -> Result<Json<MatchOutcome>, ApiError> {
    if req.query.trim().is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }
    if user.profile.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    let outcome = state
        .matcher
        .run(&user.uid, &req.query)
        .await
        .map_err(|e| {
            tracing::warn!(user_id = %user.uid, error = %e, "item matching failed");
            ApiError::Upstream(e.to_string())
        })?;
    Ok(Json(outcome))
}
