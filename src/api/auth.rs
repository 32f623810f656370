use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;

use crate::auth::AuthSession;
use crate::error::ApiError;
use crate::models::{collections, LoginRequest, RegisterRequest, UserProfile};
use crate::store::fetch;

use super::{validated, Ack, ApiJson, AppState, CurrentUser, IdField};

/// `POST /api/auth/register`
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<Json<Ack>, ApiError> {
    validated(req.validate())?;

    let uid = state
        .auth
        .sign_up(&req.email, &req.password, &req.name)
        .await?;

    let profile = req.into_profile(Utc::now());
    let data = serde_json::to_value(&profile).map_err(anyhow::Error::from)?;
    state.store.put(collections::USERS, &uid, &data).await?;

    tracing::info!(uid = %uid, user_type = profile.user_type.as_str(), "user registered");
    Ok(Json(Ack::created(
        "User registered successfully",
        IdField::User(uid),
    )))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    message: &'static str,
    user: UserProfile,
    #[serde(flatten)]
    session: AuthSession,
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let session = state.auth.sign_in(&req.email, &req.password).await?;

    let user: UserProfile = fetch(state.store.as_ref(), collections::USERS, &session.uid)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(LoginResponse {
        message: "Login successful",
        user,
        session,
    }))
}

#[derive(Serialize)]
pub struct MeResponse {
    user: UserProfile,
}

/// `GET /api/auth/me`
pub async fn me(user: CurrentUser) -> Result<Json<MeResponse>, ApiError> {
    let profile = user
        .profile
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(MeResponse { user: profile }))
}
