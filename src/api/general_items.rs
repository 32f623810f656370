use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::models::{collections, GeneralItem};

use super::{stamped, Ack, ApiJson, AppState, CurrentUser, IdField};

/// `POST /api/general-items`, providers only.
pub async fn create_general_item(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(item): ApiJson<GeneralItem>,
) -> Result<Json<Ack>, ApiError> {
    if !user.is_provider() {
        return Err(ApiError::forbidden(
            "Only providers can create general items",
        ));
    }
    if item.name.trim().is_empty() {
        return Err(ApiError::bad_request("general item name must not be empty"));
    }

    let id = state
        .store
        .insert(collections::GENERAL_ITEMS, &stamped(&item, Utc::now())?)
        .await?;
    Ok(Json(Ack::created(
        "General item created successfully",
        IdField::GeneralItem(id),
    )))
}

#[derive(Serialize)]
pub struct GeneralItemsResponse {
    general_items: Vec<Value>,
}

/// `GET /api/general-items`, public.
pub async fn list_general_items(
    State(state): State<AppState>,
) -> Result<Json<GeneralItemsResponse>, ApiError> {
    let records = state.store.list(collections::GENERAL_ITEMS, None).await?;
    Ok(Json(GeneralItemsResponse {
        general_items: records.into_iter().map(|r| r.into_json()).collect(),
    }))
}
