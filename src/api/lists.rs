use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::models::{collections, ShoppingList};
use crate::store::{fetch, with_id, FieldFilter};

use super::{stamped, touched, validated, Ack, ApiJson, AppState, CurrentUser, IdField};

#[derive(Serialize)]
pub struct ListsResponse {
    lists: Vec<Value>,
}

/// `POST /api/lists`
pub async fn create_list(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(mut list): ApiJson<ShoppingList>,
) -> Result<Json<Ack>, ApiError> {
    validated(list.validate())?;
    list.user_id = user.uid.clone();

    let id = state
        .store
        .insert(collections::LISTS, &stamped(&list, Utc::now())?)
        .await?;
    Ok(Json(Ack::created(
        "List created successfully",
        IdField::List(id),
    )))
}

/// `GET /api/lists`
pub async fn list_lists(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ListsResponse>, ApiError> {
    let records = state
        .store
        .list(
            collections::LISTS,
            Some(&FieldFilter::eq("userId", user.uid.as_str())),
        )
        .await?;
    Ok(Json(ListsResponse {
        lists: records.into_iter().map(|r| r.into_json()).collect(),
    }))
}

/// `GET /api/lists/{id}`
pub async fn get_list(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let doc = state
        .store
        .get(collections::LISTS, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("List not found"))?;

    if doc.get("userId").and_then(Value::as_str) != Some(user.uid.as_str()) {
        return Err(ApiError::not_found("List not found"));
    }
    Ok(Json(with_id(&id, doc)))
}

/// `PUT /api/lists/{id}`
pub async fn update_list(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ApiJson(mut list): ApiJson<ShoppingList>,
) -> Result<Json<Ack>, ApiError> {
    validated(list.validate())?;

    let existing: ShoppingList = fetch(state.store.as_ref(), collections::LISTS, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("List not found"))?;
    if existing.user_id != user.uid {
        return Err(ApiError::not_found("List not found"));
    }
    list.user_id = existing.user_id;

    state
        .store
        .update(collections::LISTS, &id, &touched(&list, Utc::now())?)
        .await?;
    Ok(Json(Ack::message("List updated successfully")))
}
