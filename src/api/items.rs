use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::models::{collections, Item};
use crate::store::{fetch, with_id, FieldFilter};

use super::{stamped, touched, validated, Ack, ApiJson, AppState, CurrentUser, IdField};

#[derive(Debug, Deserialize)]
pub struct ItemsQuery {
    pub category: Option<String>,
}

#[derive(Serialize)]
pub struct ItemsResponse {
    items: Vec<Value>,
}

/// `GET /api/items?category=`
pub async fn list_items(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<ItemsResponse>, ApiError> {
    let filter = query
        .category
        .filter(|c| !c.is_empty())
        .map(|c| FieldFilter::eq("category", c));
    let records = state.store.list(collections::ITEMS, filter.as_ref()).await?;
    Ok(Json(ItemsResponse {
        items: records.into_iter().map(|r| r.into_json()).collect(),
    }))
}

/// `POST /api/items`, providers only. The item is always listed under the
/// calling provider.
pub async fn create_item(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(mut item): ApiJson<Item>,
) -> Result<Json<Ack>, ApiError> {
    if !user.is_provider() {
        return Err(ApiError::forbidden("Only providers can create items"));
    }
    validated(item.validate())?;
    item.provider_id = user.uid.clone();

    let id = state
        .store
        .insert(collections::ITEMS, &stamped(&item, Utc::now())?)
        .await?;
    tracing::info!(item_id = %id, provider_id = %user.uid, "item created");
    Ok(Json(Ack::created(
        "Item created successfully",
        IdField::Item(id),
    )))
}

/// `GET /api/items/{id}`
pub async fn get_item(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let doc = state
        .store
        .get(collections::ITEMS, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Item not found"))?;
    Ok(Json(with_id(&id, doc)))
}

/// `PUT /api/items/{id}`, owning provider only.
pub async fn update_item(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ApiJson(mut item): ApiJson<Item>,
) -> Result<Json<Ack>, ApiError> {
    validated(item.validate())?;

    let existing: Item = fetch(state.store.as_ref(), collections::ITEMS, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Item not found"))?;
    if existing.provider_id != user.uid {
        return Err(ApiError::forbidden(
            "Only the owning provider can update this item",
        ));
    }
    item.provider_id = existing.provider_id;

    state
        .store
        .update(collections::ITEMS, &id, &touched(&item, Utc::now())?)
        .await?;
    Ok(Json(Ack::message("Item updated successfully")))
}
