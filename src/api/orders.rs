use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::models::{collections, Order};
use crate::store::{fetch, with_id, FieldFilter};

use super::{stamped, touched, validated, Ack, ApiJson, AppState, CurrentUser, IdField};

#[derive(Serialize)]
pub struct OrdersResponse {
    orders: Vec<Value>,
}

fn can_see(order: &Order, user: &CurrentUser) -> bool {
    order.user_id == user.uid || order.provider_id == user.uid
}

/// `POST /api/orders`. The order is always placed by the caller.
pub async fn create_order(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(mut order): ApiJson<Order>,
) -> Result<Json<Ack>, ApiError> {
    validated(order.validate())?;
    order.user_id = user.uid.clone();

    let id = state
        .store
        .insert(collections::ORDERS, &stamped(&order, Utc::now())?)
        .await?;
    tracing::info!(order_id = %id, user_id = %user.uid, provider_id = %order.provider_id, "order placed");
    Ok(Json(Ack::created(
        "Order created successfully",
        IdField::Order(id),
    )))
}

/// `GET /api/orders`: orders the caller placed and, for providers, the
/// orders addressed to them, oldest first.
pub async fn list_orders(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<OrdersResponse>, ApiError> {
    let placed = FieldFilter::eq("userId", user.uid.as_str());
    let records = if user.is_provider() {
        // One pass over the collection keeps the store's creation order
        // across both sides.
        let incoming = FieldFilter::eq("providerId", user.uid.as_str());
        state
            .store
            .list(collections::ORDERS, None)
            .await?
            .into_iter()
            .filter(|r| placed.matches(&r.data) || incoming.matches(&r.data))
            .collect()
    } else {
        state.store.list(collections::ORDERS, Some(&placed)).await?
    };

    Ok(Json(OrdersResponse {
        orders: records.into_iter().map(|r| r.into_json()).collect(),
    }))
}

/// `GET /api/orders/{id}`
pub async fn get_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let doc = state
        .store
        .get(collections::ORDERS, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;

    let order: Order = serde_json::from_value(doc.clone()).map_err(anyhow::Error::from)?;
    if !can_see(&order, &user) {
        return Err(ApiError::not_found("Order not found"));
    }
    Ok(Json(with_id(&id, doc)))
}

/// `PUT /api/orders/{id}`. Either side of the order may update it; the
/// placing user never changes. Anyone else sees the order as missing.
pub async fn update_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ApiJson(mut order): ApiJson<Order>,
) -> Result<Json<Ack>, ApiError> {
    validated(order.validate())?;

    let existing: Order = fetch(state.store.as_ref(), collections::ORDERS, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Order not found"))?;
    if !can_see(&existing, &user) {
        return Err(ApiError::not_found("Order not found"));
    }
    order.user_id = existing.user_id;

    state
        .store
        .update(collections::ORDERS, &id, &touched(&order, Utc::now())?)
        .await?;
    tracing::info!(order_id = %id, status = %order.status, "order updated");
    Ok(Json(Ack::message("Order updated successfully")))
}
