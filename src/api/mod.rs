//! HTTP handlers for the `/api` routes.
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `POST` | `/api/auth/register` | none | Create account and profile |
//! | `POST` | `/api/auth/login` | none | Exchange credentials for tokens |
//! | `GET`  | `/api/auth/me` | bearer | Caller's profile |
//! | `GET`/`POST` | `/api/items` | bearer | List (by `category`) / create (providers) |
//! | `GET`/`PUT`  | `/api/items/{id}` | bearer | Fetch / replace (owning provider) |
//! | `GET`/`POST` | `/api/orders` | bearer | Caller's orders / place order |
//! | `GET`/`PUT`  | `/api/orders/{id}` | bearer | Fetch / replace (customer or provider) |
//! | `GET`/`POST` | `/api/lists` | bearer | Caller's lists / create list |
//! | `GET`/`PUT`  | `/api/lists/{id}` | bearer | Fetch / replace (owner) |
//! | `GET`/`POST` | `/api/general-items` | none / bearer | List / create (providers) |
//! | `POST` | `/api/assistant/match` | bearer | Natural-language item matching |

pub mod assistant;
pub mod auth;
pub mod general_items;
pub mod items;
pub mod lists;
pub mod orders;

use std::sync::Arc;

use axum::extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request};
use axum::http::{header::AUTHORIZATION, request::Parts};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::auth::{AuthError, AuthProvider};
use crate::config::Config;
use crate::error::ApiError;
use crate::matcher::ItemMatcher;
use crate::models::{collections, UserProfile};
use crate::store::{fetch, DocumentStore};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn DocumentStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub matcher: Arc<ItemMatcher>,
}

/// The authenticated caller.
///
/// Extracting this verifies the `Authorization: Bearer <token>` header with
/// the auth provider and loads the caller's stored profile. Role checks use
/// the profile, never the token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub uid: String,
    pub email: Option<String>,
    pub profile: Option<UserProfile>,
}

impl CurrentUser {
    pub fn is_provider(&self) -> bool {
        self.profile.as_ref().is_some_and(UserProfile::is_provider)
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;

        let claims = state.auth.verify_token(token).await.map_err(|e| match e {
            AuthError::Unavailable(msg) => ApiError::Upstream(msg),
            _ => ApiError::Unauthorized,
        })?;

        let profile = fetch(state.store.as_ref(), collections::USERS, &claims.uid).await?;

        Ok(CurrentUser {
            uid: claims.uid,
            email: claims.email,
            profile,
        })
    }
}

/// JSON request body whose rejection is an [`ApiError`].
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ApiError> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

/// `{ "message": ... }` plus one id field, the shape of every create/update
/// response.
#[derive(Serialize)]
pub struct Ack {
    pub message: &'static str,
    #[serde(flatten)]
    pub id: Option<IdField>,
}

#[derive(Serialize)]
pub enum IdField {
    #[serde(rename = "itemId")]
    Item(String),
    #[serde(rename = "orderId")]
    Order(String),
    #[serde(rename = "listId")]
    List(String),
    #[serde(rename = "generalItemId")]
    GeneralItem(String),
    #[serde(rename = "userId")]
    User(String),
}

impl Ack {
    pub fn created(message: &'static str, id: IdField) -> Self {
        Self {
            message,
            id: Some(id),
        }
    }

    pub fn message(message: &'static str) -> Self {
        Self { message, id: None }
    }
}

/// Serialize a payload and add `createdAt`/`updatedAt`.
pub(crate) fn stamped<T: Serialize>(payload: &T, now: DateTime<Utc>) -> Result<Value, ApiError> {
    let mut value = serde_json::to_value(payload).map_err(anyhow::Error::from)?;
    value["createdAt"] = serde_json::to_value(now).map_err(anyhow::Error::from)?;
    value["updatedAt"] = value["createdAt"].clone();
    Ok(value)
}

/// Serialize a replacement payload with a fresh `updatedAt`; `createdAt` is
/// left to the stored document.
pub(crate) fn touched<T: Serialize>(payload: &T, now: DateTime<Utc>) -> Result<Value, ApiError> {
    let mut value = serde_json::to_value(payload).map_err(anyhow::Error::from)?;
    value["updatedAt"] = serde_json::to_value(now).map_err(anyhow::Error::from)?;
    Ok(value)
}

pub(crate) fn validated(result: anyhow::Result<()>) -> Result<(), ApiError> {
    result.map_err(|e| ApiError::bad_request(e.to_string()))
}
