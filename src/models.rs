//! Core data models for the delivery platform.
//!
//! These are the payloads accepted by the HTTP API and the documents stored in
//! the [`store`](crate::store). JSON field names are camelCase so the stored
//! documents keep the shape the frontend already speaks.

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Collection names in the document store.
pub mod collections {
    pub const USERS: &str = "users";
    pub const ITEMS: &str = "items";
    pub const GENERAL_ITEMS: &str = "general_items";
    pub const ORDERS: &str = "orders";
    pub const LISTS: &str = "lists";
}

/// A postal address for a consumer or a provider storefront.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub zip_code: String,
}

impl Address {
    /// Joins the non-empty components with `", "`, the form the distance
    /// service accepts as a free-text location.
    pub fn format(&self) -> String {
        [&self.street, &self.city, &self.zip_code]
            .into_iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn is_empty(&self) -> bool {
        self.format().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Consumer,
    Provider,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Consumer => "consumer",
            UserType::Provider => "provider",
        }
    }
}

/// Body of `POST /api/auth/register`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub user_type: UserType,
    pub phone_number: String,
    pub address: Address,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<()> {
        validate_email(&self.email)?;
        if self.password.is_empty() {
            bail!("password must not be empty");
        }
        if self.name.trim().is_empty() {
            bail!("name must not be empty");
        }
        Ok(())
    }

    /// The stored profile: everything but the password.
    pub fn into_profile(self, now: DateTime<Utc>) -> UserProfile {
        UserProfile {
            email: self.email,
            name: self.name,
            user_type: self.user_type,
            phone_number: self.phone_number,
            address: Some(self.address),
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

/// Body of `POST /api/auth/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

fn validate_email(email: &str) -> Result<()> {
    let Some((local, domain)) = email.split_once('@') else {
        bail!("invalid email address: {}", email);
    };
    if local.is_empty() || !domain.contains('.') || domain.starts_with('.') || domain.ends_with('.')
    {
        bail!("invalid email address: {}", email);
    }
    Ok(())
}

/// User profile stored in `users/{uid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub email: String,
    pub name: String,
    pub user_type: UserType,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn is_provider(&self) -> bool {
        self.user_type == UserType::Provider
    }
}

/// Catalog-level product grouping, e.g. "milk" with its known brands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralItem {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub brands: Vec<String>,
    #[serde(default)]
    pub default_image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A concrete product sold by one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub brand: String,
    pub price: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub available_stock: i64,
    #[serde(default)]
    pub general_item_id: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Item {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("item name must not be empty");
        }
        if !self.price.is_finite() || self.price < 0.0 {
            bail!("item price must be a non-negative number");
        }
        if self.available_stock < 0 {
            bail!("availableStock must not be negative");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub item_id: String,
    pub name: String,
    pub quantity: i64,
    pub price: f64,
}

fn default_status() -> String {
    "pending".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default)]
    pub user_id: String,
    pub provider_id: String,
    pub items: Vec<OrderItem>,
    pub total_price: f64,
    #[serde(default = "default_status")]
    pub status: String,
    pub delivery_address: Address,
    #[serde(default)]
    pub scheduled_delivery_time: Option<DateTime<Utc>>,
}

impl Order {
    pub fn validate(&self) -> Result<()> {
        if self.items.is_empty() {
            bail!("order must contain at least one item");
        }
        if self.items.iter().any(|i| i.quantity <= 0) {
            bail!("order item quantity must be positive");
        }
        Ok(())
    }

    /// Sum of `price * quantity` over the order lines.
    pub fn items_total(&self) -> f64 {
        self.items
            .iter()
            .map(|i| i.price * i.quantity as f64)
            .sum()
    }

    /// Orders past these states never trigger notifications.
    pub fn is_closed(&self) -> bool {
        matches!(self.status.as_str(), "delivered" | "cancelled")
    }
}

/// A named, recurring shopping list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingList {
    #[serde(default)]
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub items: Vec<String>,
    pub frequency: String,
    #[serde(default)]
    pub next_order_date: Option<DateTime<Utc>>,
    /// Order ids placed from this list.
    #[serde(default)]
    pub orders: Option<Vec<String>>,
    #[serde(default)]
    pub auto_approve_delivery: bool,
}

impl ShoppingList {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("list name must not be empty");
        }
        Ok(())
    }
}

/// Reorder cadence of a [`ShoppingList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Weekly,
    Biweekly,
    Monthly,
}

impl Frequency {
    /// Unknown labels fall back to weekly.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "weekly" => Frequency::Weekly,
            "2 weeks" | "biweekly" => Frequency::Biweekly,
            "monthly" => Frequency::Monthly,
            _ => Frequency::Weekly,
        }
    }

    pub fn interval(&self) -> Duration {
        match self {
            Frequency::Weekly => Duration::weeks(1),
            Frequency::Biweekly => Duration::weeks(2),
            Frequency::Monthly => Duration::days(30),
        }
    }
}
