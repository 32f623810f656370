//! Approaching-order notifications.
//!
//! Finds recurring shopping lists and one-off orders due within the
//! lookahead window, drafts a notification email for the provider of each
//! affected order with the LLM, and sends it. Recurring lists that were
//! notified successfully have their `nextOrderDate` advanced by their
//! frequency.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;

use crate::llm::ChatModel;
use crate::mailer::Mailer;
use crate::models::{collections, Frequency, Order, ShoppingList, UserProfile};
use crate::prompts::{self, OrderEmailFields};
use crate::store::{fetch, list_as, DocumentStore};

const VALUED_CUSTOMER: &str = "Valued Customer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Recurring,
    #[serde(rename = "new")]
    OneOff,
}

/// A list or order that is due soon.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationJob {
    /// List id for recurring jobs, order id for one-off jobs.
    pub source_id: String,
    pub kind: JobKind,
    pub order_ids: Vec<String>,
    /// Set for recurring jobs.
    pub list: Option<ShoppingList>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum NotificationStatus {
    Success,
    Fail { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationResult {
    pub order_id: String,
    pub source_id: String,
    pub kind: JobKind,
    #[serde(flatten)]
    pub status: NotificationStatus,
}

impl NotificationResult {
    pub fn is_success(&self) -> bool {
        self.status == NotificationStatus::Success
    }
}

fn is_due(when: Option<DateTime<Utc>>, now: DateTime<Utc>, horizon: DateTime<Utc>) -> bool {
    when.unwrap_or(now).date_naive() <= horizon.date_naive()
}

/// Lists and orders due on or before `now + lookahead_days` (calendar date
/// comparison). A missing date counts as due now. Closed orders are skipped.
pub async fn approaching(
    store: &dyn DocumentStore,
    now: DateTime<Utc>,
    lookahead_days: i64,
) -> Result<Vec<NotificationJob>> {
    let horizon = now + Duration::days(lookahead_days);
    let mut jobs = Vec::new();

    let lists: Vec<(String, ShoppingList)> = list_as(store, collections::LISTS, None).await?;
    for (id, list) in lists {
        if is_due(list.next_order_date, now, horizon) {
            jobs.push(NotificationJob {
                source_id: id,
                kind: JobKind::Recurring,
                order_ids: list.orders.clone().unwrap_or_default(),
                list: Some(list),
            });
        }
    }

    let orders: Vec<(String, Order)> = list_as(store, collections::ORDERS, None).await?;
    for (id, order) in orders {
        if !order.is_closed() && is_due(order.scheduled_delivery_time, now, horizon) {
            jobs.push(NotificationJob {
                source_id: id.clone(),
                kind: JobKind::OneOff,
                order_ids: vec![id],
                list: None,
            });
        }
    }

    Ok(jobs)
}

pub struct Notifier {
    store: Arc<dyn DocumentStore>,
    llm: Arc<dyn ChatModel>,
    mailer: Arc<dyn Mailer>,
    lookahead_days: i64,
    email_temperature: f32,
}

impl Notifier {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        llm: Arc<dyn ChatModel>,
        mailer: Arc<dyn Mailer>,
        lookahead_days: i64,
        email_temperature: f32,
    ) -> Self {
        Self {
            store,
            llm,
            mailer,
            lookahead_days,
            email_temperature,
        }
    }

    /// Notify every provider with an approaching order. Each order is
    /// emailed at most once per run.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<Vec<NotificationResult>> {
        let jobs = approaching(self.store.as_ref(), now, self.lookahead_days).await?;
        let mut results = Vec::new();
        let mut notified: HashSet<String> = HashSet::new();

        for job in jobs {
            if job.order_ids.is_empty() {
                tracing::warn!(list_id = %job.source_id, "recurring list has no orders, skipping");
                continue;
            }

            let mut any_success = false;
            for order_id in &job.order_ids {
                if !notified.insert(order_id.clone()) {
                    continue;
                }
                let status = self.notify_order(order_id).await;
                any_success |= status == NotificationStatus::Success;
                results.push(NotificationResult {
                    order_id: order_id.clone(),
                    source_id: job.source_id.clone(),
                    kind: job.kind,
                    status,
                });
            }

            if let (JobKind::Recurring, Some(list), true) = (job.kind, &job.list, any_success) {
                // A failed advance leaves the list due; the results still stand.
                if let Err(e) = self.advance_list(&job.source_id, list, now).await {
                    tracing::warn!(list_id = %job.source_id, error = %e, "failed to advance recurring list");
                }
            }
        }

        let success = results.iter().filter(|r| r.is_success()).count();
        tracing::info!("Processed {} orders. {} successful.", results.len(), success);
        for r in &results {
            if let NotificationStatus::Fail { reason } = &r.status {
                tracing::warn!(order_id = %r.order_id, reason = %reason, "notification failed");
            }
        }

        Ok(results)
    }

    async fn notify_order(&self, order_id: &str) -> NotificationStatus {
        match self.try_notify_order(order_id).await {
            Ok(()) => NotificationStatus::Success,
            Err(e) => NotificationStatus::Fail {
                reason: e.to_string(),
            },
        }
    }

    async fn try_notify_order(&self, order_id: &str) -> Result<()> {
        let store = self.store.as_ref();
        let order: Order = fetch(store, collections::ORDERS, order_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Order not found"))?;

        let provider_email = provider_email(store, &order.provider_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No provider email found"))?;

        let customer_name = fetch::<UserProfile>(store, collections::USERS, &order.user_id)
            .await
            .ok()
            .flatten()
            .map(|u| u.name)
            .unwrap_or_else(|| VALUED_CUSTOMER.to_string());

        let items = order
            .items
            .iter()
            .map(|i| format!("{} x {}", i.quantity, i.name))
            .collect::<Vec<_>>()
            .join(", ");
        let address = order.delivery_address.format();
        let address = if address.is_empty() { "N/A".to_string() } else { address };

        let prompt = prompts::order_email(&OrderEmailFields {
            order_id,
            customer_name: &customer_name,
            items: &items,
            total: order.items_total(),
            delivery_address: &address,
        });
        tracing::debug!(order_id, model = self.llm.model_name(), "drafting notification email");
        let body = self
            .llm
            .generate(&prompt, self.email_temperature)
            .await
            .map_err(|e| anyhow::anyhow!("Email generation failed: {}", e))?;

        let subject = format!("Order Notification - {}", order_id);
        self.mailer
            .send(&provider_email, &subject, &body)
            .await
            .map_err(|e| anyhow::anyhow!("Email sending failed: {}", e))
    }

    async fn advance_list(
        &self,
        list_id: &str,
        list: &ShoppingList,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let next = next_order_date(list, now);
        self.store
            .update(
                collections::LISTS,
                list_id,
                &json!({ "nextOrderDate": next, "updatedAt": now }),
            )
            .await?;
        tracing::info!(list_id, next = %next, "advanced recurring list");
        Ok(())
    }
}

/// The list's current due date (now if unset) plus one frequency interval.
pub fn next_order_date(list: &ShoppingList, now: DateTime<Utc>) -> DateTime<Utc> {
    list.next_order_date.unwrap_or(now) + Frequency::from_label(&list.frequency).interval()
}

/// Email of `provider_id` if it is a registered provider.
pub async fn provider_email(store: &dyn DocumentStore, provider_id: &str) -> Result<Option<String>> {
    let profile: Option<UserProfile> = fetch(store, collections::USERS, provider_id).await?;
    Ok(profile
        .filter(UserProfile::is_provider)
        .map(|p| p.email)
        .filter(|e| !e.is_empty()))
}
