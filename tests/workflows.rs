mod common;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

use common::{address, matcher, FakeChat, RecordingMailer};
use grocer::config::Config;
use grocer::models::{collections, ShoppingList};
use grocer::notifier::{NotificationStatus, Notifier};
use grocer::store::{
    fetch, CachedEmbedding, DocumentStore, FieldFilter, InMemoryStore, Record,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
}

fn user(name: &str, email: &str, user_type: &str, addr: Option<Value>) -> Value {
    json!({
        "email": email,
        "name": name,
        "userType": user_type,
        "phoneNumber": "555",
        "address": addr
    })
}

fn order(user_id: &str, provider_id: &str, status: &str, when: Option<DateTime<Utc>>) -> Value {
    json!({
        "userId": user_id,
        "providerId": provider_id,
        "items": [
            {"itemId": "i1", "name": "milk", "quantity": 2, "price": 1.5},
            {"itemId": "i2", "name": "bread", "quantity": 1, "price": 0.0}
        ],
        "totalPrice": 99.0,
        "status": status,
        "deliveryAddress": address("1 Mall Rd", "5"),
        "scheduledDeliveryTime": when
    })
}

async fn seed(store: &dyn DocumentStore, collection: &str, id: &str, doc: Value) {
    store.put(collection, id, &doc).await.unwrap();
}

async fn notifier_fixture() -> (Arc<InMemoryStore>, Arc<RecordingMailer>, Notifier) {
    let store = Arc::new(InMemoryStore::new());
    let s = store.as_ref();
    seed(s, collections::USERS, "p1", user("Corner Shop", "shop@example.com", "provider", None)).await;
    seed(s, collections::USERS, "u1", user("Ana", "ana@example.com", "consumer", None)).await;

    seed(s, collections::ORDERS, "o1", order("u1", "p1", "pending", Some(now() + Duration::days(1)))).await;
    seed(s, collections::ORDERS, "o2", order("u1", "p1", "pending", Some(now() + Duration::days(10)))).await;
    seed(s, collections::ORDERS, "o3", order("u1", "p1", "delivered", Some(now()))).await;
    seed(s, collections::ORDERS, "o4", order("ghost", "nobody", "pending", None)).await;

    seed(
        s,
        collections::LISTS,
        "weekly",
        json!({
            "userId": "u1",
            "name": "Weekly basics",
            "frequency": "weekly",
            "nextOrderDate": now() + Duration::days(2),
            "orders": ["o1", "o2"]
        }),
    )
    .await;
    seed(
        s,
        collections::LISTS,
        "empty",
        json!({
            "userId": "u1",
            "name": "Nothing yet",
            "frequency": "monthly",
            "nextOrderDate": now()
        }),
    )
    .await;

    let mailer = Arc::new(RecordingMailer::default());
    let notifier = Notifier::new(store.clone(), Arc::new(FakeChat), mailer.clone(), 3, 0.5);
    (store, mailer, notifier)
}

#[tokio::test]
async fn test_notifier_emails_each_due_order_once() {
    let (store, mailer, notifier) = notifier_fixture().await;

    let results = notifier.run(now()).await.unwrap();
    let summary: Vec<(&str, &str, bool)> = results
        .iter()
        .map(|r| (r.order_id.as_str(), r.source_id.as_str(), r.is_success()))
        .collect();
    assert_eq!(
        summary,
        vec![("o1", "weekly", true), ("o2", "weekly", true), ("o4", "o4", false)]
    );
    assert_eq!(
        results[2].status,
        NotificationStatus::Fail {
            reason: "No provider email found".to_string()
        }
    );

    let sent = mailer.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0, "shop@example.com");
    assert_eq!(sent[0].1, "Order Notification - o1");
    assert!(sent[0].2.contains("customer 'Ana'"));
    // Total is recomputed from the order lines, not the stored totalPrice
    assert!(sent[0].2.contains("Total: 3.00"));

    let weekly: ShoppingList = fetch(store.as_ref(), collections::LISTS, "weekly")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(weekly.next_order_date, Some(now() + Duration::days(9)));

    let empty: ShoppingList = fetch(store.as_ref(), collections::LISTS, "empty")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(empty.next_order_date, Some(now()));
}

#[tokio::test]
async fn test_failed_send_does_not_advance_list() {
    let store = Arc::new(InMemoryStore::new());
    let s = store.as_ref();
    seed(s, collections::USERS, "p1", user("Corner Shop", "shop@example.com", "provider", None)).await;
    seed(s, collections::ORDERS, "o1", order("u1", "p1", "pending", Some(now() + Duration::days(30)))).await;
    seed(
        s,
        collections::LISTS,
        "weekly",
        json!({ "userId": "u1", "name": "Weekly", "frequency": "weekly",
                "nextOrderDate": now(), "orders": ["o1"] }),
    )
    .await;

    let mailer = Arc::new(RecordingMailer {
        reject: vec!["shop@example.com".to_string()],
        ..Default::default()
    });
    let notifier = Notifier::new(store.clone(), Arc::new(FakeChat), mailer, 3, 0.5);

    let results = notifier.run(now()).await.unwrap();
    assert_eq!(results.len(), 1);
    match &results[0].status {
        NotificationStatus::Fail { reason } => assert!(reason.starts_with("Email sending failed")),
        other => panic!("expected failure, got {:?}", other),
    }
    let list: ShoppingList = fetch(store.as_ref(), collections::LISTS, "weekly")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(list.next_order_date, Some(now()));
}

#[tokio::test]
async fn test_matcher_without_address_skips_distance() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
    let s = store.as_ref();
    seed(s, collections::USERS, "u1", user("Ana", "ana@example.com", "consumer", None)).await;
    seed(
        s,
        collections::USERS,
        "p1",
        user("Corner Shop", "shop@example.com", "provider", Some(address("2 Shop St", "3"))),
    )
    .await;
    seed(
        s,
        collections::ITEMS,
        "i1",
        json!({ "name": "Bread loaf", "category": "bakery", "brand": "Dawn",
                "price": 1.2, "providerId": "p1", "availableStock": 4 }),
    )
    .await;

    let matcher = matcher(store.clone(), &Config::minimal());
    let outcome = matcher.run("u1", "some bread please").await.unwrap();
    assert!(outcome.relevant);
    assert_eq!(outcome.recommendations.len(), 1);
    assert_eq!(outcome.recommendations[0].item_id, "i1");
    assert_eq!(outcome.recommendations[0].provider_name, "Corner Shop");
    assert_eq!(outcome.recommendations[0].distance, "Unknown");
}

#[tokio::test]
async fn test_matcher_requires_known_user() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
    let matcher = matcher(store, &Config::minimal());
    assert!(matcher.run("ghost", "milk").await.is_err());

    // Off-topic queries end before the user lookup
    let outcome = matcher.run("ghost", "weather tomorrow").await.unwrap();
    assert!(!outcome.relevant);
}

/// Rejects every write to shopping lists; everything else goes through.
struct FrozenLists(InMemoryStore);

#[async_trait]
impl DocumentStore for FrozenLists {
    async fn insert(&self, collection: &str, data: &Value) -> Result<String> {
        self.0.insert(collection, data).await
    }
    async fn put(&self, collection: &str, id: &str, data: &Value) -> Result<()> {
        self.0.put(collection, id, data).await
    }
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        self.0.get(collection, id).await
    }
    async fn update(&self, collection: &str, id: &str, patch: &Value) -> Result<bool> {
        if collection == collections::LISTS {
            bail!("database is read-only");
        }
        self.0.update(collection, id, patch).await
    }
    async fn list(&self, collection: &str, filter: Option<&FieldFilter>) -> Result<Vec<Record>> {
        self.0.list(collection, filter).await
    }
    async fn get_embedding(&self, key: &str, model: &str) -> Result<Option<CachedEmbedding>> {
        self.0.get_embedding(key, model).await
    }
    async fn put_embedding(
        &self,
        key: &str,
        model: &str,
        content_hash: &str,
        vector: &[f32],
    ) -> Result<()> {
        self.0.put_embedding(key, model, content_hash, vector).await
    }
}

#[tokio::test]
async fn test_failed_list_advance_keeps_run_going() {
    let store = Arc::new(FrozenLists(InMemoryStore::new()));
    let s = store.as_ref();
    seed(s, collections::USERS, "p1", user("Corner Shop", "shop@example.com", "provider", None)).await;
    seed(s, collections::USERS, "u1", user("Ana", "ana@example.com", "consumer", None)).await;
    seed(s, collections::ORDERS, "o1", order("u1", "p1", "pending", Some(now() + Duration::days(1)))).await;
    seed(s, collections::ORDERS, "o5", order("u1", "p1", "pending", Some(now() + Duration::days(2)))).await;
    seed(
        s,
        collections::LISTS,
        "weekly",
        json!({ "userId": "u1", "name": "Weekly", "frequency": "weekly",
                "nextOrderDate": now(), "orders": ["o1"] }),
    )
    .await;

    let mailer = Arc::new(RecordingMailer::default());
    let notifier = Notifier::new(store.clone(), Arc::new(FakeChat), mailer.clone(), 3, 0.5);

    let results = notifier.run(now()).await.unwrap();
    let summary: Vec<(&str, &str, bool)> = results
        .iter()
        .map(|r| (r.order_id.as_str(), r.source_id.as_str(), r.is_success()))
        .collect();
    assert_eq!(summary, vec![("o1", "weekly", true), ("o5", "o5", true)]);
    assert_eq!(mailer.sent.lock().unwrap().len(), 2);

    // The list stays due for the next run
    let list: ShoppingList = fetch(store.as_ref(), collections::LISTS, "weekly")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(list.next_order_date, Some(now()));
}

fn provider_at(name: &str, zip: Option<&str>) -> Value {
    let email = format!("{}@example.com", name.to_lowercase().replace(' ', "."));
    user(name, &email, "provider", zip.map(|z| address("9 Market St", z)))
}

fn milk_from(provider_id: &str, brand: &str) -> Value {
    json!({ "name": "Fresh milk", "category": "dairy", "brand": brand,
            "price": 1.0, "providerId": provider_id, "availableStock": 10 })
}

#[tokio::test]
async fn test_matcher_keeps_only_nearest_providers() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
    let s = store.as_ref();
    seed(s, collections::USERS, "u1", user("Ana", "ana@example.com", "consumer", Some(address("1 Home Rd", "1")))).await;
    seed(s, collections::USERS, "far", provider_at("Far Mart", Some("8"))).await;
    seed(s, collections::USERS, "near", provider_at("Near Mart", Some("2"))).await;
    seed(s, collections::ITEMS, "i-far", milk_from("far", "Cowbell")).await;
    seed(s, collections::ITEMS, "i-near", milk_from("near", "Dairyland")).await;

    let mut config = Config::minimal();
    config.matching.max_providers = 1;
    let outcome = matcher(store.clone(), &config).run("u1", "milk").await.unwrap();

    let picked: Vec<(&str, &str)> = outcome
        .recommendations
        .iter()
        .map(|r| (r.item_id.as_str(), r.distance.as_str()))
        .collect();
    assert_eq!(picked, vec![("i-near", "2 km")]);
}

#[tokio::test]
async fn test_matcher_drops_providers_without_route() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
    let s = store.as_ref();
    seed(s, collections::USERS, "u1", user("Ana", "ana@example.com", "consumer", Some(address("1 Home Rd", "1")))).await;
    seed(s, collections::USERS, "homeless", provider_at("No Address", None)).await;
    seed(s, collections::USERS, "lost", provider_at("Lost Shop", Some("unknown"))).await;
    seed(s, collections::USERS, "ok", provider_at("Good Shop", Some("4"))).await;
    seed(s, collections::ITEMS, "i1", milk_from("homeless", "A")).await;
    seed(s, collections::ITEMS, "i2", milk_from("lost", "B")).await;
    seed(s, collections::ITEMS, "i3", milk_from("ok", "C")).await;

    let outcome = matcher(store.clone(), &Config::minimal())
        .run("u1", "milk")
        .await
        .unwrap();

    assert_eq!(outcome.recommendations.len(), 1);
    assert_eq!(outcome.recommendations[0].item_id, "i3");
    assert_eq!(outcome.recommendations[0].provider_name, "Good Shop");
    assert_eq!(outcome.recommendations[0].duration, "8 mins");
}

#[tokio::test]
async fn test_matcher_with_empty_catalog() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
    seed(store.as_ref(), collections::USERS, "u1", user("Ana", "ana@example.com", "consumer", None)).await;

    let outcome = matcher(store.clone(), &Config::minimal())
        .run("u1", "coffee and milk")
        .await
        .unwrap();

    assert!(outcome.relevant);
    assert!(outcome.recommendations.is_empty());
    assert!(outcome
        .messages
        .iter()
        .any(|m| m == "No items found in database."));
}

#[tokio::test]
async fn test_matcher_with_nothing_extracted() {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
    let s = store.as_ref();
    seed(s, collections::USERS, "u1", user("Ana", "ana@example.com", "consumer", None)).await;
    seed(s, collections::USERS, "p1", provider_at("Corner Shop", Some("3"))).await;
    seed(s, collections::ITEMS, "i1", milk_from("p1", "Dairyland")).await;

    let outcome = matcher(store.clone(), &Config::minimal())
        .run("u1", "something tasty")
        .await
        .unwrap();

    assert!(outcome.relevant);
    assert_eq!(outcome.extracted.map(|e| e.items), Some(Vec::new()));
    assert!(outcome.recommendations.is_empty());
    assert!(outcome.messages.iter().any(|m| m == "Matched 0 items"));
}
