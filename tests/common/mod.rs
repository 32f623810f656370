//! Fakes for the external providers, shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use grocer::api::AppState;
use grocer::auth::{AuthClaims, AuthError, AuthProvider, AuthSession};
use grocer::config::Config;
use grocer::distance::{DistanceService, TravelEstimate};
use grocer::embedding::EmbeddingProvider;
use grocer::llm::{ChatModel, Prompt};
use grocer::mailer::Mailer;
use grocer::matcher::ItemMatcher;
use grocer::models::Address;
use grocer::store::{DocumentStore, InMemoryStore};

/// Accounts live in memory; the id token of a user is `token-<uid>`.
#[derive(Default)]
pub struct FakeAuth {
    accounts: Mutex<HashMap<String, (String, String)>>,
}

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn sign_up(&self, email: &str, password: &str, _: &str) -> Result<String, AuthError> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(email) {
            return Err(AuthError::EmailExists);
        }
        let uid = format!("uid{}", accounts.len() + 1);
        accounts.insert(email.to_string(), (uid.clone(), password.to_string()));
        Ok(uid)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let accounts = self.accounts.lock().unwrap();
        match accounts.get(email) {
            Some((uid, pw)) if pw == password => Ok(AuthSession {
                uid: uid.clone(),
                id_token: format!("token-{}", uid),
                refresh_token: "refresh".to_string(),
                expires_in: 3600,
            }),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    async fn verify_token(&self, token: &str) -> Result<AuthClaims, AuthError> {
        let uid = token.strip_prefix("token-").ok_or(AuthError::InvalidToken)?;
        let accounts = self.accounts.lock().unwrap();
        accounts
            .iter()
            .find(|(_, (u, _))| u == uid)
            .map(|(email, (u, _))| AuthClaims {
                uid: u.clone(),
                email: Some(email.clone()),
            })
            .ok_or(AuthError::InvalidToken)
    }
}

/// Relevance: anything mentioning "weather" is off-topic. Extraction: the
/// known product words found in the query, plus "nestle" as the brand when
/// mentioned. Free text: a fixed email body.
pub struct FakeChat;

const PRODUCTS: [&str; 3] = ["coffee", "milk", "bread"];

#[async_trait]
impl ChatModel for FakeChat {
    fn model_name(&self) -> &str {
        "fake-chat"
    }

    async fn generate(&self, prompt: &Prompt, _temperature: f32) -> Result<String> {
        Ok(format!("Hello provider,\n\n{}\n", prompt.user))
    }

    async fn generate_json(&self, prompt: &Prompt, schema: &Value, _: f32) -> Result<Value> {
        let query = prompt.user.to_lowercase();
        if schema["properties"].get("is_relevant").is_some() {
            return Ok(json!({ "is_relevant": !query.contains("weather") }));
        }
        let items: Vec<&str> = PRODUCTS
            .iter()
            .copied()
            .filter(|p| query.contains(p))
            .collect();
        let brand = query.contains("nestle").then_some("Nestle");
        Ok(json!({ "items": items, "preferred_brand": brand }))
    }
}

/// Embeds by keyword presence over the product words.
#[derive(Default)]
pub struct KeywordEmbedder {
    pub texts: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword"
    }
    fn dims(&self) -> usize {
        PRODUCTS.len()
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let t = t.to_lowercase();
                PRODUCTS
                    .iter()
                    .map(|w| if t.contains(w) { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect())
    }
}

/// Distance in kilometres is the destination zip code.
pub struct ZipDistance;

#[async_trait]
impl DistanceService for ZipDistance {
    async fn estimate(&self, _origin: &Address, destination: &Address) -> Result<TravelEstimate> {
        let Ok(km) = destination.zip_code.parse::<u64>() else {
            bail!("NOT_FOUND");
        };
        Ok(TravelEstimate {
            distance_text: format!("{} km", km),
            duration_text: format!("{} mins", km * 2),
            distance_meters: km * 1000,
            duration_seconds: km * 120,
        })
    }
}

/// Records every sent email; fails for recipients in `reject`.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, String, String)>>,
    pub reject: Vec<String>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        if self.reject.iter().any(|r| r == to) {
            bail!("mailbox unavailable");
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

pub fn matcher(store: Arc<dyn DocumentStore>, config: &Config) -> ItemMatcher {
    ItemMatcher::new(
        store,
        Arc::new(FakeChat),
        Arc::new(KeywordEmbedder::default()),
        Arc::new(ZipDistance),
        config.matching.clone(),
        0.0,
    )
}

pub fn app_state() -> AppState {
    let config = Config::minimal();
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryStore::new());
    AppState {
        matcher: Arc::new(matcher(store.clone(), &config)),
        config: Arc::new(config),
        store,
        auth: Arc::new(FakeAuth::default()),
    }
}

pub fn address(street: &str, zip: &str) -> Value {
    json!({ "street": street, "city": "Lahore", "zipCode": zip })
}
