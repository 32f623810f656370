//! The shopping assistant: natural-language query → ranked item offers.
//!
//! The run is a small state machine. Each stage reads and extends a
//! [`MatchRun`] and names the next stage; stages that find nothing to do end
//! the run early.
//!
//! ```text
//! check_relevance ──▶ load_user ──▶ extract ──▶ match_items ──▶ filter_by_distance ──▶ rank
//!        │                                           │
//!        └── not relevant ──▶ END                    └── no matches ──▶ END
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::config::MatchingConfig;
use crate::distance::{DistanceService, TravelEstimate};
use crate::embedding::EmbeddingProvider;
use crate::llm::{structured, ChatModel};
use crate::models::{collections, Item, UserProfile};
use crate::prompts;
use crate::search::{match_catalog, MatchedItem};
use crate::store::{fetch, list_as, DocumentStore};

const UNKNOWN_PROVIDER: &str = "Unknown Provider";
const UNKNOWN: &str = "Unknown";

/// Shopping intent pulled out of the query by the LLM. All strings are
/// lower-case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedIntent {
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub preferred_brand: Option<String>,
    /// Preferred delivery time in days.
    #[serde(default)]
    pub delivery_time: Option<i64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
}

impl ExtractedIntent {
    fn normalized(self) -> Self {
        let lower = |s: String| s.trim().to_lowercase();
        Self {
            items: self
                .items
                .into_iter()
                .map(lower)
                .filter(|s| !s.is_empty())
                .collect(),
            preferred_brand: self.preferred_brand.map(lower).filter(|s| !s.is_empty()),
            category: self.category.map(lower).filter(|s| !s.is_empty()),
            ..self
        }
    }

    /// Search queries: each item, suffixed with the category when known.
    pub fn search_queries(&self) -> Vec<String> {
        self.items
            .iter()
            .map(|item| match &self.category {
                Some(category) => format!("{} {}", item, category),
                None => item.clone(),
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct Relevance {
    is_relevant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub item_id: String,
    pub item_name: String,
    pub brand: String,
    pub provider_id: String,
    pub provider_name: String,
    pub price: f64,
    pub distance: String,
    pub duration: String,
    #[serde(skip)]
    pub distance_meters: Option<u64>,
}

/// Result of one assistant run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchOutcome {
    pub relevant: bool,
    pub extracted: Option<ExtractedIntent>,
    pub recommendations: Vec<Recommendation>,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    CheckRelevance,
    LoadUser,
    Extract,
    MatchItems,
    FilterByDistance,
    Rank,
    Done,
}

/// A matched item that survived distance filtering.
#[derive(Debug, Clone)]
struct Candidate {
    matched: MatchedItem,
    estimate: Option<TravelEstimate>,
}

/// Working state of a single run.
#[derive(Debug, Default)]
struct MatchRun {
    query: String,
    user_id: String,
    relevant: bool,
    user: Option<UserProfile>,
    intent: Option<ExtractedIntent>,
    matched: Vec<MatchedItem>,
    candidates: Vec<Candidate>,
    providers: HashMap<String, Option<UserProfile>>,
    recommendations: Vec<Recommendation>,
    messages: Vec<String>,
}

impl MatchRun {
    fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(user_id = %self.user_id, "{}", message);
        self.messages.push(message);
    }
}

pub struct ItemMatcher {
    store: Arc<dyn DocumentStore>,
    llm: Arc<dyn ChatModel>,
    embedder: Arc<dyn EmbeddingProvider>,
    distance: Arc<dyn DistanceService>,
    config: MatchingConfig,
    temperature: f32,
}

impl ItemMatcher {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        llm: Arc<dyn ChatModel>,
        embedder: Arc<dyn EmbeddingProvider>,
        distance: Arc<dyn DistanceService>,
        config: MatchingConfig,
        temperature: f32,
    ) -> Self {
        Self {
            store,
            llm,
            embedder,
            distance,
            config,
            temperature,
        }
    }

    /// Run the full pipeline for `user_id`.
    ///
    /// # Errors
    ///
    /// Fails when the user does not exist or the store/embedding provider
    /// fails. LLM failures degrade instead: a failed relevance check counts
    /// as "not relevant", a failed extraction as an empty intent.
    pub async fn run(&self, user_id: &str, query: &str) -> Result<MatchOutcome> {
        let mut run = MatchRun {
            query: query.trim().to_string(),
            user_id: user_id.to_string(),
            ..Default::default()
        };

        let mut stage = Stage::CheckRelevance;
        while stage != Stage::Done {
            stage = match stage {
                Stage::CheckRelevance => self.check_relevance(&mut run).await,
                Stage::LoadUser => self.load_user(&mut run).await?,
                Stage::Extract => self.extract(&mut run).await,
                Stage::MatchItems => self.match_items(&mut run).await?,
                Stage::FilterByDistance => self.filter_by_distance(&mut run).await?,
                Stage::Rank => self.rank(&mut run).await?,
                Stage::Done => Stage::Done,
            };
        }

        tracing::info!(
            user_id,
            llm = self.llm.model_name(),
            embedder = self.embedder.model_name(),
            relevant = run.relevant,
            recommendations = run.recommendations.len(),
            "item matching finished"
        );

        Ok(MatchOutcome {
            relevant: run.relevant,
            extracted: run.intent,
            recommendations: run.recommendations,
            messages: run.messages,
        })
    }

    async fn check_relevance(&self, run: &mut MatchRun) -> Stage {
        if run.query.is_empty() {
            run.note("Query is empty");
            return Stage::Done;
        }

        let prompt = prompts::relevance(&run.query);
        let schema = prompts::relevance_schema();
        match structured::<Relevance>(self.llm.as_ref(), &prompt, &schema, self.temperature).await
        {
            Ok(r) => {
                run.relevant = r.is_relevant;
                run.note(format!(
                    "Query relevance: {}",
                    if r.is_relevant { "Relevant" } else { "Not relevant" }
                ));
            }
            Err(e) => {
                tracing::warn!(error = %e, "relevance check failed");
                run.relevant = false;
                run.note("Error determining query relevance, assuming not relevant");
            }
        }

        if run.relevant {
            Stage::LoadUser
        } else {
            Stage::Done
        }
    }

    async fn load_user(&self, run: &mut MatchRun) -> Result<Stage> {
        let user: UserProfile = fetch(self.store.as_ref(), collections::USERS, &run.user_id)
            .await?
            .ok_or_else(|| anyhow!("user not found: {}", run.user_id))?;
        run.user = Some(user);
        Ok(Stage::Extract)
    }

    async fn extract(&self, run: &mut MatchRun) -> Stage {
        let prompt = prompts::extraction(&run.query);
        let schema = prompts::extraction_schema();
        let intent =
            match structured::<ExtractedIntent>(self.llm.as_ref(), &prompt, &schema, self.temperature)
                .await
            {
                Ok(intent) => intent.normalized(),
                Err(e) => {
                    tracing::warn!(error = %e, "intent extraction failed");
                    run.note("Could not extract items from the query");
                    ExtractedIntent::default()
                }
            };

        run.note(format!("Extracted items: {:?}", intent.items));
        run.intent = Some(intent);
        Stage::MatchItems
    }

    async fn match_items(&self, run: &mut MatchRun) -> Result<Stage> {
        let items: Vec<(String, Item)> =
            list_as(self.store.as_ref(), collections::ITEMS, None).await?;
        if items.is_empty() {
            run.note("No items found in database.");
            return Ok(Stage::Done);
        }

        let queries = run
            .intent
            .as_ref()
            .map(ExtractedIntent::search_queries)
            .unwrap_or_default();

        run.matched = match_catalog(
            self.store.as_ref(),
            self.embedder.as_ref(),
            &items,
            &queries,
            self.config.similarity_threshold,
            self.config.max_matches_per_query,
        )
        .await?;

        run.note(format!("Matched {} items", run.matched.len()));
        if run.matched.is_empty() {
            Ok(Stage::Done)
        } else {
            Ok(Stage::FilterByDistance)
        }
    }

    async fn provider(&self, run: &mut MatchRun, provider_id: &str) -> Result<Option<UserProfile>> {
        if let Some(cached) = run.providers.get(provider_id) {
            return Ok(cached.clone());
        }
        let profile: Option<UserProfile> =
            fetch(self.store.as_ref(), collections::USERS, provider_id)
                .await?
                .filter(UserProfile::is_provider);
        run.providers
            .insert(provider_id.to_string(), profile.clone());
        Ok(profile)
    }

    async fn filter_by_distance(&self, run: &mut MatchRun) -> Result<Stage> {
        let user_address = run
            .user
            .as_ref()
            .and_then(|u| u.address.clone())
            .filter(|a| !a.is_empty());

        let Some(user_address) = user_address else {
            run.note("No delivery address on file, skipping distance filter");
            run.candidates = run
                .matched
                .iter()
                .cloned()
                .map(|matched| Candidate {
                    matched,
                    estimate: None,
                })
                .collect();
            return Ok(Stage::Rank);
        };

        let mut provider_ids: Vec<String> = Vec::new();
        for m in &run.matched {
            if !provider_ids.contains(&m.item.provider_id) {
                provider_ids.push(m.item.provider_id.clone());
            }
        }

        let mut estimates: Vec<(String, TravelEstimate)> = Vec::new();
        for provider_id in provider_ids {
            let Some(provider) = self.provider(run, &provider_id).await? else {
                continue;
            };
            let Some(address) = provider.address.filter(|a| !a.is_empty()) else {
                continue;
            };
            match self.distance.estimate(&user_address, &address).await {
                Ok(estimate) => estimates.push((provider_id, estimate)),
                Err(e) => {
                    tracing::warn!(provider_id = %provider_id, error = %e, "distance lookup failed")
                }
            }
        }

        estimates.sort_by_key(|(_, e)| e.distance_meters);
        estimates.truncate(self.config.max_providers);
        let closest: HashMap<String, TravelEstimate> = estimates.into_iter().collect();

        run.candidates = run
            .matched
            .iter()
            .filter_map(|m| {
                closest.get(&m.item.provider_id).map(|estimate| Candidate {
                    matched: m.clone(),
                    estimate: Some(estimate.clone()),
                })
            })
            .collect();

        run.note(format!(
            "{} items from {} nearby providers",
            run.candidates.len(),
            closest.len()
        ));
        Ok(Stage::Rank)
    }

    async fn rank(&self, run: &mut MatchRun) -> Result<Stage> {
        let candidates = std::mem::take(&mut run.candidates);
        let mut recommendations = Vec::with_capacity(candidates.len());

        for Candidate { matched, estimate } in candidates {
            let provider_name = self
                .provider(run, &matched.item.provider_id)
                .await?
                .map(|p| p.name)
                .unwrap_or_else(|| UNKNOWN_PROVIDER.to_string());

            recommendations.push(Recommendation {
                item_id: matched.id,
                item_name: matched.item.name,
                brand: matched.item.brand,
                provider_id: matched.item.provider_id,
                provider_name,
                price: matched.item.price,
                distance: estimate
                    .as_ref()
                    .map(|e| e.distance_text.clone())
                    .unwrap_or_else(|| UNKNOWN.to_string()),
                duration: estimate
                    .as_ref()
                    .map(|e| e.duration_text.clone())
                    .unwrap_or_else(|| UNKNOWN.to_string()),
                distance_meters: estimate.map(|e| e.distance_meters),
            });
        }

        let preferred = run
            .intent
            .as_ref()
            .and_then(|i| i.preferred_brand.clone());
        sort_recommendations(&mut recommendations, preferred.as_deref());

        run.note(format!("Ranked {} recommendations", recommendations.len()));
        run.recommendations = recommendations;
        Ok(Stage::Done)
    }
}

/// Nearest first (unknown distance last), then the preferred brand, then
/// cheapest.
pub fn sort_recommendations(recs: &mut [Recommendation], preferred_brand: Option<&str>) {
    let brand_rank = |r: &Recommendation| match preferred_brand {
        Some(brand) if r.brand.eq_ignore_ascii_case(brand) => 0,
        Some(_) => 1,
        None => 0,
    };
    recs.sort_by(|a, b| {
        let da = a.distance_meters.unwrap_or(u64::MAX);
        let db = b.distance_meters.unwrap_or(u64::MAX);
        da.cmp(&db)
            .then(brand_rank(a).cmp(&brand_rank(b)))
            .then(a.price.total_cmp(&b.price))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str, brand: &str, price: f64, meters: Option<u64>) -> Recommendation {
        Recommendation {
            item_id: name.to_string(),
            item_name: name.to_string(),
            brand: brand.to_string(),
            provider_id: "p".to_string(),
            provider_name: "P".to_string(),
            price,
            distance: UNKNOWN.to_string(),
            duration: UNKNOWN.to_string(),
            distance_meters: meters,
        }
    }

    #[test]
    fn test_search_queries_append_category() {
        let intent = ExtractedIntent {
            items: vec!["coffee".into(), "milk".into()],
            category: Some("beverages".into()),
            ..Default::default()
        };
        assert_eq!(
            intent.search_queries(),
            vec!["coffee beverages", "milk beverages"]
        );
        let intent = ExtractedIntent {
            items: vec!["coffee".into()],
            ..Default::default()
        };
        assert_eq!(intent.search_queries(), vec!["coffee"]);
    }

    #[test]
    fn test_intent_normalization_lowercases() {
        let intent = ExtractedIntent {
            items: vec!["  Coffee ".into(), "".into()],
            preferred_brand: Some("Nescafe".into()),
            category: Some(" ".into()),
            ..Default::default()
        }
        .normalized();
        assert_eq!(intent.items, vec!["coffee"]);
        assert_eq!(intent.preferred_brand.as_deref(), Some("nescafe"));
        assert!(intent.category.is_none());
    }

    #[test]
    fn test_sort_by_distance_then_brand_then_price() {
        let mut recs = vec![
            rec("far", "a", 1.0, Some(9000)),
            rec("unknown", "a", 0.5, None),
            rec("near-other", "b", 1.0, Some(100)),
            rec("near-pref-pricey", "a", 5.0, Some(100)),
            rec("near-pref-cheap", "a", 2.0, Some(100)),
        ];
        sort_recommendations(&mut recs, Some("A"));
        let order: Vec<_> = recs.iter().map(|r| r.item_name.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "near-pref-cheap",
                "near-pref-pricey",
                "near-other",
                "far",
                "unknown"
            ]
        );
    }
}
