//! Semantic matching of shopping queries against the item catalog.
//!
//! Each catalog item is embedded from `"{name} {brand} {description}
//! {category}"`. For every query vector the `k` most similar items are
//! considered and those scoring strictly above the similarity threshold are
//! kept. Vectors are cached in the store keyed by item id and a SHA-256 of
//! the embedded text, so only new or edited items hit the embedding API.

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};

use crate::embedding::{cosine_similarity, EmbeddingProvider};
use crate::models::Item;
use crate::store::DocumentStore;

/// A catalog entry selected for a query.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticMatch {
    /// Index into the corpus.
    pub index: usize,
    pub score: f32,
}

/// An item that matched, with its id and best similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedItem {
    pub id: String,
    pub item: Item,
    pub score: f32,
}

pub fn item_corpus_text(item: &Item) -> String {
    format!(
        "{} {} {} {}",
        item.name,
        item.brand,
        item.description.as_deref().unwrap_or(""),
        item.category
    )
}

pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Top-k cosine matching.
///
/// For each query, the `k` highest-scoring corpus entries (descending) are
/// taken and kept when their score is strictly greater than `threshold`.
/// Results are deduplicated by corpus index in first-seen order; a repeated
/// entry keeps its best score.
pub fn top_k_matches(
    queries: &[Vec<f32>],
    corpus: &[Vec<f32>],
    threshold: f32,
    k: usize,
) -> Vec<SemanticMatch> {
    let mut out: Vec<SemanticMatch> = Vec::new();

    for query in queries {
        let mut scored: Vec<(usize, f32)> = corpus
            .iter()
            .enumerate()
            .map(|(i, vec)| (i, cosine_similarity(query, vec)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        for (index, score) in scored.into_iter().take(k) {
            if score <= threshold {
                continue;
            }
            match out.iter_mut().find(|m| m.index == index) {
                Some(existing) => existing.score = existing.score.max(score),
                None => out.push(SemanticMatch { index, score }),
            }
        }
    }

    out
}

/// Embed every catalog item, reusing cached vectors whose content hash
/// still matches.
pub async fn embed_catalog(
    store: &dyn DocumentStore,
    embedder: &dyn EmbeddingProvider,
    items: &[(String, Item)],
) -> Result<Vec<Vec<f32>>> {
    let model = embedder.model_name().to_string();
    let dims = embedder.dims();
    // A width of 0 means the provider does not know its own.
    let fits = |v: &[f32]| dims == 0 || v.len() == dims;
    let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(items.len());
    let mut pending: Vec<(usize, String, String)> = Vec::new();

    for (i, (id, item)) in items.iter().enumerate() {
        let text = item_corpus_text(item);
        let hash = content_hash(&text);
        match store.get_embedding(id, &model).await? {
            Some(cached) if cached.content_hash == hash && fits(&cached.vector) => {
                vectors.push(Some(cached.vector))
            }
            _ => {
                vectors.push(None);
                pending.push((i, text, hash));
            }
        }
    }

    if !pending.is_empty() {
        tracing::info!(
            count = pending.len(),
            cached = items.len() - pending.len(),
            "embedding catalog items"
        );
        let texts: Vec<String> = pending.iter().map(|(_, text, _)| text.clone()).collect();
        let fresh = embedder.embed(&texts).await?;
        if fresh.len() != pending.len() {
            bail!(
                "embedding provider returned {} vectors for {} items",
                fresh.len(),
                pending.len()
            );
        }
        if let Some(bad) = fresh.iter().find(|v| !fits(v)) {
            bail!(
                "embedding provider returned {}-dimensional vectors, expected {} (check embedding.dims)",
                bad.len(),
                dims
            );
        }
        for ((i, _, hash), vector) in pending.into_iter().zip(fresh) {
            store
                .put_embedding(&items[i].0, &model, &hash, &vector)
                .await?;
            vectors[i] = Some(vector);
        }
    }

    Ok(vectors.into_iter().map(Option::unwrap_or_default).collect())
}

/// Semantic search of `queries` over `items`.
pub async fn match_catalog(
    store: &dyn DocumentStore,
    embedder: &dyn EmbeddingProvider,
    items: &[(String, Item)],
    queries: &[String],
    threshold: f32,
    k: usize,
) -> Result<Vec<MatchedItem>> {
    if items.is_empty() || queries.is_empty() {
        return Ok(Vec::new());
    }

    let corpus = embed_catalog(store, embedder, items).await?;
    let query_vecs = embedder.embed(queries).await?;

    Ok(top_k_matches(&query_vecs, &corpus, threshold, k)
        .into_iter()
        .map(|m| MatchedItem {
            id: items[m.index].0.clone(),
            item: items[m.index].1.clone(),
            score: m.score,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn item(name: &str, category: &str) -> Item {
        Item {
            name: name.to_string(),
            category: category.to_string(),
            brand: "acme".to_string(),
            price: 1.0,
            description: None,
            provider_id: "p1".to_string(),
            available_stock: 1,
            general_item_id: None,
            image_url: None,
        }
    }

    /// Embeds by keyword presence: [coffee, milk, tea].
    struct KeywordEmbedder {
        calls: AtomicUsize,
        texts: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    ["coffee", "milk", "tea"]
                        .iter()
                        .map(|w| if t.contains(w) { 1.0 } else { 0.0 })
                        .collect()
                })
                .collect())
        }
    }

    #[test]
    fn test_corpus_text_joins_fields() {
        let mut it = item("milk", "dairy");
        it.description = Some("whole".into());
        assert_eq!(item_corpus_text(&it), "milk acme whole dairy");
    }

    #[test]
    fn test_top_k_respects_threshold_and_k() {
        let corpus = vec![
            vec![1.0, 0.0],
            vec![0.9, 0.1],
            vec![0.0, 1.0],
            vec![0.8, 0.2],
        ];
        let matches = top_k_matches(&[vec![1.0, 0.0]], &corpus, 0.75, 2);
        let idx: Vec<usize> = matches.iter().map(|m| m.index).collect();
        assert_eq!(idx, vec![0, 1]);

        // Exactly-at-threshold scores are excluded
        let matches = top_k_matches(&[vec![1.0, 0.0]], &[vec![1.0, 0.0]], 1.0, 7);
        assert!(matches.is_empty());
    }

    #[test]
    fn test_top_k_dedupes_across_queries() {
        let corpus = vec![vec![1.0, 1.0], vec![1.0, 0.0]];
        let queries = vec![vec![1.0, 0.0], vec![1.0, 1.0]];
        let matches = top_k_matches(&queries, &corpus, 0.5, 7);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].index, 1);
        assert_eq!(matches[1].index, 0);
        assert!((matches[1].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_match_catalog_uses_cache() {
        let store = InMemoryStore::new();
        let embedder = KeywordEmbedder {
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
        };
        let items = vec![
            ("i1".to_string(), item("coffee beans", "beverages")),
            ("i2".to_string(), item("milk", "dairy")),
        ];
        let queries = vec!["coffee".to_string()];

        let first = match_catalog(&store, &embedder, &items, &queries, 0.75, 7)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, "i1");
        // corpus (2 texts) + query (1 text)
        assert_eq!(embedder.texts.load(Ordering::SeqCst), 3);

        match_catalog(&store, &embedder, &items, &queries, 0.75, 7)
            .await
            .unwrap();
        // Second run embeds only the query
        assert_eq!(embedder.texts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_cached_vector_of_wrong_width_is_reembedded() {
        let store = InMemoryStore::new();
        let embedder = KeywordEmbedder {
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
        };
        let items = vec![("i1".to_string(), item("milk", "dairy"))];
        let hash = content_hash(&item_corpus_text(&items[0].1));
        store
            .put_embedding("i1", "keyword", &hash, &[1.0, 0.0])
            .await
            .unwrap();

        let vecs = embed_catalog(&store, &embedder, &items).await.unwrap();
        assert_eq!(vecs[0], vec![0.0, 1.0, 0.0]);
        assert_eq!(embedder.texts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejects_vectors_of_unexpected_width() {
        struct Narrow;

        #[async_trait]
        impl EmbeddingProvider for Narrow {
            fn model_name(&self) -> &str {
                "narrow"
            }
            fn dims(&self) -> usize {
                4
            }
            async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
                Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
            }
        }

        let store = InMemoryStore::new();
        let items = vec![("i1".to_string(), item("milk", "dairy"))];
        let err = embed_catalog(&store, &Narrow, &items).await.unwrap_err();
        assert!(err.to_string().contains("expected 4"));
        assert!(store.get_embedding("i1", "narrow").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_edited_item_is_reembedded() {
        let store = InMemoryStore::new();
        let embedder = KeywordEmbedder {
            calls: AtomicUsize::new(0),
            texts: AtomicUsize::new(0),
        };
        let mut items = vec![("i1".to_string(), item("milk", "dairy"))];
        embed_catalog(&store, &embedder, &items).await.unwrap();
        items[0].1.name = "green tea".to_string();
        let vecs = embed_catalog(&store, &embedder, &items).await.unwrap();
        assert_eq!(vecs[0], vec![0.0, 0.0, 1.0]);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }
}
