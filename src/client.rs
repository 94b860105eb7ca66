//! Fetch-through client over the entity cache
//!
//! Pairs an [`EntityCache`] with a [`PageFetcher`] so callers ask for
//! entities and pages without caring whether they come from memory or the
//! network. Fetches of the same page are serialized through a
//! [`KeyedLock`], so concurrent callers trigger one request.

use crate::cache::{EntityCache, EntityCacheConfig, FetchDecision};
use crate::error::{CacheError, Result};
use crate::lock::KeyedLock;
use crate::uri::{canonical_uri, uri_without_fragment};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// Source of compacted page documents
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the compacted JSON-LD document for a fragment-free page URI
    async fn fetch(&self, uri: &str) -> Result<Value>;
}

/// Entity lookups that fall back to fetching the owning page
pub struct DataClient<F: PageFetcher> {
    cache: EntityCache,
    fetcher: F,
    locks: KeyedLock,
}

impl<F: PageFetcher> DataClient<F> {
    /// Create a client with its own cache
    pub fn new(fetcher: F, config: EntityCacheConfig) -> Result<Self> {
        let locks = KeyedLock::new(config.lock_poll_interval);
        let cache = EntityCache::with_config(config)?;
        Ok(Self {
            cache,
            fetcher,
            locks,
        })
    }

    /// Create a client around an existing cache
    pub fn with_cache(cache: EntityCache, fetcher: F) -> Self {
        let locks = KeyedLock::new(cache.config().lock_poll_interval);
        Self {
            cache,
            fetcher,
            locks,
        }
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// The document of the page holding `uri`, fetched at most once
    /// concurrently
    pub async fn get_page(&self, uri: &str) -> Result<Value> {
        if self.cache.is_disposed() {
            return Err(CacheError::Disposed);
        }

        let key = uri_without_fragment(uri)?;
        let _guard = self.locks.acquire(&key).await;

        if let Some(document) = self.cache.get_entity_from_page(&key)? {
            return Ok(document);
        }

        debug!("Fetching page: {}", key);
        let document = self.fetcher.fetch(&key).await?;
        if !self.cache.add(document.clone(), &key)? {
            debug!("Page {} was cached while fetching", key);
        }

        Ok(document)
    }

    /// Look up an entity, fetching its page on a miss
    pub async fn get_entity(&self, uri: &str) -> Result<Option<Value>> {
        if let Some(entity) = self.cache.get_entity(uri).await? {
            return Ok(Some(entity));
        }

        // the page is here and does not describe the entity
        if self.cache.has_page_of_entity(uri) {
            return Ok(None);
        }

        self.get_page(uri).await?;
        self.cache.get_entity(uri).await
    }

    /// Make sure `required_properties` of `uri` are known, fetching only
    /// when the cache cannot answer
    pub async fn ensure<S: AsRef<str> + Sync>(
        &self,
        uri: &str,
        required_properties: &[S],
    ) -> Result<Option<Value>> {
        let decision = self.cache.fetch_needed(uri, required_properties).await?;
        debug!("Ensure {}: {}", uri, decision);

        match decision {
            FetchDecision::PageCached => {}
            FetchDecision::GraphCovered => {
                if let Some(entity) = self.cache.get_entity(uri).await? {
                    return Ok(Some(entity));
                }
                // nothing required, but nothing known either
                self.get_page(uri).await?;
            }
            FetchDecision::Fetch => {
                self.get_page(uri).await?;
            }
        }

        self.cache.get_entity(uri).await
    }

    /// [`ensure`](Self::ensure) for a node object found inside another
    /// document
    ///
    /// The node's `@id` names the entity. A node without an absolute `@id`
    /// cannot be looked up and is returned unchanged.
    pub async fn ensure_node<S: AsRef<str> + Sync>(
        &self,
        node: &Value,
        required_properties: &[S],
    ) -> Result<Option<Value>> {
        let id = match node.get("@id").and_then(Value::as_str) {
            Some(id) if canonical_uri(id).is_ok() => id,
            _ => {
                debug!("Node has no absolute @id, returning it as is");
                return Ok(Some(node.clone()));
            }
        };

        self.ensure(id, required_properties).await
    }

    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct CountingFetcher {
        pages: HashMap<String, Value>,
        calls: AtomicUsize,
    }

    impl CountingFetcher {
        fn new(pages: Vec<(&str, Value)>) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .map(|(uri, doc)| (uri.to_string(), doc))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageFetcher for CountingFetcher {
        async fn fetch(&self, uri: &str) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.pages.get(uri).cloned().ok_or_else(|| CacheError::Fetch {
                uri: uri.to_string(),
                reason: "404".to_string(),
            })
        }
    }

    fn basic_graph() -> Value {
        json!({
            "@context": {"@vocab": "http://schema.org/test#"},
            "@id": "http://test/doc",
            "name": "test",
            "child": {
                "@id": "http://test/doc#a",
                "name": "childA",
                "child": {"@id": "http://test/doc#c", "name": "grandChildC"}
            }
        })
    }

    fn client() -> DataClient<CountingFetcher> {
        DataClient::new(
            CountingFetcher::new(vec![("http://test/doc", basic_graph())]),
            EntityCacheConfig::builder()
                .enable_auto_sweep(false)
                .lock_poll_interval(Duration::from_millis(5))
                .build(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_entity_fetches_owning_page() {
        let client = client();

        let entity = client.get_entity("http://test/doc#c").await.unwrap().unwrap();
        assert_eq!(entity["name"], "grandChildC");
        assert_eq!(client.fetcher().calls(), 1);

        let root = client.get_entity("http://test/doc").await.unwrap().unwrap();
        assert_eq!(root, basic_graph());

        assert!(client
            .get_entity("http://test/doc#nonexist")
            .await
            .unwrap()
            .is_none());
        assert_eq!(client.fetcher().calls(), 1);
    }

    #[tokio::test]
    async fn test_ensure_fetches_once() {
        let client = client();
        let required = ["http://schema.org/test#name"];

        let entity = client.ensure("http://test/doc#a", &required).await.unwrap();
        assert_eq!(entity.unwrap()["name"], "childA");

        client.ensure("http://test/doc#a", &required).await.unwrap();
        client.ensure("http://test/doc", &required).await.unwrap();
        assert_eq!(client.fetcher().calls(), 1);
    }

    #[tokio::test]
    async fn test_ensure_without_properties_fetches_unknown_entity() {
        let client = client();
        let nothing: &[&str] = &[];

        let entity = client.ensure("http://test/doc#a", nothing).await.unwrap();
        assert_eq!(entity.unwrap()["name"], "childA");
        assert_eq!(client.fetcher().calls(), 1);

        client.ensure("http://test/doc#a", nothing).await.unwrap();
        assert_eq!(client.fetcher().calls(), 1);
    }

    #[tokio::test]
    async fn test_ensure_node_without_id_is_returned_as_is() {
        let client = client();
        let nothing: &[&str] = &[];

        for node in [json!({"name": "inline"}), json!({"@id": "#relative"}), json!("text")] {
            let entity = client.ensure_node(&node, nothing).await.unwrap();
            assert_eq!(entity, Some(node));
        }
        assert_eq!(client.fetcher().calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_page_fetches_once() {
        let client = Arc::new(client());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.get_page("http://test/doc#a").await })
            })
            .collect();

        for result in join_all(tasks).await {
            assert_eq!(result.unwrap().unwrap(), basic_graph());
        }
        assert_eq!(client.fetcher().calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_page_is_a_fetch_error() {
        let client = client();
        let err = client.get_entity("http://test/missing").await.unwrap_err();
        assert!(matches!(err, CacheError::Fetch { .. }));
        assert_eq!(client.cache().page_count(), 0);
    }
}
