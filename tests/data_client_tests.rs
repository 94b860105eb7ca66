//! Integration tests for the fetch-through data client

use async_trait::async_trait;
use futures::future::join_all;
use ld_entity_cache::{CacheError, DataClient, EntityCacheConfig, PageFetcher, Result, RDF_TYPE};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory registry that records every request
#[derive(Default)]
struct MockRegistry {
    pages: HashMap<String, Value>,
    requests: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
}

impl MockRegistry {
    fn with_page(mut self, uri: &str, document: Value) -> Self {
        self.pages.insert(uri.to_string(), document);
        self
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for MockRegistry {
    async fn fetch(&self, uri: &str) -> Result<Value> {
        self.requests.lock().unwrap().push(uri.to_string());
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.pages.get(uri).cloned().ok_or_else(|| CacheError::Fetch {
            uri: uri.to_string(),
            reason: "not found".to_string(),
        })
    }
}

fn basic_graph() -> Value {
    json!({
        "@context": {"@vocab": "http://schema.org/test#"},
        "@id": "http://test/doc",
        "name": "test",
        "children": [
            {"@id": "http://test/doc#a", "@type": "Child", "name": "childA"},
            {
                "@id": "http://test/doc#b",
                "name": "childB",
                "children": [{"@id": "http://test/doc#c", "name": "grandChildC"}]
            }
        ]
    })
}

/// Mentions child a inline with only its type
fn bare_graph() -> Value {
    json!({
        "@context": {"@vocab": "http://schema.org/test#"},
        "@id": "http://test/docBare",
        "items": [{"@id": "http://test/doc#a", "@type": "Child"}]
    })
}

fn package_index() -> Value {
    json!({
        "@context": {"@vocab": "http://schema.org/test#"},
        "@id": "http://api/index",
        "packages": [
            {"@id": "http://api/pkg/foo", "version": "1.0.0", "listed": true},
            {"@id": "http://api/pkg/bar", "version": "0.3.0"}
        ]
    })
}

fn client(registry: MockRegistry) -> DataClient<MockRegistry> {
    let config = EntityCacheConfig::builder()
        .cache_expiration(Duration::from_secs(300))
        .enable_auto_sweep(false)
        .lock_poll_interval(Duration::from_millis(2))
        .build();
    DataClient::new(registry, config).unwrap()
}

#[tokio::test]
async fn test_get_entity_nested_child() {
    let client = client(MockRegistry::default().with_page("http://test/doc", basic_graph()));

    let entity = client.get_entity("http://test/doc#c").await.unwrap().unwrap();
    assert_eq!(entity["name"], "grandChildC");
}

#[tokio::test]
async fn test_get_entity_root_returns_page() {
    let client = client(MockRegistry::default().with_page("http://test/doc", basic_graph()));

    let entity = client.get_entity("http://test/doc").await.unwrap().unwrap();
    assert_eq!(entity, basic_graph());
}

#[tokio::test]
async fn test_get_entity_missing_returns_none() {
    let client = client(MockRegistry::default().with_page("http://test/doc", basic_graph()));

    let entity = client.get_entity("http://test/doc#nonexist").await.unwrap();
    assert!(entity.is_none());
    assert_eq!(client.fetcher().requests(), vec!["http://test/doc".to_string()]);
}

#[tokio::test]
async fn test_ensure_fetches_page_once() {
    let client = client(MockRegistry::default().with_page("http://test/doc", basic_graph()));
    let name = ["http://schema.org/test#name"];

    for _ in 0..3 {
        let entity = client.ensure("http://test/doc#b", &name).await.unwrap().unwrap();
        assert_eq!(entity["name"], "childB");
    }

    assert_eq!(client.fetcher().requests().len(), 1);
}

#[tokio::test]
async fn test_ensure_skips_fetch_when_graph_covers() {
    let client = client(MockRegistry::default().with_page("http://api/index", package_index()));
    client.get_page("http://api/index").await.unwrap();

    let version = ["http://schema.org/test#version"];
    let foo = client.ensure("http://api/pkg/foo", &version).await.unwrap().unwrap();
    assert_eq!(foo["version"], "1.0.0");

    // the package page itself was never requested
    assert_eq!(client.fetcher().requests(), vec!["http://api/index".to_string()]);
}

#[tokio::test]
async fn test_ensure_fetches_for_missing_property() {
    let client = client(
        MockRegistry::default()
            .with_page("http://api/index", package_index())
            .with_page(
                "http://api/pkg/bar",
                json!({
                    "@context": {"@vocab": "http://schema.org/test#"},
                    "@id": "http://api/pkg/bar",
                    "version": "0.3.0",
                    "listed": false
                }),
            ),
    );
    client.get_page("http://api/index").await.unwrap();

    let listed = ["http://schema.org/test#listed"];
    let bar = client.ensure("http://api/pkg/bar", &listed).await.unwrap().unwrap();
    assert_eq!(bar["listed"], false);
    assert_eq!(client.fetcher().requests().len(), 2);
}

fn inline_client() -> DataClient<MockRegistry> {
    client(
        MockRegistry::default()
            .with_page("http://test/docBare", bare_graph())
            .with_page("http://test/doc", basic_graph()),
    )
}

#[tokio::test]
async fn test_ensure_node_answered_inline() {
    let client = inline_client();
    let bare = client.get_page("http://test/docBare").await.unwrap();

    let entity = client
        .ensure_node(&bare["items"][0], &[RDF_TYPE])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(entity["@type"], "Child");
    assert_eq!(client.fetcher().requests().len(), 1);
}

#[tokio::test]
async fn test_ensure_node_fetches_missing_inline_property() {
    let client = inline_client();
    let bare = client.get_page("http://test/docBare").await.unwrap();

    let entity = client
        .ensure_node(&bare["items"][0], &["http://schema.org/test#name"])
        .await
        .unwrap()
        .unwrap();

    assert_eq!(entity["name"], "childA");
    assert_eq!(
        client.fetcher().requests(),
        vec!["http://test/docBare".to_string(), "http://test/doc".to_string()]
    );
}

#[tokio::test]
async fn test_ensure_node_without_id_returns_input() {
    let client = inline_client();
    client.get_page("http://test/docBare").await.unwrap();

    let corrupt = json!({"blah": "blah"});
    let entity = client
        .ensure_node(&corrupt, &["http://schema.org/test#name"])
        .await
        .unwrap();

    assert_eq!(entity, Some(corrupt));
    assert_eq!(client.fetcher().requests().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_fetch() {
    let client = Arc::new(client(
        MockRegistry::default().with_page("http://test/doc", basic_graph()),
    ));

    let lookups: Vec<_> = ["#a", "#b", "#c", "", "#a", "#c"]
        .into_iter()
        .map(|fragment| {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .get_entity(&format!("http://test/doc{}", fragment))
                    .await
            })
        })
        .collect();

    for lookup in join_all(lookups).await {
        assert!(lookup.unwrap().unwrap().is_some());
    }

    assert_eq!(client.fetcher().requests().len(), 1);
    assert_eq!(client.fetcher().in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_fetch_failure_is_not_cached() {
    let client = client(MockRegistry::default());

    for _ in 0..2 {
        let err = client.get_page("http://api/gone").await.unwrap_err();
        assert!(matches!(err, CacheError::Fetch { .. }));
    }

    assert_eq!(client.fetcher().requests().len(), 2);
    assert_eq!(client.cache().page_count(), 0);
}

#[tokio::test]
async fn test_shutdown_disposes_cache() {
    let client = client(MockRegistry::default().with_page("http://test/doc", basic_graph()));
    client.get_page("http://test/doc").await.unwrap();

    client.shutdown().await;

    assert!(client.cache().is_disposed());
    assert!(matches!(
        client.get_page("http://test/doc").await,
        Err(CacheError::Disposed)
    ));
}
