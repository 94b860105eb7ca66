//! Integration tests for the entity cache
//!
//! These tests drive the cache through its public API:
//! - Page adds and exact-page lookups
//! - Graph lookups across pages
//! - Fetch decisions
//! - Idle eviction and shutdown
//! - Keyed lock and graph primitives

use futures::future::join_all;
use ld_entity_cache::cache::{EntityCache, EntityCacheConfig, FetchDecision, SweepOutcome};
use ld_entity_cache::graph::{Graph, Node};
use ld_entity_cache::lock::KeyedLock;
use ld_entity_cache::CacheError;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const VOCAB: &str = "http://schema.org/test#";

fn manual(expiration: Duration) -> EntityCache {
    EntityCache::with_config(EntityCacheConfig::manual_sweep(expiration)).unwrap()
}

fn registration_index() -> Value {
    json!({
        "@context": {
            "@vocab": VOCAB,
            "items": {"@id": "http://schema.org/test#items"},
            "dependency": {"@type": "@id"}
        },
        "@id": "http://api/index",
        "items": [
            {"@id": "http://api/pkg/foo", "version": "1.0.0", "dependency": "http://api/pkg/bar"},
            {"@id": "http://api/pkg/bar", "version": "2.1.0"}
        ]
    })
}

#[tokio::test]
async fn test_example_scenario() {
    let cache = manual(Duration::from_secs(300));
    let doc = json!({"@id": "http://api/pkg/foo", "name": "Foo"});

    cache.add(doc.clone(), "http://api/pkg/foo").unwrap();

    assert_eq!(cache.get_entity("http://api/pkg/foo").await.unwrap(), Some(doc));
    assert_eq!(
        cache
            .fetch_needed("http://api/pkg/foo", &[] as &[&str])
            .await
            .unwrap(),
        FetchDecision::PageCached
    );
}

#[tokio::test]
async fn test_entities_resolve_across_pages() {
    let cache = manual(Duration::from_secs(300));
    cache.add(registration_index(), "http://api/index").unwrap();

    let foo = cache.get_entity("http://api/pkg/foo").await.unwrap().unwrap();
    assert_eq!(foo["version"], "1.0.0");

    let version = format!("{}version", VOCAB);
    let dependency = format!("{}dependency", VOCAB);

    assert_eq!(
        cache
            .fetch_needed("http://api/pkg/foo", &[&version, &dependency])
            .await
            .unwrap(),
        FetchDecision::GraphCovered
    );
    assert_eq!(
        cache
            .fetch_needed("http://api/pkg/bar", &[&version, &dependency])
            .await
            .unwrap(),
        FetchDecision::Fetch
    );

    // foo -> bar link is followed
    let described = cache.describe("http://api/pkg/foo").await.unwrap();
    assert!(described
        .iter()
        .any(|t| t.subject == Node::iri("http://api/pkg/bar")));
}

#[tokio::test]
async fn test_has_page_of_entity() {
    let cache = manual(Duration::from_secs(300));
    cache.add(registration_index(), "http://api/index").unwrap();

    assert!(cache.has_page_of_entity("http://api/index"));
    assert!(cache.has_page_of_entity("http://api/index#section"));
    assert!(!cache.has_page_of_entity("http://api/pkg/foo"));
}

#[tokio::test]
async fn test_fragment_page_uri_is_rejected() {
    let cache = manual(Duration::from_secs(300));
    let result = cache.add(registration_index(), "http://api/index#frag");

    assert!(matches!(result, Err(CacheError::FragmentInPageUri(_))));
    assert_eq!(cache.page_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_adds_keep_one_page() {
    let cache = Arc::new(manual(Duration::from_secs(300)));

    let adds: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.add(registration_index(), "http://api/index") })
        })
        .collect();

    let winners = join_all(adds)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .filter(|won| *won)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(cache.page_count(), 1);

    let stats = cache.stats().await;
    assert_eq!(stats.duplicate_adds, 7);
}

#[tokio::test]
async fn test_idle_pages_are_swept() {
    let cache = manual(Duration::from_millis(200));
    cache
        .add(json!({"@context": {"@vocab": VOCAB}, "@id": "http://a/only", "name": "A"}), "http://a/")
        .unwrap();
    cache
        .add(json!({"@context": {"@vocab": VOCAB}, "@id": "http://b/only", "name": "B"}), "http://b/")
        .unwrap();
    cache.wait_for_tasks().await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(cache.has_page_of_entity("http://b/"));

    let report = cache.sweep().await;
    assert_eq!(report.outcome, SweepOutcome::Evicted);
    assert_eq!(report.evicted, vec!["http://a/".to_string()]);

    assert!(cache.get_entity("http://a/only").await.unwrap().is_none());
    assert!(cache.get_entity("http://b/only").await.unwrap().is_some());
    assert_eq!(cache.page_count(), 1);
}

#[tokio::test]
async fn test_shutdown_clears_cache() {
    let cache = EntityCache::new(Duration::from_secs(60)).unwrap();
    cache.add(registration_index(), "http://api/index").unwrap();
    cache.wait_for_tasks().await;

    cache.shutdown().await;

    assert_eq!(cache.page_count(), 0);
    assert!(!cache.has_page_of_entity("http://api/index"));
    assert!(matches!(
        cache.add(registration_index(), "http://api/index"),
        Err(CacheError::Disposed)
    ));
    assert_eq!(cache.stats().await.triples, 0);
}

#[test]
fn test_cycle_describe_terminates() {
    let mut graph = Graph::new();
    graph.assert_spo(Node::iri("http://x/a"), Node::iri("http://x/p"), Node::iri("http://x/b"));
    graph.assert_spo(Node::iri("http://x/b"), Node::iri("http://x/p"), Node::iri("http://x/a"));

    assert_eq!(graph.recursive_describe("http://x/a").len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_keyed_lock_excludes_holders() {
    let lock = Arc::new(KeyedLock::new(Duration::from_millis(1)));
    let inside = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..6)
        .map(|_| {
            let (lock, inside, peak) = (Arc::clone(&lock), Arc::clone(&inside), Arc::clone(&peak));
            tokio::spawn(async move {
                for _ in 0..5 {
                    let _guard = lock.acquire("http://api/pkg/foo").await;
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for worker in join_all(workers).await {
        worker.unwrap();
    }

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert!(!lock.is_held("http://api/pkg/foo"));
}

#[test]
fn test_keyed_lock_in_blocking_harness() {
    let lock = KeyedLock::new(Duration::from_millis(1));

    tokio_test::block_on(async {
        let guard = lock.acquire("http://a/").await;
        assert!(lock.try_acquire("http://a/").is_none());
        assert!(lock.try_acquire("http://b/").is_some());
        drop(guard);
        assert!(lock.try_acquire("http://a/").is_some());
    });
}
