//! # Linked-Data Entity Cache (ld-entity-cache)
//!
//! An in-process cache for clients of paged JSON-LD feeds, such as package
//! registration indexes where each page lists many entities and points to
//! others.
//!
//! ## Features
//!
//! - Page cache keyed by fragment-free URI, first writer wins
//! - Background JSON-LD expansion into a merged, in-memory triple graph
//! - Entity lookups across every cached page, with exact-page precedence
//! - `fetch_needed` decisions so callers skip requests the graph already answers
//! - Idle-page eviction by a periodic sweep that never drops in-flight loads
//! - Per-key async lock and a fetch-through [`DataClient`]
//!
//! ## Cache
//!
//! ```no_run
//! use ld_entity_cache::{EntityCache, FetchDecision};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = EntityCache::new(Duration::from_secs(300))?;
//!
//!     cache.add(
//!         json!({
//!             "@context": {"@vocab": "http://schema.org/test#"},
//!             "@id": "http://api/index",
//!             "item": {"@id": "http://api/pkg/foo", "version": "1.0.0"}
//!         }),
//!         "http://api/index",
//!     )?;
//!
//!     // Known from the index page, no fetch of the package page required
//!     let decision = cache
//!         .fetch_needed("http://api/pkg/foo", &["http://schema.org/test#version"])
//!         .await?;
//!     assert_eq!(decision, FetchDecision::GraphCovered);
//!
//!     let foo = cache.get_entity("http://api/pkg/foo").await?;
//!     println!("{:?}", foo);
//!
//!     cache.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Client
//!
//! ```no_run
//! use async_trait::async_trait;
//! use ld_entity_cache::{DataClient, EntityCacheConfig, PageFetcher, Result};
//! use serde_json::Value;
//!
//! struct Registry;
//!
//! #[async_trait]
//! impl PageFetcher for Registry {
//!     async fn fetch(&self, uri: &str) -> Result<Value> {
//!         Ok(serde_json::json!({ "@id": uri }))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = DataClient::new(Registry, EntityCacheConfig::from_env()?)?;
//!     let page = client.get_page("http://api/pkg/foo").await?;
//!     println!("{}", page);
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;
pub mod error;
pub mod graph;
pub mod jsonld;
pub mod lock;
pub mod uri;

// Re-export main types for convenience
pub use cache::{
    CacheStats, EntityCache, EntityCacheConfig, EntityCacheConfigBuilder, FetchDecision, Page,
    PageState, SweepOutcome, SweepReport,
};
pub use client::{DataClient, PageFetcher};
pub use error::{CacheError, Result};
pub use graph::{Graph, Node, Triple, RDF_TYPE};
pub use jsonld::{Expander, JsonLdExpander};
pub use lock::{KeyedLock, KeyedLockGuard};
pub use uri::uri_without_fragment;
