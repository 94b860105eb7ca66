//! # Entity Cache
//!
//! In-process cache for paged linked-data feeds. Every fetched page is kept
//! in its compacted form and, once expanded in the background, merged into
//! one master graph so that entities described on other pages can be served
//! without another request.
//!
//! ## Features
//!
//! - **First-writer-wins pages**: concurrent `add`s of the same page keep one copy
//! - **Background expansion**: pages are expanded off the caller's task
//! - **Graph lookups**: entities resolve across every cached page
//! - **Fetch decisions**: tell whether a page request is needed at all
//! - **Idle eviction**: a periodic sweep drops pages not read within the window
//!
//! ## Example
//!
//! ```rust
//! use ld_entity_cache::cache::{EntityCache, EntityCacheConfig, FetchDecision};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # async fn example() -> ld_entity_cache::Result<()> {
//! let cache = EntityCache::with_config(EntityCacheConfig::manual_sweep(Duration::from_secs(3600)))?;
//!
//! cache.add(json!({"@id": "http://api/pkg/foo", "name": "Foo"}), "http://api/pkg/foo")?;
//!
//! let entity = cache.get_entity("http://api/pkg/foo").await?;
//! assert!(entity.is_some());
//!
//! let decision = cache.fetch_needed("http://api/pkg/foo", &["name"]).await?;
//! assert_eq!(decision, FetchDecision::PageCached);
//!
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod eviction;
pub mod page;
pub mod store;
pub mod types;

pub use config::{EntityCacheConfig, EntityCacheConfigBuilder};
pub use eviction::{SweepOutcome, SweepReport};
pub use page::{Page, PageState};
pub use store::EntityCache;
pub use types::{CacheStats, FetchDecision};
