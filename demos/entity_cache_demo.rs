//! Entity Cache Demo
//!
//! Walks a small in-memory package registry through the data client and
//! shows which lookups hit the network.
//!
//! Usage:
//!   cargo run --example entity_cache_demo
//!
//! Environment variables:
//!   RUST_LOG                     - log filter (default: info)
//!   LD_CACHE_EXPIRATION_SECS     - eviction window (default: 300)
//!   LD_CACHE_SWEEP_INTERVAL_SECS - sweep period (default: expiration)

use async_trait::async_trait;
use ld_entity_cache::{CacheError, DataClient, EntityCacheConfig, PageFetcher, Result};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;
use tracing_subscriber::EnvFilter;

const VOCAB: &str = "http://schema.org/registry#";

struct DemoRegistry {
    requests: AtomicUsize,
}

#[async_trait]
impl PageFetcher for DemoRegistry {
    async fn fetch(&self, uri: &str) -> Result<Value> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        info!("GET {}", uri);

        match uri {
            "http://registry/index" => Ok(json!({
                "@context": {"@vocab": VOCAB, "dependency": {"@type": "@id"}},
                "@id": "http://registry/index",
                "package": [
                    {"@id": "http://registry/pkg/serde", "version": "1.0.200"},
                    {
                        "@id": "http://registry/pkg/tokio",
                        "version": "1.37.0",
                        "dependency": "http://registry/pkg/mio"
                    }
                ]
            })),
            "http://registry/pkg/tokio" => Ok(json!({
                "@context": {"@vocab": VOCAB},
                "@id": "http://registry/pkg/tokio",
                "version": "1.37.0",
                "description": "An event-driven, non-blocking I/O platform"
            })),
            other => Err(CacheError::Fetch {
                uri: other.to_string(),
                reason: "404 Not Found".to_string(),
            }),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("=== Entity Cache Demo ===");

    let config = EntityCacheConfig::from_env()?;
    info!("Cache expiration: {:?}", config.cache_expiration);

    let client = DataClient::new(
        DemoRegistry {
            requests: AtomicUsize::new(0),
        },
        config,
    )?;

    info!("\n--- Load the index page ---");
    client.get_page("http://registry/index").await?;

    info!("\n--- Versions come from the index ---");
    let version = [format!("{}version", VOCAB)];
    for package in ["http://registry/pkg/serde", "http://registry/pkg/tokio"] {
        if let Some(entity) = client.ensure(package, &version).await? {
            info!("{} -> {}", package, entity["version"]);
        }
    }

    info!("\n--- Descriptions need the package page ---");
    let description = [format!("{}description", VOCAB)];
    if let Some(tokio) = client.ensure("http://registry/pkg/tokio", &description).await? {
        info!("tokio: {}", tokio["description"]);
    }

    info!("\n--- Graph around tokio ---");
    for triple in client.cache().describe("http://registry/pkg/tokio").await? {
        info!("{}", triple);
    }

    info!("\n--- Statistics ---");
    info!("{}", client.cache().stats().await);
    info!(
        "Requests sent: {}",
        client.fetcher().requests.load(Ordering::SeqCst)
    );

    client.shutdown().await;
    info!("=== Demo Complete ===");
    Ok(())
}
