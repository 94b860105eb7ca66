//! Entity cache: page map, merged master graph and eviction sweep

use crate::cache::{
    config::EntityCacheConfig,
    eviction::{SweepOutcome, SweepReport},
    page::Page,
    types::{CacheStats, FetchDecision, StatsRecorder},
};
use crate::error::{CacheError, Result};
use crate::graph::{Graph, Triple};
use crate::jsonld::{Expander, JsonLdExpander};
use crate::uri::{canonical_uri, has_fragment, uri_without_fragment};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Client-side cache of linked-data pages and the entities they describe
///
/// - Pages are keyed by their fragment-free URI; the first `add` for a key
///   wins and later ones are dropped.
/// - Each page is expanded on a background task and merged into a single
///   master graph, so entities seen on any page answer without a refetch.
/// - A periodic sweep evicts pages not read within the expiration window
///   and swaps in a master graph rebuilt from the survivors.
pub struct EntityCache {
    inner: Arc<CacheInner>,

    /// Stops the sweep task; dropping it does the same
    shutdown: watch::Sender<bool>,

    sweeper: Mutex<Option<JoinHandle<()>>>,

    disposed: AtomicBool,
}

/// State shared with background loads and the sweep task
struct CacheInner {
    config: EntityCacheConfig,

    pages: DashMap<String, Arc<Page>>,

    /// The cache-wide lock: guards graph reads, merges and the eviction swap
    master: RwLock<MasterGraph>,

    /// Keeps sweeps from overlapping without blocking readers
    sweep_guard: tokio::sync::Mutex<()>,

    expander: Arc<dyn Expander>,

    stats: StatsRecorder,

    /// Makes the next sweep panic
    #[cfg(test)]
    panic_next_sweep: AtomicBool,
}

#[derive(Debug, Default)]
struct MasterGraph {
    graph: Graph,

    /// Bumped on every merge and swap
    generation: u64,
}

impl EntityCache {
    /// Create a cache that evicts pages unused for `cache_expiration`
    pub fn new(cache_expiration: Duration) -> Result<Self> {
        Self::with_config(
            EntityCacheConfig::builder()
                .cache_expiration(cache_expiration)
                .build(),
        )
    }

    /// Create a cache using the bundled JSON-LD expander
    pub fn with_config(config: EntityCacheConfig) -> Result<Self> {
        Self::with_expander(config, Arc::new(JsonLdExpander::new()))
    }

    /// Create a cache with a custom expander
    ///
    /// With `enable_auto_sweep` this must run inside a tokio runtime.
    pub fn with_expander(config: EntityCacheConfig, expander: Arc<dyn Expander>) -> Result<Self> {
        config.validate()?;
        info!("Initializing entity cache with config: {:?}", config);

        let inner = Arc::new(CacheInner {
            config,
            pages: DashMap::new(),
            master: RwLock::new(MasterGraph::default()),
            sweep_guard: tokio::sync::Mutex::new(()),
            expander,
            stats: StatsRecorder::default(),
            #[cfg(test)]
            panic_next_sweep: AtomicBool::new(false),
        });

        let (shutdown, shutdown_rx) = watch::channel(false);

        let sweeper = if inner.config.enable_auto_sweep {
            let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
                CacheError::ConfigError("automatic sweeping needs a tokio runtime".to_string())
            })?;
            Some(runtime.spawn(run_sweeper(Arc::clone(&inner), shutdown_rx)))
        } else {
            None
        };

        Ok(Self {
            inner,
            shutdown,
            sweeper: Mutex::new(sweeper),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &EntityCacheConfig {
        &self.inner.config
    }

    /// Whether the page holding `entity_uri` is cached (fragment ignored)
    ///
    /// Counts as a read of that page. Pages whose load failed report false.
    pub fn has_page_of_entity(&self, entity_uri: &str) -> bool {
        let Ok(key) = uri_without_fragment(entity_uri) else {
            return false;
        };
        let Some(page) = self.inner.page(&key) else {
            return false;
        };

        page.update_last_used();
        !page.is_disposed() && !page.is_failed()
    }

    /// Cache a fetched page and start expanding it in the background
    ///
    /// Returns `Ok(false)` when the page was already cached; the new copy is
    /// discarded. `page_uri` must not carry a fragment. Must be called from
    /// within a tokio runtime.
    pub fn add(&self, compacted: Value, page_uri: &str) -> Result<bool> {
        self.ensure_open()?;

        if has_fragment(page_uri)? {
            warn!("Rejecting page URI with a fragment: {}", page_uri);
            return Err(CacheError::FragmentInPageUri(page_uri.to_string()));
        }

        tokio::runtime::Handle::try_current()
            .map_err(|_| CacheError::Other("adding a page needs a tokio runtime".to_string()))?;

        let key = canonical_uri(page_uri)?;
        let page = Arc::new(Page::new(&key, compacted)?);

        let inserted = match self.inner.pages.entry(key.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&page));
                true
            }
        };

        if !inserted {
            page.dispose();
            StatsRecorder::bump(&self.inner.stats.duplicate_adds);
            debug!("Page already cached, dropping duplicate: {}", key);
            return Ok(false);
        }

        StatsRecorder::bump(&self.inner.stats.pages_added);

        let cache = Arc::downgrade(&self.inner);
        page.begin_load(Arc::clone(&self.inner.expander), move |page| async move {
            if let Some(cache) = cache.upgrade() {
                cache.merge_page(&page).await;
            }
        });

        debug!("Added page: {}", key);
        Ok(true)
    }

    /// Look up an entity
    ///
    /// A page URI answers with the page's own document. Anything else waits
    /// for pending loads and answers from the master graph with the JSON
    /// object that described the entity.
    pub async fn get_entity(&self, entity_uri: &str) -> Result<Option<Value>> {
        if let Some(document) = self.get_entity_from_page(entity_uri)? {
            StatsRecorder::bump(&self.inner.stats.page_hits);
            return Ok(Some(document));
        }

        self.wait_for_tasks().await;

        let entity = self.inner.get_entity_from_graph(entity_uri).await?;
        match entity {
            Some(_) => StatsRecorder::bump(&self.inner.stats.graph_hits),
            None => StatsRecorder::bump(&self.inner.stats.misses),
        }
        Ok(entity)
    }

    /// Exact page lookup; `None` for fragment URIs and uncached pages
    pub fn get_entity_from_page(&self, entity_uri: &str) -> Result<Option<Value>> {
        if has_fragment(entity_uri)? {
            return Ok(None);
        }

        let key = canonical_uri(entity_uri)?;
        let Some(page) = self.inner.page(&key) else {
            return Ok(None);
        };
        if page.is_disposed() || page.is_failed() {
            return Ok(None);
        }

        page.update_last_used();
        Ok(page.compacted().map(|document| Value::clone(&document)))
    }

    /// Decide whether `entity_uri` has to be fetched to learn
    /// `required_properties`
    pub async fn fetch_needed<S: AsRef<str>>(
        &self,
        entity_uri: &str,
        required_properties: &[S],
    ) -> Result<FetchDecision> {
        if self.has_page_of_entity(entity_uri) {
            return Ok(FetchDecision::PageCached);
        }

        self.wait_for_tasks().await;

        let subject = canonical_uri(entity_uri)?;
        let triples = self.inner.master.read().await.graph.select_subject(&subject);
        self.inner.touch_contributors(&triples);

        let predicates: HashSet<&str> = triples.iter().map(|t| t.predicate.value()).collect();
        let covered = required_properties
            .iter()
            .all(|property| predicates.contains(property.as_ref()));

        Ok(if covered {
            FetchDecision::GraphCovered
        } else {
            FetchDecision::Fetch
        })
    }

    /// Wait until every page that is currently loading has settled
    ///
    /// Must not be called while holding the master graph lock: the merge
    /// that completes a load takes it.
    pub async fn wait_for_tasks(&self) {
        let pending: Vec<Arc<Page>> = self
            .inner
            .pages
            .iter()
            .filter(|entry| entry.value().is_loading())
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        if pending.is_empty() {
            return;
        }

        debug!("Waiting for {} page loads", pending.len());
        join_all(pending.iter().map(|page| page.wait_loaded())).await;
    }

    /// Every statement reachable from `entity_uri` in the master graph
    pub async fn describe(&self, entity_uri: &str) -> Result<Vec<Arc<Triple>>> {
        self.wait_for_tasks().await;

        let subject = canonical_uri(entity_uri)?;
        let triples = self
            .inner
            .master
            .read()
            .await
            .graph
            .recursive_describe(&subject);
        self.inner.touch_contributors(&triples);

        Ok(triples)
    }

    /// Run an eviction sweep now
    pub async fn sweep(&self) -> SweepReport {
        self.inner.sweep_at(Utc::now()).await
    }

    /// Number of cached pages, without touching them
    pub fn page_count(&self) -> usize {
        self.inner.pages.len()
    }

    pub async fn stats(&self) -> CacheStats {
        let failed = self
            .inner
            .pages
            .iter()
            .filter(|entry| entry.value().is_failed())
            .count();
        let triples = self.inner.master.read().await.graph.len();
        self.inner
            .stats
            .snapshot(self.inner.pages.len(), failed, triples)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Stop the sweep task, dispose every page and clear the cache
    ///
    /// Waits for an in-flight sweep to finish. Idempotent.
    pub async fn shutdown(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self.shutdown.send(true);

        let sweeper = self
            .sweeper
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                warn!("Sweep task ended abnormally: {}", e);
            }
        }

        // a manual sweep may still be running
        let _guard = self.inner.sweep_guard.lock().await;

        for entry in self.inner.pages.iter() {
            entry.value().dispose();
        }
        self.inner.pages.clear();

        let mut master = self.inner.master.write().await;
        master.graph = Graph::new();
        master.generation += 1;

        info!("Entity cache disposed");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_disposed() {
            Err(CacheError::Disposed)
        } else {
            Ok(())
        }
    }
}

impl Drop for EntityCache {
    fn drop(&mut self) {
        // the sweep task exits once the shutdown sender is gone
        for entry in self.inner.pages.iter() {
            entry.value().dispose();
        }
    }
}

impl CacheInner {
    fn page(&self, key: &str) -> Option<Arc<Page>> {
        self.pages.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Completion callback of a page load
    async fn merge_page(&self, page: &Page) {
        page.update_last_used();

        let Some(graph) = page.graph() else {
            return;
        };

        let mut master = self.master.write().await;
        if page.is_disposed() {
            debug!("Skipping merge of disposed page: {}", page.uri());
            return;
        }

        let added = master.graph.merge(&graph);
        master.generation += 1;
        debug!(
            "Merged page {} into master graph ({} new triples)",
            page.uri(),
            added
        );
    }

    async fn get_entity_from_graph(&self, entity_uri: &str) -> Result<Option<Value>> {
        let subject = canonical_uri(entity_uri)?;
        let triples = self.master.read().await.graph.select_subject(&subject);
        self.touch_contributors(&triples);

        Ok(best_entity(&triples, entity_uri, &subject))
    }

    /// Mark every page that contributed one of `triples` as used
    fn touch_contributors(&self, triples: &[Arc<Triple>]) {
        let keys: HashSet<&str> = triples.iter().filter_map(|t| t.page()).collect();
        for key in keys {
            if let Some(page) = self.page(key) {
                page.update_last_used();
            }
        }
    }

    async fn sweep_at(&self, now: DateTime<Utc>) -> SweepReport {
        let Ok(_guard) = self.sweep_guard.try_lock() else {
            debug!("Sweep already running, skipping");
            return SweepReport::new(SweepOutcome::AlreadyRunning, now);
        };

        #[cfg(test)]
        if self.panic_next_sweep.swap(false, Ordering::SeqCst) {
            panic!("sweep failed");
        }

        // read before the snapshot so any merge after it is detected at swap time
        let generation = self.master.read().await.generation;
        let pages: Vec<Arc<Page>> = self
            .pages
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        if pages.iter().any(|page| page.is_loading()) {
            StatsRecorder::bump(&self.stats.deferred_sweeps);
            debug!("Deferring sweep, pages still loading");
            return SweepReport::new(SweepOutcome::DeferredWhileLoading, now).with_kept(pages.len());
        }

        StatsRecorder::bump(&self.stats.sweeps);

        let window = self.config.cache_expiration;
        let (remove, keep): (Vec<_>, Vec<_>) = pages
            .into_iter()
            .partition(|page| page.is_stale(window, now));

        if remove.is_empty() {
            return SweepReport::new(SweepOutcome::NothingExpired, now).with_kept(keep.len());
        }

        let mut replacement = Graph::new();
        for page in &keep {
            if let Some(graph) = page.graph() {
                replacement.merge(&graph);
            }
        }

        {
            let mut master = self.master.write().await;
            if master.generation != generation {
                StatsRecorder::bump(&self.stats.deferred_sweeps);
                debug!("Deferring sweep, a page merged while rebuilding");
                return SweepReport::new(SweepOutcome::DeferredConcurrentMerge, now)
                    .with_kept(keep.len() + remove.len());
            }
            master.graph = replacement;
            master.generation += 1;
        }

        let mut evicted = Vec::with_capacity(remove.len());
        for page in remove {
            let removed = self
                .pages
                .remove_if(page.uri(), |_, cached| Arc::ptr_eq(cached, &page));
            if removed.is_some() {
                page.dispose();
                evicted.push(page.uri().to_string());
            } else {
                debug!("Page already gone during eviction: {}", page.uri());
            }
        }

        StatsRecorder::add(&self.stats.evicted_pages, evicted.len() as u64);
        info!("Evicted {} expired pages, kept {}", evicted.len(), keep.len());

        SweepReport::new(SweepOutcome::Evicted, now)
            .with_evicted(evicted)
            .with_kept(keep.len())
    }
}

/// Pick the JSON to answer an entity lookup with
///
/// Candidates are the source objects of statements about `subject`. A
/// source from the page that owns `requested` wins, then the object with
/// the most keys, then the first one seen. Without sources a flat object
/// is rebuilt from the statements.
fn best_entity(triples: &[Arc<Triple>], requested: &str, subject: &str) -> Option<Value> {
    if triples.is_empty() {
        return None;
    }

    let home = uri_without_fragment(requested).ok();
    let mut best: Option<(bool, usize, &Arc<Value>)> = None;

    for triple in triples.iter().filter(|t| t.subject.value() == subject) {
        let Some(source) = triple.source() else {
            continue;
        };
        let at_home = home.is_some() && triple.page() == home.as_deref();
        let richness = source.as_object().map_or(0, Map::len);

        let better = match best {
            Some((best_home, best_richness, _)) => (at_home, richness) > (best_home, best_richness),
            None => true,
        };
        if better {
            best = Some((at_home, richness, source));
        }
    }

    match best {
        Some((_, _, source)) => Some(Value::clone(source)),
        None => Some(entity_from_triples(subject, triples)),
    }
}

fn entity_from_triples(subject: &str, triples: &[Arc<Triple>]) -> Value {
    let mut entity = Map::new();
    entity.insert("@id".to_string(), Value::String(subject.to_string()));

    for triple in triples {
        let value = match &triple.object {
            object if object.is_literal() => Value::String(object.value().to_string()),
            object => {
                let mut reference = Map::new();
                reference.insert("@id".to_string(), Value::String(object.value().to_string()));
                Value::Object(reference)
            }
        };

        match entity.get_mut(triple.predicate.value()) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                entity.insert(triple.predicate.value().to_string(), value);
            }
        }
    }

    Value::Object(entity)
}

/// Background sweep loop, owned by the cache that spawned it
async fn run_sweeper(inner: Arc<CacheInner>, mut shutdown: watch::Receiver<bool>) {
    info!(
        "Starting cache sweep task (interval: {:?})",
        inner.config.sweep_interval
    );

    loop {
        let delay = inner.config.sweep_delay();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }

        // a failed sweep must not stop the timer
        match AssertUnwindSafe(inner.sweep_at(Utc::now()))
            .catch_unwind()
            .await
        {
            Ok(report) => debug!("Sweep finished: {}", report),
            Err(_) => warn!("Sweep panicked, retrying on the next tick"),
        }
    }

    debug!("Cache sweep task stopped");
}
