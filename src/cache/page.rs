//! Page cache entries
//!
//! A [`Page`] holds one fetched compacted document and, once its background
//! load finishes, the graph expanded from it.
//!
//! ```text
//! Loading ──► Loaded
//!    │  └───► Failed      (expansion error; terminal)
//!    └──────► Disposed    (absorbing; reachable from every state)
//! ```

use crate::error::{CacheError, Result};
use crate::graph::Graph;
use crate::jsonld::Expander;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lifecycle of a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageState {
    /// Expansion scheduled or running
    Loading,

    /// Graph available and merged
    Loaded,

    /// Expansion failed; the page will never load
    Failed,

    /// Removed from the cache; inert
    Disposed,
}

impl PageState {
    /// Whether the load has resolved one way or another
    pub fn is_settled(&self) -> bool {
        !matches!(self, PageState::Loading)
    }
}

#[derive(Debug, Default)]
struct PageContents {
    compacted: Option<Arc<Value>>,
    graph: Option<Arc<Graph>>,
}

/// One cached page
#[derive(Debug)]
pub struct Page {
    /// Fragment-free page key
    uri: Arc<str>,

    contents: Mutex<PageContents>,

    /// Doubles as the `Loaded` signal
    state: watch::Sender<PageState>,

    load_started: AtomicBool,

    created_at: DateTime<Utc>,

    /// Milliseconds since the epoch. Eviction bookkeeping only.
    last_used_ms: AtomicI64,
}

impl Page {
    /// Create a page in the `Loading` state
    pub fn new(uri: &str, compacted: Value) -> Result<Self> {
        if crate::uri::has_fragment(uri)? {
            return Err(CacheError::FragmentInPageUri(uri.to_string()));
        }

        let now = Utc::now();
        let (state, _) = watch::channel(PageState::Loading);

        Ok(Self {
            uri: Arc::from(uri),
            contents: Mutex::new(PageContents {
                compacted: Some(Arc::new(compacted)),
                graph: None,
            }),
            state,
            load_started: AtomicBool::new(false),
            created_at: now,
            last_used_ms: AtomicI64::new(now.timestamp_millis()),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn state(&self) -> PageState {
        *self.state.borrow()
    }

    pub fn is_loading(&self) -> bool {
        self.state() == PageState::Loading
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == PageState::Loaded
    }

    pub fn is_failed(&self) -> bool {
        self.state() == PageState::Failed
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == PageState::Disposed
    }

    /// The compacted document, until disposal
    pub fn compacted(&self) -> Option<Arc<Value>> {
        self.contents().compacted.clone()
    }

    /// The expanded graph, once loaded
    pub fn graph(&self) -> Option<Arc<Graph>> {
        self.contents().graph.clone()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_used(&self) -> DateTime<Utc> {
        let ms = self.last_used_ms.load(Ordering::Relaxed);
        Utc.timestamp_millis_opt(ms)
            .single()
            .unwrap_or(self.created_at)
    }

    /// Record a read of this page
    pub fn update_last_used(&self) {
        self.touch_at(Utc::now());
    }

    pub(crate) fn touch_at(&self, at: DateTime<Utc>) {
        self.last_used_ms
            .store(at.timestamp_millis(), Ordering::Relaxed);
    }

    /// Not read within `window` as of `now`
    pub fn is_stale(&self, window: Duration, now: DateTime<Utc>) -> bool {
        (now - self.last_used())
            .to_std()
            .map(|idle| idle > window)
            .unwrap_or(false)
    }

    /// Expand the compacted document on a background task
    ///
    /// On success the graph is stored, `on_complete` runs, and only then is
    /// the page published as `Loaded`, so anyone who waited on
    /// [`Page::wait_loaded`] sees the callback's effects. A page disposed
    /// before or during the load never reaches `on_complete`.
    ///
    /// Only the first call schedules work; later calls return `None`.
    pub fn begin_load<F, Fut>(
        self: &Arc<Self>,
        expander: Arc<dyn Expander>,
        on_complete: F,
    ) -> Option<JoinHandle<()>>
    where
        F: FnOnce(Arc<Page>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.load_started.swap(true, Ordering::AcqRel) {
            warn!("Load already started for page: {}", self.uri);
            return None;
        }

        let page = Arc::clone(self);
        Some(tokio::spawn(async move {
            let Some(document) = page.compacted() else {
                debug!("Page disposed before load: {}", page.uri);
                return;
            };

            let base = Arc::clone(&page.uri);
            let expanded =
                tokio::task::spawn_blocking(move || expander.expand(&document, &base)).await;

            match expanded {
                Ok(Ok(triples)) => {
                    let graph: Graph = triples
                        .into_iter()
                        .map(|t| t.with_page(Arc::clone(&page.uri)))
                        .collect();
                    let size = graph.len();

                    if !page.store_graph(graph) {
                        debug!("Page disposed during load, dropping graph: {}", page.uri);
                        return;
                    }

                    on_complete(Arc::clone(&page)).await;
                    page.settle(PageState::Loaded);
                    debug!("Loaded page {} ({} triples)", page.uri, size);
                }
                Ok(Err(e)) => {
                    warn!("Failed to expand page {}: {}", page.uri, e);
                    page.settle(PageState::Failed);
                }
                Err(e) => {
                    warn!("Expansion task for page {} did not finish: {}", page.uri, e);
                    page.settle(PageState::Failed);
                }
            }
        }))
    }

    /// Wait until the page leaves `Loading`, returning the state it settled in
    pub async fn wait_loaded(&self) -> PageState {
        let mut rx = self.state.subscribe();
        let settled = rx.wait_for(PageState::is_settled).await.map(|state| *state);
        settled.unwrap_or(PageState::Disposed)
    }

    /// Drop the document and graph. Idempotent.
    pub fn dispose(&self) {
        if self.state.send_replace(PageState::Disposed) == PageState::Disposed {
            return;
        }

        let mut contents = self.contents();
        contents.compacted = None;
        contents.graph = None;
        debug!("Disposed page: {}", self.uri);
    }

    fn store_graph(&self, graph: Graph) -> bool {
        let mut contents = self.contents();
        if self.is_disposed() {
            return false;
        }
        contents.graph = Some(Arc::new(graph));
        true
    }

    fn settle(&self, next: PageState) {
        self.state.send_if_modified(|state| {
            if *state == PageState::Loading {
                *state = next;
                true
            } else {
                false
            }
        });
    }

    fn contents(&self) -> MutexGuard<'_, PageContents> {
        self.contents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
