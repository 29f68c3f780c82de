use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use shared::{
    domain::Collection,
    protocol::{PageMeta, PageRequest},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::warn;

use crate::{backends::ListingBackend, error::FetchError};

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const DEFAULT_SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy)]
pub struct PagerOptions {
    pub per_page: u32,
    pub search_debounce: Duration,
}

impl Default for PagerOptions {
    fn default() -> Self {
        Self {
            per_page: DEFAULT_PER_PAGE,
            search_debounce: DEFAULT_SEARCH_DEBOUNCE,
        }
    }
}

/// How a page load resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLoad {
    /// The response replaced the pager's items and metadata.
    Applied,
    /// A newer request was issued while this one was in flight; its response
    /// was discarded. Not an error.
    Superseded,
    /// The request was never sent (already at the boundary).
    Ignored,
}

#[derive(Debug, Clone)]
pub enum PagerEvent {
    PageApplied { page: u32, total_pages: u32 },
    FetchFailed { error: String },
}

struct PagerState<T> {
    items: Vec<T>,
    meta: PageMeta,
    search: String,
    busy: bool,
    /// True once the metadata reflects a real page count, either from a
    /// successful load or from a seeded snapshot.
    total_known: bool,
}

fn empty_meta(per_page: u32) -> PageMeta {
    PageMeta {
        current_page: 1,
        total_pages: 1,
        total_count: 0,
        per_page,
        has_previous: false,
        has_next: false,
        start_index: 0,
        end_index: 0,
    }
}

/// Client-side controller for one server-paginated, server-searched listing.
///
/// State is replaced wholesale from each response's pagination metadata; the
/// pager never counts locally. Concurrent loads resolve last-issued-wins: a
/// monotonic ticket is taken per request and a response only applies if no
/// newer ticket exists by the time it lands.
pub struct CollectionPager<T> {
    backend: Arc<dyn ListingBackend<T>>,
    collection: Collection,
    options: PagerOptions,
    issue: AtomicU64,
    inner: Mutex<PagerState<T>>,
    debounce: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<PagerEvent>,
}

impl<T: Clone + Send + 'static> CollectionPager<T> {
    pub fn new(collection: Collection, backend: Arc<dyn ListingBackend<T>>) -> Arc<Self> {
        Self::with_options(collection, backend, PagerOptions::default())
    }

    pub fn with_options(
        collection: Collection,
        backend: Arc<dyn ListingBackend<T>>,
        options: PagerOptions,
    ) -> Arc<Self> {
        Self::build(collection, backend, options, empty_meta(options.per_page), false)
    }

    /// Seeds the cursor from pagination metadata the host already holds; the
    /// page count is treated as known from the start, so even the first
    /// `go_to` is clamped against it.
    pub fn with_snapshot(
        collection: Collection,
        backend: Arc<dyn ListingBackend<T>>,
        options: PagerOptions,
        snapshot: PageMeta,
    ) -> Arc<Self> {
        Self::build(collection, backend, options, snapshot, true)
    }

    fn build(
        collection: Collection,
        backend: Arc<dyn ListingBackend<T>>,
        options: PagerOptions,
        meta: PageMeta,
        total_known: bool,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            backend,
            collection,
            options,
            issue: AtomicU64::new(0),
            inner: Mutex::new(PagerState {
                items: Vec::new(),
                meta,
                search: String::new(),
                busy: false,
                total_known,
            }),
            debounce: Mutex::new(None),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PagerEvent> {
        self.events.subscribe()
    }

    pub async fn items(&self) -> Vec<T> {
        self.inner.lock().await.items.clone()
    }

    pub async fn meta(&self) -> PageMeta {
        self.inner.lock().await.meta
    }

    pub async fn search(&self) -> String {
        self.inner.lock().await.search.clone()
    }

    pub async fn is_busy(&self) -> bool {
        self.inner.lock().await.busy
    }

    pub async fn summary(&self, item_label: &str) -> String {
        self.inner.lock().await.meta.summary(item_label)
    }

    /// Loads the current page again with the current search.
    pub async fn refresh(self: &Arc<Self>) -> Result<PageLoad, FetchError> {
        let page = self.inner.lock().await.meta.current_page;
        self.load(page).await
    }

    /// Jumps to `page`, clamped against the last known page count. Before the
    /// count is known any page >= 1 is attempted as-is; the server clamps
    /// either way, so a stale count cannot push us out of range.
    pub async fn go_to(self: &Arc<Self>, page: u32) -> Result<PageLoad, FetchError> {
        let target = {
            let inner = self.inner.lock().await;
            if inner.total_known {
                page.clamp(1, inner.meta.total_pages)
            } else {
                page.max(1)
            }
        };
        self.load(target).await
    }

    pub async fn previous(self: &Arc<Self>) -> Result<PageLoad, FetchError> {
        let meta = self.inner.lock().await.meta;
        if !meta.has_previous {
            return Ok(PageLoad::Ignored);
        }
        self.load(meta.current_page - 1).await
    }

    pub async fn next(self: &Arc<Self>) -> Result<PageLoad, FetchError> {
        let meta = self.inner.lock().await.meta;
        if !meta.has_next {
            return Ok(PageLoad::Ignored);
        }
        self.load(meta.current_page + 1).await
    }

    /// Schedules a debounced search. Each call replaces the pending timer,
    /// so only the last term of a typing burst reaches the network.
    pub async fn set_search(self: &Arc<Self>, raw: &str) {
        let term = raw.trim().to_string();
        let mut slot = self.debounce.lock().await;
        if let Some(pending) = slot.take() {
            pending.abort();
        }
        let pager = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(pager.options.search_debounce).await;
            if let Err(error) = pager.set_search_now(&term).await {
                warn!(%error, "debounced search fetch failed");
            }
        }));
    }

    /// Applies a search term immediately. A new term always restarts from
    /// page 1.
    pub async fn set_search_now(self: &Arc<Self>, raw: &str) -> Result<PageLoad, FetchError> {
        {
            let mut inner = self.inner.lock().await;
            inner.search = raw.trim().to_string();
        }
        self.load(1).await
    }

    async fn load(self: &Arc<Self>, page: u32) -> Result<PageLoad, FetchError> {
        let ticket = self.issue.fetch_add(1, Ordering::SeqCst) + 1;
        let request = {
            let mut inner = self.inner.lock().await;
            inner.busy = true;
            PageRequest {
                collection: self.collection,
                page,
                search: inner.search.clone(),
                per_page: self.options.per_page,
            }
        };

        let result = self.backend.fetch_page(&request).await;

        let mut inner = self.inner.lock().await;
        if self.issue.load(Ordering::SeqCst) != ticket {
            // A newer request owns the state now; leave everything to it,
            // including the busy flag.
            return Ok(PageLoad::Superseded);
        }
        inner.busy = false;

        match result {
            Ok(page_result) => {
                inner.items = page_result.items;
                inner.meta = page_result.pagination;
                inner.total_known = true;
                let _ = self.events.send(PagerEvent::PageApplied {
                    page: inner.meta.current_page,
                    total_pages: inner.meta.total_pages,
                });
                Ok(PageLoad::Applied)
            }
            Err(error) => {
                // Items and metadata stay exactly as they were.
                let _ = self.events.send(PagerEvent::FetchFailed {
                    error: error.to_string(),
                });
                Err(error)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/pagination_tests.rs"]
mod tests;
