//! Cursor-paginated product fetching on top of the request cache.
//!
//! Every upstream request goes through an in-flight table keyed by its slot
//! ((filter key, cursor) for listing pages, the product id for details):
//! concurrent callers asking for the same slot share one upstream call. Each
//! call runs on its own task and writes its result to the cache itself, so
//! the cache sees each response exactly once even if every caller waiting on
//! it has gone away.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::catalog::{FilterCriteria, NormalizedFilterKey, ProductPage, PublicProduct};
use crate::error::{FetchError, UpstreamError};
use crate::fetch::cache::{CacheKey, CachePolicy, ObserverGuard, PageChain, RequestCache};
use crate::upstream::ProductSource;

type PageSlot = (NormalizedFilterKey, Option<String>);
type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, UpstreamError>>>;

/// Upstream requests currently running, by slot.
struct Inflight<K, T> {
    slots: Arc<Mutex<HashMap<K, SharedFetch<T>>>>,
}

impl<K, T> Inflight<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    /// Join the request running for `slot`, or spawn the one built by `start`.
    /// The slot is released when the spawned task finishes, whether or not
    /// anyone is still waiting for it.
    fn join_or_start<F>(&self, slot: K, start: impl FnOnce() -> F) -> SharedFetch<T>
    where
        F: Future<Output = Result<T, UpstreamError>> + Send + 'static,
    {
        // Held until the slot is inserted: the task's removal cannot overtake it.
        let mut slots = lock(&self.slots);
        if let Some(existing) = slots.get(&slot) {
            debug!(slot = ?slot, "joining in-flight upstream request");
            return existing.clone();
        }

        let request = start();
        let table = Arc::clone(&self.slots);
        let finished = slot.clone();
        let handle = tokio::spawn(async move {
            let result = request.await;
            lock(&table).remove(&finished);
            result
        });
        let shared = async move {
            handle.await.unwrap_or_else(|err| {
                Err(UpstreamError::Transport(format!("upstream task ended: {err}")))
            })
        }
        .boxed()
        .shared();

        slots.insert(slot, shared.clone());
        shared
    }
}

struct CatalogInner {
    source: Arc<dyn ProductSource>,
    pages: RequestCache<PageChain>,
    products: RequestCache<PublicProduct>,
    page_requests: Inflight<PageSlot, ProductPage>,
    product_requests: Inflight<CacheKey, PublicProduct>,
    refreshing: Mutex<HashSet<CacheKey>>,
}

/// Paginated fetch controller. Cheap to clone; clones share the cache and the
/// in-flight tables.
#[derive(Clone)]
pub struct ProductCatalog {
    inner: Arc<CatalogInner>,
}

impl std::fmt::Debug for ProductCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductCatalog")
            .field("cached_listings", &self.inner.pages.len())
            .field("cached_products", &self.inner.products.len())
            .field("inflight_pages", &self.inner.page_requests.len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ProductCatalog {
    pub fn new(source: Arc<dyn ProductSource>, policy: CachePolicy) -> Self {
        Self {
            inner: Arc::new(CatalogInner {
                source,
                pages: RequestCache::new(policy),
                products: RequestCache::new(policy),
                page_requests: Inflight::new(),
                product_requests: Inflight::new(),
                refreshing: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn page_cache(&self) -> &RequestCache<PageChain> {
        &self.inner.pages
    }

    pub fn product_cache(&self) -> &RequestCache<PublicProduct> {
        &self.inner.products
    }

    /// Upstream requests currently running (listing pages and products).
    pub fn inflight(&self) -> usize {
        self.inner.page_requests.len() + self.inner.product_requests.len()
    }

    /// Whether a background refresh is running for the listing of `criteria`.
    pub fn is_refreshing(&self, criteria: &FilterCriteria) -> bool {
        lock(&self.inner.refreshing).contains(&CacheKey::pages(&criteria.key()))
    }

    /// Mark the listing for `criteria` as in use so it is not evicted.
    pub fn observe(&self, criteria: &FilterCriteria) -> ObserverGuard<PageChain> {
        self.inner.pages.observe(CacheKey::pages(&criteria.key()))
    }

    /// Drop evictable entries from both caches.
    pub fn sweep(&self) -> usize {
        self.inner.pages.sweep() + self.inner.products.sweep()
    }

    pub async fn fetch_first_page(&self, criteria: &FilterCriteria) -> Result<ProductPage, FetchError> {
        self.fetch_page(criteria, None).await
    }

    /// Fetch the page at `cursor`. An invalid or expired cursor surfaces as the
    /// upstream's error; it is not retried.
    pub async fn fetch_next_page(
        &self,
        criteria: &FilterCriteria,
        cursor: &str,
    ) -> Result<ProductPage, FetchError> {
        self.fetch_page(criteria, Some(cursor)).await
    }

    async fn fetch_page(
        &self,
        criteria: &FilterCriteria,
        cursor: Option<&str>,
    ) -> Result<ProductPage, FetchError> {
        criteria.validate()?;
        let request = self.page_request(criteria.normalized(), cursor.map(str::to_string));
        Ok(request.await?)
    }

    fn page_request(&self, criteria: FilterCriteria, cursor: Option<String>) -> SharedFetch<ProductPage> {
        let key = criteria.key();
        let slot: PageSlot = (key.clone(), cursor.clone());
        let inner = Arc::clone(&self.inner);

        self.inner.page_requests.join_or_start(slot, move || async move {
            let result = inner.source.fetch_page(&criteria, cursor.as_deref()).await;
            match &result {
                Ok(page) => {
                    inner.pages.put_page(&key, cursor.as_deref(), page.clone());
                    debug!(
                        key = %key,
                        cursor = ?cursor,
                        products = page.products.len(),
                        has_more = page.has_more(),
                        "page fetched"
                    );
                }
                Err(err) => warn!(key = %key, cursor = ?cursor, error = %err, "page fetch failed"),
            }
            result
        })
    }

    /// Ensure the listing for `criteria` is cached and return it.
    ///
    /// Fresh data is returned as-is. Stale data is returned immediately and a
    /// background refetch is started. Without an entry the first page is
    /// fetched.
    pub async fn load(&self, criteria: &FilterCriteria) -> Result<PageChain, FetchError> {
        criteria.validate()?;
        let normalized = criteria.normalized();
        let cache_key = CacheKey::pages(&normalized.key());

        if let Some(entry) = self.inner.pages.get(&cache_key) {
            if self.inner.pages.is_stale(&entry) {
                self.spawn_listing_refresh(normalized, entry.value.pages().len());
            } else {
                debug!(key = %cache_key.id, "listing served from cache");
            }
            return Ok(entry.value);
        }

        let first = self.fetch_page(&normalized, None).await?;
        Ok(self
            .inner
            .pages
            .get(&cache_key)
            .map(|entry| entry.value)
            .unwrap_or_else(|| PageChain::first(first)))
    }

    /// Fetch the page following the last cached one. `Ok(None)` once the
    /// listing is exhausted.
    pub async fn fetch_more(&self, criteria: &FilterCriteria) -> Result<Option<ProductPage>, FetchError> {
        let chain = self.load(criteria).await?;
        match chain.next_cursor() {
            Some(cursor) => self.fetch_next_page(criteria, cursor).await.map(Some),
            None => Ok(None),
        }
    }

    /// Single listing page. The first page goes through [`load`](Self::load);
    /// a cursor page is answered from the cached chain when it holds that
    /// page and is otherwise fetched on its own.
    pub async fn page(
        &self,
        criteria: &FilterCriteria,
        cursor: Option<&str>,
    ) -> Result<ProductPage, FetchError> {
        let Some(cursor) = cursor else {
            let chain = self.load(criteria).await?;
            return match chain.page_at(None) {
                Some(first) => Ok(first.clone()),
                None => self.fetch_first_page(criteria).await,
            };
        };

        criteria.validate()?;
        let normalized = criteria.normalized();
        let cache_key = CacheKey::pages(&normalized.key());
        if let Some(entry) = self.inner.pages.get(&cache_key) {
            if let Some(page) = entry.value.page_at(Some(cursor)) {
                if self.inner.pages.is_stale(&entry) {
                    self.spawn_listing_refresh(normalized, entry.value.pages().len());
                }
                return Ok(page.clone());
            }
        }
        self.fetch_next_page(criteria, cursor).await
    }

    fn spawn_listing_refresh(&self, criteria: FilterCriteria, depth: usize) {
        let cache_key = CacheKey::pages(&criteria.key());
        if !lock(&self.inner.refreshing).insert(cache_key.clone()) {
            return;
        }
        info!(key = %cache_key.id, pages = depth, "listing is stale; refreshing in background");

        let catalog = self.clone();
        tokio::spawn(async move {
            if let Err(err) = catalog.refresh_listing(&criteria, depth).await {
                warn!(key = %cache_key.id, error = %err, "background refresh failed");
            }
            lock(&catalog.inner.refreshing).remove(&cache_key);
        });
    }

    /// Refetch up to `depth` pages from the start, replacing the cached chain
    /// page by page.
    async fn refresh_listing(&self, criteria: &FilterCriteria, depth: usize) -> Result<(), FetchError> {
        let mut page = self.fetch_page(criteria, None).await?;
        for _ in 1..depth {
            let Some(cursor) = page.next_cursor.clone() else {
                break;
            };
            page = self.fetch_page(criteria, Some(&cursor)).await?;
        }
        Ok(())
    }

    /// Product detail through the same stale-while-revalidate policy.
    pub async fn product(&self, id: &str) -> Result<PublicProduct, FetchError> {
        let cache_key = CacheKey::product(id);
        if let Some(entry) = self.inner.products.get(&cache_key) {
            if self.inner.products.is_stale(&entry) {
                self.spawn_product_refresh(cache_key);
            }
            return Ok(entry.value);
        }

        Ok(self.product_request(id).await?)
    }

    fn product_request(&self, id: &str) -> SharedFetch<PublicProduct> {
        let cache_key = CacheKey::product(id);
        let inner = Arc::clone(&self.inner);
        let id = id.to_string();

        self.inner
            .product_requests
            .join_or_start(cache_key.clone(), move || async move {
                let result = inner.source.fetch_product(&id).await;
                match &result {
                    Ok(product) => inner.products.insert(cache_key, product.clone()),
                    Err(err) => debug!(id = %id, error = %err, "product fetch failed"),
                }
                result
            })
    }

    fn spawn_product_refresh(&self, cache_key: CacheKey) {
        if !lock(&self.inner.refreshing).insert(cache_key.clone()) {
            return;
        }
        let catalog = self.clone();
        tokio::spawn(async move {
            if let Err(err) = catalog.product_request(&cache_key.id).await {
                warn!(id = %cache_key.id, error = %err, "product refresh failed");
            }
            lock(&catalog.inner.refreshing).remove(&cache_key);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::product::sample_product;
    use crate::catalog::{has_more, Store};
    use crate::upstream::testing::{eventually, ScriptedSource};
    use std::time::Duration;

    fn page(ids: &[&str], next: Option<&str>) -> ProductPage {
        ProductPage {
            products: ids.iter().map(|id| sample_product(id, Store::FamilyMart)).collect(),
            next_cursor: next.map(str::to_string),
        }
    }

    fn ids(products: &[PublicProduct]) -> Vec<&str> {
        products.iter().map(|p| p.id.as_str()).collect()
    }

    fn catalog(source: &Arc<ScriptedSource>) -> ProductCatalog {
        ProductCatalog::new(source.clone(), CachePolicy::default())
    }

    #[tokio::test]
    async fn sequential_pages_concatenate_in_fetch_order() {
        let source = ScriptedSource::new();
        let criteria = FilterCriteria::with_default_limit();
        source.script(&criteria, None, page(&["a", "b"], Some("c1")));
        source.script(&criteria, Some("c1"), page(&["c", "a"], None));
        let catalog = catalog(&source);

        let first = catalog.fetch_first_page(&criteria).await.unwrap();
        assert!(has_more(&first));
        let second = catalog.fetch_next_page(&criteria, "c1").await.unwrap();
        assert!(!has_more(&second));

        let chain = catalog.load(&criteria).await.unwrap();
        // Ids are not de-duplicated across pages.
        assert_eq!(ids(&chain.products()), vec!["a", "b", "c", "a"]);
        assert!(!chain.has_more());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn fetch_more_walks_the_cached_chain() {
        let source = ScriptedSource::new();
        let criteria = FilterCriteria::with_default_limit();
        source.script(&criteria, None, page(&["a"], Some("c1")));
        source.script(&criteria, Some("c1"), page(&["b"], None));
        let catalog = catalog(&source);

        assert_eq!(catalog.load(&criteria).await.unwrap().pages().len(), 1);
        let more = catalog.fetch_more(&criteria).await.unwrap().unwrap();
        assert_eq!(ids(&more.products), vec!["b"]);
        assert!(catalog.fetch_more(&criteria).await.unwrap().is_none());
        assert_eq!(source.requested_cursors(), vec![None, Some("c1".to_string())]);
    }

    #[tokio::test]
    async fn cursor_page_on_a_cold_key_is_a_single_upstream_call() {
        let source = ScriptedSource::new();
        let criteria = FilterCriteria::with_default_limit();
        source.script_error(&criteria, None, UpstreamError::status(503, "unavailable"));
        source.script(&criteria, Some("c1"), page(&["b"], None));
        let catalog = catalog(&source);

        // The first page is down; the cursor page is still served.
        let second = catalog.page(&criteria, Some("c1")).await.unwrap();
        assert_eq!(ids(&second.products), vec!["b"]);
        assert_eq!(source.requested_cursors(), vec![Some("c1".to_string())]);
    }

    #[tokio::test]
    async fn page_lookup_reuses_cached_pages() {
        let source = ScriptedSource::new();
        let criteria = FilterCriteria::with_default_limit();
        source.script(&criteria, None, page(&["a"], Some("c1")));
        source.script(&criteria, Some("c1"), page(&["b"], None));
        let catalog = catalog(&source);

        let first = catalog.page(&criteria, None).await.unwrap();
        assert_eq!(ids(&first.products), vec!["a"]);
        let second = catalog.page(&criteria, Some("c1")).await.unwrap();
        assert_eq!(ids(&second.products), vec!["b"]);
        assert_eq!(source.calls(), 2);

        let again = catalog.page(&criteria, Some("c1")).await.unwrap();
        assert_eq!(again, second);
        assert_eq!(catalog.page(&criteria, None).await.unwrap(), first);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn abandoned_request_still_completes_and_frees_its_slot() {
        let source = ScriptedSource::new();
        let criteria = FilterCriteria::with_default_limit();
        source.script(&criteria, None, page(&["a"], None));
        let release = source.hold(&criteria, None);
        let catalog = catalog(&source);

        let waiter = tokio::spawn({
            let catalog = catalog.clone();
            let criteria = criteria.clone();
            async move { catalog.fetch_first_page(&criteria).await }
        });
        source.wait_for_calls(1).await;
        assert_eq!(catalog.inflight(), 1);

        // The only caller goes away mid-request.
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());
        release.notify_one();

        eventually(|| catalog.inflight() == 0, "in-flight table to drain").await;
        let chain = catalog.load(&criteria).await.unwrap();
        assert_eq!(ids(&chain.products()), vec!["a"]);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn simultaneous_requests_share_one_upstream_call() {
        let source = ScriptedSource::new();
        let criteria = FilterCriteria::with_default_limit();
        source.script(&criteria, None, page(&["a"], None));
        let release = source.hold(&criteria, None);
        let catalog = catalog(&source);

        let first = tokio::spawn({
            let catalog = catalog.clone();
            let criteria = criteria.clone();
            async move { catalog.fetch_first_page(&criteria).await }
        });
        source.wait_for_calls(1).await;

        // Blank search normalizes away: same key, same in-flight slot.
        let second = tokio::spawn({
            let catalog = catalog.clone();
            let criteria = FilterCriteria {
                search: Some("  ".into()),
                ..criteria.clone()
            };
            async move { catalog.fetch_first_page(&criteria).await }
        });
        tokio::task::yield_now().await;
        release.notify_one();

        let (a, b) = (first.await.unwrap().unwrap(), second.await.unwrap().unwrap());
        assert_eq!(a, b);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn invalid_criteria_never_reach_upstream() {
        let source = ScriptedSource::new();
        let catalog = catalog(&source);
        let criteria = FilterCriteria {
            min_price: Some(500.0),
            max_price: Some(100.0),
            ..FilterCriteria::default()
        };

        let err = catalog.load(&criteria).await.unwrap_err();
        assert!(matches!(err, FetchError::Validation(_)));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn stale_cursor_error_is_propagated_without_retry() {
        let source = ScriptedSource::new();
        let criteria = FilterCriteria::with_default_limit();
        source.script_error(&criteria, Some("expired"), UpstreamError::status(400, "cursor expired"));
        let catalog = catalog(&source);

        let err = catalog.fetch_next_page(&criteria, "expired").await.unwrap_err();
        assert_eq!(
            err,
            FetchError::Upstream(UpstreamError::status(400, "cursor expired"))
        );
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_listing_is_served_then_refreshed_in_background() {
        let source = ScriptedSource::new();
        let criteria = FilterCriteria::with_default_limit();
        source.script(&criteria, None, page(&["old"], None));
        let catalog = catalog(&source);
        let _observer = catalog.observe(&criteria);

        catalog.load(&criteria).await.unwrap();
        source.script(&criteria, None, page(&["new"], None));

        tokio::time::advance(Duration::from_secs(31 * 60)).await;
        let served = catalog.load(&criteria).await.unwrap();
        assert_eq!(ids(&served.products()), vec!["old"]);

        source.wait_for_calls(2).await;
        eventually(|| !catalog.is_refreshing(&criteria), "background refresh").await;
        let refreshed = catalog.load(&criteria).await.unwrap();
        assert_eq!(ids(&refreshed.products()), vec!["new"]);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn background_refresh_rewalks_every_cached_page() {
        let source = ScriptedSource::new();
        let criteria = FilterCriteria::with_default_limit();
        source.script(&criteria, None, page(&["a"], Some("c1")));
        source.script(&criteria, Some("c1"), page(&["b"], None));
        let catalog = catalog(&source);
        let _observer = catalog.observe(&criteria);

        catalog.load(&criteria).await.unwrap();
        catalog.fetch_more(&criteria).await.unwrap();
        source.script(&criteria, None, page(&["a2"], Some("c1")));
        source.script(&criteria, Some("c1"), page(&["b2"], None));

        tokio::time::advance(Duration::from_secs(31 * 60)).await;
        let served = catalog.load(&criteria).await.unwrap();
        assert_eq!(ids(&served.products()), vec!["a", "b"]);

        source.wait_for_calls(4).await;
        eventually(|| !catalog.is_refreshing(&criteria), "background refresh").await;
        let refreshed = catalog.load(&criteria).await.unwrap();
        assert_eq!(ids(&refreshed.products()), vec!["a2", "b2"]);
        assert_eq!(refreshed.cursor_chain(), &[None, Some("c1".to_string())]);
        assert!(!refreshed.has_more());
        assert_eq!(
            source.requested_cursors(),
            vec![None, Some("c1".to_string()), None, Some("c1".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn evicted_listing_is_fetched_cold() {
        let source = ScriptedSource::new();
        let criteria = FilterCriteria::with_default_limit();
        source.script(&criteria, None, page(&["a"], None));
        let catalog = catalog(&source);

        catalog.load(&criteria).await.unwrap();
        tokio::time::advance(Duration::from_secs(61 * 60)).await;
        catalog.load(&criteria).await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn product_detail_is_cached() {
        let source = ScriptedSource::new();
        source.script_product(sample_product("p1", Store::SevenEleven));
        let catalog = catalog(&source);

        assert_eq!(catalog.product("p1").await.unwrap().id, "p1");
        assert_eq!(catalog.product("p1").await.unwrap().id, "p1");
        assert_eq!(source.calls(), 1);

        let err = catalog.product("missing").await.unwrap_err();
        assert_eq!(
            err,
            FetchError::Upstream(UpstreamError::status(404, "not found"))
        );
    }

    #[tokio::test]
    async fn simultaneous_product_lookups_share_one_upstream_call() {
        let source = ScriptedSource::new();
        source.script_product(sample_product("p1", Store::Lawson));
        let release = source.hold_product("p1");
        let catalog = catalog(&source);

        let lookups: Vec<_> = (0..2)
            .map(|_| {
                let catalog = catalog.clone();
                tokio::spawn(async move { catalog.product("p1").await })
            })
            .collect();
        source.wait_for_calls(1).await;
        eventually(|| catalog.inflight() == 1, "product request to register").await;
        tokio::task::yield_now().await;
        release.notify_one();

        for lookup in lookups {
            assert_eq!(lookup.await.unwrap().unwrap().id, "p1");
        }
        assert_eq!(source.calls(), 1);
        assert_eq!(catalog.inflight(), 0);
    }
}
