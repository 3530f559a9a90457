//! Process-wide request cache with a stale-while-revalidate window and an
//! eviction window for entries nobody observes.
//!
//! Entries are keyed by resource kind plus a key string (a normalized filter
//! key for listings, a product id for detail lookups). Distinct keys never
//! share data.
//!
//! # Thread safety
//!
//! State sits behind a `std::sync::Mutex`. The lock is held only for map
//! operations, never across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::catalog::{NormalizedFilterKey, ProductPage, PublicProduct};

/// Data older than this is served but refreshed in the background.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30 * 60);
/// Unobserved entries older than this are dropped.
pub const DEFAULT_EVICT_AFTER: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub stale_after: Duration,
    pub evict_after: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            stale_after: DEFAULT_STALE_AFTER,
            evict_after: DEFAULT_EVICT_AFTER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    ProductPages,
    ProductDetail,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: ResourceKind,
    pub id: String,
}

impl CacheKey {
    pub fn pages(key: &NormalizedFilterKey) -> Self {
        Self {
            kind: ResourceKind::ProductPages,
            id: key.as_str().to_string(),
        }
    }

    pub fn product(id: &str) -> Self {
        Self {
            kind: ResourceKind::ProductDetail,
            id: id.to_string(),
        }
    }
}

/// Listing pages for one filter key, in fetch order, with the cursor each
/// page was requested with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageChain {
    pages: Vec<ProductPage>,
    cursors: Vec<Option<String>>,
}

impl PageChain {
    pub fn first(page: ProductPage) -> Self {
        Self {
            pages: vec![page],
            cursors: vec![None],
        }
    }

    /// Append `page` if it continues the chain: its request cursor must be the
    /// last page's `next_cursor`.
    pub fn push(&mut self, cursor: &str, page: ProductPage) -> bool {
        let continues = self
            .pages
            .last()
            .and_then(|last| last.next_cursor.as_deref())
            == Some(cursor);
        if continues {
            self.pages.push(page);
            self.cursors.push(Some(cursor.to_string()));
        }
        continues
    }

    pub fn pages(&self) -> &[ProductPage] {
        &self.pages
    }

    pub fn cursor_chain(&self) -> &[Option<String>] {
        &self.cursors
    }

    /// The page that was fetched with `cursor`, if the chain holds it.
    pub fn page_at(&self, cursor: Option<&str>) -> Option<&ProductPage> {
        let idx = self.cursors.iter().position(|c| c.as_deref() == cursor)?;
        self.pages.get(idx)
    }

    pub fn last_page(&self) -> Option<&ProductPage> {
        self.pages.last()
    }

    /// Cursor for the page after the last cached one.
    pub fn next_cursor(&self) -> Option<&str> {
        self.last_page().and_then(|p| p.next_cursor.as_deref())
    }

    pub fn has_more(&self) -> bool {
        self.next_cursor().is_some()
    }

    /// Products of every page, concatenated in fetch order.
    pub fn products(&self) -> Vec<PublicProduct> {
        self.pages
            .iter()
            .flat_map(|p| p.products.iter().cloned())
            .collect()
    }
}

/// Snapshot of one cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub fetched_at: Instant,
    pub observers: usize,
    unobserved_since: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn new(value: V, now: Instant) -> Self {
        Self {
            value,
            fetched_at: now,
            observers: 0,
            unobserved_since: Some(now),
        }
    }

    pub fn is_stale(&self, now: Instant, policy: &CachePolicy) -> bool {
        now.saturating_duration_since(self.fetched_at) >= policy.stale_after
    }

    pub fn is_evictable(&self, now: Instant, policy: &CachePolicy) -> bool {
        self.observers == 0
            && self
                .unobserved_since
                .is_some_and(|since| now.saturating_duration_since(since) >= policy.evict_after)
    }
}

struct CacheState<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    observers: HashMap<CacheKey, usize>,
}

/// Request cache shared by every consumer of one resource type.
pub struct RequestCache<V> {
    policy: CachePolicy,
    state: Arc<Mutex<CacheState<V>>>,
}

impl<V: Clone> RequestCache<V> {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            state: Arc::new(Mutex::new(CacheState {
                entries: HashMap::new(),
                observers: HashMap::new(),
            })),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        lock_state(&self.state)
    }

    /// Entry for `key`, unless absent or due for eviction (which drops it).
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        let now = Instant::now();
        let mut state = self.lock();
        let evict = state
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_evictable(now, &self.policy));
        if evict {
            debug!(key = %key.id, kind = ?key.kind, "evicting unobserved cache entry");
            state.entries.remove(key);
            return None;
        }
        state.entries.get(key).cloned()
    }

    pub fn is_stale(&self, entry: &CacheEntry<V>) -> bool {
        entry.is_stale(Instant::now(), &self.policy)
    }

    /// Store `value`, replacing any previous entry and resetting its age.
    pub fn insert(&self, key: CacheKey, value: V) {
        let now = Instant::now();
        let mut state = self.lock();
        let observers = state.observers.get(&key).copied().unwrap_or(0);
        let mut entry = CacheEntry::new(value, now);
        entry.observers = observers;
        if observers > 0 {
            entry.unobserved_since = None;
        }
        state.entries.insert(key, entry);
    }

    /// Mutate an existing entry in place; refreshes `fetched_at` when `f`
    /// reports a change. Returns `false` when no entry exists.
    pub fn update(&self, key: &CacheKey, f: impl FnOnce(&mut V) -> bool) -> bool {
        let now = Instant::now();
        let mut state = self.lock();
        match state.entries.get_mut(key) {
            Some(entry) => {
                let changed = f(&mut entry.value);
                if changed {
                    entry.fetched_at = now;
                }
                changed
            }
            None => false,
        }
    }

    pub fn invalidate(&self, key: &CacheKey) {
        if self.lock().entries.remove(key).is_some() {
            debug!(key = %key.id, kind = ?key.kind, "cache entry invalidated");
        }
    }

    /// Register an active observer; the entry is not evicted while any
    /// observer guard is alive.
    pub fn observe(&self, key: CacheKey) -> ObserverGuard<V> {
        let mut state = self.lock();
        *state.observers.entry(key.clone()).or_insert(0) += 1;
        let count = state.observers[&key];
        if let Some(entry) = state.entries.get_mut(&key) {
            entry.observers = count;
            entry.unobserved_since = None;
        }
        ObserverGuard {
            key,
            state: Arc::clone(&self.state),
        }
    }

    /// Drop every evictable entry. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let policy = self.policy;
        let mut state = self.lock();
        let before = state.entries.len();
        state
            .entries
            .retain(|_, entry| !entry.is_evictable(now, &policy));
        before - state.entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget everything, observers included.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.observers.clear();
    }
}

impl RequestCache<PageChain> {
    /// Record a fetched listing page. A first page (`cursor == None`) starts a
    /// new chain; a later page is appended only if it continues the cached
    /// chain. Returns whether the page was stored.
    pub fn put_page(&self, key: &NormalizedFilterKey, cursor: Option<&str>, page: ProductPage) -> bool {
        let cache_key = CacheKey::pages(key);
        match cursor {
            None => {
                self.insert(cache_key, PageChain::first(page));
                true
            }
            Some(cursor) => {
                let stored = self.update(&cache_key, |chain| chain.push(cursor, page));
                if !stored {
                    debug!(key = %key, cursor, "dropping page that does not continue the cached chain");
                }
                stored
            }
        }
    }
}

impl<V: Clone> Default for RequestCache<V> {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

fn lock_state<V>(state: &Mutex<CacheState<V>>) -> MutexGuard<'_, CacheState<V>> {
    // A panic while holding the lock leaves plain map data behind; keep serving it.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps a cache entry alive while held.
pub struct ObserverGuard<V> {
    key: CacheKey,
    state: Arc<Mutex<CacheState<V>>>,
}

impl<V> ObserverGuard<V> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl<V> Drop for ObserverGuard<V> {
    fn drop(&mut self) {
        let now = Instant::now();
        let mut state = lock_state(&self.state);
        let remaining = match state.observers.get_mut(&self.key) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            state.observers.remove(&self.key);
        }
        if let Some(entry) = state.entries.get_mut(&self.key) {
            entry.observers = remaining;
            if remaining == 0 {
                entry.unobserved_since = Some(now);
            }
        }
    }
}
