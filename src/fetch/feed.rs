//! The product list currently on screen.
//!
//! Switching filters bumps an epoch. Every load carries the epoch it was
//! started under and its result is applied only if that epoch is still
//! current, so a slow response for an abandoned filter never lands in the
//! list of the new one.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::catalog::{FilterCriteria, NormalizedFilterKey, ProductPage, PublicProduct};
use crate::error::FetchError;
use crate::fetch::cache::{ObserverGuard, PageChain};
use crate::fetch::controller::ProductCatalog;

#[derive(Debug, Clone, PartialEq)]
pub enum FeedStatus {
    Idle,
    Loading,
    LoadingMore,
    Ready,
    Failed(FetchError),
}

/// What happened to a load once it completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    Applied,
    /// The filters changed while the request was outstanding.
    Discarded,
    /// Nothing left to load.
    Exhausted,
}

/// Handle for the load of one selected filter.
#[derive(Debug, Clone)]
pub struct FeedTicket {
    epoch: u64,
    criteria: FilterCriteria,
}

impl FeedTicket {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }
}

struct FeedState {
    epoch: u64,
    criteria: FilterCriteria,
    key: Option<NormalizedFilterKey>,
    pages: Vec<ProductPage>,
    status: FeedStatus,
    observer: Option<ObserverGuard<PageChain>>,
}

#[derive(Clone)]
pub struct ProductFeed {
    catalog: ProductCatalog,
    state: Arc<Mutex<FeedState>>,
}

impl ProductFeed {
    pub fn new(catalog: ProductCatalog) -> Self {
        Self {
            catalog,
            state: Arc::new(Mutex::new(FeedState {
                epoch: 0,
                criteria: FilterCriteria::default(),
                key: None,
                pages: Vec::new(),
                status: FeedStatus::Idle,
                observer: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make `criteria` the current filter. Loads started earlier become stale.
    pub fn select(&self, criteria: &FilterCriteria) -> FeedTicket {
        let normalized = criteria.normalized();
        let key = normalized.key();
        let observer = self.catalog.observe(&normalized);

        let mut state = self.lock();
        state.epoch += 1;
        state.key = Some(key);
        state.criteria = normalized.clone();
        state.pages.clear();
        state.status = FeedStatus::Loading;
        // Replacing the guard releases the previous key.
        state.observer = Some(observer);

        FeedTicket {
            epoch: state.epoch,
            criteria: normalized,
        }
    }

    /// Load the cached (or freshly fetched) listing for a ticket.
    pub async fn load(&self, ticket: &FeedTicket) -> Result<FeedOutcome, FetchError> {
        let result = self.catalog.load(&ticket.criteria).await;

        let mut state = self.lock();
        if state.epoch != ticket.epoch {
            debug!(
                ticket = ticket.epoch,
                current = state.epoch,
                "discarding listing for a replaced filter"
            );
            return Ok(FeedOutcome::Discarded);
        }
        match result {
            Ok(chain) => {
                state.pages = chain.pages().to_vec();
                state.status = FeedStatus::Ready;
                Ok(FeedOutcome::Applied)
            }
            Err(err) => {
                state.status = FeedStatus::Failed(err.clone());
                Err(err)
            }
        }
    }

    /// `select` followed by `load`.
    pub async fn apply(&self, criteria: &FilterCriteria) -> Result<FeedOutcome, FetchError> {
        let ticket = self.select(criteria);
        self.load(&ticket).await
    }

    /// Fetch the page after the last one shown.
    pub async fn load_more(&self) -> Result<FeedOutcome, FetchError> {
        let (epoch, criteria, cursor) = {
            let mut state = self.lock();
            let Some(cursor) = state
                .pages
                .last()
                .and_then(|page| page.next_cursor.clone())
            else {
                return Ok(FeedOutcome::Exhausted);
            };
            state.status = FeedStatus::LoadingMore;
            (state.epoch, state.criteria.clone(), cursor)
        };

        let result = self.catalog.fetch_next_page(&criteria, &cursor).await;

        let mut state = self.lock();
        if state.epoch != epoch {
            debug!(ticket = epoch, current = state.epoch, cursor = %cursor, "discarding page for a replaced filter");
            return Ok(FeedOutcome::Discarded);
        }
        match result {
            Ok(page) => {
                let continues = state
                    .pages
                    .last()
                    .and_then(|last| last.next_cursor.as_deref())
                    == Some(cursor.as_str());
                if continues {
                    state.pages.push(page);
                }
                state.status = FeedStatus::Ready;
                Ok(FeedOutcome::Applied)
            }
            Err(err) => {
                state.status = FeedStatus::Failed(err.clone());
                Err(err)
            }
        }
    }

    /// Visible products: every loaded page, concatenated in fetch order.
    pub fn products(&self) -> Vec<PublicProduct> {
        self.lock()
            .pages
            .iter()
            .flat_map(|page| page.products.iter().cloned())
            .collect()
    }

    pub fn has_more(&self) -> bool {
        self.lock()
            .pages
            .last()
            .is_some_and(ProductPage::has_more)
    }

    pub fn status(&self) -> FeedStatus {
        self.lock().status.clone()
    }

    pub fn current_key(&self) -> Option<NormalizedFilterKey> {
        self.lock().key.clone()
    }

    pub fn criteria(&self) -> FilterCriteria {
        self.lock().criteria.clone()
    }
}
