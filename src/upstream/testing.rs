//! In-memory upstream used by unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use crate::catalog::{FilterCriteria, NormalizedFilterKey, ProductPage, PublicProduct};
use crate::error::UpstreamError;
use crate::upstream::ProductSource;

type Slot = (NormalizedFilterKey, Option<String>);

/// Serves scripted pages per (filter key, cursor) and counts upstream calls.
/// A slot can be held until the test releases it.
#[derive(Default)]
pub struct ScriptedSource {
    pages: Mutex<HashMap<Slot, Result<ProductPage, UpstreamError>>>,
    products: Mutex<HashMap<String, PublicProduct>>,
    holds: Mutex<HashMap<Slot, Arc<Notify>>>,
    product_holds: Mutex<HashMap<String, Arc<Notify>>>,
    calls: AtomicUsize,
    log: Mutex<Vec<Slot>>,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, criteria: &FilterCriteria, cursor: Option<&str>, page: ProductPage) {
        self.pages
            .lock()
            .unwrap()
            .insert((criteria.key(), cursor.map(str::to_string)), Ok(page));
    }

    pub fn script_error(&self, criteria: &FilterCriteria, cursor: Option<&str>, err: UpstreamError) {
        self.pages
            .lock()
            .unwrap()
            .insert((criteria.key(), cursor.map(str::to_string)), Err(err));
    }

    pub fn script_product(&self, product: PublicProduct) {
        self.products
            .lock()
            .unwrap()
            .insert(product.id.clone(), product);
    }

    /// Block responses for this slot until [`Notify::notify_one`] is called on
    /// the returned handle.
    pub fn hold(&self, criteria: &FilterCriteria, cursor: Option<&str>) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.holds.lock().unwrap().insert(
            (criteria.key(), cursor.map(str::to_string)),
            Arc::clone(&notify),
        );
        notify
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested_cursors(&self) -> Vec<Option<String>> {
        self.log.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    /// Block product responses for `id` until released.
    pub fn hold_product(&self, id: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.product_holds
            .lock()
            .unwrap()
            .insert(id.to_string(), Arc::clone(&notify));
        notify
    }

    pub async fn wait_for_calls(&self, n: usize) {
        eventually(|| self.calls() >= n, "upstream call count").await;
    }
}

/// Poll `done` until it holds, failing the test after five seconds. Sleeps
/// rather than yields so a paused clock still reaches the deadline.
pub async fn eventually(mut done: impl FnMut() -> bool, what: &str) {
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {what}");
}

#[async_trait]
impl ProductSource for ScriptedSource {
    async fn fetch_page(
        &self,
        criteria: &FilterCriteria,
        cursor: Option<&str>,
    ) -> Result<ProductPage, UpstreamError> {
        let slot = (criteria.key(), cursor.map(str::to_string));
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(slot.clone());

        let hold = self.holds.lock().unwrap().get(&slot).cloned();
        if let Some(hold) = hold {
            hold.notified().await;
        }

        self.pages
            .lock()
            .unwrap()
            .get(&slot)
            .cloned()
            .unwrap_or_else(|| Err(UpstreamError::status(400, "invalid cursor")))
    }

    async fn fetch_product(&self, id: &str) -> Result<PublicProduct, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hold = self.product_holds.lock().unwrap().get(id).cloned();
        if let Some(hold) = hold {
            hold.notified().await;
        }
        self.products
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| UpstreamError::status(404, "not found"))
    }
}
