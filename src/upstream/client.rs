use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::catalog::query::{self, format_number};
use crate::catalog::{FilterCriteria, ProductPage, PublicProduct};
use crate::error::UpstreamError;

const API_KEY_HEADER: &str = "x-api-key";

/// Upstream product collaborator: filtering, ordering and paging happen there.
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// Fetch one listing page. `cursor` is `None` for the first page.
    async fn fetch_page(
        &self,
        criteria: &FilterCriteria,
        cursor: Option<&str>,
    ) -> Result<ProductPage, UpstreamError>;

    async fn fetch_product(&self, id: &str) -> Result<PublicProduct, UpstreamError>;
}

/// Query pairs for `GET /products`, in the order the upstream documents them.
pub fn listing_query(criteria: &FilterCriteria, cursor: Option<&str>) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
        pairs.push(("cursor", cursor.to_string()));
    }
    if let Some(limit) = criteria.limit.filter(|l| *l > 0) {
        pairs.push((query::PARAM_LIMIT, limit.to_string()));
    }
    if let Some(search) = criteria.search.as_deref().filter(|s| !s.is_empty()) {
        pairs.push((query::PARAM_SEARCH, search.to_string()));
    }
    pairs.push(("status", criteria.status().as_str().to_string()));
    if let Some(min) = criteria.min_price {
        pairs.push((query::PARAM_MIN_PRICE, format_number(min)));
    }
    if let Some(max) = criteria.max_price {
        pairs.push((query::PARAM_MAX_PRICE, format_number(max)));
    }
    push_csv(&mut pairs, query::PARAM_STORES, criteria.stores.as_deref(), |s| s.as_str());
    push_csv(&mut pairs, query::PARAM_CATEGORIES, criteria.categories.as_deref(), |c| c.as_str());
    push_csv(&mut pairs, query::PARAM_REGIONS, criteria.regions.as_deref(), |r| r.as_str());
    pairs
}

fn push_csv<T>(
    pairs: &mut Vec<(&'static str, String)>,
    name: &'static str,
    values: Option<&[T]>,
    wire: fn(&T) -> &'static str,
) {
    if let Some(values) = values.filter(|v| !v.is_empty()) {
        let csv = values.iter().map(wire).collect::<Vec<_>>().join(",");
        pairs.push((name, csv));
    }
}

/// HTTP client for the upstream product REST API.
#[derive(Debug, Clone)]
pub struct ProductsClient {
    base_url: String,
    api_key: String,
    http: Client,
}

impl ProductsClient {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: Option<u64>) -> anyhow::Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let timeout_secs = timeout_secs.unwrap_or(15);
        let http = Client::builder()
            .user_agent(concat!("Takonbini/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            base_url,
            api_key: api_key.to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&'static str, String)],
    ) -> Result<T, UpstreamError> {
        let resp = self
            .http
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let err = UpstreamError::status(status.as_u16(), body);
            if status == StatusCode::NOT_FOUND {
                debug!(url, status = status.as_u16(), "upstream resource not found");
            } else if let UpstreamError::Status { body, .. } = &err {
                warn!(url, status = status.as_u16(), body = %body, "upstream request failed");
            }
            return Err(err);
        }

        resp.json::<T>()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ProductSource for ProductsClient {
    async fn fetch_page(
        &self,
        criteria: &FilterCriteria,
        cursor: Option<&str>,
    ) -> Result<ProductPage, UpstreamError> {
        let url = format!("{}/products", self.base_url);
        let query = listing_query(criteria, cursor);
        debug!(url = %url, cursor = ?cursor, "fetching product page");
        self.get_json(&url, &query).await
    }

    async fn fetch_product(&self, id: &str) -> Result<PublicProduct, UpstreamError> {
        let url = format!("{}/products/{}", self.base_url, urlencoding::encode(id));
        self.get_json(&url, &[]).await
    }
}
