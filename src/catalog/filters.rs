//! Product filter criteria, normalization and validation.
//!
//! Normalized criteria are what the cache and the URL see: two criteria that
//! denote the same filter (list order, duplicates, blank search, an unchecked
//! "include soon" box) normalize to the same value and the same
//! [`NormalizedFilterKey`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::product::{Category, Region, Store};
use crate::catalog::query;
use crate::error::{PriceBound, ValidationError};

/// Page size used by the listing when no explicit limit is supplied.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Listing status understood by the upstream product API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductStatus {
    #[serde(rename = "allWithoutSoon")]
    AllWithoutSoon,
    #[serde(rename = "new")]
    New,
    #[serde(rename = "soon")]
    Soon,
    #[serde(rename = "all")]
    All,
}

impl ProductStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductStatus::AllWithoutSoon => "allWithoutSoon",
            ProductStatus::New => "new",
            ProductStatus::Soon => "soon",
            ProductStatus::All => "all",
        }
    }
}

/// Filter criteria for a product listing. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stores: Option<Vec<Store>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<Category>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<Region>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_soon: Option<bool>,
    /// Held as a float so a fractional draft value can be represented and rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl FilterCriteria {
    /// Criteria with only the default page size set.
    pub fn with_default_limit() -> Self {
        Self {
            limit: Some(DEFAULT_PAGE_LIMIT),
            ..Self::default()
        }
    }

    /// Canonical form: trimmed search, sorted and de-duplicated lists, empty
    /// values dropped.
    pub fn normalized(&self) -> FilterCriteria {
        FilterCriteria {
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            stores: normalize_list(self.stores.as_deref(), |s| s.as_str()),
            categories: normalize_list(self.categories.as_deref(), |c| c.as_str()),
            regions: normalize_list(self.regions.as_deref(), |r| r.as_str()),
            include_soon: self.include_soon.filter(|soon| *soon),
            min_price: self.min_price,
            max_price: self.max_price,
            limit: self.limit,
        }
    }

    /// Cache and request identity of these criteria.
    pub fn key(&self) -> NormalizedFilterKey {
        NormalizedFilterKey(query::encode(&self.normalized()).to_query_string())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(min) = self.min_price {
            check_price(PriceBound::Min, min)?;
        }
        if let Some(max) = self.max_price {
            check_price(PriceBound::Max, max)?;
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(ValidationError::InvertedPriceRange { min, max });
            }
        }
        Ok(())
    }

    /// Form-validation flavour of [`FilterCriteria::validate`].
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn status(&self) -> ProductStatus {
        if self.include_soon.unwrap_or(false) {
            ProductStatus::All
        } else {
            ProductStatus::AllWithoutSoon
        }
    }

    /// True when a user-facing filter is set. The page size is not a filter.
    pub fn has_active_filters(&self) -> bool {
        let n = self.normalized();
        n.search.is_some()
            || n.include_soon.is_some()
            || n.min_price.is_some()
            || n.max_price.is_some()
            || n.stores.is_some()
            || n.categories.is_some()
            || n.regions.is_some()
    }

    /// Number shown on the filter panel badge: one per scalar filter plus one
    /// per selected list value.
    pub fn active_filter_count(&self) -> usize {
        let scalars = [
            self.search.as_deref().is_some_and(|s| !s.is_empty()),
            self.include_soon.is_some(),
            self.min_price.is_some(),
            self.max_price.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count();

        scalars
            + self.stores.as_ref().map_or(0, Vec::len)
            + self.categories.as_ref().map_or(0, Vec::len)
            + self.regions.as_ref().map_or(0, Vec::len)
    }
}

fn check_price(bound: PriceBound, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(ValidationError::NonIntegerPrice { bound, value });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativePrice { bound, value });
    }
    Ok(())
}

fn normalize_list<T: Copy>(values: Option<&[T]>, name: fn(&T) -> &'static str) -> Option<Vec<T>> {
    let mut out: Vec<T> = values?.to_vec();
    out.sort_by_key(|v| name(v));
    out.dedup_by_key(|v| name(v));
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Order-independent identity of a set of filter criteria.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedFilterKey(String);

impl NormalizedFilterKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedFilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<unfiltered>")
        } else {
            f.write_str(&self.0)
        }
    }
}
