//! Mapping between [`FilterCriteria`] and URL search parameters.
//!
//! Decoding is permissive: URLs are user-editable, so malformed values decode
//! to "absent" instead of failing.

use serde_json::Value;
use std::str::FromStr;

use crate::catalog::filters::FilterCriteria;
use crate::catalog::product::{Category, Region, Store};

pub const PARAM_SEARCH: &str = "search";
pub const PARAM_STORES: &str = "stores";
pub const PARAM_CATEGORIES: &str = "categories";
pub const PARAM_REGIONS: &str = "regions";
pub const PARAM_INCLUDE_SOON: &str = "includeSoon";
pub const PARAM_MIN_PRICE: &str = "minPrice";
pub const PARAM_MAX_PRICE: &str = "maxPrice";
pub const PARAM_LIMIT: &str = "limit";
/// Pagination cursor; not part of the filter criteria.
pub const PARAM_CURSOR: &str = "cursor";

/// Ordered URL search parameters. Names may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    pairs: Vec<(String, String)>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw query string (with or without the leading `?`).
    pub fn from_query(raw: &str) -> Self {
        let raw = raw.strip_prefix('?').unwrap_or(raw);
        let pairs = url::form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { pairs }
    }

    /// Build from an already-parsed JSON search object, as routers hand it over.
    /// Arrays become repeated values; scalars use their textual form.
    pub fn from_json(value: &Value) -> Self {
        let mut params = Self::new();
        let Some(object) = value.as_object() else {
            return params;
        };
        for (name, value) in object {
            match value {
                Value::Array(items) => {
                    for item in items {
                        if let Some(text) = scalar_text(item) {
                            params.append(name, text);
                        }
                    }
                }
                other => {
                    if let Some(text) = scalar_text(other) {
                        params.append(name, text);
                    }
                }
            }
        }
        params
    }

    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.pairs.push((name.to_string(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn to_query_string(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &self.pairs {
            serializer.append_pair(k, v);
        }
        serializer.finish()
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Values a decoded list may contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedValues {
    pub stores: Vec<Store>,
    pub categories: Vec<Category>,
    pub regions: Vec<Region>,
}

impl Default for AllowedValues {
    fn default() -> Self {
        Self {
            stores: Store::ALL.to_vec(),
            categories: Category::ALL.to_vec(),
            regions: Region::ALL.to_vec(),
        }
    }
}

/// Render a number the way the browser client prints it: no trailing `.0`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

pub fn encode(criteria: &FilterCriteria) -> SearchParams {
    let mut params = SearchParams::new();
    if let Some(search) = criteria.search.as_deref().filter(|s| !s.is_empty()) {
        params.append(PARAM_SEARCH, search);
    }
    append_list(&mut params, PARAM_STORES, criteria.stores.as_deref(), |s| s.as_str());
    append_list(&mut params, PARAM_CATEGORIES, criteria.categories.as_deref(), |c| c.as_str());
    append_list(&mut params, PARAM_REGIONS, criteria.regions.as_deref(), |r| r.as_str());
    if criteria.include_soon == Some(true) {
        params.append(PARAM_INCLUDE_SOON, "true");
    }
    if let Some(min) = criteria.min_price {
        params.append(PARAM_MIN_PRICE, format_number(min));
    }
    if let Some(max) = criteria.max_price {
        params.append(PARAM_MAX_PRICE, format_number(max));
    }
    if let Some(limit) = criteria.limit {
        params.append(PARAM_LIMIT, limit.to_string());
    }
    params
}

fn append_list<T>(params: &mut SearchParams, name: &str, values: Option<&[T]>, wire: fn(&T) -> &'static str) {
    let Some(values) = values.filter(|v| !v.is_empty()) else {
        return;
    };
    let joined = values.iter().map(wire).collect::<Vec<_>>().join(",");
    params.append(name, joined);
}

pub fn decode(params: &SearchParams, allowed: &AllowedValues) -> FilterCriteria {
    FilterCriteria {
        search: params.get(PARAM_SEARCH).map(str::to_string),
        stores: parse_list(params, PARAM_STORES, &allowed.stores),
        categories: parse_list(params, PARAM_CATEGORIES, &allowed.categories),
        regions: parse_list(params, PARAM_REGIONS, &allowed.regions),
        include_soon: parse_flag(params.get(PARAM_INCLUDE_SOON)),
        min_price: parse_number(params.get(PARAM_MIN_PRICE)),
        max_price: parse_number(params.get(PARAM_MAX_PRICE)),
        limit: parse_limit(params.get(PARAM_LIMIT)),
    }
    .normalized()
}

/// Split comma-joined and/or repeated values, keep the allowed ones.
pub fn parse_list<T>(params: &SearchParams, name: &str, allowed: &[T]) -> Option<Vec<T>>
where
    T: FromStr + PartialEq + Copy,
{
    let values: Vec<T> = params
        .get_all(name)
        .flat_map(|raw| raw.split(','))
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .filter_map(|item| item.parse::<T>().ok())
        .filter(|item| allowed.contains(item))
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

/// Finite number or absent. Surrounding whitespace is ignored.
pub fn parse_number(raw: Option<&str>) -> Option<f64> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_flag(raw: Option<&str>) -> Option<bool> {
    (raw? == "true").then_some(true)
}

fn parse_limit(raw: Option<&str>) -> Option<u32> {
    let n = parse_number(raw)?;
    if n.fract() != 0.0 || n < 1.0 || n > f64::from(u32::MAX) {
        return None;
    }
    Some(n as u32)
}
