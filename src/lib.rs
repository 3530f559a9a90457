//! Takonbini catalog service: browse, filter and page through convenience
//! store products from an upstream catalog API.

pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod sitemap;
pub mod ui;
pub mod upstream;

pub use catalog::{FilterCriteria, NormalizedFilterKey, ProductPage, PublicProduct};
pub use error::{FetchError, UpstreamError, ValidationError};
pub use fetch::{ProductCatalog, ProductFeed};
