// Upstream product API access.

pub mod client;
#[cfg(test)]
pub(crate) mod testing;

pub use client::{listing_query, ProductSource, ProductsClient};
