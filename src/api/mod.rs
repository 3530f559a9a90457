// HTTP surface for the storefront: product listings, product detail, the
// image proxy, the sitemap and a health check.

pub mod handlers;
pub mod image;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
