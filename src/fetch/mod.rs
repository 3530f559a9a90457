// Paginated fetching, request caching and the visible product feed.

pub mod cache;
pub mod controller;
pub mod feed;

pub use cache::{CacheEntry, CacheKey, CachePolicy, PageChain, RequestCache, ResourceKind};
pub use controller::ProductCatalog;
pub use feed::{FeedOutcome, FeedStatus, FeedTicket, ProductFeed};
