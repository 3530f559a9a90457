// Catalog model: product vocabulary, filter criteria and their URL form.

pub mod filters;
pub mod localize;
pub mod product;
pub mod query;

pub use filters::{FilterCriteria, NormalizedFilterKey, ProductStatus, DEFAULT_PAGE_LIMIT};
pub use product::{
    has_more, Category, LocalizedText, ProductPage, PublicProduct, Region, Store,
};
pub use query::{AllowedValues, SearchParams};
