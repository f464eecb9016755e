//! Statistical series sources, provider clients, and the explicitly refreshed catalog cache.

pub mod catalog;
mod error;
pub mod ipea;
mod limiter;
mod source;

pub use catalog::{CatalogFilter, CatalogPolicy, SeriesCatalog, SeriesMetadata, Theme};
pub use error::{SourceError, SourceResult};
pub use ipea::{IpeaClient, IPEA_BASE_URL};
pub use limiter::RequestLimiter;
pub use source::{SeriesSnapshot, SeriesSource};
