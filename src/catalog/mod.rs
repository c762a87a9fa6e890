//! Remote character catalog: REST client, wire types, and the offline-aware
//! layer that writes results through to the TTL cache.

mod api_types;
mod cache;
mod cached_client;
mod client;
mod error;
mod types;

pub use cache::CatalogKey;
pub use cached_client::CachedCatalog;
pub use client::{trailing_id, CatalogClient};
pub use error::{CatalogError, LoadError};
pub use types::{
  apply_filters, Character, CharacterStatus, Episode, Gender, Page, Place, StatusFilter,
};

/// Network reachability as reported by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
  Online,
  Offline,
}

impl Connectivity {
  pub fn is_online(&self) -> bool {
    matches!(self, Self::Online)
  }
}
