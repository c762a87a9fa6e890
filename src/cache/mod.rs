//! Expiring cache for catalog payloads, with offline support.
//!
//! This module provides a payload-agnostic caching mechanism that:
//! - Stores any serializable payload with the time it was written
//! - Treats entries older than the caller's max age as absent
//! - Deletes expired entries lazily, on the read that discovers them
//! - Tags results with where they came from (network, cache, offline)

mod traits;
mod ttl;

pub use traits::{CacheResult, CacheSource};
pub use ttl::{CacheHit, TtlCache};
