//! TTL cache on top of the key-value store.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::Clock;
use crate::store::{keys, KvStore};

/// Stored shape of a cache entry.
#[derive(Serialize, Deserialize)]
struct CacheEntry<T> {
  data: T,
  stored_at: DateTime<Utc>,
}

/// A payload found in the cache, with the time it was stored.
#[derive(Debug, Clone)]
pub struct CacheHit<T> {
  pub data: T,
  pub stored_at: DateTime<Utc>,
}

/// Expiring cache of arbitrary payloads.
///
/// Entries never expire on their own: a read with a max age that the entry
/// exceeds deletes it. Never-cached and expired look the same to callers.
/// There is no size or count bound. Storage failures are logged and behave as
/// a miss (reads) or a no-op (writes).
#[derive(Clone)]
pub struct TtlCache {
  store: Arc<dyn KvStore>,
  clock: Arc<dyn Clock>,
}

impl TtlCache {
  pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
    Self { store, clock }
  }

  /// Store `payload` under `key` stamped with the current time.
  pub fn put<T: Serialize>(&self, key: &str, payload: &T) {
    let entry = CacheEntry {
      data: payload,
      stored_at: self.clock.now(),
    };

    let result = serde_json::to_string(&entry)
      .map_err(color_eyre::eyre::Report::from)
      .and_then(|encoded| self.store.set(&keys::cache(key), &encoded));

    if let Err(e) = result {
      tracing::warn!(%key, error = %e, "failed to write cache entry");
    }
  }

  /// Fetch the payload under `key` if it is at most `max_age` old.
  pub fn get<T: DeserializeOwned>(&self, key: &str, max_age: Duration) -> Option<T> {
    self.get_entry(key, max_age).map(|hit| hit.data)
  }

  /// Like [`TtlCache::get`], also returning when the payload was stored.
  pub fn get_entry<T: DeserializeOwned>(&self, key: &str, max_age: Duration) -> Option<CacheHit<T>> {
    let storage_key = keys::cache(key);

    let raw = match self.store.get(&storage_key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        tracing::warn!(%key, error = %e, "failed to read cache entry");
        return None;
      }
    };

    let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
      Ok(entry) => entry,
      Err(e) => {
        tracing::warn!(%key, error = %e, "unreadable cache entry");
        return None;
      }
    };

    if self.clock.now() - entry.stored_at > max_age {
      tracing::debug!(%key, "cache entry expired");
      self.remove(key);
      return None;
    }

    Some(CacheHit {
      data: entry.data,
      stored_at: entry.stored_at,
    })
  }

  /// Drop the entry under `key`, if any.
  pub fn remove(&self, key: &str) {
    if let Err(e) = self.store.remove(&keys::cache(key)) {
      tracing::warn!(%key, error = %e, "failed to delete cache entry");
    }
  }
}
