//! Durable on-device key-value storage.
//!
//! Every value is JSON text stored under a flat key. The store is the only
//! shared mutable resource of the crate: writers do read-modify-write without
//! transactions and the last write observed in storage wins.

mod flush;
mod memory;
mod sqlite;

use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;

pub use flush::Flush;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Well-known keys of the local store.
pub mod keys {
  pub const FAVORITES: &str = "favorites";
  pub const PREFERENCES: &str = "preferences";
  pub const TELEMETRY: &str = "telemetry";
  pub const DEVICE_ID: &str = "device_id";
  pub const AUTH_SESSION: &str = "auth_session";
  pub const CACHE_PREFIX: &str = "cache:";

  /// Storage key for a TTL cache entry.
  pub fn cache(key: &str) -> String {
    format!("{}{}", CACHE_PREFIX, key)
  }
}

/// Trait for key-value storage backends.
pub trait KvStore: Send + Sync {
  /// Read the value stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Delete `key`. Deleting a missing key is not an error.
  fn remove(&self, key: &str) -> Result<()>;

  /// All keys currently stored.
  fn keys(&self) -> Result<Vec<String>>;
}

/// Read and deserialize the JSON value stored under `key`.
pub fn read_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Result<Option<T>> {
  match store.get(key)? {
    Some(raw) => serde_json::from_str(&raw)
      .map(Some)
      .map_err(|e| eyre!("Failed to decode stored value '{}': {}", key, e)),
    None => Ok(None),
  }
}

/// Summary of what the app keeps on the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageInfo {
  pub favorites_count: usize,
  pub cache_keys: usize,
  pub total_size_bytes: usize,
}

impl StorageInfo {
  /// Total size formatted the way the settings screen shows it.
  pub fn total_size(&self) -> String {
    format!("{:.2} KB", self.total_size_bytes as f64 / 1024.0)
  }
}

/// Walk the store and summarize its contents.
///
/// Unreadable keys are skipped.
pub fn storage_info(store: &dyn KvStore) -> Result<StorageInfo> {
  let mut info = StorageInfo::default();

  for key in store.keys()? {
    let value = match store.get(&key) {
      Ok(Some(value)) => value,
      Ok(None) => continue,
      Err(e) => {
        tracing::warn!(%key, error = %e, "skipping unreadable key");
        continue;
      }
    };

    info.total_size_bytes += value.len();

    if key == keys::FAVORITES {
      info.favorites_count = serde_json::from_str::<Vec<serde_json::Value>>(&value)
        .map(|v| v.len())
        .unwrap_or(0);
    } else if key.starts_with(keys::CACHE_PREFIX) {
      info.cache_keys += 1;
    }
  }

  Ok(info)
}

/// Remove favorites, preferences, telemetry and every cache entry.
///
/// The device id and the auth session survive. Returns the number of keys
/// removed.
pub fn clear_all_data(store: &dyn KvStore) -> Result<usize> {
  let doomed: Vec<String> = store
    .keys()?
    .into_iter()
    .filter(|key| {
      key == keys::FAVORITES
        || key == keys::PREFERENCES
        || key == keys::TELEMETRY
        || key.starts_with(keys::CACHE_PREFIX)
    })
    .collect();

  for key in &doomed {
    store.remove(key)?;
  }

  tracing::info!(removed = doomed.len(), "cleared local app data");
  Ok(doomed.len())
}
