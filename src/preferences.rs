//! User preferences record.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::StatusFilter;
use crate::store::{keys, read_json, Flush, KvStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
  pub default_filter: StatusFilter,
  pub notifications_enabled: bool,
  /// Advisory; the cache does not consult it
  pub cache_enabled: bool,
}

impl Default for UserPreferences {
  fn default() -> Self {
    Self {
      default_filter: StatusFilter::All,
      notifications_enabled: true,
      cache_enabled: true,
    }
  }
}

/// Device-local preferences, created with defaults on first run.
pub struct PreferencesStore {
  store: Arc<dyn KvStore>,
  current: UserPreferences,
}

impl PreferencesStore {
  /// Load stored preferences, writing the defaults when there are none.
  pub fn load(store: Arc<dyn KvStore>) -> Self {
    let stored = read_json::<UserPreferences>(store.as_ref(), keys::PREFERENCES);

    match stored {
      Ok(Some(current)) => Self { store, current },
      Ok(None) => {
        let prefs = Self {
          store,
          current: UserPreferences::default(),
        };
        let _ = prefs.persist();
        prefs
      }
      Err(e) => {
        tracing::error!(error = %e, "failed to load preferences, using defaults");
        Self {
          store,
          current: UserPreferences::default(),
        }
      }
    }
  }

  pub fn get(&self) -> UserPreferences {
    self.current
  }

  /// Mutate the preferences in place and persist them.
  pub fn update(&mut self, change: impl FnOnce(&mut UserPreferences)) -> Flush {
    change(&mut self.current);
    tracing::info!(preferences = ?self.current, "preferences updated");
    self.persist()
  }

  /// Replace the preferences wholesale, e.g. from the cloud copy.
  pub fn replace(&mut self, preferences: UserPreferences) -> Flush {
    self.current = preferences;
    self.persist()
  }

  fn persist(&self) -> Flush {
    Flush::persist_json(self.store.clone(), keys::PREFERENCES, &self.current)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::MemoryStore;

  #[test]
  fn test_first_run_writes_defaults() {
    let store = Arc::new(MemoryStore::new());
    let prefs = PreferencesStore::load(store.clone());

    assert_eq!(prefs.get(), UserPreferences::default());
    assert_eq!(
      store.get(keys::PREFERENCES).unwrap().as_deref(),
      Some(r#"{"defaultFilter":"all","notificationsEnabled":true,"cacheEnabled":true}"#)
    );
  }

  #[tokio::test]
  async fn test_update_persists() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let mut prefs = PreferencesStore::load(store.clone());

    prefs
      .update(|p| {
        p.default_filter = StatusFilter::Dead;
        p.notifications_enabled = false;
      })
      .wait()
      .await
      .unwrap();

    let reloaded = PreferencesStore::load(store);
    assert_eq!(reloaded.get().default_filter, StatusFilter::Dead);
    assert!(!reloaded.get().notifications_enabled);
    assert!(reloaded.get().cache_enabled);
  }

  #[test]
  fn test_corrupt_preferences_fall_back_to_defaults() {
    let store = Arc::new(MemoryStore::new());
    store.set(keys::PREFERENCES, "{\"defaultFilter\":\"sideways\"}").unwrap();

    let prefs = PreferencesStore::load(store);
    assert_eq!(prefs.get(), UserPreferences::default());
  }
}
