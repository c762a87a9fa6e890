//! Favorited characters, persisted on the device.

use std::sync::Arc;

use crate::catalog::Character;
use crate::store::{keys, read_json, Flush, KvStore};

/// Unbounded list of favorited character snapshots.
///
/// Snapshots are taken when a character is favorited and are not refreshed
/// from the catalog afterwards. Every mutation updates memory first and then
/// persists the whole list write-behind; a failed write is logged and the two
/// copies may differ until the next successful one.
pub struct FavoritesStore {
  store: Arc<dyn KvStore>,
  favorites: Vec<Character>,
}

impl FavoritesStore {
  /// Load the persisted list. Unreadable data yields an empty list.
  pub fn load(store: Arc<dyn KvStore>) -> Self {
    let favorites = match read_json::<Vec<Character>>(store.as_ref(), keys::FAVORITES) {
      Ok(favorites) => favorites.unwrap_or_default(),
      Err(e) => {
        tracing::error!(error = %e, "failed to load favorites");
        Vec::new()
      }
    };

    tracing::debug!(count = favorites.len(), "favorites loaded");
    Self { store, favorites }
  }

  /// Add a character unless one with the same id is already present.
  pub fn add(&mut self, character: Character) -> Flush {
    if self.is_favorite(character.id) {
      return Flush::ready();
    }

    tracing::info!(id = character.id, name = %character.name, "favorite added");
    self.favorites.push(character);
    self.persist()
  }

  /// Remove the character with `id`, if present.
  pub fn remove(&mut self, id: u32) -> Flush {
    let before = self.favorites.len();
    self.favorites.retain(|c| c.id != id);
    if self.favorites.len() == before {
      return Flush::ready();
    }

    tracing::info!(id, "favorite removed");
    self.persist()
  }

  pub fn is_favorite(&self, id: u32) -> bool {
    self.favorites.iter().any(|c| c.id == id)
  }

  /// Remove everything.
  pub fn clear(&mut self) -> Flush {
    let previous = self.favorites.len();
    self.favorites.clear();
    tracing::info!(previous, "favorites cleared");
    self.persist()
  }

  /// Replace the whole list, e.g. with data restored from the cloud.
  pub fn replace(&mut self, favorites: Vec<Character>) -> Flush {
    self.favorites = Vec::new();
    for character in favorites {
      if !self.is_favorite(character.id) {
        self.favorites.push(character);
      }
    }
    self.persist()
  }

  /// Favorites in insertion order.
  pub fn list(&self) -> &[Character] {
    &self.favorites
  }

  pub fn len(&self) -> usize {
    self.favorites.len()
  }

  pub fn is_empty(&self) -> bool {
    self.favorites.is_empty()
  }

  fn persist(&self) -> Flush {
    Flush::persist_json(self.store.clone(), keys::FAVORITES, &self.favorites)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::CharacterStatus;
  use crate::store::MemoryStore;
  use crate::test_support::character;

  fn rick() -> Character {
    character(1, "Rick Sanchez", CharacterStatus::Alive)
  }

  fn morty() -> Character {
    character(2, "Morty Smith", CharacterStatus::Alive)
  }

  #[tokio::test]
  async fn test_add_then_remove() {
    let mut favorites = FavoritesStore::load(Arc::new(MemoryStore::new()));

    favorites.add(rick()).wait().await.unwrap();
    assert!(favorites.is_favorite(1));

    favorites.remove(1).wait().await.unwrap();
    assert!(!favorites.is_favorite(1));
  }

  #[tokio::test]
  async fn test_add_is_idempotent_by_id() {
    let mut favorites = FavoritesStore::load(Arc::new(MemoryStore::new()));

    favorites.add(rick()).wait().await.unwrap();
    let mut renamed = rick();
    renamed.name = "Rick C-137".to_string();
    favorites.add(renamed).wait().await.unwrap();

    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites.list()[0].name, "Rick Sanchez");
  }

  #[tokio::test]
  async fn test_clear_empties_regardless_of_size() {
    let mut favorites = FavoritesStore::load(Arc::new(MemoryStore::new()));
    for id in 1..=25 {
      let _ = favorites.add(character(id, "Somebody", CharacterStatus::Unknown));
    }

    favorites.clear().wait().await.unwrap();
    assert!(favorites.is_empty());
  }

  #[tokio::test]
  async fn test_list_survives_reload_in_insertion_order() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let mut favorites = FavoritesStore::load(store.clone());
    favorites.add(morty()).wait().await.unwrap();
    favorites.add(rick()).wait().await.unwrap();

    let reloaded = FavoritesStore::load(store);
    let ids: Vec<u32> = reloaded.list().iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![2, 1]);
  }

  #[tokio::test]
  async fn test_remove_missing_is_noop() {
    let mut favorites = FavoritesStore::load(Arc::new(MemoryStore::new()));
    favorites.add(rick()).wait().await.unwrap();

    let flush = favorites.remove(99);
    assert!(flush.is_finished());
    assert_eq!(favorites.len(), 1);
  }

  #[tokio::test]
  async fn test_persistence_failure_keeps_memory_state() {
    let store = Arc::new(MemoryStore::new());
    let mut favorites = FavoritesStore::load(store.clone());
    store.reject_writes(true);

    let flush = favorites.add(rick());
    assert!(favorites.is_favorite(1));
    assert!(flush.wait().await.is_err());
    assert!(store.get(keys::FAVORITES).unwrap().is_none());
  }

  #[test]
  fn test_corrupt_storage_loads_empty() {
    let store = Arc::new(MemoryStore::new());
    store.set(keys::FAVORITES, "not json").unwrap();

    let favorites = FavoritesStore::load(store);
    assert!(favorites.is_empty());
  }

  #[tokio::test]
  async fn test_replace_dedups() {
    let mut favorites = FavoritesStore::load(Arc::new(MemoryStore::new()));
    favorites
      .replace(vec![rick(), morty(), rick()])
      .wait()
      .await
      .unwrap();
    assert_eq!(favorites.len(), 2);
  }
}
