use chrono::Utc;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::{Character, CharacterStatus, Gender, Place};
use crate::clock::Clock;
use crate::config::CloudConfig;
use crate::preferences::UserPreferences;
use crate::store::{keys, read_json, KvStore};

use super::auth::Auth;
use super::documents::{DocumentStore, Fields};
use super::firestore::FirestoreRest;

const CONNECTION_TEST: &str = "connection_test";

/// Whether the cloud store can be used at all in this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudAvailability {
  Available,
  Unavailable { reason: String },
}

/// Result of one best-effort cloud operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome<T> {
  Synced(T),
  /// The cloud is not configured; nothing was attempted
  Unavailable,
  Failed(String),
}

impl<T> SyncOutcome<T> {
  pub fn is_synced(&self) -> bool {
    matches!(self, Self::Synced(_))
  }

  pub fn synced(self) -> Option<T> {
    match self {
      Self::Synced(value) => Some(value),
      _ => None,
    }
  }
}

impl<T> fmt::Display for SyncOutcome<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Synced(_) => f.write_str("synced"),
      Self::Unavailable => f.write_str("cloud unavailable"),
      Self::Failed(reason) => write!(f, "failed: {}", reason),
    }
  }
}

/// Where a user's documents live: per device, or per signed-in account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Partition {
  Device(String),
  User(String),
}

impl Partition {
  pub fn id(&self) -> &str {
    match self {
      Self::Device(id) | Self::User(id) => id,
    }
  }

  pub fn favorites_collection(&self) -> &'static str {
    match self {
      Self::Device(_) => "device_favorites",
      Self::User(_) => "user_favorites",
    }
  }

  pub fn preferences_collection(&self) -> &'static str {
    match self {
      Self::Device(_) => "device_preferences",
      Self::User(_) => "user_preferences",
    }
  }
}

/// Favorites and preferences after reconciling local and remote copies.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedData {
  pub favorites: Vec<Character>,
  pub preferences: UserPreferences,
}

/// Trimmed favorite as stored in the favorites document.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FavoriteSnapshot {
  id: u32,
  name: String,
  status: CharacterStatus,
  #[serde(default)]
  species: String,
  #[serde(default)]
  image: String,
  #[serde(default)]
  saved_at: Option<String>,
}

impl FavoriteSnapshot {
  fn into_character(self, fallback_created: &str) -> Character {
    Character {
      id: self.id,
      name: self.name,
      status: self.status,
      species: self.species,
      kind: String::new(),
      gender: Gender::Unknown,
      origin: Place::unknown(),
      location: Place::unknown(),
      image: self.image,
      episode: Vec::new(),
      url: format!("https://rickandmortyapi.com/api/character/{}", self.id),
      created: self.saved_at.unwrap_or_else(|| fallback_created.to_string()),
    }
  }
}

/// Persisted device id, generated on first use.
///
/// If the store cannot be read or written a temporary id is returned; it is
/// not persisted and changes on the next start.
pub fn device_id(store: &dyn KvStore) -> String {
  let existing = match read_json::<String>(store, keys::DEVICE_ID) {
    Ok(existing) => existing,
    Err(e) => {
      tracing::warn!(error = %e, "failed to read device id");
      return temporary_device_id();
    }
  };
  if let Some(id) = existing.filter(|id| !id.is_empty()) {
    return id;
  }

  let id = format!("device_{}", uuid::Uuid::new_v4().simple());
  let stored = serde_json::to_string(&id)
    .map_err(color_eyre::Report::from)
    .and_then(|encoded| store.set(keys::DEVICE_ID, &encoded));
  match stored {
    Ok(()) => {
      tracing::info!(device_id = %id, "generated device id");
      id
    }
    Err(e) => {
      tracing::warn!(error = %e, "failed to persist device id");
      temporary_device_id()
    }
  }
}

fn temporary_device_id() -> String {
  format!("temp_{}", Utc::now().timestamp_millis())
}

/// Best-effort mirror of favorites and preferences to the document store.
pub struct CloudSync {
  documents: Option<Arc<dyn DocumentStore>>,
  availability: CloudAvailability,
  auth: Arc<Auth>,
  device_id: String,
  clock: Arc<dyn Clock>,
}

impl CloudSync {
  /// Build over an explicit document store; `None` means the cloud is off.
  pub fn new(
    documents: Option<Arc<dyn DocumentStore>>,
    auth: Arc<Auth>,
    device_id: String,
    clock: Arc<dyn Clock>,
  ) -> Self {
    let availability = match documents {
      Some(_) => CloudAvailability::Available,
      None => CloudAvailability::Unavailable {
        reason: "cloud configuration incomplete".to_string(),
      },
    };

    Self {
      documents,
      availability,
      auth,
      device_id,
      clock,
    }
  }

  /// Connect to Firestore when the configuration is complete.
  pub fn connect(
    config: Option<&CloudConfig>,
    auth: Arc<Auth>,
    store: &dyn KvStore,
    clock: Arc<dyn Clock>,
    timeout: Duration,
  ) -> Self {
    let device_id = device_id(store);

    let Some(config) = config else {
      tracing::warn!("cloud sync disabled: configuration incomplete");
      return Self::new(None, auth, device_id, clock);
    };

    match FirestoreRest::new(config, timeout) {
      Ok(rest) => {
        tracing::info!(project = %config.project_id, %device_id, "cloud sync enabled");
        Self::new(Some(Arc::new(rest)), auth, device_id, clock)
      }
      Err(e) => {
        tracing::warn!(error = %e, "cloud sync disabled");
        let mut sync = Self::new(None, auth, device_id, clock);
        sync.availability = CloudAvailability::Unavailable {
          reason: e.to_string(),
        };
        sync
      }
    }
  }

  pub fn is_available(&self) -> bool {
    self.availability == CloudAvailability::Available
  }

  pub fn availability(&self) -> &CloudAvailability {
    &self.availability
  }

  pub fn auth(&self) -> &Auth {
    &self.auth
  }

  pub fn device_id(&self) -> &str {
    &self.device_id
  }

  /// The partition writes go to right now.
  pub fn partition(&self) -> Partition {
    match self.auth.current_user() {
      Some(user) => Partition::User(user.uid),
      None => Partition::Device(self.device_id.clone()),
    }
  }

  pub async fn save_favorites(&self, favorites: &[Character]) -> SyncOutcome<()> {
    let Some(documents) = &self.documents else {
      return SyncOutcome::Unavailable;
    };
    let partition = self.partition();
    let now = self.clock.now().to_rfc3339();

    let snapshots: Vec<Value> = favorites
      .iter()
      .map(|c| {
        json!({
          "id": c.id,
          "name": c.name,
          "status": c.status,
          "species": c.species,
          "image": c.image,
          "savedAt": now,
        })
      })
      .collect();

    let mut fields = Fields::new();
    fields.insert("favorites".to_string(), Value::Array(snapshots));
    fields.insert("lastUpdated".to_string(), Value::String(now.clone()));
    if let Some(user) = self.auth.current_user() {
      fields.insert("userEmail".to_string(), Value::String(user.email));
    }

    let token = self.auth.id_token().await;
    let result = documents
      .merge(
        partition.favorites_collection(),
        partition.id(),
        fields,
        token.as_deref(),
      )
      .await;

    match result {
      Ok(()) => {
        tracing::info!(count = favorites.len(), partition = %partition.id(), "favorites saved to cloud");
        SyncOutcome::Synced(())
      }
      Err(e) => {
        tracing::warn!(error = %e, "failed to save favorites to cloud");
        SyncOutcome::Failed(e.to_string())
      }
    }
  }

  pub async fn load_favorites(&self) -> SyncOutcome<Vec<Character>> {
    let Some(documents) = &self.documents else {
      return SyncOutcome::Unavailable;
    };
    let partition = self.partition();
    let token = self.auth.id_token().await;

    let doc = match documents
      .get(partition.favorites_collection(), partition.id(), token.as_deref())
      .await
    {
      Ok(doc) => doc,
      Err(e) => {
        tracing::warn!(error = %e, "failed to load favorites from cloud");
        return SyncOutcome::Failed(e.to_string());
      }
    };

    let entries = match doc.as_ref().and_then(|d| d.get("favorites")) {
      Some(Value::Array(entries)) => entries.clone(),
      _ => Vec::new(),
    };

    let now = self.clock.now().to_rfc3339();
    let favorites = entries
      .into_iter()
      .filter_map(|entry| match serde_json::from_value::<FavoriteSnapshot>(entry) {
        Ok(snapshot) => Some(snapshot.into_character(&now)),
        Err(e) => {
          tracing::warn!(error = %e, "skipping malformed cloud favorite");
          None
        }
      })
      .collect();
    SyncOutcome::Synced(favorites)
  }

  pub async fn save_user_preferences(&self, preferences: &UserPreferences) -> SyncOutcome<()> {
    let Some(documents) = &self.documents else {
      return SyncOutcome::Unavailable;
    };
    let partition = self.partition();

    let mut fields = match serde_json::to_value(preferences) {
      Ok(Value::Object(fields)) => fields,
      Ok(_) => Fields::new(),
      Err(e) => return SyncOutcome::Failed(e.to_string()),
    };
    fields.insert(
      "lastUpdated".to_string(),
      Value::String(self.clock.now().to_rfc3339()),
    );

    let token = self.auth.id_token().await;
    match documents
      .merge(
        partition.preferences_collection(),
        partition.id(),
        fields,
        token.as_deref(),
      )
      .await
    {
      Ok(()) => {
        tracing::info!(partition = %partition.id(), "preferences saved to cloud");
        SyncOutcome::Synced(())
      }
      Err(e) => {
        tracing::warn!(error = %e, "failed to save preferences to cloud");
        SyncOutcome::Failed(e.to_string())
      }
    }
  }

  /// Stored preferences, or `Synced(None)` when there is no document yet.
  pub async fn load_user_preferences(&self) -> SyncOutcome<Option<UserPreferences>> {
    let Some(documents) = &self.documents else {
      return SyncOutcome::Unavailable;
    };
    let partition = self.partition();
    let token = self.auth.id_token().await;

    let doc = match documents
      .get(partition.preferences_collection(), partition.id(), token.as_deref())
      .await
    {
      Ok(doc) => doc,
      Err(e) => {
        tracing::warn!(error = %e, "failed to load preferences from cloud");
        return SyncOutcome::Failed(e.to_string());
      }
    };

    match doc.map(|fields| serde_json::from_value::<UserPreferences>(Value::Object(fields))) {
      None => SyncOutcome::Synced(None),
      Some(Ok(preferences)) => SyncOutcome::Synced(Some(preferences)),
      Some(Err(e)) => {
        tracing::warn!(error = %e, "cloud preferences document is malformed");
        SyncOutcome::Failed(e.to_string())
      }
    }
  }

  /// Delete favorites and preferences from the device partition and, when
  /// signed in, from the user partition. Individual failures are logged and
  /// skipped.
  pub async fn clear_user_data(&self) -> SyncOutcome<()> {
    let Some(documents) = &self.documents else {
      return SyncOutcome::Unavailable;
    };

    let mut partitions = vec![Partition::Device(self.device_id.clone())];
    if let Some(user) = self.auth.current_user() {
      partitions.push(Partition::User(user.uid));
    }

    let token = self.auth.id_token().await;
    let targets: Vec<(&'static str, &str)> = partitions
      .iter()
      .flat_map(|p| {
        [
          (p.favorites_collection(), p.id()),
          (p.preferences_collection(), p.id()),
        ]
      })
      .collect();

    let results = join_all(
      targets
        .iter()
        .map(|(collection, id)| documents.delete(collection, id, token.as_deref())),
    )
    .await;

    for ((collection, id), result) in targets.iter().zip(results) {
      if let Err(e) = result {
        tracing::warn!(%collection, %id, error = %e, "failed to delete cloud document");
      }
    }
    tracing::info!("cloud user data cleared");
    SyncOutcome::Synced(())
  }

  /// Round-trip a throwaway document to prove the store is reachable.
  pub async fn check_connection(&self) -> SyncOutcome<()> {
    let Some(documents) = &self.documents else {
      return SyncOutcome::Unavailable;
    };
    let token = self.auth.id_token().await;

    let mut fields = Fields::new();
    fields.insert(
      "timestamp".to_string(),
      Value::String(self.clock.now().to_rfc3339()),
    );
    fields.insert("test".to_string(), Value::Bool(true));

    let result = async {
      documents
        .merge(CONNECTION_TEST, &self.device_id, fields, token.as_deref())
        .await?;
      documents
        .delete(CONNECTION_TEST, &self.device_id, token.as_deref())
        .await
    }
    .await;

    match result {
      Ok(()) => SyncOutcome::Synced(()),
      Err(e) => {
        tracing::warn!(error = %e, "cloud connection test failed");
        SyncOutcome::Failed(e.to_string())
      }
    }
  }

  /// Reconcile local and remote copies and write the result back.
  ///
  /// Local favorites win when there are any; local preferences win when
  /// given. Nothing is merged item by item.
  pub async fn sync_data(
    &self,
    local_favorites: &[Character],
    local_preferences: Option<UserPreferences>,
  ) -> SyncOutcome<SyncedData> {
    if !self.is_available() {
      return SyncOutcome::Unavailable;
    }

    let (remote_favorites, remote_preferences) =
      futures::join!(self.load_favorites(), self.load_user_preferences());

    let favorites = if !local_favorites.is_empty() {
      local_favorites.to_vec()
    } else {
      match remote_favorites {
        SyncOutcome::Synced(remote) => remote,
        SyncOutcome::Unavailable => return SyncOutcome::Unavailable,
        SyncOutcome::Failed(e) => return SyncOutcome::Failed(e),
      }
    };
    let preferences = match (local_preferences, remote_preferences) {
      (Some(local), _) => local,
      (None, SyncOutcome::Synced(remote)) => remote.unwrap_or_default(),
      (None, SyncOutcome::Unavailable) => return SyncOutcome::Unavailable,
      (None, SyncOutcome::Failed(e)) => return SyncOutcome::Failed(e),
    };

    let (saved_favorites, saved_preferences) = futures::join!(
      self.save_favorites(&favorites),
      self.save_user_preferences(&preferences)
    );
    for outcome in [saved_favorites, saved_preferences] {
      match outcome {
        SyncOutcome::Synced(()) => {}
        SyncOutcome::Unavailable => return SyncOutcome::Unavailable,
        SyncOutcome::Failed(e) => return SyncOutcome::Failed(e),
      }
    }

    tracing::info!(favorites = favorites.len(), "cloud sync complete");
    SyncOutcome::Synced(SyncedData {
      favorites,
      preferences,
    })
  }
}
