use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::cache::{CacheResult, TtlCache};
use crate::catalog::{
  CachedCatalog, CatalogClient, Character, Connectivity, Episode, LoadError, Page, StatusFilter,
};
use crate::clock::{Clock, SystemClock};
use crate::cloud::{Auth, AuthUser, CloudError, CloudSync, SyncOutcome, SyncedData};
use crate::config::{CloudConfig, Config};
use crate::favorites::FavoritesStore;
use crate::preferences::{PreferencesStore, UserPreferences};
use crate::store::{self, Flush, KvStore, StorageInfo};
use crate::telemetry::{TelemetryLog, TelemetryStats};

/// A character with the episodes shown on its detail view.
#[derive(Debug)]
pub struct CharacterDetail {
  pub character: CacheResult<Character>,
  /// `None` when the episodes could not be loaded
  pub episodes: Option<CacheResult<Vec<Episode>>>,
  pub is_favorite: bool,
}

/// Application context: owns every service and wires them together.
///
/// Mutations update memory immediately. Their persistence and cloud mirroring
/// run in the background and are tracked until [`App::settle`].
pub struct App {
  config: Config,
  store: Arc<dyn KvStore>,
  clock: Arc<dyn Clock>,
  catalog: CachedCatalog,
  favorites: FavoritesStore,
  preferences: PreferencesStore,
  telemetry: TelemetryLog,
  cloud: Arc<CloudSync>,
  connectivity: Connectivity,

  /// Write-behind persists still running
  pending_writes: Vec<Flush>,
  /// Persists that failed after they were dropped from `pending_writes`
  failed_writes: usize,
  /// Fire-and-forget cloud mirrors
  cloud_tasks: Vec<JoinHandle<()>>,
}

impl App {
  /// Wire the production services over `store`.
  pub fn new(config: Config, store: Arc<dyn KvStore>, connectivity: Connectivity) -> Result<Self> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let timeout = Duration::from_secs(config.api.timeout_secs);

    let client = CatalogClient::new(&config.api)?;
    let catalog = CachedCatalog::new(
      client,
      TtlCache::new(store.clone(), clock.clone()),
      config.cache_max_age(),
      config.episodes.preview_limit,
    );

    let cloud_config = CloudConfig::from_env().ok();
    let auth = Arc::new(Auth::select(
      config.cloud.auth,
      cloud_config.as_ref(),
      store.clone(),
      clock.clone(),
      timeout,
    ));
    let cloud = Arc::new(CloudSync::connect(
      cloud_config.as_ref(),
      auth,
      store.as_ref(),
      clock.clone(),
      timeout,
    ));

    Ok(Self::with_services(
      config,
      store,
      clock,
      catalog,
      cloud,
      connectivity,
    ))
  }

  /// Build the context from already constructed collaborators.
  pub fn with_services(
    config: Config,
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    catalog: CachedCatalog,
    cloud: Arc<CloudSync>,
    connectivity: Connectivity,
  ) -> Self {
    let favorites = FavoritesStore::load(store.clone());
    let preferences = PreferencesStore::load(store.clone());
    let telemetry = TelemetryLog::load(store.clone(), clock.clone(), config.telemetry.max_events);

    Self {
      config,
      store,
      clock,
      catalog,
      favorites,
      preferences,
      telemetry,
      cloud,
      connectivity,
      pending_writes: Vec::new(),
      failed_writes: 0,
      cloud_tasks: Vec::new(),
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn connectivity(&self) -> Connectivity {
    self.connectivity
  }

  pub fn set_connectivity(&mut self, connectivity: Connectivity) {
    if self.connectivity != connectivity {
      tracing::info!(?connectivity, "connectivity changed");
    }
    self.connectivity = connectivity;
  }

  pub fn cloud(&self) -> &CloudSync {
    &self.cloud
  }

  pub fn telemetry(&self) -> &TelemetryLog {
    &self.telemetry
  }

  pub fn favorites(&self) -> &[Character] {
    self.favorites.list()
  }

  pub fn is_favorite(&self, id: u32) -> bool {
    self.favorites.is_favorite(id)
  }

  pub fn preferences(&self) -> UserPreferences {
    self.preferences.get()
  }

  pub fn record_launch(&mut self) {
    let flush = self.telemetry.app_launched();
    self.track(flush);
  }

  /// One page of the character list, from the network or the cache.
  pub async fn browse(
    &self,
    page: u32,
    filter: StatusFilter,
  ) -> Result<CacheResult<Page<Character>>, LoadError> {
    self
      .catalog
      .load_characters(page, filter, self.connectivity)
      .await
  }

  /// Name search. Results are never cached, so this needs the network.
  pub async fn search(&self, name: &str, page: u32) -> Result<Page<Character>, LoadError> {
    if !self.connectivity.is_online() {
      return Err(LoadError::UnavailableOffline(format!(
        "search for '{}'",
        name
      )));
    }
    Ok(self.catalog.client().search_characters(name, page).await?)
  }

  /// Record that the user switched the status filter.
  pub fn apply_filter(&mut self, filter: StatusFilter) {
    let flush = self.telemetry.filter_applied("status", &filter.to_string());
    self.track(flush);
  }

  /// Load a character and its first episodes, and record the view.
  pub async fn character_detail(&mut self, id: u32) -> Result<CharacterDetail, LoadError> {
    let character = self.catalog.load_character(id, self.connectivity).await?;

    let flush = self.telemetry.character_viewed(&character.data);
    self.track(flush);

    let episodes = match self
      .catalog
      .load_episodes(&character.data, self.connectivity)
      .await
    {
      Ok(episodes) => Some(episodes),
      Err(e) => {
        tracing::warn!(id, error = %e, "episodes unavailable");
        None
      }
    };

    Ok(CharacterDetail {
      is_favorite: self.favorites.is_favorite(id),
      character,
      episodes,
    })
  }

  /// Add a favorite. Returns false if it was already there.
  pub fn add_favorite(&mut self, character: Character) -> bool {
    if self.favorites.is_favorite(character.id) {
      return false;
    }

    let telemetry = self.telemetry.favorite_added(&character);
    let write = self.favorites.add(character);
    self.track(write);
    self.track(telemetry);
    self.mirror_favorites();
    true
  }

  /// Fetch (or recall) a character by id and favorite it.
  pub async fn favorite_by_id(&mut self, id: u32) -> Result<bool, LoadError> {
    let character = self.catalog.load_character(id, self.connectivity).await?;
    Ok(self.add_favorite(character.data))
  }

  /// Remove a favorite. Returns false if it was not there.
  pub fn remove_favorite(&mut self, id: u32) -> bool {
    if !self.favorites.is_favorite(id) {
      return false;
    }

    let write = self.favorites.remove(id);
    let telemetry = self.telemetry.favorite_removed(id);
    self.track(write);
    self.track(telemetry);
    self.mirror_favorites();
    true
  }

  /// Flip the favorite state of `character`; returns the new state.
  pub fn toggle_favorite(&mut self, character: Character) -> bool {
    if self.favorites.is_favorite(character.id) {
      self.remove_favorite(character.id);
      false
    } else {
      self.add_favorite(character);
      true
    }
  }

  pub fn clear_favorites(&mut self) {
    let write = self.favorites.clear();
    let telemetry = self.telemetry.filter_applied("clear_favorites", "all");
    self.track(write);
    self.track(telemetry);
    self.mirror_favorites();
  }

  /// Change preferences locally and mirror them to the cloud when online.
  pub fn update_preferences(&mut self, change: impl FnOnce(&mut UserPreferences)) {
    let write = self.preferences.update(change);
    self.track(write);

    if self.should_mirror() {
      let cloud = self.cloud.clone();
      let preferences = self.preferences.get();
      self.spawn_cloud(async move {
        cloud.save_user_preferences(&preferences).await;
      });
    }
  }

  pub fn stats(&self) -> TelemetryStats {
    self.telemetry.get_stats()
  }

  /// Drop telemetry older than `days`; returns how many events went.
  pub fn prune_telemetry(&mut self, days: i64) -> usize {
    let (removed, flush) = self.telemetry.clear_old_events(days);
    self.track(flush);
    removed
  }

  pub fn clear_telemetry(&mut self) {
    let flush = self.telemetry.clear_all_events();
    self.track(flush);
  }

  pub async fn storage_info(&mut self) -> Result<StorageInfo> {
    if let Err(e) = self.settle().await {
      tracing::warn!(error = %e, "pending writes failed before reading storage info");
    }
    store::storage_info(self.store.as_ref())
  }

  /// Wipe local app data and, when online, the cloud copies.
  ///
  /// Returns the number of local keys removed and the cloud outcome, which
  /// is `Unavailable` when offline.
  pub async fn clear_all_data(&mut self) -> Result<(usize, SyncOutcome<()>)> {
    // Pending writes must land before the wipe or they would resurrect data
    if let Err(e) = self.settle().await {
      tracing::warn!(error = %e, "pending writes failed before clearing data");
    }

    let removed = store::clear_all_data(self.store.as_ref())?;

    self.favorites = FavoritesStore::load(self.store.clone());
    self.preferences = PreferencesStore::load(self.store.clone());
    self.telemetry = TelemetryLog::load(
      self.store.clone(),
      self.clock.clone(),
      self.config.telemetry.max_events,
    );

    let cloud = if self.connectivity.is_online() {
      self.cloud.clear_user_data().await
    } else {
      SyncOutcome::Unavailable
    };
    Ok((removed, cloud))
  }

  /// Reconcile with the cloud and adopt the result locally.
  pub async fn sync(&mut self) -> SyncOutcome<SyncedData> {
    if !self.connectivity.is_online() {
      return SyncOutcome::Unavailable;
    }

    let outcome = self
      .cloud
      .sync_data(self.favorites.list(), Some(self.preferences.get()))
      .await;

    if let SyncOutcome::Synced(data) = &outcome {
      let favorites = self.favorites.replace(data.favorites.clone());
      let preferences = self.preferences.replace(data.preferences);
      self.track(favorites);
      self.track(preferences);
    }
    outcome
  }

  pub async fn check_cloud(&self) -> SyncOutcome<()> {
    self.cloud.check_connection().await
  }

  pub fn current_user(&self) -> Option<AuthUser> {
    self.cloud.auth().current_user()
  }

  /// Sign in. Favorites are not moved from the device partition.
  pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, CloudError> {
    self.cloud.auth().sign_in(email, password).await
  }

  pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, CloudError> {
    self.cloud.auth().sign_up(email, password).await
  }

  pub fn sign_out(&self) {
    self.cloud.auth().sign_out();
  }

  pub async fn send_password_reset(&self, email: &str) -> Result<(), CloudError> {
    self.cloud.auth().send_password_reset(email).await
  }

  /// Wait for every outstanding write and cloud mirror.
  ///
  /// Cloud outcomes are already logged; only failed local writes are
  /// reported.
  pub async fn settle(&mut self) -> Result<()> {
    let mut failed = std::mem::take(&mut self.failed_writes);
    for flush in std::mem::take(&mut self.pending_writes) {
      if flush.wait().await.is_err() {
        failed += 1;
      }
    }

    for task in std::mem::take(&mut self.cloud_tasks) {
      if let Err(e) = task.await {
        tracing::warn!(error = %e, "cloud task panicked");
      }
    }

    if failed > 0 {
      return Err(eyre!("{} local write(s) failed to persist", failed));
    }
    Ok(())
  }

  fn track(&mut self, flush: Flush) {
    let mut failed = 0;
    self.pending_writes.retain_mut(|pending| match pending.try_result() {
      Some(Ok(())) => false,
      Some(Err(_)) => {
        failed += 1;
        false
      }
      None => true,
    });
    self.failed_writes += failed;
    self.pending_writes.push(flush);
  }

  fn should_mirror(&self) -> bool {
    self.connectivity.is_online() && self.cloud.is_available()
  }

  fn mirror_favorites(&mut self) {
    if !self.should_mirror() {
      return;
    }
    let cloud = self.cloud.clone();
    let favorites = self.favorites.list().to_vec();
    self.spawn_cloud(async move {
      cloud.save_favorites(&favorites).await;
    });
  }

  fn spawn_cloud(&mut self, task: impl std::future::Future<Output = ()> + Send + 'static) {
    self.cloud_tasks.retain(|t| !t.is_finished());
    match tokio::runtime::Handle::try_current() {
      Ok(runtime) => self.cloud_tasks.push(runtime.spawn(task)),
      Err(_) => tracing::debug!("no runtime, skipping cloud mirror"),
    }
  }
}
