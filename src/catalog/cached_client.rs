//! Catalog access with write-through caching and offline fallback.

use chrono::Duration;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;

use crate::cache::{CacheResult, TtlCache};

use super::cache::CatalogKey;
use super::client::CatalogClient;
use super::error::{CatalogError, LoadError};
use super::types::{apply_filters, Character, Episode, Page, StatusFilter};
use super::Connectivity;

/// Catalog client with transparent caching support.
///
/// Prefers fresh data: when online every load goes to the network and
/// successful results are written through to the cache. When the fetch fails,
/// or the device is offline, cached data no older than `max_age` is served
/// instead and tagged with where it came from.
#[derive(Clone)]
pub struct CachedCatalog {
  inner: CatalogClient,
  cache: TtlCache,
  max_age: Duration,
  episode_limit: usize,
}

impl CachedCatalog {
  pub fn new(inner: CatalogClient, cache: TtlCache, max_age: Duration, episode_limit: usize) -> Self {
    Self {
      inner,
      cache,
      max_age,
      episode_limit,
    }
  }

  /// The underlying uncached client.
  pub fn client(&self) -> &CatalogClient {
    &self.inner
  }

  /// Load one page of the character list.
  ///
  /// Only the first page is cached. When it comes from the cache the status
  /// filter is applied locally, since the cached page may have been loaded
  /// under a different filter. Later pages need the network.
  pub async fn load_characters(
    &self,
    page: u32,
    filter: StatusFilter,
    connectivity: Connectivity,
  ) -> Result<CacheResult<Page<Character>>, LoadError> {
    if page > 1 {
      if !connectivity.is_online() {
        return Err(LoadError::UnavailableOffline(format!(
          "page {} of the character list",
          page
        )));
      }
      let data = self.inner.get_characters_by_status(filter, page).await?;
      return Ok(CacheResult::from_network(data));
    }

    let result = self
      .fetch_through(CatalogKey::CharacterList, connectivity, || {
        self.inner.get_characters_by_status(filter, page)
      })
      .await?;

    if result.is_cached() {
      return Ok(result.map(|mut cached: Page<Character>| {
        cached.results = apply_filters(&cached.results, filter, "");
        cached
      }));
    }
    Ok(result)
  }

  /// Load a single character.
  pub async fn load_character(
    &self,
    id: u32,
    connectivity: Connectivity,
  ) -> Result<CacheResult<Character>, LoadError> {
    self
      .fetch_through(CatalogKey::Character(id), connectivity, || {
        self.inner.get_character(id)
      })
      .await
  }

  /// Load the first episodes a character appears in.
  pub async fn load_episodes(
    &self,
    character: &Character,
    connectivity: Connectivity,
  ) -> Result<CacheResult<Vec<Episode>>, LoadError> {
    let urls: Vec<String> = character
      .episode
      .iter()
      .take(self.episode_limit)
      .cloned()
      .collect();

    self
      .fetch_through(CatalogKey::Episodes(character.id), connectivity, || async move {
        self.inner.get_episodes_from_urls(&urls).await
      })
      .await
  }

  /// Network first with write-through; cache when offline or on failure.
  async fn fetch_through<T, F, Fut>(
    &self,
    key: CatalogKey,
    connectivity: Connectivity,
    fetcher: F,
  ) -> Result<CacheResult<T>, LoadError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, CatalogError>>,
  {
    let cache_key = key.cache_key();

    if !connectivity.is_online() {
      return self
        .cache
        .get_entry(&cache_key, self.max_age)
        .map(|hit| CacheResult::offline(hit.data, hit.stored_at))
        .ok_or_else(|| LoadError::UnavailableOffline(key.description()));
    }

    match fetcher().await {
      Ok(data) => {
        self.cache.put(&cache_key, &data);
        Ok(CacheResult::from_network(data))
      }
      Err(e) => {
        tracing::warn!(what = %key.description(), error = %e, "fetch failed, trying cache");
        match self.cache.get_entry(&cache_key, self.max_age) {
          Some(hit) => Ok(CacheResult::fallback(hit.data, hit.stored_at)),
          None => Err(e.into()),
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::CacheSource;
  use crate::catalog::CharacterStatus;
  use crate::clock::ManualClock;
  use crate::store::MemoryStore;
  use crate::test_support::{character, character_json, episode_json, serve};
  use axum::extract::{Path, State};
  use axum::http::StatusCode;
  use axum::routing::get;
  use axum::{Json, Router};
  use serde_json::{json, Value};
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  struct Harness {
    catalog: CachedCatalog,
    cache: TtlCache,
    clock: Arc<ManualClock>,
    hits: Arc<AtomicUsize>,
  }

  async fn character_route(
    State(hits): State<Arc<AtomicUsize>>,
    Path(id): Path<u32>,
  ) -> Result<Json<Value>, StatusCode> {
    hits.fetch_add(1, Ordering::SeqCst);
    match id {
      1..=100 => Ok(Json(character_json(id, "Rick Sanchez", "Alive"))),
      _ => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
  }

  async fn list_route(State(hits): State<Arc<AtomicUsize>>) -> Json<Value> {
    hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({
      "info": {"count": 3, "pages": 1, "next": null, "prev": null},
      "results": [
        character_json(1, "Rick Sanchez", "Alive"),
        character_json(3, "Summer Smith", "Alive"),
        character_json(8, "Adjudicator Rick", "Dead")
      ]
    }))
  }

  async fn episode_route(State(hits): State<Arc<AtomicUsize>>, Path(ids): Path<String>) -> Json<Value> {
    hits.fetch_add(1, Ordering::SeqCst);
    let episodes: Vec<Value> = ids
      .split(',')
      .map(|id| episode_json(id.parse().unwrap()))
      .collect();
    Json(Value::Array(episodes))
  }

  async fn harness() -> Harness {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
      .route("/api/character", get(list_route))
      .route("/api/character/:id", get(character_route))
      .route("/api/episode/:ids", get(episode_route))
      .with_state(hits.clone());
    let base = serve(router).await;

    let client =
      CatalogClient::with_timeout(&format!("{}/api", base), std::time::Duration::from_secs(5)).unwrap();
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let cache = TtlCache::new(Arc::new(MemoryStore::new()), clock.clone());
    let catalog = CachedCatalog::new(client, cache.clone(), Duration::minutes(5), 10);

    Harness {
      catalog,
      cache,
      clock,
      hits,
    }
  }

  #[tokio::test]
  async fn test_offline_detail_served_from_recent_cache_without_network() {
    let h = harness().await;
    h.cache
      .put("character_42", &character(42, "Rick Sanchez", CharacterStatus::Alive));
    h.clock.advance(Duration::minutes(1));

    let result = h
      .catalog
      .load_character(42, Connectivity::Offline)
      .await
      .unwrap();

    assert_eq!(result.data.id, 42);
    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(h.hits.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_offline_detail_never_cached_is_unavailable() {
    let h = harness().await;

    let err = h
      .catalog
      .load_character(99, Connectivity::Offline)
      .await
      .unwrap_err();

    assert!(matches!(err, LoadError::UnavailableOffline(_)));
    assert_eq!(err.to_string(), "character 99 unavailable offline");
    assert_eq!(h.hits.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_offline_detail_with_expired_cache_is_unavailable() {
    let h = harness().await;
    h.cache
      .put("character_42", &character(42, "Rick Sanchez", CharacterStatus::Alive));
    h.clock.advance(Duration::minutes(6));

    let err = h
      .catalog
      .load_character(42, Connectivity::Offline)
      .await
      .unwrap_err();
    assert!(matches!(err, LoadError::UnavailableOffline(_)));
  }

  #[tokio::test]
  async fn test_online_load_writes_through() {
    let h = harness().await;

    let result = h.catalog.load_character(7, Connectivity::Online).await.unwrap();
    assert_eq!(result.source, CacheSource::Network);

    let cached: Option<Character> = h.cache.get("character_7", Duration::minutes(5));
    assert_eq!(cached.map(|c| c.id), Some(7));
  }

  #[tokio::test]
  async fn test_failed_fetch_falls_back_to_cache() {
    let h = harness().await;
    h.cache
      .put("character_500", &character(500, "Cached Rick", CharacterStatus::Dead));

    let result = h
      .catalog
      .load_character(500, Connectivity::Online)
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Fallback);
    assert_eq!(result.data.name, "Cached Rick");
    assert_eq!(h.hits.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_failed_fetch_without_cache_surfaces_remote_error() {
    let h = harness().await;

    let err = h
      .catalog
      .load_character(500, Connectivity::Online)
      .await
      .unwrap_err();
    assert!(matches!(
      err,
      LoadError::Remote(CatalogError::Http { status: 503 })
    ));
  }

  #[tokio::test]
  async fn test_offline_list_applies_filter_to_cached_page() {
    let h = harness().await;
    h.catalog
      .load_characters(1, StatusFilter::All, Connectivity::Online)
      .await
      .unwrap();

    let dead = h
      .catalog
      .load_characters(1, StatusFilter::Dead, Connectivity::Offline)
      .await
      .unwrap();

    assert_eq!(dead.source, CacheSource::Offline);
    assert_eq!(
      dead.data.results.iter().map(|c| c.id).collect::<Vec<_>>(),
      vec![8]
    );
    assert_eq!(h.hits.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_offline_later_pages_are_unavailable() {
    let h = harness().await;

    let err = h
      .catalog
      .load_characters(2, StatusFilter::All, Connectivity::Offline)
      .await
      .unwrap_err();
    assert!(matches!(err, LoadError::UnavailableOffline(_)));
  }

  #[tokio::test]
  async fn test_episodes_limited_and_cached_per_character() {
    let h = harness().await;
    let mut rick = character(1, "Rick Sanchez", CharacterStatus::Alive);
    rick.episode = (1..=15)
      .map(|n| format!("https://rickandmortyapi.com/api/episode/{}", n))
      .collect();

    let online = h
      .catalog
      .load_episodes(&rick, Connectivity::Online)
      .await
      .unwrap();
    assert_eq!(online.data.len(), 10);

    let offline = h
      .catalog
      .load_episodes(&rick, Connectivity::Offline)
      .await
      .unwrap();
    assert_eq!(offline.data.len(), 10);
    assert_eq!(offline.source, CacheSource::Offline);
    assert_eq!(h.hits.load(Ordering::SeqCst), 1);
  }
}
