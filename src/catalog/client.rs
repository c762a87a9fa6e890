use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::config::ApiConfig;

use super::api_types::{ApiPage, OneOrMany};
use super::error::CatalogError;
use super::types::{Character, Episode, Page, StatusFilter};

/// Client for the public character catalog REST API.
///
/// One attempt per call; a failure is returned to the caller, who decides
/// whether to fall back to the cache.
#[derive(Clone)]
pub struct CatalogClient {
  http: reqwest::Client,
  base_url: String,
}

impl CatalogClient {
  pub fn new(config: &ApiConfig) -> Result<Self, CatalogError> {
    Self::with_timeout(&config.base_url, Duration::from_secs(config.timeout_secs))
  }

  pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, CatalogError> {
    // Validate early so request building can't fail on the base part
    Url::parse(base_url)?;

    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| CatalogError::Network(format!("Failed to build HTTP client: {}", e)))?;

    Ok(Self {
      http,
      base_url: base_url.trim_end_matches('/').to_string(),
    })
  }

  /// Get one page of characters
  pub async fn get_characters(&self, page: u32) -> Result<Page<Character>, CatalogError> {
    self.get_characters_by_status(StatusFilter::All, page).await
  }

  /// Get one page of characters with the given status
  pub async fn get_characters_by_status(
    &self,
    status: StatusFilter,
    page: u32,
  ) -> Result<Page<Character>, CatalogError> {
    let mut query = vec![("page", page.to_string())];
    if let Some(status) = status.as_query() {
      query.push(("status", status.to_string()));
    }

    let page: ApiPage<Character> = self.get_json("character", &query).await?;
    Ok(page.into())
  }

  /// Search characters by name
  pub async fn search_characters(
    &self,
    name: &str,
    page: u32,
  ) -> Result<Page<Character>, CatalogError> {
    let query = [("name", name.to_string()), ("page", page.to_string())];
    let page: ApiPage<Character> = self.get_json("character", &query).await?;
    Ok(page.into())
  }

  /// Get a single character by id
  pub async fn get_character(&self, id: u32) -> Result<Character, CatalogError> {
    self.get_json(&format!("character/{}", id), &[]).await
  }

  /// Get several characters in one request
  pub async fn get_multiple_characters(&self, ids: &[u32]) -> Result<Vec<Character>, CatalogError> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }

    let result: OneOrMany<Character> = self
      .get_json(&format!("character/{}", join_ids(ids)), &[])
      .await?;
    Ok(result.into_vec())
  }

  /// Get a single episode by id
  pub async fn get_episode(&self, id: u32) -> Result<Episode, CatalogError> {
    self.get_json(&format!("episode/{}", id), &[]).await
  }

  /// Get the episodes behind a list of episode urls in one batched request.
  ///
  /// Ids come from the last path segment of each url; urls without a numeric
  /// id are skipped. Results are in server order, not input order.
  pub async fn get_episodes_from_urls(&self, urls: &[String]) -> Result<Vec<Episode>, CatalogError> {
    let ids: Vec<u32> = urls.iter().filter_map(|u| trailing_id(u)).collect();

    if ids.is_empty() {
      return Ok(Vec::new());
    }

    let result: OneOrMany<Episode> = self
      .get_json(&format!("episode/{}", join_ids(&ids)), &[])
      .await?;
    Ok(result.into_vec())
  }

  async fn get_json<T: DeserializeOwned>(
    &self,
    path: &str,
    query: &[(&str, String)],
  ) -> Result<T, CatalogError> {
    let mut url = Url::parse(&format!("{}/{}", self.base_url, path))?;
    if !query.is_empty() {
      url.query_pairs_mut().extend_pairs(query);
    }

    tracing::debug!(%url, "catalog request");

    let response = self
      .http
      .get(url.clone())
      .header("Content-Type", "application/json")
      .send()
      .await
      .map_err(|e| {
        tracing::warn!(%url, error = %e, "catalog request failed");
        CatalogError::from(e)
      })?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
      return Err(CatalogError::NotFound(path.to_string()));
    }
    if !status.is_success() {
      tracing::warn!(%url, status = status.as_u16(), "catalog returned error status");
      return Err(CatalogError::Http {
        status: status.as_u16(),
      });
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| CatalogError::Parse(e.to_string()))
  }
}

/// Numeric id at the end of a resource url, e.g. `.../episode/28` -> 28.
pub fn trailing_id(url: &str) -> Option<u32> {
  url
    .trim_end_matches('/')
    .rsplit('/')
    .next()
    .and_then(|segment| segment.parse().ok())
}

fn join_ids(ids: &[u32]) -> String {
  ids
    .iter()
    .map(|id| id.to_string())
    .collect::<Vec<_>>()
    .join(",")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::{character_json, episode_json, serve};
  use axum::extract::{Path, Query, State};
  use axum::http::StatusCode as AxumStatus;
  use axum::routing::get;
  use axum::{Json, Router};
  use serde_json::{json, Value};
  use std::collections::HashMap;
  use std::sync::{Arc, Mutex};

  type Requests = Arc<Mutex<Vec<String>>>;

  async fn list_characters(
    State(requests): State<Requests>,
    Query(params): Query<HashMap<String, String>>,
  ) -> Json<Value> {
    requests
      .lock()
      .unwrap()
      .push(format!("character?{:?}", params.get("status")));

    let all = vec![
      character_json(1, "Rick Sanchez", "Alive"),
      character_json(8, "Adjudicator Rick", "Dead"),
      character_json(6, "Abadango Cluster Princess", "Alive"),
      character_json(11, "Albert Einstein", "Dead"),
      character_json(5, "Jerry Smith", "unknown"),
    ];
    let results: Vec<Value> = match params.get("status").map(String::as_str) {
      Some(wanted) => all
        .into_iter()
        .filter(|c| c["status"].as_str().unwrap().eq_ignore_ascii_case(wanted))
        .collect(),
      None => all,
    };
    let page: u32 = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let next = if page < 2 { json!("next") } else { Value::Null };

    Json(json!({
      "info": {
        "count": results.len(),
        "pages": 2,
        "next": next,
        "prev": null
      },
      "results": results
    }))
  }

  async fn one_character(Path(id): Path<String>) -> Result<Json<Value>, AxumStatus> {
    match id.as_str() {
      "1" => Ok(Json(character_json(1, "Rick Sanchez", "Alive"))),
      "1,2" => Ok(Json(json!([
        character_json(1, "Rick Sanchez", "Alive"),
        character_json(2, "Morty Smith", "Alive")
      ]))),
      "500" => Err(AxumStatus::INTERNAL_SERVER_ERROR),
      "666" => Ok(Json(json!({"unexpected": true}))),
      _ => Err(AxumStatus::NOT_FOUND),
    }
  }

  async fn episodes(State(requests): State<Requests>, Path(ids): Path<String>) -> Json<Value> {
    requests.lock().unwrap().push(format!("episode/{}", ids));

    let parsed: Vec<u32> = ids.split(',').map(|s| s.parse().unwrap()).collect();
    if parsed.len() == 1 {
      return Json(episode_json(parsed[0]));
    }
    // Server order deliberately differs from request order
    let mut sorted = parsed.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    Json(Value::Array(sorted.into_iter().map(episode_json).collect()))
  }

  async fn catalog_server() -> (CatalogClient, Requests) {
    let requests: Requests = Arc::default();
    let router = Router::new()
      .route("/api/character", get(list_characters))
      .route("/api/character/:id", get(one_character))
      .route("/api/episode/:ids", get(episodes))
      .with_state(requests.clone());

    let base = serve(router).await;
    let client = CatalogClient::with_timeout(&format!("{}/api", base), Duration::from_secs(5)).unwrap();
    (client, requests)
  }

  #[tokio::test]
  async fn test_dead_filter_returns_only_dead_characters() {
    let (client, requests) = catalog_server().await;

    let page = client
      .get_characters_by_status(StatusFilter::Dead, 1)
      .await
      .unwrap();

    assert_eq!(page.results.len(), 2);
    assert!(page.results.iter().all(|c| c.status.as_str() == "Dead"));
    assert!(page.next_page_exists);
    assert_eq!(requests.lock().unwrap()[0], "character?Some(\"dead\")");
  }

  #[tokio::test]
  async fn test_all_filter_omits_status_parameter() {
    let (client, requests) = catalog_server().await;

    let page = client.get_characters(2).await.unwrap();

    assert_eq!(page.results.len(), 5);
    assert!(!page.next_page_exists);
    assert_eq!(requests.lock().unwrap()[0], "character?None");
  }

  #[tokio::test]
  async fn test_episodes_are_fetched_in_one_batch() {
    let (client, requests) = catalog_server().await;
    let urls = vec![
      "https://rickandmortyapi.com/api/episode/1".to_string(),
      "https://rickandmortyapi.com/api/episode/3".to_string(),
    ];

    let episodes = client.get_episodes_from_urls(&urls).await.unwrap();

    let mut ids: Vec<u32> = episodes.iter().map(|e| e.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 3]);
    assert_eq!(*requests.lock().unwrap(), vec!["episode/1,3".to_string()]);
  }

  #[tokio::test]
  async fn test_single_episode_url_still_returns_a_list() {
    let (client, _) = catalog_server().await;
    let urls = vec!["https://rickandmortyapi.com/api/episode/7".to_string()];

    let episodes = client.get_episodes_from_urls(&urls).await.unwrap();
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0].id, 7);
  }

  #[tokio::test]
  async fn test_no_usable_episode_ids_skips_request() {
    let (client, requests) = catalog_server().await;
    let urls = vec!["https://rickandmortyapi.com/api/episode/".to_string(), "garbage".to_string()];

    assert!(client.get_episodes_from_urls(&urls).await.unwrap().is_empty());
    assert!(client.get_episodes_from_urls(&[]).await.unwrap().is_empty());
    assert!(requests.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_multiple_characters() {
    let (client, _) = catalog_server().await;

    let characters = client.get_multiple_characters(&[1, 2]).await.unwrap();
    assert_eq!(characters.len(), 2);
    assert!(client.get_multiple_characters(&[]).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_status_errors_are_classified() {
    let (client, _) = catalog_server().await;

    assert_eq!(client.get_character(1).await.unwrap().name, "Rick Sanchez");

    let missing = client.get_character(99).await.unwrap_err();
    assert!(matches!(missing, CatalogError::NotFound(_)));
    assert_eq!(missing.status(), Some(404));

    let broken = client.get_character(500).await.unwrap_err();
    assert!(matches!(broken, CatalogError::Http { status: 500 }));
    assert!(!broken.is_transient());

    let garbled = client.get_character(666).await.unwrap_err();
    assert!(matches!(garbled, CatalogError::Parse(_)));
  }

  #[tokio::test]
  async fn test_slow_response_times_out() {
    let router = Router::new().route(
      "/api/character/:id",
      get(|| async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Json(character_json(1, "Rick Sanchez", "Alive"))
      }),
    );
    let base = serve(router).await;
    let client =
      CatalogClient::with_timeout(&format!("{}/api", base), Duration::from_millis(100)).unwrap();

    let err = client.get_character(1).await.unwrap_err();
    assert!(matches!(err, CatalogError::Timeout));
    assert!(err.is_transient());
  }

  #[tokio::test]
  async fn test_unreachable_server_is_a_network_error() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
      .unwrap()
      .local_addr()
      .unwrap()
      .port();
    let client =
      CatalogClient::with_timeout(&format!("http://127.0.0.1:{}/api", port), Duration::from_secs(2))
        .unwrap();

    let err = client.get_characters(1).await.unwrap_err();
    assert!(err.is_transient());
  }

  #[test]
  fn test_trailing_id() {
    assert_eq!(trailing_id("https://rickandmortyapi.com/api/episode/28"), Some(28));
    assert_eq!(trailing_id("https://rickandmortyapi.com/api/episode/28/"), Some(28));
    assert_eq!(trailing_id("https://rickandmortyapi.com/api/episode/"), None);
    assert_eq!(trailing_id("nonsense"), None);
  }

  #[test]
  fn test_invalid_base_url_is_rejected() {
    assert!(matches!(
      CatalogClient::with_timeout("not a url", Duration::from_secs(1)),
      Err(CatalogError::Url(_))
    ));
  }
}
