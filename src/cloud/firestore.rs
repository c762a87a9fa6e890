//! Document store backed by the Firestore REST API.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;
use url::Url;

use crate::config::CloudConfig;

use super::documents::{DocumentStore, Fields};
use super::CloudError;

const FIRESTORE_BASE: &str = "https://firestore.googleapis.com/v1";

pub struct FirestoreRest {
  http: reqwest::Client,
  base_url: String,
  project_id: String,
  api_key: String,
}

impl FirestoreRest {
  pub fn new(config: &CloudConfig, timeout: Duration) -> Result<Self, CloudError> {
    Self::with_base_url(FIRESTORE_BASE, &config.project_id, &config.api_key, timeout)
  }

  pub fn with_base_url(
    base_url: &str,
    project_id: &str,
    api_key: &str,
    timeout: Duration,
  ) -> Result<Self, CloudError> {
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| CloudError::Network(format!("Failed to build HTTP client: {}", e)))?;

    Ok(Self {
      http,
      base_url: base_url.trim_end_matches('/').to_string(),
      project_id: project_id.to_string(),
      api_key: api_key.to_string(),
    })
  }

  fn document_url(&self, collection: &str, id: &str) -> Result<Url, CloudError> {
    let mut url = Url::parse(&format!(
      "{}/projects/{}/databases/(default)/documents/{}/{}",
      self.base_url, self.project_id, collection, id
    ))
    .map_err(|e| CloudError::Parse(format!("Invalid document URL: {}", e)))?;
    url.query_pairs_mut().append_pair("key", &self.api_key);
    Ok(url)
  }

  fn request(&self, method: Method, url: Url, token: Option<&str>) -> RequestBuilder {
    let request = self.http.request(method, url);
    match token {
      Some(token) => request.bearer_auth(token),
      None => request,
    }
  }
}

#[async_trait]
impl DocumentStore for FirestoreRest {
  async fn get(
    &self,
    collection: &str,
    id: &str,
    token: Option<&str>,
  ) -> Result<Option<Fields>, CloudError> {
    let url = self.document_url(collection, id)?;
    let response = self.request(Method::GET, url, token).send().await?;

    if response.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    let body: Value = check(response).await?.json().await?;

    let fields = body
      .get("fields")
      .and_then(Value::as_object)
      .map(decode_fields)
      .unwrap_or_default();
    Ok(Some(fields))
  }

  async fn merge(
    &self,
    collection: &str,
    id: &str,
    fields: Fields,
    token: Option<&str>,
  ) -> Result<(), CloudError> {
    let mut url = self.document_url(collection, id)?;
    {
      // Only the listed fields are written; the rest of the document stays
      let mut query = url.query_pairs_mut();
      for name in fields.keys() {
        query.append_pair("updateMask.fieldPaths", name);
      }
    }

    let body = json!({ "fields": encode_fields(&fields) });
    let response = self
      .request(Method::PATCH, url, token)
      .json(&body)
      .send()
      .await?;
    check(response).await?;
    Ok(())
  }

  async fn delete(&self, collection: &str, id: &str, token: Option<&str>) -> Result<(), CloudError> {
    let url = self.document_url(collection, id)?;
    let response = self.request(Method::DELETE, url, token).send().await?;

    if response.status() == StatusCode::NOT_FOUND {
      return Ok(());
    }
    check(response).await?;
    Ok(())
  }
}

/// Turn a non-2xx response into an error carrying the service's message.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, CloudError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let body: Value = response.json().await.unwrap_or(Value::Null);
  let message = body["error"]["message"]
    .as_str()
    .unwrap_or("no details")
    .to_string();
  Err(CloudError::Http {
    status: status.as_u16(),
    message,
  })
}

/// Encode plain JSON into Firestore's typed value representation.
pub(crate) fn encode_value(value: &Value) -> Value {
  match value {
    Value::Null => json!({ "nullValue": null }),
    Value::Bool(b) => json!({ "booleanValue": b }),
    Value::Number(n) => match n.as_i64() {
      Some(i) => json!({ "integerValue": i.to_string() }),
      None => json!({ "doubleValue": n.as_f64() }),
    },
    Value::String(s) => json!({ "stringValue": s }),
    Value::Array(items) => json!({
      "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
    }),
    Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
  }
}

pub(crate) fn encode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
  fields
    .iter()
    .map(|(name, value)| (name.clone(), encode_value(value)))
    .collect()
}

/// Decode a Firestore typed value back into plain JSON.
pub(crate) fn decode_value(value: &Value) -> Value {
  let Some(typed) = value.as_object() else {
    return Value::Null;
  };

  if let Some(v) = typed.get("stringValue").or_else(|| typed.get("timestampValue")) {
    return v.clone();
  }
  if let Some(v) = typed.get("integerValue") {
    return match v {
      Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
      other => other.clone(),
    };
  }
  if let Some(v) = typed.get("doubleValue").or_else(|| typed.get("booleanValue")) {
    return v.clone();
  }
  if let Some(array) = typed.get("arrayValue") {
    let items = array
      .get("values")
      .and_then(Value::as_array)
      .map(|values| values.iter().map(decode_value).collect())
      .unwrap_or_default();
    return Value::Array(items);
  }
  if let Some(map) = typed.get("mapValue") {
    let fields = map
      .get("fields")
      .and_then(Value::as_object)
      .map(decode_fields)
      .unwrap_or_default();
    return Value::Object(fields);
  }
  Value::Null
}

pub(crate) fn decode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
  fields
    .iter()
    .map(|(name, value)| (name.clone(), decode_value(value)))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::serve;
  use axum::extract::{Path, RawQuery, State};
  use axum::http::{HeaderMap, StatusCode as AxumStatus};
  use axum::routing::get;
  use axum::{Json, Router};
  use std::collections::HashMap;
  use std::sync::{Arc, Mutex};

  #[derive(Default)]
  struct FakeFirestore {
    docs: Mutex<HashMap<String, Value>>,
    queries: Mutex<Vec<String>>,
    tokens: Mutex<Vec<Option<String>>>,
  }

  type Shared = Arc<FakeFirestore>;
  type DocPath = Path<(String, String, String, String)>;

  fn record(state: &FakeFirestore, headers: &HeaderMap, query: Option<String>) {
    state.queries.lock().unwrap().push(query.unwrap_or_default());
    state.tokens.lock().unwrap().push(
      headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(String::from),
    );
  }

  async fn get_doc(
    State(state): State<Shared>,
    Path((_, _, collection, id)): DocPath,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
  ) -> Result<Json<Value>, AxumStatus> {
    record(&state, &headers, query);
    let docs = state.docs.lock().unwrap();
    match docs.get(&format!("{}/{}", collection, id)) {
      Some(fields) => Ok(Json(json!({ "name": id, "fields": fields }))),
      None => Err(AxumStatus::NOT_FOUND),
    }
  }

  async fn patch_doc(
    State(state): State<Shared>,
    Path((_, _, collection, id)): DocPath,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    Json(body): Json<Value>,
  ) -> Json<Value> {
    record(&state, &headers, query);
    state
      .docs
      .lock()
      .unwrap()
      .insert(format!("{}/{}", collection, id), body["fields"].clone());
    Json(body)
  }

  async fn delete_doc(
    State(state): State<Shared>,
    Path((_, _, collection, id)): DocPath,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
  ) -> AxumStatus {
    record(&state, &headers, query);
    match state.docs.lock().unwrap().remove(&format!("{}/{}", collection, id)) {
      Some(_) => AxumStatus::OK,
      None => AxumStatus::NOT_FOUND,
    }
  }

  async fn fake_firestore() -> (FirestoreRest, Shared) {
    let state: Shared = Arc::default();
    let router = Router::new()
      .route(
        "/v1/projects/:project/databases/:db/documents/:collection/:id",
        get(get_doc).patch(patch_doc).delete(delete_doc),
      )
      .with_state(state.clone());
    let base = serve(router).await;

    let rest = FirestoreRest::with_base_url(
      &format!("{}/v1", base),
      "demo-project",
      "test-key",
      Duration::from_secs(5),
    )
    .unwrap();
    (rest, state)
  }

  #[test]
  fn test_value_encoding_round_trip() {
    let original = json!({
      "favorites": [{"id": 1, "name": "Rick", "score": 0.5}],
      "enabled": true,
      "missing": null
    });
    let encoded = encode_fields(original.as_object().unwrap());

    assert_eq!(
      encoded["favorites"]["arrayValue"]["values"][0]["mapValue"]["fields"]["id"],
      json!({ "integerValue": "1" })
    );
    assert_eq!(encoded["enabled"], json!({ "booleanValue": true }));

    let decoded = decode_fields(&encoded);
    assert_eq!(Value::Object(decoded), original);
  }

  #[test]
  fn test_decode_tolerates_empty_containers() {
    assert_eq!(decode_value(&json!({ "arrayValue": {} })), json!([]));
    assert_eq!(decode_value(&json!({ "mapValue": {} })), json!({}));
    assert_eq!(
      decode_value(&json!({ "timestampValue": "2024-01-01T00:00:00Z" })),
      json!("2024-01-01T00:00:00Z")
    );
  }

  #[tokio::test]
  async fn test_merge_get_delete_against_rest_api() {
    let (rest, state) = fake_firestore().await;
    let fields = json!({ "defaultFilter": "dead", "cacheEnabled": false });

    rest
      .merge(
        "device_preferences",
        "device_1",
        fields.as_object().unwrap().clone(),
        Some("id-token"),
      )
      .await
      .unwrap();

    let patch_query = state.queries.lock().unwrap()[0].clone();
    assert!(patch_query.contains("key=test-key"));
    assert!(patch_query.contains("updateMask.fieldPaths=defaultFilter"));
    assert!(patch_query.contains("updateMask.fieldPaths=cacheEnabled"));
    assert_eq!(
      state.tokens.lock().unwrap()[0].as_deref(),
      Some("Bearer id-token")
    );

    let loaded = rest
      .get("device_preferences", "device_1", None)
      .await
      .unwrap()
      .unwrap();
    assert_eq!(Value::Object(loaded), fields);

    rest.delete("device_preferences", "device_1", None).await.unwrap();
    assert!(rest
      .get("device_preferences", "device_1", None)
      .await
      .unwrap()
      .is_none());

    // Deleting twice is fine
    rest.delete("device_preferences", "device_1", None).await.unwrap();
  }
}
