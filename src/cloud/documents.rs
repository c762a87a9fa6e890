use async_trait::async_trait;
use serde_json::{Map, Value};

use super::CloudError;

/// Top-level fields of a document.
pub type Fields = Map<String, Value>;

/// A remote store of JSON documents addressed by collection and id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
  /// Fetch a document; `None` if it does not exist.
  async fn get(
    &self,
    collection: &str,
    id: &str,
    token: Option<&str>,
  ) -> Result<Option<Fields>, CloudError>;

  /// Upsert: write `fields` over the document, leaving other fields alone.
  async fn merge(
    &self,
    collection: &str,
    id: &str,
    fields: Fields,
    token: Option<&str>,
  ) -> Result<(), CloudError>;

  /// Delete a document. Deleting a missing document succeeds.
  async fn delete(&self, collection: &str, id: &str, token: Option<&str>) -> Result<(), CloudError>;
}
