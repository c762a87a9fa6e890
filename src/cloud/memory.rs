//! In-process document store for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::documents::{DocumentStore, Fields};
use super::CloudError;

#[derive(Default)]
pub(crate) struct MemoryDocuments {
  docs: Mutex<HashMap<(String, String), Fields>>,
  outage: AtomicBool,
}

impl MemoryDocuments {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Make every call fail as if the service were down.
  pub(crate) fn set_outage(&self, down: bool) {
    self.outage.store(down, Ordering::SeqCst);
  }

  pub(crate) fn document(&self, collection: &str, id: &str) -> Option<Fields> {
    self
      .docs
      .lock()
      .unwrap()
      .get(&(collection.to_string(), id.to_string()))
      .cloned()
  }

  pub(crate) fn len(&self) -> usize {
    self.docs.lock().unwrap().len()
  }

  fn check(&self) -> Result<(), CloudError> {
    if self.outage.load(Ordering::SeqCst) {
      return Err(CloudError::Network("service unreachable".to_string()));
    }
    Ok(())
  }
}

#[async_trait]
impl DocumentStore for MemoryDocuments {
  async fn get(
    &self,
    collection: &str,
    id: &str,
    _token: Option<&str>,
  ) -> Result<Option<Fields>, CloudError> {
    self.check()?;
    Ok(self.document(collection, id))
  }

  async fn merge(
    &self,
    collection: &str,
    id: &str,
    fields: Fields,
    _token: Option<&str>,
  ) -> Result<(), CloudError> {
    self.check()?;
    let mut docs = self.docs.lock().unwrap();
    let doc = docs
      .entry((collection.to_string(), id.to_string()))
      .or_default();
    doc.extend(fields);
    Ok(())
  }

  async fn delete(&self, collection: &str, id: &str, _token: Option<&str>) -> Result<(), CloudError> {
    self.check()?;
    self
      .docs
      .lock()
      .unwrap()
      .remove(&(collection.to_string(), id.to_string()));
    Ok(())
  }
}
