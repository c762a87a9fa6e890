//! Serde-deserializable types matching catalog API responses.
//!
//! These types are separate from domain types so the wire envelope stays out
//! of the rest of the crate.

use serde::Deserialize;

use super::types::Page;

#[derive(Debug, Deserialize)]
pub struct ApiInfo {
  #[serde(default)]
  pub count: u32,
  #[serde(default)]
  pub pages: u32,
  pub next: Option<String>,
  #[allow(dead_code)]
  pub prev: Option<String>,
}

/// Envelope of every list endpoint.
#[derive(Debug, Deserialize)]
pub struct ApiPage<T> {
  pub info: ApiInfo,
  #[serde(default = "Vec::new")]
  pub results: Vec<T>,
}

impl<T> From<ApiPage<T>> for Page<T> {
  fn from(page: ApiPage<T>) -> Self {
    Page {
      count: page.info.count,
      total_pages: page.info.pages,
      next_page_exists: page.info.next.is_some(),
      results: page.results,
    }
  }
}

/// Multi-id endpoints answer with a bare object for a single id and an array
/// otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
  Many(Vec<T>),
  One(T),
}

impl<T> OneOrMany<T> {
  pub fn into_vec(self) -> Vec<T> {
    match self {
      Self::Many(items) => items,
      Self::One(item) => vec![item],
    }
  }
}
