use serde::{Deserialize, Serialize};
use std::fmt;

/// Life status of a character as reported by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterStatus {
  Alive,
  Dead,
  #[serde(rename = "unknown")]
  Unknown,
}

impl CharacterStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Alive => "Alive",
      Self::Dead => "Dead",
      Self::Unknown => "unknown",
    }
  }
}

impl fmt::Display for CharacterStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
  Female,
  Male,
  Genderless,
  #[serde(rename = "unknown")]
  Unknown,
}

/// Status filter for character lists. `All` means no filter.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
  #[default]
  All,
  Alive,
  Dead,
  Unknown,
}

impl StatusFilter {
  /// Value of the server-side `status` query parameter, if any.
  pub fn as_query(&self) -> Option<&'static str> {
    match self {
      Self::All => None,
      Self::Alive => Some("alive"),
      Self::Dead => Some("dead"),
      Self::Unknown => Some("unknown"),
    }
  }

  pub fn matches(&self, status: CharacterStatus) -> bool {
    match self {
      Self::All => true,
      Self::Alive => status == CharacterStatus::Alive,
      Self::Dead => status == CharacterStatus::Dead,
      Self::Unknown => status == CharacterStatus::Unknown,
    }
  }
}

impl fmt::Display for StatusFilter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_query().unwrap_or("all"))
  }
}

/// Named reference to another catalog resource (origin, location).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Place {
  pub name: String,
  pub url: String,
}

impl Place {
  pub fn unknown() -> Self {
    Self {
      name: "Unknown".to_string(),
      url: String::new(),
    }
  }
}

/// A catalog character. Never modified locally, only copied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
  pub id: u32,
  pub name: String,
  pub status: CharacterStatus,
  pub species: String,
  #[serde(rename = "type", default)]
  pub kind: String,
  pub gender: Gender,
  pub origin: Place,
  pub location: Place,
  pub image: String,
  /// Episode urls in air order
  #[serde(default)]
  pub episode: Vec<String>,
  #[serde(default)]
  pub url: String,
  pub created: String,
}

/// A catalog episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
  pub id: u32,
  pub name: String,
  /// Display string, not parsed
  pub air_date: String,
  /// Code such as "S01E01"
  pub episode: String,
  #[serde(default)]
  pub characters: Vec<String>,
  #[serde(default)]
  pub url: String,
  pub created: String,
}

/// One page of a paginated list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
  /// Total number of items across all pages
  pub count: u32,
  pub total_pages: u32,
  pub next_page_exists: bool,
  pub results: Vec<T>,
}

/// Apply the list screen's local filters: status first, then a
/// case-insensitive name search when `search` is not blank.
pub fn apply_filters(characters: &[Character], filter: StatusFilter, search: &str) -> Vec<Character> {
  let needle = search.trim().to_lowercase();

  characters
    .iter()
    .filter(|c| filter.matches(c.status))
    .filter(|c| needle.is_empty() || c.name.to_lowercase().contains(&needle))
    .cloned()
    .collect()
}
