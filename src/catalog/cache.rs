//! Cache keys for catalog payloads.

/// What a cached catalog payload is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogKey {
  /// First page of the character list (last filter loaded)
  CharacterList,
  /// A single character
  Character(u32),
  /// Episode previews of a character
  Episodes(u32),
}

impl CatalogKey {
  pub fn cache_key(&self) -> String {
    match self {
      Self::CharacterList => "characters".to_string(),
      Self::Character(id) => format!("character_{}", id),
      Self::Episodes(id) => format!("episodes_{}", id),
    }
  }

  pub fn description(&self) -> String {
    match self {
      Self::CharacterList => "character list".to_string(),
      Self::Character(id) => format!("character {}", id),
      Self::Episodes(id) => format!("episodes of character {}", id),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_keys_are_stable() {
    assert_eq!(CatalogKey::CharacterList.cache_key(), "characters");
    assert_eq!(CatalogKey::Character(42).cache_key(), "character_42");
    assert_eq!(CatalogKey::Episodes(42).cache_key(), "episodes_42");
  }
}
