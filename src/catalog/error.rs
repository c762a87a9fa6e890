use thiserror::Error;

/// Errors produced by the remote catalog client.
#[derive(Error, Debug)]
pub enum CatalogError {
  /// The request did not complete within the client timeout.
  #[error("Request timeout")]
  Timeout,

  /// Connectivity failure before a response arrived.
  #[error("Network error: {0}")]
  Network(String),

  /// The requested resource does not exist.
  #[error("Not found: {0}")]
  NotFound(String),

  /// Any other non-2xx response.
  #[error("HTTP error! status: {status}")]
  Http { status: u16 },

  /// The response body was not the expected JSON.
  #[error("Invalid JSON response: {0}")]
  Parse(String),

  /// The request URL could not be built.
  #[error("Invalid request URL: {0}")]
  Url(#[from] url::ParseError),
}

impl CatalogError {
  /// Timeout or connectivity loss, as opposed to an answer from the server.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::Timeout | Self::Network(_))
  }

  /// HTTP status carried by the error, if the server answered.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::NotFound(_) => Some(404),
      Self::Http { status } => Some(*status),
      _ => None,
    }
  }
}

impl From<reqwest::Error> for CatalogError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_timeout() {
      Self::Timeout
    } else if e.is_decode() {
      Self::Parse(e.to_string())
    } else {
      Self::Network(e.to_string())
    }
  }
}

/// Errors from offline-aware catalog loads.
#[derive(Error, Debug)]
pub enum LoadError {
  /// Offline and nothing usable in the cache.
  #[error("{0} unavailable offline")]
  UnavailableOffline(String),

  /// The remote fetch failed and nothing usable was cached.
  #[error(transparent)]
  Remote(#[from] CatalogError),
}
