//! Best-effort mirror of favorites and preferences to a cloud document store.
//!
//! Sync operations never raise to the caller: unavailability and failures are
//! reported as values ([`CloudAvailability`], [`SyncOutcome`]) and logged.
//! Only explicit account actions (sign in, sign up, password reset) return
//! errors.

mod auth;
mod documents;
mod firestore;
#[cfg(test)]
mod memory;
mod sync;

use thiserror::Error;

pub use auth::{Auth, AuthUser, IdentityToolkitAuth, SimulatedAuth};
pub use documents::{DocumentStore, Fields};
pub use firestore::FirestoreRest;
pub use sync::{device_id, CloudAvailability, CloudSync, Partition, SyncOutcome, SyncedData};

#[cfg(test)]
pub(crate) use memory::MemoryDocuments;

/// Errors produced talking to the cloud services.
#[derive(Error, Debug)]
pub enum CloudError {
  #[error("Request timeout")]
  Timeout,

  #[error("Network error: {0}")]
  Network(String),

  #[error("Cloud returned status {status}: {message}")]
  Http { status: u16, message: String },

  #[error("Unexpected cloud response: {0}")]
  Parse(String),

  /// The identity service rejected the request (wrong password, ...)
  #[error("Authentication failed: {0}")]
  Auth(String),
}

impl From<reqwest::Error> for CloudError {
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
