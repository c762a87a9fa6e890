//! Write-behind persistence handles.

use color_eyre::{eyre::eyre, Result};
use futures::FutureExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::KvStore;

/// Completion handle for a write-behind persist.
///
/// In-memory state is already updated when a `Flush` is returned. Dropping the
/// handle detaches the write; awaiting [`Flush::wait`] reports whether the
/// value reached storage. Failures are logged either way.
#[derive(Debug)]
pub struct Flush {
  handle: Option<JoinHandle<Result<()>>>,
}

impl Flush {
  /// A handle for a mutation that had nothing to persist.
  pub fn ready() -> Self {
    Self { handle: None }
  }

  /// Serialize `value` now and write it under `key` in the background.
  ///
  /// Outside a tokio runtime the write happens inline.
  pub fn persist_json<T: Serialize + ?Sized>(
    store: Arc<dyn KvStore>,
    key: impl Into<String>,
    value: &T,
  ) -> Self {
    let key = key.into();
    let encoded = serde_json::to_string(value)
      .map_err(|e| eyre!("Failed to serialize '{}': {}", key, e));

    let write = move || -> Result<()> {
      let result = encoded.and_then(|encoded| store.set(&key, &encoded));
      if let Err(e) = &result {
        tracing::warn!(%key, error = %e, "write-behind persist failed");
      }
      result
    };

    match tokio::runtime::Handle::try_current() {
      Ok(runtime) => Self {
        handle: Some(runtime.spawn_blocking(write)),
      },
      Err(_) => {
        let _ = write();
        Self::ready()
      }
    }
  }

  /// Wait for the write to finish.
  pub async fn wait(self) -> Result<()> {
    match self.handle {
      Some(handle) => handle
        .await
        .map_err(|e| eyre!("Persist task failed: {}", e))?,
      None => Ok(()),
    }
  }

  /// Whether the write has already finished (or there was none).
  pub fn is_finished(&self) -> bool {
    self.handle.as_ref().map_or(true, |h| h.is_finished())
  }

  /// Outcome of a finished write, or `None` while it is still running.
  pub fn try_result(&mut self) -> Option<Result<()>> {
    let handle = match self.handle.as_mut() {
      Some(handle) if handle.is_finished() => handle,
      Some(_) => return None,
      None => return Some(Ok(())),
    };

    let joined = tokio::task::unconstrained(handle).now_or_never()?;
    self.handle = None;
    Some(match joined {
      Ok(result) => result,
      Err(e) => Err(eyre!("Persist task failed: {}", e)),
    })
  }
}
