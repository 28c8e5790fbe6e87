//! Run-scoped key/value store shared by the steps of one run.
//!
//! Values are `serde_json::Value`s so any serializable type can be stored.
//! A read either waits for the key to be written (`get`) or falls back to a
//! default (`get_or`). Concurrent writers to the same key are not serialized
//! beyond the map lock: the last write wins.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::WorkflowError;

pub struct ContextStore {
  values: Mutex<HashMap<String, serde_json::Value>>,
  changed: Notify,
  closed: CancellationToken,
}

impl ContextStore {
  /// Create a store that stops blocking reads once `closed` is cancelled.
  pub fn new(closed: CancellationToken) -> Self {
    Self {
      values: Mutex::new(HashMap::new()),
      changed: Notify::new(),
      closed,
    }
  }

  /// Write a value and wake every pending `get`.
  pub fn set(&self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
    self.values.lock().unwrap().insert(key.into(), value.into());
    self.changed.notify_waiters();
  }

  /// Serialize and write a value.
  pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), WorkflowError> {
    let value = serde_json::to_value(value).map_err(|e| WorkflowError::ContextValue {
      key: key.to_string(),
      message: e.to_string(),
    })?;
    self.set(key, value);
    Ok(())
  }

  /// Wait until `key` is set, then return its value.
  ///
  /// Only the calling task is suspended. Fails with `ContextClosed` if the run
  /// ends first.
  pub async fn get(&self, key: &str) -> Result<serde_json::Value, WorkflowError> {
    loop {
      let changed = self.changed.notified();
      tokio::pin!(changed);
      // Register before checking so a write between the check and the await
      // is not missed.
      changed.as_mut().enable();

      if let Some(value) = self.peek(key) {
        return Ok(value);
      }

      tokio::select! {
        _ = &mut changed => {}
        _ = self.closed.cancelled() => {
          return Err(WorkflowError::ContextClosed {
            key: key.to_string(),
          });
        }
      }
    }
  }

  /// Return the value of `key`, or `default` if it is absent. Never blocks.
  pub fn get_or(&self, key: &str, default: serde_json::Value) -> serde_json::Value {
    self.peek(key).unwrap_or(default)
  }

  /// Wait for `key` and deserialize it.
  pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, WorkflowError> {
    let value = self.get(key).await?;
    decode(key, value)
  }

  /// Deserialize `key` if present, otherwise return `default`. Never blocks.
  pub fn get_as_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, WorkflowError> {
    match self.peek(key) {
      Some(value) => decode(key, value),
      None => Ok(default),
    }
  }

  fn peek(&self, key: &str) -> Option<serde_json::Value> {
    self.values.lock().unwrap().get(key).cloned()
  }
}

fn decode<T: DeserializeOwned>(key: &str, value: serde_json::Value) -> Result<T, WorkflowError> {
  serde_json::from_value(value).map_err(|e| WorkflowError::ContextValue {
    key: key.to_string(),
    message: e.to_string(),
  })
}
