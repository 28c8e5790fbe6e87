use std::path::Path;

use serde_json::Value;
use tracing::info;

use crate::capability::OrderLookup;
use crate::error::SupportError;

/// Order records loaded from a JSON array, matched on `order_number`.
#[derive(Debug, Clone, Default)]
pub struct JsonOrderBook {
  orders: Vec<Value>,
}

impl JsonOrderBook {
  pub fn new(orders: Vec<Value>) -> Self {
    Self { orders }
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, SupportError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| SupportError::io(path, e))?;
    let value: Value = serde_json::from_str(&raw).map_err(|e| SupportError::invalid(path, e))?;

    let Value::Array(orders) = value else {
      return Err(SupportError::invalid(path, "expected a JSON array of orders"));
    };

    info!(path = %path.display(), orders = orders.len(), "order_book_loaded");
    Ok(Self { orders })
  }

  pub fn len(&self) -> usize {
    self.orders.len()
  }

  pub fn is_empty(&self) -> bool {
    self.orders.is_empty()
  }
}

fn order_number_matches(record: &Value, order_id: i64) -> bool {
  match record.get("order_number") {
    Some(Value::Number(n)) => n.as_i64() == Some(order_id),
    Some(Value::String(s)) => s.trim().parse::<i64>().ok() == Some(order_id),
    _ => false,
  }
}

impl OrderLookup for JsonOrderBook {
  fn lookup(&self, order_id: i64) -> anyhow::Result<Option<Value>> {
    Ok(
      self
        .orders
        .iter()
        .find(|record| order_number_matches(record, order_id))
        .cloned(),
    )
  }
}
