//! Join buffer: collect one event of each required kind, fire once.
//!
//! A join step declares its required kinds with [`JoinBuffer::require`] and
//! offers every event routed to it. The offer that completes the set returns
//! the inputs in declaration order; every other offer, including any offer
//! after the join fired, returns `None`.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::WorkflowError;
use crate::event::{EventKind, WorkflowEvent};

struct JoinSlot<E> {
  required: Vec<EventKind>,
  received: HashMap<EventKind, E>,
  fired: bool,
}

/// Per-run join state, keyed by step name.
pub struct JoinBuffer<E> {
  slots: Mutex<HashMap<String, JoinSlot<E>>>,
}

impl<E: WorkflowEvent> JoinBuffer<E> {
  pub fn new() -> Self {
    Self {
      slots: Mutex::new(HashMap::new()),
    }
  }

  /// Declare the kinds `step` needs before it may fire.
  ///
  /// The first declaration for a step wins; later calls are ignored so
  /// concurrent invocations of the same join agree on one set.
  pub fn require(&self, step: &str, kinds: Vec<EventKind>) {
    let mut slots = self.slots.lock().unwrap();
    slots.entry(step.to_string()).or_insert_with(|| {
      let mut required = Vec::with_capacity(kinds.len());
      for kind in kinds {
        if !required.contains(&kind) {
          required.push(kind);
        }
      }
      JoinSlot {
        required,
        received: HashMap::new(),
        fired: false,
      }
    });
  }

  /// Whether `step` has declared its required kinds in this run.
  pub fn is_declared(&self, step: &str) -> bool {
    self.slots.lock().unwrap().contains_key(step)
  }

  /// Record `event` for `step`.
  ///
  /// Returns the complete input set, ordered as declared, exactly once.
  /// Duplicates, kinds outside the required set and late arrivals are dropped.
  pub fn offer(&self, step: &str, event: E) -> Result<Option<Vec<E>>, WorkflowError> {
    let mut slots = self.slots.lock().unwrap();
    let slot = slots.get_mut(step).ok_or_else(|| WorkflowError::JoinMisuse {
      step: step.to_string(),
      message: "event offered before the join was declared".to_string(),
    })?;

    let kind = event.kind();
    if slot.fired || !slot.required.contains(&kind) {
      return Ok(None);
    }
    slot.received.entry(kind).or_insert(event);

    if slot.received.len() < slot.required.len() {
      return Ok(None);
    }

    slot.fired = true;
    let inputs = slot
      .required
      .iter()
      .filter_map(|kind| slot.received.remove(kind))
      .collect();
    Ok(Some(inputs))
  }
}

impl<E: WorkflowEvent> Default for JoinBuffer<E> {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const PROMPT: EventKind = EventKind::new("prompt");
  const DATA: EventKind = EventKind::new("data");
  const OTHER: EventKind = EventKind::new("other");

  #[derive(Debug, Clone, PartialEq)]
  enum TestEvent {
    Prompt(&'static str),
    Data(&'static str),
    Other,
  }

  impl WorkflowEvent for TestEvent {
    fn kind(&self) -> EventKind {
      match self {
        TestEvent::Prompt(_) => PROMPT,
        TestEvent::Data(_) => DATA,
        TestEvent::Other => OTHER,
      }
    }
  }

  #[test]
  fn test_fires_in_declaration_order_regardless_of_arrival() {
    let buffer = JoinBuffer::new();
    buffer.require("answer", vec![PROMPT, DATA]);

    assert_eq!(buffer.offer("answer", TestEvent::Data("order")).unwrap(), None);
    let inputs = buffer
      .offer("answer", TestEvent::Prompt("template"))
      .unwrap()
      .expect("join should complete");

    assert_eq!(
      inputs,
      vec![TestEvent::Prompt("template"), TestEvent::Data("order")]
    );
  }

  #[test]
  fn test_singleton_join_fires_on_first_offer() {
    let buffer = JoinBuffer::new();
    buffer.require("answer", vec![PROMPT]);

    let inputs = buffer.offer("answer", TestEvent::Prompt("template")).unwrap();
    assert_eq!(inputs, Some(vec![TestEvent::Prompt("template")]));
    assert_eq!(buffer.offer("answer", TestEvent::Prompt("again")).unwrap(), None);
  }

  #[test]
  fn test_duplicates_after_firing_are_discarded() {
    let buffer = JoinBuffer::new();
    buffer.require("answer", vec![PROMPT, DATA]);

    buffer.offer("answer", TestEvent::Prompt("first")).unwrap();
    assert!(buffer.offer("answer", TestEvent::Data("order")).unwrap().is_some());

    assert_eq!(buffer.offer("answer", TestEvent::Prompt("again")).unwrap(), None);
    assert_eq!(buffer.offer("answer", TestEvent::Data("again")).unwrap(), None);
  }

  #[test]
  fn test_duplicate_before_completion_keeps_first() {
    let buffer = JoinBuffer::new();
    buffer.require("answer", vec![PROMPT, DATA]);

    buffer.offer("answer", TestEvent::Prompt("first")).unwrap();
    buffer.offer("answer", TestEvent::Prompt("second")).unwrap();
    let inputs = buffer.offer("answer", TestEvent::Data("order")).unwrap().unwrap();

    assert_eq!(inputs[0], TestEvent::Prompt("first"));
  }

  #[test]
  fn test_unrequired_kind_is_ignored() {
    let buffer = JoinBuffer::new();
    buffer.require("answer", vec![PROMPT]);

    assert_eq!(buffer.offer("answer", TestEvent::Other).unwrap(), None);
    let inputs = buffer.offer("answer", TestEvent::Prompt("template")).unwrap();
    assert_eq!(inputs, Some(vec![TestEvent::Prompt("template")]));
  }

  #[test]
  fn test_first_declaration_wins() {
    let buffer = JoinBuffer::new();
    buffer.require("answer", vec![PROMPT, DATA]);
    buffer.require("answer", vec![PROMPT]);

    assert_eq!(buffer.offer("answer", TestEvent::Prompt("template")).unwrap(), None);
  }

  #[test]
  fn test_offer_without_declaration_is_misuse() {
    let buffer: JoinBuffer<TestEvent> = JoinBuffer::new();
    let err = buffer.offer("answer", TestEvent::Other).unwrap_err();
    assert!(matches!(err, WorkflowError::JoinMisuse { .. }));
  }
}
