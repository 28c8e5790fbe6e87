use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use crate::error::WorkflowError;
use crate::event::EventKind;

/// Declared shape of one registered step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepNode {
  pub name: String,
  pub accepts: Vec<EventKind>,
  pub emits: Vec<EventKind>,
}

impl StepNode {
  /// A step accepting more than one kind waits for a joined input set.
  pub fn is_join(&self) -> bool {
    self.accepts.len() > 1
  }
}

/// Static routing graph derived from step registrations.
#[derive(Debug, Clone)]
pub struct StepGraph {
  start: EventKind,
  stop: EventKind,
  /// Steps in registration order.
  nodes: Vec<StepNode>,
  /// Event kind -> indices of the steps accepting it, in registration order.
  consumers: HashMap<EventKind, Vec<usize>>,
}

impl StepGraph {
  pub fn new(start: EventKind, stop: EventKind, nodes: Vec<StepNode>) -> Self {
    let mut consumers: HashMap<EventKind, Vec<usize>> = HashMap::new();
    for (index, node) in nodes.iter().enumerate() {
      for kind in &node.accepts {
        let entry = consumers.entry(*kind).or_default();
        if !entry.contains(&index) {
          entry.push(index);
        }
      }
    }

    Self {
      start,
      stop,
      nodes,
      consumers,
    }
  }

  pub fn start_kind(&self) -> EventKind {
    self.start
  }

  pub fn stop_kind(&self) -> EventKind {
    self.stop
  }

  pub fn nodes(&self) -> &[StepNode] {
    &self.nodes
  }

  pub fn node(&self, name: &str) -> Option<&StepNode> {
    self.nodes.iter().find(|node| node.name == name)
  }

  /// Indices of the steps accepting `kind`.
  pub(crate) fn consumer_indices(&self, kind: EventKind) -> &[usize] {
    self
      .consumers
      .get(&kind)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Names of the steps accepting `kind`.
  pub fn consumers(&self, kind: EventKind) -> Vec<&str> {
    self
      .consumer_indices(kind)
      .iter()
      .map(|&index| self.nodes[index].name.as_str())
      .collect()
  }

  /// Names of the steps that may emit `kind`.
  pub fn producers(&self, kind: EventKind) -> Vec<&str> {
    self
      .nodes
      .iter()
      .filter(|node| node.emits.contains(&kind))
      .map(|node| node.name.as_str())
      .collect()
  }

  /// Check that every declared flow can be routed.
  pub fn validate(&self) -> Result<(), WorkflowError> {
    let mut names = HashSet::new();
    for node in &self.nodes {
      if node.name.is_empty() {
        return Err(WorkflowError::invalid_graph("step names must not be empty"));
      }
      if !names.insert(node.name.as_str()) {
        return Err(WorkflowError::invalid_graph(format!(
          "duplicate step name '{}'",
          node.name
        )));
      }
      if node.accepts.is_empty() {
        return Err(WorkflowError::invalid_graph(format!(
          "step '{}' accepts no events",
          node.name
        )));
      }
      if node.accepts.contains(&self.stop) {
        return Err(WorkflowError::invalid_graph(format!(
          "step '{}' accepts the stop event '{}'",
          node.name, self.stop
        )));
      }
    }

    if self.consumer_indices(self.start).is_empty() {
      return Err(WorkflowError::invalid_graph(format!(
        "no step accepts the start event '{}'",
        self.start
      )));
    }

    for node in &self.nodes {
      for kind in &node.emits {
        if *kind != self.stop && self.consumer_indices(*kind).is_empty() {
          return Err(WorkflowError::invalid_graph(format!(
            "step '{}' emits '{}' but no step accepts it",
            node.name, kind
          )));
        }
      }

      for kind in &node.accepts {
        if *kind != self.start && self.producers(*kind).is_empty() {
          return Err(WorkflowError::invalid_graph(format!(
            "step '{}' accepts '{}' but no step emits it",
            node.name, kind
          )));
        }
      }
    }

    if self.producers(self.stop).is_empty() {
      return Err(WorkflowError::invalid_graph(format!(
        "no step emits the stop event '{}'",
        self.stop
      )));
    }

    Ok(())
  }

  /// Render every possible flow as a Mermaid flowchart.
  pub fn to_mermaid(&self) -> String {
    let mut out = String::from("flowchart TD\n");
    let _ = writeln!(out, "  start([\"{}\"])", self.start);
    let _ = writeln!(out, "  stop([\"{}\"])", self.stop);

    for node in &self.nodes {
      let shape = if node.is_join() {
        format!("{{{{\"{}\"}}}}", node.name)
      } else {
        format!("[\"{}\"]", node.name)
      };
      let _ = writeln!(out, "  {}{}", mermaid_id(&node.name), shape);
    }

    for &index in self.consumer_indices(self.start) {
      let _ = writeln!(
        out,
        "  start -->|{}| {}",
        self.start,
        mermaid_id(&self.nodes[index].name)
      );
    }

    for node in &self.nodes {
      for kind in &node.emits {
        if *kind == self.stop {
          let _ = writeln!(out, "  {} -->|{}| stop", mermaid_id(&node.name), kind);
          continue;
        }
        for &index in self.consumer_indices(*kind) {
          let _ = writeln!(
            out,
            "  {} -->|{}| {}",
            mermaid_id(&node.name),
            kind,
            mermaid_id(&self.nodes[index].name)
          );
        }
      }
    }

    out
  }
}

fn mermaid_id(name: &str) -> String {
  let id: String = name
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
    .collect();
  format!("step_{}", id)
}

#[cfg(test)]
mod tests {
  use super::*;

  const START: EventKind = EventKind::new("start");
  const QUERY: EventKind = EventKind::new("query");
  const DATA: EventKind = EventKind::new("data");
  const STOP: EventKind = EventKind::new("stop");

  fn node(name: &str, accepts: &[EventKind], emits: &[EventKind]) -> StepNode {
    StepNode {
      name: name.to_string(),
      accepts: accepts.to_vec(),
      emits: emits.to_vec(),
    }
  }

  fn pipeline() -> Vec<StepNode> {
    vec![
      node("extract", &[START], &[QUERY, DATA]),
      node("answer", &[QUERY, DATA], &[STOP]),
    ]
  }

  #[test]
  fn test_valid_graph() {
    let graph = StepGraph::new(START, STOP, pipeline());

    assert!(graph.validate().is_ok());
    assert_eq!(graph.consumers(QUERY), vec!["answer"]);
    assert_eq!(graph.producers(DATA), vec!["extract"]);
    assert!(graph.node("answer").unwrap().is_join());
    assert!(!graph.node("extract").unwrap().is_join());
  }

  #[test]
  fn test_emitted_kind_without_consumer_is_rejected() {
    let graph = StepGraph::new(
      START,
      STOP,
      vec![
        node("extract", &[START], &[QUERY]),
        node("finish", &[START], &[STOP]),
      ],
    );

    let err = graph.validate().unwrap_err();
    assert!(err.to_string().contains("emits 'query'"));
  }

  #[test]
  fn test_missing_start_consumer_is_rejected() {
    let graph = StepGraph::new(START, STOP, vec![node("answer", &[QUERY], &[STOP, QUERY])]);

    let err = graph.validate().unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidGraph { .. }));
    assert!(err.to_string().contains("start event"));
  }

  #[test]
  fn test_duplicate_names_are_rejected() {
    let mut nodes = pipeline();
    nodes.push(node("answer", &[QUERY], &[STOP]));
    let graph = StepGraph::new(START, STOP, nodes);

    assert!(graph.validate().unwrap_err().to_string().contains("duplicate"));
  }

  #[test]
  fn test_step_without_accepts_is_rejected() {
    let mut nodes = pipeline();
    nodes.push(node("idle", &[], &[STOP]));
    let graph = StepGraph::new(START, STOP, nodes);

    assert!(graph.validate().unwrap_err().to_string().contains("accepts no events"));
  }

  #[test]
  fn test_unreachable_stop_is_rejected() {
    let graph = StepGraph::new(START, STOP, vec![node("extract", &[START], &[])]);

    assert!(graph.validate().unwrap_err().to_string().contains("stop event"));
  }

  #[test]
  fn test_mermaid_lists_every_edge() {
    let graph = StepGraph::new(START, STOP, pipeline());
    let chart = graph.to_mermaid();

    assert!(chart.starts_with("flowchart TD\n"));
    assert!(chart.contains("start -->|start| step_extract"));
    assert!(chart.contains("step_extract -->|query| step_answer"));
    assert!(chart.contains("step_extract -->|data| step_answer"));
    assert!(chart.contains("step_answer -->|stop| stop"));
    assert!(chart.contains("step_answer{{\"answer\"}}"));
  }
}
