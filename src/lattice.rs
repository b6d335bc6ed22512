use std::collections::HashMap;

use crate::lang::BOUNDARY_WORD;

/// One weighted word hypothesis between two lattice nodes. `weight` is a
/// log-domain cost added to the word's lexical score wherever the edge is
/// used as a leaf.
#[derive(Debug, Clone)]
pub struct LatticeEdge {
  pub word: String,
  pub weight: f64,
  pub start: usize,
  pub end: usize,
  pub attributes: HashMap<String, String>,
}

impl LatticeEdge {
  pub fn new(word: impl Into<String>, weight: f64, start: usize, end: usize) -> Self {
    Self { word: word.into(), weight, start, end, attributes: HashMap::new() }
  }

  pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.attributes.insert(key.into(), value.into());
    self
  }
}

/// A word confusion network: a directed graph of word-spans over integer
/// node ids, consumed by the chart in place of a plain token sequence.
/// `add_boundary` must be called before parsing; the boundary edge marks
/// where the parseable span ends.
#[derive(Debug, Default, Clone)]
pub struct Lattice {
  edges: Vec<LatticeEdge>,
  max_node: usize,
  boundary: Option<usize>,
}

impl Lattice {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn add_edge(&mut self, edge: LatticeEdge) {
    debug_assert!(edge.start < edge.end, "lattice edges must move forward");
    self.max_node = self.max_node.max(edge.end);
    self.edges.push(edge);
  }

  /// Appends the synthetic boundary edge after the last node: a
  /// deterministic, cost-free transition.
  pub fn add_boundary(&mut self) {
    let start = self.max_node;
    self.edges.push(LatticeEdge::new(BOUNDARY_WORD, 0.0, start, start + 1));
    self.max_node = start + 1;
    self.boundary = Some(start);
  }

  /// The node the boundary edge leaves from, once appended.
  pub fn boundary_start(&self) -> Option<usize> {
    self.boundary
  }

  pub fn edges(&self) -> &[LatticeEdge] {
    &self.edges
  }

  pub fn edges_from(&self, node: usize) -> impl Iterator<Item = &LatticeEdge> {
    self.edges.iter().filter(move |e| e.start == node)
  }

  pub fn num_edges(&self) -> usize {
    self.edges.len()
  }

  pub fn num_nodes(&self) -> usize {
    if self.edges.is_empty() {
      0
    } else {
      self.max_node + 1
    }
  }
}

/// Builds the trivial lattice for a plain token sequence: one edge per
/// token at weight 0, plus the boundary.
pub fn lattice_of_tokens(tokens: &[&str]) -> Lattice {
  let mut lat = Lattice::new();
  for (i, tok) in tokens.iter().enumerate() {
    lat.add_edge(LatticeEdge::new(*tok, 0.0, i, i + 1));
  }
  lat.add_boundary();
  lat
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_add_boundary_appends_one_free_edge() {
    let mut lat = Lattice::new();
    lat.add_edge(LatticeEdge::new("the", -0.1, 0, 1));
    lat.add_edge(LatticeEdge::new("dog", -0.2, 1, 2));

    let before = lat.num_edges();
    lat.add_boundary();
    assert_eq!(lat.num_edges(), before + 1);

    let b = lat.edges().last().unwrap();
    assert_eq!(b.weight, 0.0);
    assert_eq!(b.word, BOUNDARY_WORD);
    assert_eq!(b.start, 2);
    assert_eq!(b.end, 3);
    assert_eq!(lat.boundary_start(), Some(2));
  }

  #[test]
  fn test_edges_from_and_attributes() {
    let mut lat = Lattice::new();
    lat.add_edge(LatticeEdge::new("a", -0.5, 0, 1).with_attribute("asr-rank", "1"));
    lat.add_edge(LatticeEdge::new("uh", -2.5, 0, 1));
    lat.add_edge(LatticeEdge::new("b", -0.5, 1, 2));

    assert_eq!(lat.edges_from(0).count(), 2);
    assert_eq!(lat.edges_from(1).count(), 1);
    assert_eq!(lat.edges()[0].attributes.get("asr-rank").map(String::as_str), Some("1"));
    assert_eq!(lat.num_nodes(), 3);
  }

  #[test]
  fn test_token_lattice_shape() {
    let lat = lattice_of_tokens(&["the", "dog"]);
    assert_eq!(lat.num_edges(), 3);
    assert_eq!(lat.boundary_start(), Some(2));
  }
}
