use std::cmp::Ordering;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::beam::Beam;
use crate::grammar::ClosedUnaryRule;
use crate::lattice::Lattice;
use crate::rules::State;
use crate::tree::{ScoredTree, Tree};
use crate::Model;

/// One derivation of a (span, state) cell entry. Children are shared
/// directly, so beam truncation elsewhere can never invalidate a
/// back-pointer.
#[derive(Debug)]
struct Deriv {
  state: State,
  score: f64,
  back: Back,
}

#[derive(Debug)]
enum Back {
  Leaf { word: String },
  Unary { rule: Rc<ClosedUnaryRule>, child: Rc<Deriv> },
  Binary { left: Rc<Deriv>, right: Rc<Deriv> },
}

#[derive(Debug, Clone)]
struct ByScore(Rc<Deriv>);

impl PartialEq for ByScore {
  fn eq(&self, other: &Self) -> bool {
    self.0.score.total_cmp(&other.0.score) == Ordering::Equal
  }
}

impl Eq for ByScore {}

impl Ord for ByScore {
  fn cmp(&self, other: &Self) -> Ordering {
    self.0.score.total_cmp(&other.0.score)
  }
}

impl PartialOrd for ByScore {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

/// Per-sentence exhaustive CKY parse over the binary grammar and the
/// closed unary grammar. Every (span, state) cell keeps a bounded beam of
/// derivations, so the k best parses fall out of the root cell directly.
pub struct PcfgParserQuery<'a> {
  model: &'a Model,
  beam_size: usize,
  cells: FxHashMap<(usize, usize, State), Vec<Rc<Deriv>>>,
  cell_states: FxHashMap<(usize, usize), Vec<State>>,
  n: usize,
  roots: Vec<Rc<Deriv>>,
}

impl<'a> PcfgParserQuery<'a> {
  /// `beam_size` bounds how many derivations each cell retains, and so
  /// how many parses `k_best_parses` can return.
  pub fn new(model: &'a Model, beam_size: usize) -> Self {
    Self {
      model,
      beam_size: beam_size.max(1),
      cells: FxHashMap::default(),
      cell_states: FxHashMap::default(),
      n: 0,
      roots: Vec::new(),
    }
  }

  fn reset(&mut self, n: usize) {
    self.cells.clear();
    self.cell_states.clear();
    self.roots.clear();
    self.n = n;
  }

  /// Parses a plain token sequence. Returns whether any parse rooted at
  /// the goal state covers the whole input.
  pub fn parse(&mut self, sentence: &[&str]) -> bool {
    self.reset(sentence.len());
    if sentence.is_empty() {
      return false;
    }

    for (i, word) in sentence.iter().enumerate() {
      let wid = self.word_id(word);
      self.add_leaves(i, i + 1, wid, word, 0.0);
    }
    self.fill();
    self.finish_roots()
  }

  /// Parses a word lattice through the same chart machinery: every lattice
  /// edge becomes a leaf over its node span, with the edge weight added to
  /// the lexical score. The appended boundary edge marks where the
  /// parseable span ends.
  pub fn parse_lattice(&mut self, lattice: &Lattice) -> bool {
    let n = match lattice.boundary_start() {
      Some(b) => b,
      None => lattice.num_nodes().saturating_sub(1),
    };
    self.reset(n);
    if n == 0 {
      return false;
    }

    for e in lattice.edges() {
      if e.end > n {
        continue; // the boundary edge is not a token
      }
      let wid = self.word_id(&e.word);
      self.add_leaves(e.start, e.end, wid, &e.word, e.weight);
    }
    self.fill();
    self.finish_roots()
  }

  pub fn best_parse(&self) -> Option<ScoredTree> {
    self.roots.first().map(|d| ScoredTree::new(self.recover(d), d.score))
  }

  /// At most `k` parses, scores non-increasing. Returns fewer when fewer
  /// were retained; capacity errors are the approximate drivers' concern.
  pub fn k_best_parses(&self, k: usize) -> Vec<ScoredTree> {
    self
      .roots
      .iter()
      .take(k)
      .map(|d| ScoredTree::new(self.recover(d), d.score))
      .collect()
  }

  pub fn num_parses_found(&self) -> usize {
    self.roots.len()
  }

  fn word_id(&self, word: &str) -> i32 {
    self.model.words.index_of(word).map(|x| x as i32).unwrap_or(-1)
  }

  fn tag_candidates(&self, wid: i32) -> Vec<usize> {
    match self.model.lexicon.tags_for(wid) {
      Some(ts) => ts.to_vec(),
      None => (0..self.model.tags.len())
        .filter(|&t| t != self.model.boundary_tag)
        .collect(),
    }
  }

  fn add_leaves(&mut self, start: usize, end: usize, wid: i32, word: &str, weight: f64) {
    for t in self.tag_candidates(wid) {
      let s = self.model.lexicon.score(wid, t, start, word);
      if s.is_finite() {
        let state = self.model.tag_state[t];
        let d = Rc::new(Deriv {
          state,
          score: s + weight,
          back: Back::Leaf { word: word.to_string() },
        });
        self.merge_into_cell(start, end, state, vec![d]);
      }
    }
  }

  fn fill(&mut self) {
    for width in 1..=self.n {
      for i in 0..=(self.n - width) {
        let j = i + width;
        if width >= 2 {
          self.binary_fill(i, j);
        }
        self.close_cell(i, j);
      }
    }
  }

  fn binary_fill(&mut self, i: usize, j: usize) {
    let mut cands: FxHashMap<State, Vec<Rc<Deriv>>> = FxHashMap::default();

    for m in (i + 1)..j {
      let left_states = match self.cell_states.get(&(i, m)) {
        Some(s) => s,
        None => continue,
      };
      for &ls in left_states {
        for rule in self.model.grammar.binary.rules_by_left(ls) {
          let rights = match self.cells.get(&(m, j, rule.right)) {
            Some(r) => r,
            None => continue,
          };
          let lefts = &self.cells[&(i, m, ls)];
          for ld in lefts {
            for rd in rights {
              let score = ld.score + rd.score + rule.score;
              cands.entry(rule.parent).or_default().push(Rc::new(Deriv {
                state: rule.parent,
                score,
                back: Back::Binary { left: ld.clone(), right: rd.clone() },
              }));
            }
          }
        }
      }
    }

    for (state, v) in cands {
      self.merge_into_cell(i, j, state, v);
    }
  }

  /// One round of closed unary rules over the cell's current contents.
  /// The closure already collapses chains, so a single round reaches
  /// everything a chain could.
  fn close_cell(&mut self, i: usize, j: usize) {
    let states_now = match self.cell_states.get(&(i, j)) {
      Some(s) => s.clone(),
      None => return,
    };

    let mut cands: FxHashMap<State, Vec<Rc<Deriv>>> = FxHashMap::default();
    for child in states_now {
      let crules = self.model.grammar.unary.closed_rules_by_child(child);
      if crules.is_empty() {
        continue;
      }
      let base = self.cells[&(i, j, child)].clone();
      for crule in crules {
        for d in &base {
          cands.entry(crule.parent).or_default().push(Rc::new(Deriv {
            state: crule.parent,
            score: d.score + crule.score,
            back: Back::Unary { rule: crule.clone(), child: d.clone() },
          }));
        }
      }
    }

    for (state, v) in cands {
      self.merge_into_cell(i, j, state, v);
    }
  }

  fn merge_into_cell(&mut self, i: usize, j: usize, state: State, new: Vec<Rc<Deriv>>) {
    let key = (i, j, state);
    let old = self.cells.remove(&key);
    let had = old.is_some();

    let mut beam = Beam::new(self.beam_size);
    if let Some(old) = old {
      for d in old {
        beam.push(ByScore(d));
      }
    }
    for d in new {
      beam.push(ByScore(d));
    }

    let v: Vec<Rc<Deriv>> = beam.into_sorted_vec().into_iter().map(|b| b.0).collect();
    if v.is_empty() {
      return;
    }
    self.cells.insert(key, v);
    if !had {
      self.cell_states.entry((i, j)).or_default().push(state);
    }
  }

  fn finish_roots(&mut self) -> bool {
    self.roots = self
      .cells
      .get(&(0, self.n, self.model.grammar.root))
      .cloned()
      .unwrap_or_default();
    debug!(
      n = self.n,
      cells = self.cells.len(),
      parses = self.roots.len(),
      "pcfg chart filled"
    );
    !self.roots.is_empty()
  }

  fn recover(&self, d: &Deriv) -> Tree {
    let label =
      |s: State| self.model.states.get(s).expect("state missing from index").to_string();
    match &d.back {
      Back::Leaf { word } => Tree::branch(label(d.state), vec![Tree::leaf(word.clone())]),
      Back::Unary { rule, child } => {
        let mut tree = self.recover(child);
        for &s in rule.path.iter().rev() {
          tree = Tree::branch(label(s), vec![tree]);
        }
        Tree::branch(label(d.state), vec![tree])
      }
      Back::Binary { left, right } => {
        Tree::branch(label(d.state), vec![self.recover(left), self.recover(right)])
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lattice::LatticeEdge;
  use crate::TrainOptions;

  fn model(srcs: &[&str]) -> Model {
    let trees: Vec<crate::tree::Tree> = srcs.iter().map(|s| s.parse().unwrap()).collect();
    Model::train(&trees, TrainOptions::default()).unwrap()
  }

  #[test]
  fn test_parse_recovers_training_tree() {
    let m = model(&["(ROOT (S (NP (DT The) (NN dog)) (VP (VBD barked))))"]);
    let mut q = PcfgParserQuery::new(&m, 4);
    assert!(q.parse(&["The", "dog", "barked"]));

    let best = q.best_parse().unwrap();
    assert_eq!(best.tree.label(), Some("ROOT"));
    assert_eq!(best.tree.yield_words(), vec!["The", "dog", "barked"]);
    assert!(best.score.is_finite());
  }

  #[test]
  fn test_unary_chain_is_reconstructed() {
    let m = model(&["(ROOT (S (VP (VB go))))"]);
    let mut q = PcfgParserQuery::new(&m, 2);
    assert!(q.parse(&["go"]));

    let best = q.best_parse().unwrap();
    // the full ROOT -> S -> VP -> VB chain must come back
    assert_eq!(format!("{}", best.tree), "(ROOT (S (VP (VB go))))");
  }

  #[test]
  fn test_no_parse_is_reported_not_thrown() {
    let m = model(&["(ROOT (S (NP (DT The) (NN dog)) (VP (VBD barked))))"]);
    let mut q = PcfgParserQuery::new(&m, 4);
    assert!(!q.parse(&[]));
    assert!(q.best_parse().is_none());
    assert!(q.k_best_parses(3).is_empty());
  }

  #[test]
  fn test_k_best_scores_non_increasing() {
    // an ambiguous grammar: two binarizations of three Xs
    let m = model(&[
      "(ROOT (A (A (X x) (X x)) (X x)))",
      "(ROOT (A (X x) (A (X x) (X x))))",
    ]);
    let mut q = PcfgParserQuery::new(&m, 8);
    assert!(q.parse(&["x", "x", "x"]));

    let parses = q.k_best_parses(8);
    assert!(parses.len() >= 2, "both bracketings should be found");
    for w in parses.windows(2) {
      assert!(w[0].score >= w[1].score);
    }
    assert_eq!(q.k_best_parses(1).len(), 1);
  }

  #[test]
  fn test_lattice_parse_uses_edge_weights() {
    let m = model(&[
      "(ROOT (S (NP (DT the) (NN dog)) (VP (VBD barked))))",
      "(ROOT (S (NP (DT the) (NN fog)) (VP (VBD barked))))",
    ]);

    let mut lat = Lattice::new();
    lat.add_edge(LatticeEdge::new("the", 0.0, 0, 1));
    // two competing hypotheses for the middle word; "dog" is much cheaper
    lat.add_edge(LatticeEdge::new("dog", -0.1, 1, 2));
    lat.add_edge(LatticeEdge::new("fog", -8.0, 1, 2));
    lat.add_edge(LatticeEdge::new("barked", 0.0, 2, 3));
    lat.add_boundary();

    let mut q = PcfgParserQuery::new(&m, 4);
    assert!(q.parse_lattice(&lat));
    let best = q.best_parse().unwrap();
    assert_eq!(best.tree.yield_words(), vec!["the", "dog", "barked"]);
  }
}
