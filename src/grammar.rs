use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{ParserError, Result};
use crate::index::Index;
use crate::rules::{BinaryRule, State, UnaryRule};
use crate::tree::Tree;

const NO_RULES_UNARY: &[Rc<UnaryRule>] = &[];
const NO_RULES_CLOSED: &[Rc<ClosedUnaryRule>] = &[];
const NO_RULES_BINARY: &[Rc<BinaryRule>] = &[];

/// A unary chain collapsed to a single rule: `parent -> ... -> child` with
/// the best chain score and the intermediate states (parent side first)
/// needed to reconstruct the chain in an output tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedUnaryRule {
  pub parent: State,
  pub child: State,
  pub score: f64,
  pub path: Vec<State>,
}

/// Unary rules indexed by parent and by child, plus the best-score
/// transitive closure used for chain application in one step.
#[derive(Debug, Default)]
pub struct UnaryGrammar {
  rules: Vec<Rc<UnaryRule>>,
  by_parent: FxHashMap<State, Vec<Rc<UnaryRule>>>,
  by_child: FxHashMap<State, Vec<Rc<UnaryRule>>>,
  closed_by_child: FxHashMap<State, Vec<Rc<ClosedUnaryRule>>>,
}

impl UnaryGrammar {
  pub fn new(rules: Vec<UnaryRule>) -> Self {
    let mut uniq: FxHashMap<(State, State), UnaryRule> = FxHashMap::default();
    for r in rules {
      // identical productions keep the better score
      let e = uniq.entry((r.parent, r.child)).or_insert_with(|| r.clone());
      if !(e.score >= r.score) {
        *e = r;
      }
    }

    let mut g = Self::default();
    for (_, r) in uniq {
      let r = Rc::new(r);
      g.by_parent.entry(r.parent).or_default().push(r.clone());
      g.by_child.entry(r.child).or_default().push(r.clone());
      g.rules.push(r);
    }
    g.close();
    g
  }

  /// Best-score closure over unary chains. Bounded relaxation: the best
  /// chain is a simple path, so at most one pass per distinct state can
  /// still improve something.
  fn close(&mut self) {
    let mut best: FxHashMap<(State, State), (f64, Vec<State>)> = FxHashMap::default();
    for r in &self.rules {
      let e = best.entry((r.parent, r.child)).or_insert((f64::NEG_INFINITY, Vec::new()));
      if r.score > e.0 {
        *e = (r.score, Vec::new());
      }
    }

    let mut passes = self.rules.len() + 1;
    let mut changed = true;
    while changed && passes > 0 {
      changed = false;
      passes -= 1;
      let snapshot: Vec<((State, State), (f64, Vec<State>))> =
        best.iter().map(|(k, v)| (*k, v.clone())).collect();
      for ((a, b), (s1, path1)) in &snapshot {
        for r in self.rules_by_parent(*b) {
          if r.child == *a {
            continue; // a cycle never improves a log-prob chain
          }
          let cand = s1 + r.score;
          let e = best
            .entry((*a, r.child))
            .or_insert((f64::NEG_INFINITY, Vec::new()));
          if cand > e.0 {
            let mut path = path1.clone();
            path.push(*b);
            *e = (cand, path);
            changed = true;
          }
        }
      }
    }

    for ((parent, child), (score, path)) in best {
      let rule = Rc::new(ClosedUnaryRule { parent, child, score, path });
      self.closed_by_child.entry(child).or_default().push(rule);
    }
  }

  pub fn rules_by_parent(&self, s: State) -> &[Rc<UnaryRule>] {
    self.by_parent.get(&s).map(Vec::as_slice).unwrap_or(NO_RULES_UNARY)
  }

  pub fn rules_by_child(&self, s: State) -> &[Rc<UnaryRule>] {
    self.by_child.get(&s).map(Vec::as_slice).unwrap_or(NO_RULES_UNARY)
  }

  pub fn closed_rules_by_child(&self, s: State) -> &[Rc<ClosedUnaryRule>] {
    self
      .closed_by_child
      .get(&s)
      .map(Vec::as_slice)
      .unwrap_or(NO_RULES_CLOSED)
  }

  pub fn len(&self) -> usize {
    self.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }
}

/// Binary rules indexed by each position a chart expansion looks them up
/// from.
#[derive(Debug, Default)]
pub struct BinaryGrammar {
  rules: Vec<Rc<BinaryRule>>,
  by_left: FxHashMap<State, Vec<Rc<BinaryRule>>>,
  by_right: FxHashMap<State, Vec<Rc<BinaryRule>>>,
  by_parent: FxHashMap<State, Vec<Rc<BinaryRule>>>,
}

impl BinaryGrammar {
  pub fn new(rules: Vec<BinaryRule>) -> Self {
    let mut uniq: FxHashMap<(State, State, State), BinaryRule> = FxHashMap::default();
    for r in rules {
      let e = uniq.entry((r.parent, r.left, r.right)).or_insert_with(|| r.clone());
      if !(e.score >= r.score) {
        *e = r;
      }
    }

    let mut g = Self::default();
    for (_, r) in uniq {
      let r = Rc::new(r);
      g.by_left.entry(r.left).or_default().push(r.clone());
      g.by_right.entry(r.right).or_default().push(r.clone());
      g.by_parent.entry(r.parent).or_default().push(r.clone());
      g.rules.push(r);
    }
    g
  }

  pub fn rules_by_left(&self, s: State) -> &[Rc<BinaryRule>] {
    self.by_left.get(&s).map(Vec::as_slice).unwrap_or(NO_RULES_BINARY)
  }

  pub fn rules_by_right(&self, s: State) -> &[Rc<BinaryRule>] {
    self.by_right.get(&s).map(Vec::as_slice).unwrap_or(NO_RULES_BINARY)
  }

  pub fn rules_by_parent(&self, s: State) -> &[Rc<BinaryRule>] {
    self.by_parent.get(&s).map(Vec::as_slice).unwrap_or(NO_RULES_BINARY)
  }

  pub fn len(&self) -> usize {
    self.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }
}

/// The frozen grammar a parser reads: rule containers plus the goal state.
#[derive(Debug)]
pub struct Grammar {
  pub unary: UnaryGrammar,
  pub binary: BinaryGrammar,
  pub root: State,
}

/// Accumulates weighted rule counts from binarized trees, then normalizes
/// per parent into log-probability rules. Only the shapes a runtime grammar
/// needs; no compaction or annotation happens here.
#[derive(Debug, Default)]
pub struct GrammarExtractor {
  unary_counts: FxHashMap<(State, State), f64>,
  binary_counts: FxHashMap<(State, State, State), f64>,
  root_counts: FxHashMap<State, f64>,
  root_order: Vec<State>,
}

impl GrammarExtractor {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn train(&mut self, tree: &Tree, weight: f64, states: &mut Index) -> Result<()> {
    let label = tree
      .label()
      .ok_or_else(|| ParserError::MalformedTree("tree root is a bare token".to_string()))?;
    let root = states.add(label);
    if !self.root_counts.contains_key(&root) {
      self.root_order.push(root);
    }
    *self.root_counts.entry(root).or_insert(0.0) += weight;

    self.walk(tree, weight, states)
  }

  fn walk(&mut self, tree: &Tree, weight: f64, states: &mut Index) -> Result<()> {
    if tree.is_leaf() || tree.is_preterminal() {
      // preterminal expansions are the lexicon's statistics
      return Ok(());
    }
    let label = tree.label().unwrap();
    let parent = states.add(label);

    let mut kids = Vec::with_capacity(tree.children().len());
    for child in tree.children() {
      let cl = child.label().ok_or_else(|| {
        ParserError::MalformedTree(format!("bare token directly under {}", label))
      })?;
      kids.push(states.add(cl));
      self.walk(child, weight, states)?;
    }

    match kids.as_slice() {
      [c] => *self.unary_counts.entry((parent, *c)).or_insert(0.0) += weight,
      [l, r] => {
        *self.binary_counts.entry((parent, *l, *r)).or_insert(0.0) += weight;
      }
      _ => {
        return Err(ParserError::MalformedTree(format!(
          "{} has {} children; the extractor consumes binarized trees",
          label,
          kids.len()
        )));
      }
    }
    Ok(())
  }

  /// Normalizes the accumulated counts and freezes them into rule
  /// containers. The goal state is the most frequent training root, ties
  /// broken by first occurrence.
  pub fn extract(self) -> Result<Grammar> {
    let mut parent_totals: FxHashMap<State, f64> = FxHashMap::default();
    for ((p, _), n) in &self.unary_counts {
      *parent_totals.entry(*p).or_insert(0.0) += n;
    }
    for ((p, _, _), n) in &self.binary_counts {
      *parent_totals.entry(*p).or_insert(0.0) += n;
    }

    let unaries = self
      .unary_counts
      .iter()
      .map(|(&(p, c), &n)| UnaryRule::new(p, c, (n / parent_totals[&p]).ln()))
      .collect();
    let binaries = self
      .binary_counts
      .iter()
      .map(|(&(p, l, r), &n)| BinaryRule::new(p, l, r, (n / parent_totals[&p]).ln()))
      .collect();

    let mut root = None;
    let mut best = f64::NEG_INFINITY;
    for &r in &self.root_order {
      let n = self.root_counts[&r];
      if n > best {
        best = n;
        root = Some(r);
      }
    }
    let root = root.ok_or(ParserError::Unsupported("extracting an untrained grammar"))?;

    let unary = UnaryGrammar::new(unaries);
    let binary = BinaryGrammar::new(binaries);
    debug!(
      unary = unary.len(),
      binary = binary.len(),
      root,
      "extracted grammar"
    );
    Ok(Grammar { unary, binary, root })
  }
}
