use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::beam::Beam;
use crate::dependency::{intern_dependency, tree_dependencies, DepCache};
use crate::error::{ParserError, Result};
use crate::pcfg::PcfgParserQuery;
use crate::tree::ScoredTree;
use crate::Model;

/// Rescores a PCFG parser's k-best list with the dependency grammar
/// instead of searching the joint model: each of the top
/// `num_to_find * k_mult + k_add` PCFG trees gets the dependency score of
/// its head-percolated dependency list added, and the best `num_to_find`
/// survive in a beam.
///
/// This approximates the joint search at a fraction of its cost; beyond
/// the top of the list the ranking is not exact, by design.
pub struct FastFactoredParser<'a> {
  model: &'a Model,
  pcfg: PcfgParserQuery<'a>,
  num_to_find: usize,
  k_mult: usize,
  k_add: usize,
  cancel: Arc<AtomicBool>,
  results: Vec<ScoredTree>,
}

impl<'a> FastFactoredParser<'a> {
  pub fn new(model: &'a Model, num_to_find: usize) -> Self {
    Self::with_factors(model, num_to_find, 2, 10)
  }

  /// `k_mult` and `k_add` control how deep into the PCFG list the
  /// rescoring looks.
  pub fn with_factors(model: &'a Model, num_to_find: usize, k_mult: usize, k_add: usize) -> Self {
    let want = num_to_find * k_mult + k_add;
    Self {
      model,
      pcfg: PcfgParserQuery::new(model, want),
      num_to_find,
      k_mult,
      k_add,
      cancel: Arc::new(AtomicBool::new(false)),
      results: Vec::new(),
    }
  }

  /// The cooperative cancellation flag. Callers enforcing a time budget
  /// keep a clone and set it from outside; the rescoring loop checks it
  /// once per candidate.
  pub fn cancel_flag(&self) -> Arc<AtomicBool> {
    self.cancel.clone()
  }

  /// Parses and rescores. `Ok(false)` when the PCFG found nothing (or
  /// nothing survived rescoring); `Err(Interrupted)` when the cancellation
  /// flag fired mid-rescoring.
  pub fn parse(&mut self, sentence: &[&str]) -> Result<bool> {
    self.results.clear();
    if !self.pcfg.parse(sentence) {
      return Ok(false);
    }

    let want = self.num_to_find * self.k_mult + self.k_add;
    let candidates = self.pcfg.k_best_parses(want);
    debug!(candidates = candidates.len(), want, "rescoring pcfg candidates");

    let mut beam = Beam::new(self.num_to_find);
    let mut cache = DepCache::new();
    for st in candidates {
      if self.cancel.load(Ordering::Relaxed) {
        return Err(ParserError::Interrupted);
      }
      let mut dep_score = 0.0;
      for raw in tree_dependencies(&st.tree, &self.model.head_finder, &self.model.pack)? {
        let dep = intern_dependency(&raw, &self.model.words, &self.model.tags);
        dep_score += cache.score(&self.model.deps, dep);
      }
      beam.push(ScoredTree::new(st.tree, st.score + dep_score));
    }

    self.results = beam.into_sorted_vec();
    Ok(!self.results.is_empty())
  }

  /// The best rescored parse; `None` when the last `parse` found nothing.
  pub fn best_parse(&self) -> Option<ScoredTree> {
    self.results.first().cloned()
  }

  /// The `k` best rescored parses. Asking for more than were retained is
  /// a caller error: this fails rather than padding or recomputing.
  pub fn k_good_parses(&self, k: usize) -> Result<Vec<ScoredTree>> {
    if k > self.results.len() {
      return Err(ParserError::Capacity { requested: k, retained: self.results.len() });
    }
    Ok(self.results[..k].to_vec())
  }

  /// The underlying PCFG k-best list, unrescored.
  pub fn k_best_parses(&self, k: usize) -> Vec<ScoredTree> {
    self.pcfg.k_best_parses(k)
  }

  pub fn num_retained(&self) -> usize {
    self.results.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tree::Tree;
  use crate::TrainOptions;

  fn ambiguous_model() -> Model {
    let srcs = [
      "(ROOT (A (A (X x) (X x)) (X x)))",
      "(ROOT (A (X x) (A (X x) (X x))))",
    ];
    let trees: Vec<Tree> = srcs.iter().map(|s| s.parse().unwrap()).collect();
    Model::train(&trees, TrainOptions::default()).unwrap()
  }

  #[test]
  fn test_rescoring_keeps_ordering_invariant() {
    let m = ambiguous_model();
    let mut p = FastFactoredParser::new(&m, 3);
    assert!(p.parse(&["x", "x", "x"]).unwrap());

    let best = p.best_parse().unwrap();
    assert_eq!(best.tree.yield_words(), vec!["x", "x", "x"]);

    let good = p.k_good_parses(p.num_retained()).unwrap();
    for w in good.windows(2) {
      assert!(w[0].score >= w[1].score);
    }
  }

  #[test]
  fn test_k_good_capacity_error() {
    let m = ambiguous_model();
    let mut p = FastFactoredParser::new(&m, 3);
    assert!(p.parse(&["x", "x", "x"]).unwrap());

    let retained = p.num_retained();
    assert!(retained <= 3);
    match p.k_good_parses(retained + 2) {
      Err(ParserError::Capacity { requested, retained: r }) => {
        assert_eq!(requested, retained + 2);
        assert_eq!(r, retained);
      }
      other => panic!("expected a capacity error, got {:?}", other.map(|v| v.len())),
    }
  }

  #[test]
  fn test_no_parse_is_ok_false() {
    let m = ambiguous_model();
    let mut p = FastFactoredParser::new(&m, 2);
    assert!(!p.parse(&[]).unwrap());
    assert!(p.best_parse().is_none());
    assert_eq!(p.k_good_parses(0).unwrap().len(), 0);
    assert!(p.k_good_parses(1).is_err());
  }

  #[test]
  fn test_cancellation_surfaces_as_interrupted() {
    let m = ambiguous_model();
    let mut p = FastFactoredParser::new(&m, 2);
    p.cancel_flag().store(true, Ordering::Relaxed);
    assert!(matches!(p.parse(&["x", "x", "x"]), Err(ParserError::Interrupted)));
  }
}
