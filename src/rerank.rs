use tracing::debug;

use crate::error::Result;
use crate::factored::FastFactoredParser;
use crate::pcfg::PcfgParserQuery;
use crate::tree::{ScoredTree, Tree};

/// What the reranking wrapper needs from the parser it wraps.
pub trait KBestQuery {
  fn parse(&mut self, sentence: &[&str]) -> Result<bool>;
  /// At most `k` parses, best first.
  fn k_best_parses(&self, k: usize) -> Vec<ScoredTree>;
}

impl<'a> KBestQuery for PcfgParserQuery<'a> {
  fn parse(&mut self, sentence: &[&str]) -> Result<bool> {
    Ok(PcfgParserQuery::parse(self, sentence))
  }

  fn k_best_parses(&self, k: usize) -> Vec<ScoredTree> {
    PcfgParserQuery::k_best_parses(self, k)
  }
}

impl<'a> KBestQuery for FastFactoredParser<'a> {
  fn parse(&mut self, sentence: &[&str]) -> Result<bool> {
    FastFactoredParser::parse(self, sentence)
  }

  fn k_best_parses(&self, k: usize) -> Vec<ScoredTree> {
    // the rescored list, without the capacity contract
    let k = k.min(self.num_retained());
    self.k_good_parses(k).expect("k clamped to what was retained")
  }
}

/// An external model that rescores candidate trees. `process` is called
/// once per sentence and the returned query once per candidate; distinct
/// sentences may be processed concurrently.
pub trait Reranker {
  fn process(&self, sentence: &[String]) -> Box<dyn RerankerQuery>;
}

pub trait RerankerQuery {
  /// `None` is the designated "no such parse" condition: the wrapper
  /// forces that candidate's combined score to negative infinity instead
  /// of dropping it.
  fn score(&self, tree: &Tree) -> Option<f64>;
}

/// Wraps an inner k-best parser and re-orders its candidates by
/// `base_parser_weight * original + reranker score`.
pub struct RerankingParserQuery<'a, Q: KBestQuery> {
  inner: Q,
  reranker: &'a dyn Reranker,
  base_parser_weight: f64,
  k: usize,
  rescored: Vec<ScoredTree>,
}

impl<'a, Q: KBestQuery> RerankingParserQuery<'a, Q> {
  pub fn new(inner: Q, reranker: &'a dyn Reranker, k: usize) -> Self {
    Self { inner, reranker, base_parser_weight: 0.5, k, rescored: Vec::new() }
  }

  pub fn with_base_weight(mut self, weight: f64) -> Self {
    self.base_parser_weight = weight;
    self
  }

  /// Parses through the inner query and re-orders its k-best list. An
  /// empty inner list propagates as a parse failure, never a panic.
  pub fn parse(&mut self, sentence: &[&str]) -> Result<bool> {
    self.rescored.clear();
    if !self.inner.parse(sentence)? {
      return Ok(false);
    }
    let kbest = self.inner.k_best_parses(self.k);
    if kbest.is_empty() {
      return Ok(false);
    }

    let words: Vec<String> = sentence.iter().map(|s| s.to_string()).collect();
    let query = self.reranker.process(&words);

    let mut rescored: Vec<ScoredTree> = kbest
      .into_iter()
      .map(|st| {
        let combined = match query.score(&st.tree) {
          Some(r) => self.base_parser_weight * st.score + r,
          None => f64::NEG_INFINITY,
        };
        ScoredTree::new(st.tree, combined)
      })
      .collect();
    rescored.sort_by(|a, b| b.cmp(a));

    debug!(candidates = rescored.len(), "reranked k-best list");
    self.rescored = rescored;
    Ok(true)
  }

  pub fn best_parse(&self) -> Option<ScoredTree> {
    self.rescored.first().cloned()
  }

  pub fn k_best_parses(&self, k: usize) -> Vec<ScoredTree> {
    self.rescored.iter().take(k).cloned().collect()
  }
}
