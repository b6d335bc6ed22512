use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{ParserError, Result};
use crate::index::Index;
use crate::rules::IntTaggedWord;
use crate::tree::Tree;
use crate::unknown::{UnknownModelKind, UnknownWordModel};

#[derive(Debug, Clone)]
pub struct LexiconOptions {
  /// Smoothing weight blending the empirical tag distribution of a word
  /// toward the overall tag distribution.
  pub smooth: f64,
  /// Words at or below this count (at observation time) also feed the
  /// unknown-word model.
  pub unknown_threshold: f64,
  pub unknown: UnknownModelKind,
  pub good_turing: bool,
}

impl Default for LexiconOptions {
  fn default() -> Self {
    Self {
      smooth: 1.0,
      unknown_threshold: 1.0,
      unknown: UnknownModelKind::English,
      good_turing: false,
    }
  }
}

/// Maps (word, tag, position) to log P(word | tag). Known words use
/// smoothed empirical counts; everything else is delegated to the
/// unknown-word model trained alongside.
#[derive(Debug)]
pub struct Lexicon {
  opts: LexiconOptions,
  word_tag_count: FxHashMap<(usize, usize), f64>,
  word_count: FxHashMap<usize, f64>,
  tag_count: FxHashMap<usize, f64>,
  total: f64,
  tags_for_word: FxHashMap<usize, Vec<usize>>,
  uwm: UnknownWordModel,
  finished: bool,
}

impl Lexicon {
  pub fn new(opts: LexiconOptions, boundary_tag: usize) -> Self {
    let uwm = UnknownWordModel::new(opts.unknown, opts.good_turing, boundary_tag);
    Self {
      opts,
      word_tag_count: FxHashMap::default(),
      word_count: FxHashMap::default(),
      tag_count: FxHashMap::default(),
      total: 0.0,
      tags_for_word: FxHashMap::default(),
      uwm,
      finished: false,
    }
  }

  /// Accumulates weighted (word, tag) counts from the tree's tagged yield.
  /// Rare tokens are forwarded to the unknown-word model as they are seen.
  pub fn train(
    &mut self,
    tree: &Tree,
    weight: f64,
    words: &mut Index,
    tags: &mut Index,
  ) -> Result<()> {
    if self.finished {
      return Err(ParserError::Unsupported("training a finished lexicon"));
    }

    for (position, (word, tag)) in tree.tagged_yield().into_iter().enumerate() {
      if tag.is_empty() {
        return Err(ParserError::MalformedTree(format!(
          "token {:?} has no preterminal parent",
          word
        )));
      }
      let w = words.add(word);
      let t = tags.add(tag);

      *self.word_tag_count.entry((w, t)).or_insert(0.0) += weight;
      let wc = self.word_count.entry(w).or_insert(0.0);
      *wc += weight;
      *self.tag_count.entry(t).or_insert(0.0) += weight;
      self.total += weight;

      if *wc <= self.opts.unknown_threshold {
        self.uwm.train_token(word, t, position, weight);
      }
    }
    Ok(())
  }

  /// Freezes derived statistics. Must be called before `score`; calling
  /// `train` afterwards is rejected.
  pub fn finish_training(&mut self, tags: &Index) {
    for &(w, t) in self.word_tag_count.keys() {
      self.tags_for_word.entry(w).or_default().push(t);
    }
    for v in self.tags_for_word.values_mut() {
      v.sort_unstable();
    }
    self.uwm.finish_training(tags.len());
    self.finished = true;
    debug!(
      words = self.word_count.len(),
      tags = self.tag_count.len(),
      tokens = self.total,
      "finished lexicon training"
    );
  }

  pub fn is_finished(&self) -> bool {
    self.finished
  }

  /// Whether the word was observed during training. Unindexed words
  /// (negative ids) are never known.
  pub fn is_known(&self, word: i32) -> bool {
    word >= 0 && self.word_count.contains_key(&(word as usize))
  }

  /// Tags observed with a known word, ascending. `None` for unknown words:
  /// callers should consider every open tag.
  pub fn tags_for(&self, word: i32) -> Option<&[usize]> {
    if word < 0 {
      return None;
    }
    self.tags_for_word.get(&(word as usize)).map(Vec::as_slice)
  }

  /// log P(word | tag) at a sentence position. `word_str` carries the
  /// surface form for signature computation when the word is unknown.
  pub fn score(&self, word: i32, tag: usize, position: usize, word_str: &str) -> f64 {
    debug_assert!(self.finished, "scoring an unfinished lexicon");

    let tag_total = self.tag_count.get(&tag).copied().unwrap_or(0.0);
    if tag_total <= 0.0 || self.total <= 0.0 {
      return f64::NEG_INFINITY;
    }
    let p_tag = tag_total / self.total;

    if self.is_known(word) {
      let w = word as usize;
      let c_wt = self.word_tag_count.get(&(w, tag)).copied().unwrap_or(0.0);
      let c_w = self.word_count[&w];
      let p_tag_given_word = (c_wt + self.opts.smooth * p_tag) / (c_w + self.opts.smooth);
      if p_tag_given_word <= 0.0 {
        return f64::NEG_INFINITY;
      }
      let p_word = c_w / self.total;
      (p_tag_given_word * p_word / p_tag).ln()
    } else {
      self.uwm.score(
        IntTaggedWord::new(word, tag as i32),
        position,
        tag_total,
        self.total,
        self.opts.smooth,
        word_str,
      )
    }
  }

  pub fn unknown_model(&self) -> &UnknownWordModel {
    &self.uwm
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn trained() -> (Lexicon, Index, Index) {
    let mut words = Index::new();
    let mut tags = Index::new();
    let boundary = tags.add(crate::lang::BOUNDARY_TAG);
    let mut lex = Lexicon::new(LexiconOptions::default(), boundary);
    let tree: Tree = "(S (NP (DT The) (NN dog)) (VP (VBD barked)))".parse().unwrap();
    lex.train(&tree, 1.0, &mut words, &mut tags).unwrap();
    lex.finish_training(&tags);
    (lex, words, tags)
  }

  #[test]
  fn test_known_word_prefers_observed_tag() {
    let (lex, words, tags) = trained();
    let dog = words.index_of("dog").unwrap() as i32;
    let nn = tags.index_of("NN").unwrap();
    let dt = tags.index_of("DT").unwrap();

    let s_nn = lex.score(dog, nn, 1, "dog");
    let s_dt = lex.score(dog, dt, 1, "dog");
    assert!(s_nn.is_finite());
    assert!(s_nn > s_dt);
    assert!(lex.is_known(dog));
    assert_eq!(lex.tags_for(dog), Some(&[nn][..]));
  }

  #[test]
  fn test_unknown_word_delegates_to_model() {
    let (lex, words, tags) = trained();
    assert_eq!(words.index_of("meowed"), None);
    let vbd = tags.index_of("VBD").unwrap();

    let s = lex.score(-1, vbd, 2, "meowed");
    assert!(s.is_finite(), "unknown word must get a finite score for VBD");
    assert!(!lex.is_known(-1));
    assert_eq!(lex.tags_for(-1), None);
  }

  #[test]
  fn test_scoring_is_deterministic() {
    let (lex, words, tags) = trained();
    let the = words.index_of("The").unwrap() as i32;
    let dt = tags.index_of("DT").unwrap();
    assert_eq!(lex.score(the, dt, 0, "The"), lex.score(the, dt, 0, "The"));
    assert_eq!(lex.score(-1, dt, 0, "Blah"), lex.score(-1, dt, 0, "Blah"));
  }

  #[test]
  fn test_retraining_after_finish_is_rejected() {
    let (mut lex, mut words, mut tags) = trained();
    let tree: Tree = "(S (NN cat))".parse().unwrap();
    assert!(matches!(
      lex.train(&tree, 1.0, &mut words, &mut tags),
      Err(ParserError::Unsupported(_))
    ));
  }
}
