use rustc_hash::FxHashMap;
use tracing::debug;

use crate::index::Index;
use crate::rules::IntTaggedWord;

/// Which signature function an unknown-word model uses. Selected by
/// configuration when the lexicon is built; each variant is a pure function
/// of the word string and its position.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnknownModelKind {
  /// Case, digit, hyphen and a fixed suffix list.
  English,
  /// First-character class only; usable for any language.
  Base,
}

const ENGLISH_SUFFIXES: &[&str] = &[
  "ing", "ogy", "ion", "ity", "ies", "ed", "er", "est", "ly", "al", "ive", "ous", "s",
];

fn english_signature(word: &str, position: usize) -> String {
  let mut sig = String::from("UNK");

  let mut has_digit = false;
  let mut has_dash = false;
  let mut has_lower = false;
  let mut has_upper = false;
  let mut first_upper = false;
  for (i, c) in word.chars().enumerate() {
    if c.is_ascii_digit() {
      has_digit = true;
    } else if c == '-' {
      has_dash = true;
    } else if c.is_lowercase() {
      has_lower = true;
    } else if c.is_uppercase() {
      has_upper = true;
      if i == 0 {
        first_upper = true;
      }
    }
  }

  if first_upper && position == 0 {
    // sentence-initial capitalization is weak evidence
    sig.push_str("-i");
  } else if first_upper {
    sig.push_str("-c");
  } else if has_upper {
    sig.push_str("-C");
  }
  if has_digit {
    sig.push_str("-d");
  }
  if has_dash {
    sig.push_str("-h");
  }
  if has_lower {
    let lower = word.to_lowercase();
    for suf in ENGLISH_SUFFIXES {
      if lower.len() > suf.len() && lower.ends_with(suf) {
        sig.push('-');
        sig.push_str(suf);
        break;
      }
    }
  }

  sig
}

fn base_signature(word: &str, _position: usize) -> String {
  let class = match word.chars().next() {
    Some(c) if c.is_uppercase() => "U",
    Some(c) if c.is_lowercase() => "L",
    Some(c) if c.is_ascii_digit() => "D",
    Some(_) => "P",
    None => "E",
  };
  format!("UNK-{}", class)
}

/// Statistics over rare training tokens, keyed by signature equivalence
/// classes, used to score words the lexicon never saw.
#[derive(Debug)]
pub struct UnknownWordModel {
  kind: UnknownModelKind,
  good_turing: bool,
  boundary_tag: usize,
  sigs: Index,
  sig_tag_count: FxHashMap<(usize, usize), f64>,
  sig_count: FxHashMap<usize, f64>,
  tag_count: FxHashMap<usize, f64>,
  total: f64,
  singleton_by_tag: FxHashMap<usize, f64>,
  singleton_total: f64,
  num_tags: usize,
  degenerate: bool,
}

impl UnknownWordModel {
  pub fn new(kind: UnknownModelKind, good_turing: bool, boundary_tag: usize) -> Self {
    Self {
      kind,
      good_turing,
      boundary_tag,
      sigs: Index::new(),
      sig_tag_count: FxHashMap::default(),
      sig_count: FxHashMap::default(),
      tag_count: FxHashMap::default(),
      total: 0.0,
      singleton_by_tag: FxHashMap::default(),
      singleton_total: 0.0,
      num_tags: 0,
      degenerate: false,
    }
  }

  /// The equivalence-class label for an unseen word. Deterministic in
  /// (word, position); only `position == 0` is distinguished.
  pub fn signature(&self, word: &str, position: usize) -> String {
    let position = if position == 0 { 0 } else { 1 };
    match self.kind {
      UnknownModelKind::English => english_signature(word, position),
      UnknownModelKind::Base => base_signature(word, position),
    }
  }

  /// Accumulates one rare-token observation.
  pub fn train_token(&mut self, word: &str, tag: usize, position: usize, weight: f64) {
    let sig = self.signature(word, position);
    let sid = self.sigs.add(&sig);
    *self.sig_tag_count.entry((sid, tag)).or_insert(0.0) += weight;
    *self.sig_count.entry(sid).or_insert(0.0) += weight;
    *self.tag_count.entry(tag).or_insert(0.0) += weight;
    self.total += weight;
  }

  /// Freezes derived statistics. With an extremely small training set the
  /// rare-token counters can be completely empty; in that case the model
  /// falls back to a uniform distribution over every tag except the
  /// boundary tag, so unknown words never score `-inf` across the board.
  pub fn finish_training(&mut self, num_tags: usize) {
    self.num_tags = num_tags;
    self.degenerate = self.total <= 0.0;

    self.singleton_by_tag.clear();
    self.singleton_total = 0.0;
    for (&(_, tag), &n) in &self.sig_tag_count {
      if n < 1.5 {
        *self.singleton_by_tag.entry(tag).or_insert(0.0) += 1.0;
        self.singleton_total += 1.0;
      }
    }

    debug!(
      signatures = self.sigs.len(),
      total = self.total,
      singletons = self.singleton_total,
      degenerate = self.degenerate,
      "finished unknown-word training"
    );
  }

  fn unseen_tag_prob(&self, tag: usize) -> f64 {
    if tag == self.boundary_tag {
      return 0.0;
    }
    if self.degenerate {
      let open = self.num_tags.saturating_sub(1).max(1);
      return 1.0 / open as f64;
    }
    if self.good_turing && self.singleton_total > 0.0 {
      // Good-Turing: mass for unseen (signature, tag) categories is
      // estimated from singleton counts
      let sing = self.singleton_by_tag.get(&tag).copied().unwrap_or(0.0);
      return (sing + 0.1) / (self.singleton_total + 0.1 * self.num_tags as f64);
    }
    self.tag_count.get(&tag).copied().unwrap_or(0.0) / self.total
  }

  /// log P(word | tag) for a word the lexicon does not know.
  ///
  /// `tag_total` and `token_total` are the lexicon's overall counts for the
  /// tag and for all tokens; `smooth` is the lexicon's smoothing weight.
  pub fn score(
    &self,
    itw: IntTaggedWord,
    position: usize,
    tag_total: f64,
    token_total: f64,
    smooth: f64,
    word: &str,
  ) -> f64 {
    let tag = itw.tag as usize;
    if itw.tag < 0 || tag == self.boundary_tag {
      return f64::NEG_INFINITY;
    }

    let p_tag_unseen = self.unseen_tag_prob(tag);
    let sig = self.signature(word, position);
    let p_tag_given_sig = match self.sigs.index_of(&sig) {
      Some(sid) => {
        let c_st = self.sig_tag_count.get(&(sid, tag)).copied().unwrap_or(0.0);
        let c_s = self.sig_count[&sid];
        (c_st + smooth * p_tag_unseen) / (c_s + smooth)
      }
      None => p_tag_unseen,
    };

    let p_tag = tag_total / token_total;
    if p_tag_given_sig <= 0.0 || p_tag <= 0.0 {
      return f64::NEG_INFINITY;
    }
    // Bayes back to P(word | tag), with a uniform share of the leftover
    // word mass standing in for P(word)
    let p_word = 1.0 / (token_total + 1.0);
    (p_tag_given_sig * p_word / p_tag).ln()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_english_signatures_are_fixed() {
    assert_eq!(english_signature("meowed", 2), "UNK-ed");
    assert_eq!(english_signature("Xylophone", 0), "UNK-i");
    assert_eq!(english_signature("Xylophone", 3), "UNK-c");
    assert_eq!(english_signature("eBay", 1), "UNK-C");
    assert_eq!(english_signature("3-year", 4), "UNK-d-h");
    assert_eq!(english_signature("running", 1), "UNK-ing");
    assert_eq!(english_signature("dogs", 1), "UNK-s");
  }

  #[test]
  fn test_base_signatures() {
    assert_eq!(base_signature("word", 0), "UNK-L");
    assert_eq!(base_signature("Word", 0), "UNK-U");
    assert_eq!(base_signature("9am", 0), "UNK-D");
    assert_eq!(base_signature("%", 0), "UNK-P");
  }

  #[test]
  fn test_signature_deterministic_across_calls() {
    let m = UnknownWordModel::new(UnknownModelKind::English, false, 0);
    let a = m.signature("flibbertigibbet", 3);
    let b = m.signature("flibbertigibbet", 7); // any non-initial position
    assert_eq!(a, b);
    assert_eq!(a, m.signature("flibbertigibbet", 3));
  }

  #[test]
  fn test_trained_model_prefers_matching_signature() {
    let boundary = 0;
    let vbd = 1;
    let nn = 2;
    let mut m = UnknownWordModel::new(UnknownModelKind::English, false, boundary);
    m.train_token("barked", vbd, 2, 1.0);
    m.train_token("dog", nn, 1, 1.0);
    m.finish_training(3);

    let s_vbd = m.score(IntTaggedWord::new(-1, vbd as i32), 2, 1.0, 3.0, 1.0, "meowed");
    let s_nn = m.score(IntTaggedWord::new(-1, nn as i32), 2, 1.0, 3.0, 1.0, "meowed");
    assert!(s_vbd.is_finite());
    assert!(s_vbd > s_nn);
  }

  #[test]
  fn test_degenerate_training_falls_back_to_uniform() {
    let boundary = 0;
    let mut m = UnknownWordModel::new(UnknownModelKind::English, false, boundary);
    m.finish_training(4);

    let s1 = m.score(IntTaggedWord::new(-1, 1), 0, 1.0, 4.0, 1.0, "zzz");
    let s2 = m.score(IntTaggedWord::new(-1, 2), 0, 1.0, 4.0, 1.0, "zzz");
    assert!(s1.is_finite());
    assert_eq!(s1, s2);
    // the boundary tag stays impossible
    let sb = m.score(IntTaggedWord::new(-1, boundary as i32), 0, 1.0, 4.0, 1.0, "zzz");
    assert_eq!(sb, f64::NEG_INFINITY);
  }

  #[test]
  fn test_good_turing_uses_singletons() {
    let boundary = 0;
    let vbd = 1;
    let nn = 2;
    let mut m = UnknownWordModel::new(UnknownModelKind::English, true, boundary);
    // "-ed" seen once with VBD (a singleton), NN seen many times
    m.train_token("barked", vbd, 2, 1.0);
    for _ in 0..5 {
      m.train_token("dog", nn, 1, 1.0);
    }
    m.finish_training(3);

    // a completely novel signature backs off to the singleton-derived
    // distribution, which favors VBD
    let s_vbd = m.score(IntTaggedWord::new(-1, vbd as i32), 1, 1.0, 6.0, 1.0, "%%%");
    let s_nn = m.score(IntTaggedWord::new(-1, nn as i32), 1, 5.0, 6.0, 1.0, "%%%");
    assert!(s_vbd.is_finite());
    assert!(s_nn.is_finite());
  }
}
