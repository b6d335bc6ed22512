use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{ParserError, Result};
use crate::index::Index;
use crate::lang::{HeadFinder, TreebankLanguagePack};
use crate::rules::{IntDependency, IntTaggedWord};
use crate::tree::Tree;

#[derive(Debug, Clone)]
pub struct DependencyOptions {
  /// Distinguish left from right attachments.
  pub directional: bool,
  /// Condition on binned linear distance; when off, every distance falls
  /// in bin 0.
  pub use_distance: bool,
  /// Coarse distance binning (boundaries {0,2,5}); fine uses {0,1,5,10}.
  pub coarse_distance: bool,
  pub smooth: f64,
  /// Projects a full tag into the reduced space dependency statistics are
  /// collected over. Identity when absent.
  pub tag_projection: Option<fn(&str) -> String>,
}

impl Default for DependencyOptions {
  fn default() -> Self {
    Self {
      directional: true,
      use_distance: true,
      coarse_distance: true,
      smooth: 1.0,
      tag_projection: None,
    }
  }
}

/// A head--argument attachment in string space with token positions, as
/// produced by head percolation over a tree, before interning.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDependency {
  pub head_word: String,
  pub head_tag: String,
  pub head_pos: usize,
  pub arg_word: String,
  pub arg_tag: String,
  pub arg_pos: usize,
}

impl RawDependency {
  pub fn left(&self) -> bool {
    self.arg_pos < self.head_pos
  }

  pub fn distance(&self) -> i16 {
    self.head_pos.abs_diff(self.arg_pos) as i16
  }
}

/// Percolates heads through `tree` and lists every attachment, including
/// the synthetic root dependency in which the boundary word (at position
/// `len`) takes the sentence head as its argument.
pub fn tree_dependencies(
  tree: &Tree,
  hf: &HeadFinder,
  pack: &impl TreebankLanguagePack,
) -> Result<Vec<RawDependency>> {
  let mut deps = Vec::new();
  let mut pos = 0;
  let (head_word, head_tag, head_pos) = percolate(tree, &mut pos, &mut deps, hf, pack)?;

  deps.push(RawDependency {
    head_word: pack.boundary_word().to_string(),
    head_tag: pack.boundary_tag().to_string(),
    head_pos: pos,
    arg_word: head_word,
    arg_tag: head_tag,
    arg_pos: head_pos,
  });
  Ok(deps)
}

fn percolate(
  tree: &Tree,
  pos: &mut usize,
  deps: &mut Vec<RawDependency>,
  hf: &HeadFinder,
  pack: &impl TreebankLanguagePack,
) -> Result<(String, String, usize)> {
  match tree {
    Tree::Leaf { word } => Err(ParserError::MalformedTree(format!(
      "token {:?} has no preterminal parent",
      word
    ))),
    Tree::Branch { label, children } => {
      if tree.is_preterminal() {
        let p = *pos;
        *pos += 1;
        let word = children[0].word().unwrap().to_string();
        return Ok((word, label.clone(), p));
      }

      let mut heads = Vec::with_capacity(children.len());
      let mut labels = Vec::with_capacity(children.len());
      for c in children {
        labels.push(c.label().ok_or_else(|| {
          ParserError::MalformedTree(format!("bare token directly under {}", label))
        })?);
        heads.push(percolate(c, pos, deps, hf, pack)?);
      }

      let h = hf.head_child(pack, label, &labels);
      for (i, arg) in heads.iter().enumerate() {
        if i == h {
          continue;
        }
        deps.push(RawDependency {
          head_word: heads[h].0.clone(),
          head_tag: heads[h].1.clone(),
          head_pos: heads[h].2,
          arg_word: arg.0.clone(),
          arg_tag: arg.1.clone(),
          arg_pos: arg.2,
        });
      }
      Ok(heads[h].clone())
    }
  }
}

/// Maximum-likelihood dependency grammar over binned tags and binned
/// distances, smoothed toward a tag-bin backoff and a uniform floor so a
/// trained model never scores an attachment at `-inf`.
#[derive(Debug)]
pub struct MleDependencyGrammar {
  opts: DependencyOptions,
  boundary_tag: usize,
  tag_bins: Vec<i16>,
  num_tag_bins: usize,
  // events are (arg tag-bin, distance-bin) given a context; the two table
  // pairs are the word-conditioned estimate and its tag-bin backoff
  full_count: FxHashMap<(i32, i16, i16, bool, i16), f64>,
  full_ctx: FxHashMap<(i32, i16, bool), f64>,
  tb_count: FxHashMap<(i16, i16, bool, i16), f64>,
  tb_ctx: FxHashMap<(i16, bool), f64>,
  finished: bool,
}

impl MleDependencyGrammar {
  /// Tag bins are fixed here, by applying the projection to every tag in
  /// the index and assigning bin ids in first-seen order.
  pub fn new(opts: DependencyOptions, tags: &Index, boundary_tag: usize) -> Self {
    let mut by_projection: FxHashMap<String, i16> = FxHashMap::default();
    let mut tag_bins = Vec::with_capacity(tags.len());
    for (_, tag) in tags.iter() {
      let proj = match opts.tag_projection {
        Some(f) => f(tag),
        None => tag.to_string(),
      };
      let next = by_projection.len() as i16;
      let bin = *by_projection.entry(proj).or_insert(next);
      tag_bins.push(bin);
    }
    let num_tag_bins = by_projection.len();

    Self {
      opts,
      boundary_tag,
      tag_bins,
      num_tag_bins,
      full_count: FxHashMap::default(),
      full_ctx: FxHashMap::default(),
      tb_count: FxHashMap::default(),
      tb_ctx: FxHashMap::default(),
      finished: false,
    }
  }

  pub fn tag_bin(&self, tag: i32) -> i16 {
    if tag < 0 {
      return tag as i16; // sentinels pass through
    }
    self.tag_bins.get(tag as usize).copied().unwrap_or(tag as i16)
  }

  pub fn num_tag_bins(&self) -> usize {
    self.num_tag_bins
  }

  /// Maps a raw word distance to a bucket. Monotone in the distance;
  /// constant 0 when distance sensitivity is off; negative distances (the
  /// valence-only case) get a dedicated bucket.
  pub fn distance_bin(&self, distance: i16) -> i16 {
    if !self.opts.use_distance {
      return 0;
    }
    if distance < 0 {
      return -1;
    }
    if self.opts.coarse_distance {
      match distance {
        0 => 0,
        1..=2 => 1,
        3..=5 => 2,
        _ => 3,
      }
    } else {
      match distance {
        0 => 0,
        1 => 1,
        2..=5 => 2,
        6..=10 => 3,
        _ => 4,
      }
    }
  }

  fn num_distance_bins(&self) -> usize {
    if !self.opts.use_distance {
      2 // bin 0 plus the valence bucket
    } else if self.opts.coarse_distance {
      5
    } else {
      6
    }
  }

  fn fold_dir(&self, left: bool) -> bool {
    self.opts.directional && left
  }

  /// True iff the word carries the boundary tag, i.e. it heads the
  /// synthetic sentence-root dependency.
  pub fn root_tw(&self, tw: IntTaggedWord) -> bool {
    tw.tag == self.boundary_tag as i32
  }

  pub fn boundary_tag(&self) -> usize {
    self.boundary_tag
  }

  fn count(&mut self, dep: IntDependency, weight: f64) {
    let htb = self.tag_bin(dep.head.tag);
    let atb = self.tag_bin(dep.arg.tag);
    let left = self.fold_dir(dep.left);
    let db = self.distance_bin(dep.distance);

    *self.full_count.entry((dep.head.word, htb, atb, left, db)).or_insert(0.0) += weight;
    *self.full_ctx.entry((dep.head.word, htb, left)).or_insert(0.0) += weight;
    *self.tb_count.entry((htb, atb, left, db)).or_insert(0.0) += weight;
    *self.tb_ctx.entry((htb, left)).or_insert(0.0) += weight;
  }

  /// Accumulates attachment and valence statistics from one tree.
  pub fn train(
    &mut self,
    tree: &Tree,
    weight: f64,
    words: &mut Index,
    tags: &mut Index,
    hf: &HeadFinder,
    pack: &impl TreebankLanguagePack,
  ) -> Result<()> {
    if self.finished {
      return Err(ParserError::Unsupported("training a finished dependency grammar"));
    }

    for raw in tree_dependencies(tree, hf, pack)? {
      let dep = IntDependency::new(
        IntTaggedWord::new(words.add(&raw.head_word) as i32, tags.add(&raw.head_tag) as i32),
        IntTaggedWord::new(words.add(&raw.arg_word) as i32, tags.add(&raw.arg_tag) as i32),
        raw.left(),
        raw.distance(),
      );
      self.count(dep, weight);
    }

    // valence: every token also generates a stop event on each side
    for (word, tag) in tree.tagged_yield() {
      let head = IntTaggedWord::new(words.add(word) as i32, tags.add(tag) as i32);
      for left in [true, false] {
        self.count(IntDependency::new(head, IntTaggedWord::stop(), left, -1), weight);
      }
    }
    Ok(())
  }

  pub fn finish_training(&mut self) {
    self.finished = true;
    debug!(
      contexts = self.full_ctx.len(),
      tag_contexts = self.tb_ctx.len(),
      "finished dependency training"
    );
  }

  /// Scores a dependency whose tags are already tag bins.
  pub fn score_tb(&self, dep: IntDependency) -> f64 {
    let htb = dep.head.tag as i16;
    let atb = dep.arg.tag as i16;
    let left = self.fold_dir(dep.left);
    let db = self.distance_bin(dep.distance);

    let uniform = 1.0 / ((self.num_tag_bins + 2) as f64 * self.num_distance_bins() as f64);
    let s = self.opts.smooth;

    let c_tb = self.tb_count.get(&(htb, atb, left, db)).copied().unwrap_or(0.0);
    let c_tb_ctx = self.tb_ctx.get(&(htb, left)).copied().unwrap_or(0.0);
    let p_tb = (c_tb + s * uniform) / (c_tb_ctx + s);

    let c_full = self
      .full_count
      .get(&(dep.head.word, htb, atb, left, db))
      .copied()
      .unwrap_or(0.0);
    let c_full_ctx = self.full_ctx.get(&(dep.head.word, htb, left)).copied().unwrap_or(0.0);
    let p = (c_full + s * p_tb) / (c_full_ctx + s);

    p.ln()
  }

  /// Scores a dependency over full tags by mapping both tags through
  /// `tag_bin` and delegating to `score_tb`.
  pub fn score(&self, dep: IntDependency) -> f64 {
    let binned = IntDependency::new(
      IntTaggedWord::new(dep.head.word, self.tag_bin(dep.head.tag) as i32),
      IntTaggedWord::new(dep.arg.word, self.tag_bin(dep.arg.tag) as i32),
      dep.left,
      dep.distance,
    );
    self.score_tb(binned)
  }

  /// Convenience overload over bare integers; behaviorally identical to
  /// building the dependency and calling `score`.
  pub fn score_parts(
    &self,
    head_word: i32,
    head_tag: i32,
    arg_word: i32,
    arg_tag: i32,
    left: bool,
    distance: i16,
  ) -> f64 {
    self.score(IntDependency::new(
      IntTaggedWord::new(head_word, head_tag),
      IntTaggedWord::new(arg_word, arg_tag),
      left,
      distance,
    ))
  }
}

/// Interns dependency scores for one sentence's parse: identical
/// (head, arg, direction, distance-bin) queries share one computed value.
/// A cache only; results are identical with or without it.
#[derive(Debug, Default)]
pub struct DepCache {
  map: FxHashMap<(IntTaggedWord, IntTaggedWord, bool, i16), f64>,
}

impl DepCache {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn score(&mut self, grammar: &MleDependencyGrammar, dep: IntDependency) -> f64 {
    let key = (dep.head, dep.arg, dep.left, grammar.distance_bin(dep.distance));
    *self.map.entry(key).or_insert_with(|| grammar.score(dep))
  }

  pub fn len(&self) -> usize {
    self.map.len()
  }
}

/// Looks a raw dependency up in frozen indices; anything unindexed becomes
/// the `ANY` wildcard, which backs off to tag statistics.
pub fn intern_dependency(raw: &RawDependency, words: &Index, tags: &Index) -> IntDependency {
  let wid = |s: &str| words.index_of(s).map(|x| x as i32).unwrap_or(IntTaggedWord::ANY);
  let tid = |s: &str| tags.index_of(s).map(|x| x as i32).unwrap_or(IntTaggedWord::ANY);
  IntDependency::new(
    IntTaggedWord::new(wid(&raw.head_word), tid(&raw.head_tag)),
    IntTaggedWord::new(wid(&raw.arg_word), tid(&raw.arg_tag)),
    raw.left(),
    raw.distance(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lang::PennLanguagePack;

  fn scenario() -> (MleDependencyGrammar, Index, Index) {
    let pack = PennLanguagePack::new();
    let hf = HeadFinder::penn();
    let mut words = Index::new();

    let tree: Tree = "(ROOT (S (NP (DT The) (NN dog)) (VP (VBD barked))))".parse().unwrap();
    // tags must be indexed before bins are fixed
    let mut tags = Index::new();
    for (_, t) in tree.tagged_yield() {
      tags.add(t);
    }
    let boundary = tags.add(crate::lang::BOUNDARY_TAG);

    let mut g = MleDependencyGrammar::new(DependencyOptions::default(), &tags, boundary);
    g.train(&tree, 1.0, &mut words, &mut tags, &hf, &pack).unwrap();
    g.finish_training();
    (g, words, tags)
  }

  #[test]
  fn test_distance_bin_monotone_and_bounded() {
    let (g, _, _) = scenario();
    let mut prev = i16::MIN;
    for d in -3..40i16 {
      let b = g.distance_bin(d);
      assert!(b >= prev, "bins must be monotone in distance");
      prev = b;
    }
    assert_eq!(g.distance_bin(-2), -1);
    assert_eq!(g.distance_bin(0), 0);
    assert_eq!(g.distance_bin(2), 1);
    assert_eq!(g.distance_bin(5), 2);
    assert_eq!(g.distance_bin(100), 3);
  }

  #[test]
  fn test_distance_bin_constant_when_disabled() {
    let tags = Index::new();
    let opts = DependencyOptions { use_distance: false, ..Default::default() };
    let g = MleDependencyGrammar::new(opts, &tags, 0);
    for d in [-5, -1, 0, 1, 7, 100] {
      assert_eq!(g.distance_bin(d), 0);
    }
  }

  #[test]
  fn test_fine_bins() {
    let tags = Index::new();
    let opts = DependencyOptions { coarse_distance: false, ..Default::default() };
    let g = MleDependencyGrammar::new(opts, &tags, 0);
    assert_eq!(g.distance_bin(1), 1);
    assert_eq!(g.distance_bin(5), 2);
    assert_eq!(g.distance_bin(10), 3);
    assert_eq!(g.distance_bin(11), 4);
  }

  #[test]
  fn test_score_agrees_with_score_parts() {
    let (g, words, tags) = scenario();
    let dog = words.index_of("dog").unwrap() as i32;
    let the = words.index_of("The").unwrap() as i32;
    let nn = tags.index_of("NN").unwrap() as i32;
    let dt = tags.index_of("DT").unwrap() as i32;

    let dep = IntDependency::new(
      IntTaggedWord::new(dog, nn),
      IntTaggedWord::new(the, dt),
      true,
      1,
    );
    assert_eq!(g.score(dep), g.score_parts(dog, nn, the, dt, true, 1));
  }

  #[test]
  fn test_trained_attachment_beats_untrained() {
    let (g, words, tags) = scenario();
    let dog = words.index_of("dog").unwrap() as i32;
    let the = words.index_of("The").unwrap() as i32;
    let barked = words.index_of("barked").unwrap() as i32;
    let nn = tags.index_of("NN").unwrap() as i32;
    let dt = tags.index_of("DT").unwrap() as i32;
    let vbd = tags.index_of("VBD").unwrap() as i32;

    // dog -> The (trained) vs The -> barked (never observed)
    let seen = g.score_parts(dog, nn, the, dt, true, 1);
    let unseen = g.score_parts(the, dt, barked, vbd, false, 2);
    assert!(seen.is_finite());
    assert!(unseen.is_finite(), "smoothing must keep unseen deps finite");
    assert!(seen > unseen);
  }

  #[test]
  fn test_root_tw_detects_boundary() {
    let (g, _, tags) = scenario();
    let boundary = tags.index_of(crate::lang::BOUNDARY_TAG).unwrap() as i32;
    assert!(g.root_tw(IntTaggedWord::new(0, boundary)));
    assert!(!g.root_tw(IntTaggedWord::new(0, tags.index_of("NN").unwrap() as i32)));
  }

  #[test]
  fn test_tree_dependencies_include_root() {
    let pack = PennLanguagePack::new();
    let hf = HeadFinder::penn();
    let tree: Tree = "(ROOT (S (NP (DT The) (NN dog)) (VP (VBD barked))))".parse().unwrap();
    let deps = tree_dependencies(&tree, &hf, &pack).unwrap();

    // dog <- The, barked <- NP head (dog), boundary <- barked
    assert_eq!(deps.len(), 3);
    let root = deps.last().unwrap();
    assert_eq!(root.head_word, crate::lang::BOUNDARY_WORD);
    assert_eq!(root.head_pos, 3);
    assert_eq!(root.arg_word, "barked");
    assert!(root.left());

    assert!(deps.iter().any(|d| d.head_word == "dog" && d.arg_word == "The" && d.left()));
    assert!(deps.iter().any(|d| d.head_word == "barked" && d.arg_word == "dog" && d.left()));
  }

  #[test]
  fn test_dep_cache_is_transparent() {
    let (g, words, tags) = scenario();
    let dog = words.index_of("dog").unwrap() as i32;
    let the = words.index_of("The").unwrap() as i32;
    let nn = tags.index_of("NN").unwrap() as i32;
    let dt = tags.index_of("DT").unwrap() as i32;
    let dep = IntDependency::new(
      IntTaggedWord::new(dog, nn),
      IntTaggedWord::new(the, dt),
      true,
      1,
    );

    let mut cache = DepCache::new();
    let a = cache.score(&g, dep);
    let b = cache.score(&g, dep);
    assert_eq!(a, g.score(dep));
    assert_eq!(a, b);
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn test_tag_projection_first_seen_order() {
    let mut tags = Index::new();
    for t in ["NN", "NNS", "VBD", "VB"] {
      tags.add(t);
    }
    fn first_letter(t: &str) -> String {
      t.chars().take(1).collect()
    }
    let opts = DependencyOptions { tag_projection: Some(first_letter), ..Default::default() };
    let g = MleDependencyGrammar::new(opts, &tags, 0);

    assert_eq!(g.num_tag_bins(), 2);
    assert_eq!(g.tag_bin(0), g.tag_bin(1)); // NN, NNS -> "N"
    assert_eq!(g.tag_bin(2), g.tag_bin(3)); // VBD, VB -> "V"
    assert_eq!(g.tag_bin(0), 0); // first seen gets bin 0
    assert_eq!(g.tag_bin(2), 1);
  }
}
