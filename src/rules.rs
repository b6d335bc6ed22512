use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Grammar states (nonterminals, including preterminal tags) are integers
/// assigned by the state index.
pub type State = usize;

/// A (word, tag) pair over index integers. The negative values are
/// sentinels: `ANY` is a wildcard used when generalizing statistics, `STOP`
/// marks "no further dependents" in valence events.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct IntTaggedWord {
  pub word: i32,
  pub tag: i32,
}

impl IntTaggedWord {
  pub const ANY: i32 = -1;
  pub const STOP: i32 = -2;

  pub fn new(word: i32, tag: i32) -> Self {
    Self { word, tag }
  }

  pub fn stop() -> Self {
    Self { word: Self::STOP, tag: Self::STOP }
  }

  pub fn is_stop(&self) -> bool {
    self.tag == Self::STOP
  }
}

impl Ord for IntTaggedWord {
  /// Tag sorts primarily, then word.
  fn cmp(&self, other: &Self) -> Ordering {
    self.tag.cmp(&other.tag).then(self.word.cmp(&other.word))
  }
}

impl PartialOrd for IntTaggedWord {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl fmt::Display for IntTaggedWord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.word, self.tag)
  }
}

/// A head--argument attachment fact. `left` is true when the argument sits
/// to the left of the head; `distance` is the raw (unbinned) word distance,
/// negative only for valence events.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct IntDependency {
  pub head: IntTaggedWord,
  pub arg: IntTaggedWord,
  pub left: bool,
  pub distance: i16,
}

impl IntDependency {
  pub fn new(head: IntTaggedWord, arg: IntTaggedWord, left: bool, distance: i16) -> Self {
    Self { head, arg, left, distance }
  }
}

impl fmt::Display for IntDependency {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let dir = if self.left { "<-" } else { "->" };
    write!(f, "{} {} {} @{}", self.head, dir, self.arg, self.distance)
  }
}

/// A unary production `parent -> child` with a log-probability score.
///
/// Equality, hashing and ordering all ignore the score: two rules with the
/// same parent and child are the same rule for lookup purposes, however
/// they were counted. The score may be NaN while a rule is still being
/// built and is `-inf` for an impossible production.
#[derive(Debug, Clone)]
pub struct UnaryRule {
  pub parent: State,
  pub child: State,
  pub score: f64,
}

impl UnaryRule {
  pub fn new(parent: State, child: State, score: f64) -> Self {
    Self { parent, child, score }
  }
}

impl PartialEq for UnaryRule {
  fn eq(&self, other: &Self) -> bool {
    self.parent == other.parent && self.child == other.child
  }
}

impl Eq for UnaryRule {}

impl Hash for UnaryRule {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.parent.hash(state);
    self.child.hash(state);
  }
}

impl Ord for UnaryRule {
  fn cmp(&self, other: &Self) -> Ordering {
    self.parent.cmp(&other.parent).then(self.child.cmp(&other.child))
  }
}

impl PartialOrd for UnaryRule {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl fmt::Display for UnaryRule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} -> {} [{}]", self.parent, self.child, self.score)
  }
}

/// A binary production `parent -> left right` with a log-probability score.
/// Same identity rules as [`UnaryRule`]: the score is not part of equality,
/// hashing or ordering, and ordering is lexicographic on (parent, left,
/// right).
#[derive(Debug, Clone)]
pub struct BinaryRule {
  pub parent: State,
  pub left: State,
  pub right: State,
  pub score: f64,
}

impl BinaryRule {
  pub fn new(parent: State, left: State, right: State, score: f64) -> Self {
    Self { parent, left, right, score }
  }
}

impl PartialEq for BinaryRule {
  fn eq(&self, other: &Self) -> bool {
    self.parent == other.parent && self.left == other.left && self.right == other.right
  }
}

impl Eq for BinaryRule {}

impl Hash for BinaryRule {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.parent.hash(state);
    self.left.hash(state);
    self.right.hash(state);
  }
}

impl Ord for BinaryRule {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .parent
      .cmp(&other.parent)
      .then(self.left.cmp(&other.left))
      .then(self.right.cmp(&other.right))
  }
}

impl PartialOrd for BinaryRule {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl fmt::Display for BinaryRule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} -> {} {} [{}]", self.parent, self.left, self.right, self.score)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::hash_map::DefaultHasher;

  fn hash_of<T: Hash>(t: &T) -> u64 {
    let mut h = DefaultHasher::new();
    t.hash(&mut h);
    h.finish()
  }

  #[test]
  fn test_rule_equality_ignores_score() {
    let a = BinaryRule::new(1, 2, 3, 0.1);
    let b = BinaryRule::new(1, 2, 3, 9.9);
    let c = BinaryRule::new(1, 2, 4, 0.1);

    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));
    assert_ne!(a, c);

    let u1 = UnaryRule::new(5, 6, f64::NAN);
    let u2 = UnaryRule::new(5, 6, -1.5);
    assert_eq!(u1, u2);
    assert_eq!(hash_of(&u1), hash_of(&u2));
  }

  #[test]
  fn test_rule_ordering_is_lexicographic() {
    let mut rules = vec![
      BinaryRule::new(2, 0, 0, 0.0),
      BinaryRule::new(1, 3, 0, 0.0),
      BinaryRule::new(1, 2, 9, 0.0),
      BinaryRule::new(1, 2, 3, 0.0),
    ];
    rules.sort();
    let keys: Vec<_> = rules.iter().map(|r| (r.parent, r.left, r.right)).collect();
    assert_eq!(keys, vec![(1, 2, 3), (1, 2, 9), (1, 3, 0), (2, 0, 0)]);
  }

  #[test]
  fn test_tagged_word_sorts_tag_first() {
    let mut v = vec![
      IntTaggedWord::new(9, 1),
      IntTaggedWord::new(0, 2),
      IntTaggedWord::new(1, 1),
    ];
    v.sort();
    assert_eq!(v[0], IntTaggedWord::new(1, 1));
    assert_eq!(v[1], IntTaggedWord::new(9, 1));
    assert_eq!(v[2], IntTaggedWord::new(0, 2));
  }

  #[test]
  fn test_stop_sentinel() {
    let stop = IntTaggedWord::stop();
    assert!(stop.is_stop());
    assert_eq!(stop.word, IntTaggedWord::STOP);
    assert!(!IntTaggedWord::new(0, 0).is_stop());
  }
}
