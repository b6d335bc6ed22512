use rustc_hash::FxHashMap;

use crate::error::{ParserError, Result};

/// A bijection between strings and small non-negative integers.
///
/// Words, tags and grammar states are all interned through one of these so
/// that every other component can work on integers. Append-only while a
/// model is being trained, then frozen (shared immutably) at parse time.
#[derive(Debug, Default, Clone)]
pub struct Index {
  strings: Vec<String>,
  ids: FxHashMap<String, usize>,
}

impl Index {
  pub fn new() -> Self {
    Default::default()
  }

  /// Returns the existing integer for `s` if present, else assigns the next
  /// integer. Assigned integers are monotonically increasing and never
  /// reused.
  pub fn add(&mut self, s: &str) -> usize {
    if let Some(&id) = self.ids.get(s) {
      return id;
    }
    let id = self.strings.len();
    self.strings.push(s.to_string());
    self.ids.insert(s.to_string(), id);
    id
  }

  /// Reverse lookup. `None` means `i` was never assigned.
  pub fn get(&self, i: usize) -> Option<&str> {
    self.strings.get(i).map(|s| s.as_str())
  }

  /// Reverse lookup that propagates an out-of-range integer as an error.
  pub fn try_get(&self, i: usize) -> Result<&str> {
    self.get(i).ok_or(ParserError::UnknownIndex(i))
  }

  pub fn index_of(&self, s: &str) -> Option<usize> {
    self.ids.get(s).copied()
  }

  pub fn contains(&self, s: &str) -> bool {
    self.ids.contains_key(s)
  }

  pub fn len(&self) -> usize {
    self.strings.len()
  }

  pub fn is_empty(&self) -> bool {
    self.strings.is_empty()
  }

  /// Iterate over assigned ids in assignment order.
  pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
    self.strings.iter().enumerate().map(|(i, s)| (i, s.as_str()))
  }
}

#[test]
fn test_index_bijection() {
  let mut idx = Index::new();
  let a = idx.add("NP");
  let b = idx.add("VP");
  let a2 = idx.add("NP");

  assert_eq!(a, a2);
  assert_ne!(a, b);
  assert_eq!(idx.get(a), Some("NP"));
  assert_eq!(idx.get(b), Some("VP"));
  assert_eq!(idx.len(), 2);
}

#[test]
fn test_index_monotone_and_missing() {
  let mut idx = Index::new();
  let mut last = None;
  for s in ["a", "b", "c", "d"] {
    let id = idx.add(s);
    if let Some(prev) = last {
      assert!(id > prev);
    }
    last = Some(id);
  }

  assert_eq!(idx.index_of("nope"), None);
  assert_eq!(idx.get(99), None);
  assert_eq!(idx.try_get(99), Err(ParserError::UnknownIndex(99)));
  assert_eq!(idx.try_get(0), Ok("a"));
}
