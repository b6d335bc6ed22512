use rustc_hash::{FxHashMap, FxHashSet};

use crate::item::{Edge, EdgeId, EdgeKey, Hook, HookId, HookKey, ItemArena};
use crate::rules::State;

const NO_EDGES: &[EdgeId] = &[];
const NO_HOOKS: &[HookId] = &[];

/// Outcome of inserting an item under Viterbi semantics.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Added<Id> {
  /// First derivation for this key.
  New(Id),
  /// A better derivation for an existing key; the item was updated in
  /// place, so the id (and every index entry) is unchanged.
  Improved(Id),
  /// A dominated derivation; discarded without touching the chart.
  Dominated,
}

impl<Id: Copy> Added<Id> {
  pub fn id(&self) -> Option<Id> {
    match self {
      Self::New(id) | Self::Improved(id) => Some(*id),
      Self::Dominated => None,
    }
  }

  pub fn is_new(&self) -> bool {
    matches!(self, Self::New(_))
  }
}

/// The indexed store of all hooks and edges for one sentence's parse.
///
/// Every index is maintained eagerly on insertion, so combination
/// candidates are found by O(1) map lookups instead of scans. Alternative
/// derivations of the same (state, span, head, tag) keep only the best
/// inside score; dominated derivations never become visible to retrieval.
#[derive(Debug, Default)]
pub struct HookChart {
  arena: ItemArena,
  best_edge: FxHashMap<EdgeKey, EdgeId>,
  best_hook: FxHashMap<HookKey, HookId>,
  // (state, head, tag, boundary) -> complete edges touching that boundary
  edges_by_start: FxHashMap<(State, usize, usize, usize), Vec<EdgeId>>,
  edges_by_end: FxHashMap<(State, usize, usize, usize), Vec<EdgeId>>,
  // (sub_state, head, tag, boundary) -> hooks waiting at that boundary
  pre_hooks_by_start: FxHashMap<(State, usize, usize, usize), Vec<HookId>>,
  post_hooks_by_end: FxHashMap<(State, usize, usize, usize), Vec<HookId>>,
  built_l: FxHashSet<(State, usize)>,
  built_r: FxHashSet<(State, usize)>,
  // coarse index by state and boundary only, for queries that do not care
  // about head or tag
  real_l: FxHashMap<(State, usize), Vec<EdgeId>>,
  real_r: FxHashMap<(State, usize), Vec<EdgeId>>,
}

impl HookChart {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn edge(&self, id: EdgeId) -> &Edge {
    self.arena.edge(id)
  }

  pub fn hook(&self, id: HookId) -> &Hook {
    self.arena.hook(id)
  }

  pub fn num_edges(&self) -> usize {
    self.arena.num_edges()
  }

  pub fn num_hooks(&self) -> usize {
    self.arena.num_hooks()
  }

  /// Inserts an edge, indexing it by both boundaries. A dominated
  /// duplicate is rejected; a better duplicate overwrites the stored item
  /// in place.
  pub fn add_edge(&mut self, edge: Edge) -> Added<EdgeId> {
    let key = edge.key();
    if let Some(&id) = self.best_edge.get(&key) {
      if edge.iscore > self.arena.edge(id).iscore {
        *self.arena.edge_mut(id) = edge;
        return Added::Improved(id);
      }
      return Added::Dominated;
    }

    let (state, start, end, head, tag) =
      (edge.state, edge.start, edge.end, edge.head, edge.tag);
    let id = self.arena.push_edge(edge);
    self.best_edge.insert(key, id);
    self.edges_by_start.entry((state, head, tag, start)).or_default().push(id);
    self.edges_by_end.entry((state, head, tag, end)).or_default().push(id);
    self.built_l.insert((state, start));
    self.built_r.insert((state, end));
    Added::New(id)
  }

  /// Inserts a hook, indexing it by its completion key.
  pub fn add_hook(&mut self, hook: Hook) -> Added<HookId> {
    let key = hook.key();
    if let Some(&id) = self.best_hook.get(&key) {
      if hook.iscore > self.arena.hook(id).iscore {
        *self.arena.hook_mut(id) = hook;
        return Added::Improved(id);
      }
      return Added::Dominated;
    }

    let pre = hook.is_pre_hook();
    let (sub, start, end, head, tag) =
      (hook.sub_state, hook.start, hook.end, hook.head, hook.tag);
    let id = self.arena.push_hook(hook);
    self.best_hook.insert(key, id);
    if pre {
      self.pre_hooks_by_start.entry((sub, head, tag, start)).or_default().push(id);
    } else {
      self.post_hooks_by_end.entry((sub, head, tag, end)).or_default().push(id);
    }
    Added::New(id)
  }

  /// Pre-hooks waiting for `edge` as their head child on the left: their
  /// span starts where the edge ends and their (sub_state, head, tag)
  /// matches. The returned slice is shared and must not be assumed
  /// mutable.
  pub fn pre_hooks_for(&self, edge: &Edge) -> &[HookId] {
    self
      .pre_hooks_by_start
      .get(&(edge.state, edge.head, edge.tag, edge.end))
      .map(Vec::as_slice)
      .unwrap_or(NO_HOOKS)
  }

  /// Post-hooks waiting for `edge` on the right: their span ends where the
  /// edge starts.
  pub fn post_hooks_for(&self, edge: &Edge) -> &[HookId] {
    self
      .post_hooks_by_end
      .get(&(edge.state, edge.head, edge.tag, edge.start))
      .map(Vec::as_slice)
      .unwrap_or(NO_HOOKS)
  }

  /// Complete edges satisfying `hook`'s completion requirement, looked up
  /// at the hook's open boundary: `start` for a pre-hook, `end` for a
  /// post-hook.
  pub fn edges_for(&self, hook: &Hook) -> &[EdgeId] {
    let map = if hook.is_pre_hook() {
      self.edges_by_end.get(&(hook.sub_state, hook.head, hook.tag, hook.start))
    } else {
      self.edges_by_start.get(&(hook.sub_state, hook.head, hook.tag, hook.end))
    };
    map.map(Vec::as_slice).unwrap_or(NO_EDGES)
  }

  /// Whether some edge with `state` has been proven starting at `start`.
  pub fn is_built_l(&self, state: State, start: usize) -> bool {
    self.built_l.contains(&(state, start))
  }

  /// Whether some edge with `state` has been proven ending at `end`.
  pub fn is_built_r(&self, state: State, end: usize) -> bool {
    self.built_r.contains(&(state, end))
  }

  /// Adds `id` to the coarse state-and-boundary index used by queries that
  /// ignore head and tag.
  pub fn register_real_edge(&mut self, id: EdgeId) {
    let (state, start, end) = {
      let e = self.arena.edge(id);
      (e.state, e.start, e.end)
    };
    self.real_l.entry((state, start)).or_default().push(id);
    self.real_r.entry((state, end)).or_default().push(id);
  }

  pub fn real_edges_with_l(&self, state: State, start: usize) -> &[EdgeId] {
    self.real_l.get(&(state, start)).map(Vec::as_slice).unwrap_or(NO_EDGES)
  }

  pub fn real_edges_with_r(&self, state: State, end: usize) -> &[EdgeId] {
    self.real_r.get(&(state, end)).map(Vec::as_slice).unwrap_or(NO_EDGES)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn edge(state: State, start: usize, end: usize, head: usize, tag: usize, iscore: f64) -> Edge {
    Edge { state, start, end, head, tag, iscore, back_hook: None, back_edge: None }
  }

  #[test]
  fn test_chart_index_round_trip() {
    let mut chart = HookChart::new();
    // head child candidate: state 7 over [0, 2) headed at 1
    let id = chart.add_edge(edge(7, 0, 2, 1, 3, -1.0)).id().unwrap();

    // a pre-hook over [2, 4) waiting for state 7 headed at 1/3
    let hook = Hook {
      state: 9,
      sub_state: 7,
      start: 2,
      end: 4,
      head: 1,
      tag: 3,
      iscore: -2.0,
      back_edge: id,
    };
    let hid = chart.add_hook(hook).id().unwrap();

    let e = chart.edge(id).clone();
    assert_eq!(chart.pre_hooks_for(&e), &[hid]);
    assert!(chart.post_hooks_for(&e).is_empty());

    let h = chart.hook(hid).clone();
    assert_eq!(chart.edges_for(&h), &[id]);

    // mismatched fields must not retrieve it
    let wrong_tag = edge(7, 0, 2, 1, 4, -1.0);
    assert!(chart.pre_hooks_for(&wrong_tag).is_empty());
    let wrong_boundary = edge(7, 0, 3, 1, 3, -1.0);
    assert!(chart.pre_hooks_for(&wrong_boundary).is_empty());
    let wrong_state = edge(8, 0, 2, 1, 3, -1.0);
    assert!(chart.pre_hooks_for(&wrong_state).is_empty());
  }

  #[test]
  fn test_post_hook_round_trip() {
    let mut chart = HookChart::new();
    // completion edge to the right: state 5 over [3, 6) headed at 4
    let id = chart.add_edge(edge(5, 3, 6, 4, 2, -1.0)).id().unwrap();

    // post-hook over [1, 3) whose head (4) lies to its right
    let hook = Hook {
      state: 8,
      sub_state: 5,
      start: 1,
      end: 3,
      head: 4,
      tag: 2,
      iscore: -2.5,
      back_edge: id,
    };
    let hid = chart.add_hook(hook).id().unwrap();

    let e = chart.edge(id).clone();
    assert_eq!(chart.post_hooks_for(&e), &[hid]);
    assert!(chart.pre_hooks_for(&e).is_empty());
    assert_eq!(chart.edges_for(&chart.hook(hid).clone()), &[id]);
  }

  #[test]
  fn test_viterbi_dominance() {
    let mut chart = HookChart::new();
    let first = chart.add_edge(edge(2, 0, 3, 1, 0, -4.0));
    let id = first.id().unwrap();
    assert!(first.is_new());

    // a worse derivation of the same key is rejected outright
    assert_eq!(chart.add_edge(edge(2, 0, 3, 1, 0, -5.0)), Added::Dominated);
    assert_eq!(chart.edge(id).iscore, -4.0);

    // a better one updates in place and keeps the id
    assert_eq!(chart.add_edge(edge(2, 0, 3, 1, 0, -2.0)), Added::Improved(id));
    assert_eq!(chart.edge(id).iscore, -2.0);
    assert_eq!(chart.num_edges(), 1, "dominated derivations must not pile up");

    // a different key is a different item
    assert!(chart.add_edge(edge(2, 0, 3, 2, 0, -9.0)).is_new());
    assert_eq!(chart.num_edges(), 2);
  }

  #[test]
  fn test_built_flags_and_real_index() {
    let mut chart = HookChart::new();
    let id = chart.add_edge(edge(4, 1, 3, 2, 0, -1.0)).id().unwrap();
    chart.register_real_edge(id);

    assert!(chart.is_built_l(4, 1));
    assert!(chart.is_built_r(4, 3));
    assert!(!chart.is_built_l(4, 2));
    assert!(!chart.is_built_r(5, 3));

    // the coarse index ignores head and tag
    assert_eq!(chart.real_edges_with_l(4, 1), &[id]);
    assert_eq!(chart.real_edges_with_r(4, 3), &[id]);
    assert!(chart.real_edges_with_l(4, 0).is_empty());
  }
}
