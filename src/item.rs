use std::fmt;

use crate::rules::State;

/// Arena index of an [`Edge`]. Back-pointers between items are these ids
/// rather than object references; the arena is dropped wholesale when the
/// sentence's parse ends.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct EdgeId(pub u32);

/// Arena index of a [`Hook`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct HookId(pub u32);

/// A complete constituent: `state` spans `[start, end)` headed by the word
/// at `head` carrying `tag`. `iscore` is the inside score, the
/// log-probability of the best derivation producing this item.
///
/// Back-pointers record how the best derivation was built: a hook
/// completion sets both `back_hook` and `back_edge` (the head child), a
/// unary expansion sets only `back_edge`, and a lexical leaf sets neither.
#[derive(Debug, Clone)]
pub struct Edge {
  pub state: State,
  pub start: usize,
  pub end: usize,
  pub head: usize,
  pub tag: usize,
  pub iscore: f64,
  pub back_hook: Option<HookId>,
  pub back_edge: Option<EdgeId>,
}

impl Edge {
  pub fn key(&self) -> EdgeKey {
    (self.state, self.start, self.end, self.head, self.tag)
  }

  pub fn is_lexical(&self) -> bool {
    self.back_hook.is_none() && self.back_edge.is_none()
  }
}

impl fmt::Display for Edge {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "Edge[{}..{}: s{} h{}/t{} = {:.4}]",
      self.start, self.end, self.state, self.head, self.tag, self.iscore
    )
  }
}

/// A partial constituent: everything of a `state` constituent except one
/// adjacent child of state `sub_state`, which must carry the head word at
/// `head`. The head always lies outside `[start, end)`; which side it is
/// on determines the hook's role.
///
/// `back_edge` is the argument edge the hook was built over.
#[derive(Debug, Clone)]
pub struct Hook {
  pub state: State,
  pub sub_state: State,
  pub start: usize,
  pub end: usize,
  pub head: usize,
  pub tag: usize,
  pub iscore: f64,
  pub back_edge: EdgeId,
}

impl Hook {
  /// Missing its head child to the left: the head lies before the span.
  pub fn is_pre_hook(&self) -> bool {
    self.head < self.start
  }

  /// Missing its head child to the right: the head lies at or after the
  /// span end.
  pub fn is_post_hook(&self) -> bool {
    self.head >= self.end
  }

  pub fn key(&self) -> HookKey {
    (self.state, self.sub_state, self.start, self.end, self.head, self.tag)
  }
}

impl fmt::Display for Hook {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let role = if self.is_pre_hook() { "pre" } else { "post" };
    write!(
      f,
      "Hook[{}..{}: s{} needs s{} h{}/t{} {} = {:.4}]",
      self.start, self.end, self.state, self.sub_state, self.head, self.tag, role, self.iscore
    )
  }
}

pub type EdgeKey = (State, usize, usize, usize, usize);
pub type HookKey = (State, State, usize, usize, usize, usize);

/// Per-sentence storage for all items. Ids are stable for the arena's
/// lifetime, so improving an item in place keeps every index entry valid.
#[derive(Debug, Default)]
pub struct ItemArena {
  edges: Vec<Edge>,
  hooks: Vec<Hook>,
}

impl ItemArena {
  pub fn new() -> Self {
    Default::default()
  }

  pub fn push_edge(&mut self, edge: Edge) -> EdgeId {
    let id = EdgeId(self.edges.len() as u32);
    self.edges.push(edge);
    id
  }

  pub fn push_hook(&mut self, hook: Hook) -> HookId {
    debug_assert!(
      hook.is_pre_hook() != hook.is_post_hook(),
      "hook head must lie outside the span: {}",
      hook
    );
    let id = HookId(self.hooks.len() as u32);
    self.hooks.push(hook);
    id
  }

  pub fn edge(&self, id: EdgeId) -> &Edge {
    &self.edges[id.0 as usize]
  }

  pub fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
    &mut self.edges[id.0 as usize]
  }

  pub fn hook(&self, id: HookId) -> &Hook {
    &self.hooks[id.0 as usize]
  }

  pub fn hook_mut(&mut self, id: HookId) -> &mut Hook {
    &mut self.hooks[id.0 as usize]
  }

  pub fn num_edges(&self) -> usize {
    self.edges.len()
  }

  pub fn num_hooks(&self) -> usize {
    self.hooks.len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn hook_at(start: usize, end: usize, head: usize) -> Hook {
    Hook {
      state: 0,
      sub_state: 1,
      start,
      end,
      head,
      tag: 0,
      iscore: -1.0,
      back_edge: EdgeId(0),
    }
  }

  #[test]
  fn test_hook_role_is_derived_from_head() {
    for (start, end, head) in [(2, 4, 0), (2, 4, 1), (2, 4, 4), (2, 4, 7), (0, 1, 1)] {
      let h = hook_at(start, end, head);
      assert_eq!(h.is_pre_hook(), head < start);
      assert_eq!(h.is_post_hook(), head >= end);
      assert!(h.is_pre_hook() != h.is_post_hook());
    }
  }

  #[test]
  fn test_arena_ids_are_stable() {
    let mut arena = ItemArena::new();
    let e = Edge {
      state: 3,
      start: 0,
      end: 1,
      head: 0,
      tag: 2,
      iscore: -0.5,
      back_hook: None,
      back_edge: None,
    };
    let id = arena.push_edge(e.clone());
    let id2 = arena.push_edge(e);

    assert_ne!(id, id2);
    arena.edge_mut(id).iscore = -0.25;
    assert_eq!(arena.edge(id).iscore, -0.25);
    assert_eq!(arena.edge(id2).iscore, -0.5);
    assert!(arena.edge(id).is_lexical());
  }
}
