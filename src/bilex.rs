use rustc_hash::FxHashMap;
use tracing::debug;

use crate::chart::{Added, HookChart};
use crate::dependency::DepCache;
use crate::item::{Edge, EdgeId, Hook};
use crate::rules::{IntDependency, IntTaggedWord};
use crate::tree::{ScoredTree, Tree};
use crate::Model;

type Cells = FxHashMap<(usize, usize), Vec<EdgeId>>;

/// Exhaustive lexicalized parsing via the Eisner--Satta reduction: a
/// binary combination never joins two complete edges over two free head
/// positions. Instead the argument edge and the rule first form a hook for
/// each candidate head outside the span (paying the dependency score
/// there), and a hook later joins the one head-child edge that matches its
/// completion key. That caps the work at O(n^4) instead of O(n^5).
pub struct BilexParser<'a> {
  model: &'a Model,
}

impl<'a> BilexParser<'a> {
  pub fn new(model: &'a Model) -> Self {
    Self { model }
  }

  /// Viterbi parse of one sentence under the combined PCFG + dependency
  /// model. `None` when no edge covers the input at the goal state.
  pub fn parse(&self, sentence: &[&str]) -> Option<ScoredTree> {
    let model = self.model;
    let n = sentence.len();
    if n == 0 {
      return None;
    }

    let word_ids: Vec<i32> = sentence
      .iter()
      .map(|w| model.words.index_of(w).map(|x| x as i32).unwrap_or(-1))
      .collect();

    // candidate (tag, lexical score) lists per position
    let mut tags_at: Vec<Vec<(usize, f64)>> = Vec::with_capacity(n);
    for (i, word) in sentence.iter().enumerate() {
      let candidates: Vec<usize> = match model.lexicon.tags_for(word_ids[i]) {
        Some(ts) => ts.to_vec(),
        None => (0..model.tags.len()).filter(|&t| t != model.boundary_tag).collect(),
      };
      let scored: Vec<(usize, f64)> = candidates
        .into_iter()
        .filter_map(|t| {
          let s = model.lexicon.score(word_ids[i], t, i, word);
          s.is_finite().then_some((t, s))
        })
        .collect();
      tags_at.push(scored);
    }

    let mut chart = HookChart::new();
    let mut cells: Cells = FxHashMap::default();
    let mut dep_cache = DepCache::new();

    // lexical leaves
    for h in 0..n {
      for &(t, s) in &tags_at[h] {
        let edge = Edge {
          state: model.tag_state[t],
          start: h,
          end: h + 1,
          head: h,
          tag: t,
          iscore: s,
          back_hook: None,
          back_edge: None,
        };
        let added = chart.add_edge(edge);
        track(&mut chart, &mut cells, added);
      }
    }
    for h in 0..n {
      close_cell(model, &mut chart, &mut cells, h, h + 1);
    }
    for h in 0..n {
      let snapshot = cells.get(&(h, h + 1)).cloned().unwrap_or_default();
      for eid in snapshot {
        make_hooks(model, &mut chart, &mut dep_cache, &word_ids, &tags_at, n, eid);
      }
    }

    for width in 2..=n {
      for i in 0..=(n - width) {
        let j = i + width;
        complete_span(&mut chart, &mut cells, i, j);
        close_cell(model, &mut chart, &mut cells, i, j);
        let snapshot = cells.get(&(i, j)).cloned().unwrap_or_default();
        for eid in snapshot {
          make_hooks(model, &mut chart, &mut dep_cache, &word_ids, &tags_at, n, eid);
        }
      }
    }

    debug!(
      n,
      edges = chart.num_edges(),
      hooks = chart.num_hooks(),
      dep_queries = dep_cache.len(),
      "bilex chart filled"
    );

    // goal: the best root-state edge over the full span, plus the root
    // dependency against the boundary word
    let mut best: Option<(EdgeId, f64)> = None;
    for &eid in chart.real_edges_with_l(model.grammar.root, 0) {
      let e = chart.edge(eid);
      if e.end != n {
        continue;
      }
      let root_dep = IntDependency::new(
        IntTaggedWord::new(model.boundary_word as i32, model.boundary_tag as i32),
        IntTaggedWord::new(word_ids[e.head], e.tag as i32),
        true,
        (n - e.head) as i16,
      );
      let total = e.iscore + dep_cache.score(&model.deps, root_dep);
      if best.map(|(_, s)| total > s).unwrap_or(true) {
        best = Some((eid, total));
      }
    }

    best.map(|(eid, score)| ScoredTree::new(recover(model, &chart, sentence, eid), score))
  }
}

/// Registers a freshly added edge in the coarse index and remembers it in
/// its span cell.
fn track(chart: &mut HookChart, cells: &mut Cells, added: Added<EdgeId>) {
  if let Added::New(id) = added {
    chart.register_real_edge(id);
    let e = chart.edge(id);
    cells.entry((e.start, e.end)).or_default().push(id);
  }
}

/// Unary closure over one cell: a growing worklist, re-processing an edge
/// whenever its score improves. Strict improvement is required to
/// re-enqueue, so zero-cost unary cycles cannot loop.
fn close_cell(model: &Model, chart: &mut HookChart, cells: &mut Cells, i: usize, j: usize) {
  let mut queue: Vec<EdgeId> = cells.get(&(i, j)).cloned().unwrap_or_default();
  let mut qi = 0;
  while qi < queue.len() {
    let eid = queue[qi];
    qi += 1;
    let (state, head, tag, iscore) = {
      let e = chart.edge(eid);
      (e.state, e.head, e.tag, e.iscore)
    };
    let rules: Vec<_> = model.grammar.unary.rules_by_child(state).to_vec();
    for rule in rules {
      let cand = Edge {
        state: rule.parent,
        start: i,
        end: j,
        head,
        tag,
        iscore: iscore + rule.score,
        back_hook: None,
        back_edge: Some(eid),
      };
      match chart.add_edge(cand) {
        Added::New(id) => {
          chart.register_real_edge(id);
          cells.entry((i, j)).or_default().push(id);
          queue.push(id);
        }
        Added::Improved(id) => queue.push(id),
        Added::Dominated => {}
      }
    }
  }
}

/// Binary completions for span `[i, j)`: head children from smaller cells
/// joined against the hooks waiting for them at the adjacent boundary.
fn complete_span(chart: &mut HookChart, cells: &mut Cells, i: usize, j: usize) {
  for m in (i + 1)..j {
    // head child on the left completes pre-hooks spanning [m, j)
    let lefts = cells.get(&(i, m)).cloned().unwrap_or_default();
    for lid in lefts {
      let l = chart.edge(lid).clone();
      let hooks: Vec<_> = chart.pre_hooks_for(&l).to_vec();
      for hid in hooks {
        let hk = chart.hook(hid).clone();
        if hk.end != j {
          continue;
        }
        let edge = Edge {
          state: hk.state,
          start: i,
          end: j,
          head: hk.head,
          tag: hk.tag,
          iscore: l.iscore + hk.iscore,
          back_hook: Some(hid),
          back_edge: Some(lid),
        };
        let added = chart.add_edge(edge);
        track(chart, cells, added);
      }
    }

    // head child on the right completes post-hooks spanning [i, m)
    let rights = cells.get(&(m, j)).cloned().unwrap_or_default();
    for rid in rights {
      let r = chart.edge(rid).clone();
      let hooks: Vec<_> = chart.post_hooks_for(&r).to_vec();
      for hid in hooks {
        let hk = chart.hook(hid).clone();
        if hk.start != i {
          continue;
        }
        let edge = Edge {
          state: hk.state,
          start: i,
          end: j,
          head: hk.head,
          tag: hk.tag,
          iscore: r.iscore + hk.iscore,
          back_hook: Some(hid),
          back_edge: Some(rid),
        };
        let added = chart.add_edge(edge);
        track(chart, cells, added);
      }
    }
  }
}

/// Registers the hooks a finished argument edge gives rise to: one per
/// rule using it as the non-head child and per candidate (head, tag) pair
/// outside its span. The dependency attachment is paid here, so the later
/// completion is a pure score addition.
fn make_hooks(
  model: &Model,
  chart: &mut HookChart,
  dep_cache: &mut DepCache,
  word_ids: &[i32],
  tags_at: &[Vec<(usize, f64)>],
  n: usize,
  eid: EdgeId,
) {
  let e = chart.edge(eid).clone();

  // e as right child: the head child is to the left (pre-hook)
  let rules: Vec<_> = model.grammar.binary.rules_by_right(e.state).to_vec();
  for rule in rules {
    for h in 0..e.start {
      for &(t, _) in &tags_at[h] {
        if !chart.is_built_l(model.tag_state[t], h) {
          continue;
        }
        let dep = IntDependency::new(
          IntTaggedWord::new(word_ids[h], t as i32),
          IntTaggedWord::new(word_ids[e.head], e.tag as i32),
          false,
          (e.head - h) as i16,
        );
        let dscore = dep_cache.score(&model.deps, dep);
        chart.add_hook(Hook {
          state: rule.parent,
          sub_state: rule.left,
          start: e.start,
          end: e.end,
          head: h,
          tag: t,
          iscore: rule.score + e.iscore + dscore,
          back_edge: eid,
        });
      }
    }
  }

  // e as left child: the head child is to the right (post-hook)
  let rules: Vec<_> = model.grammar.binary.rules_by_left(e.state).to_vec();
  for rule in rules {
    for h in e.end..n {
      for &(t, _) in &tags_at[h] {
        if !chart.is_built_l(model.tag_state[t], h) {
          continue;
        }
        let dep = IntDependency::new(
          IntTaggedWord::new(word_ids[h], t as i32),
          IntTaggedWord::new(word_ids[e.head], e.tag as i32),
          true,
          (h - e.head) as i16,
        );
        let dscore = dep_cache.score(&model.deps, dep);
        chart.add_hook(Hook {
          state: rule.parent,
          sub_state: rule.right,
          start: e.start,
          end: e.end,
          head: h,
          tag: t,
          iscore: rule.score + e.iscore + dscore,
          back_edge: eid,
        });
      }
    }
  }
}

/// Walks the back-pointer DAG from a goal edge back into a tree.
fn recover(model: &Model, chart: &HookChart, sentence: &[&str], eid: EdgeId) -> Tree {
  let e = chart.edge(eid);
  let label = model
    .states
    .get(e.state)
    .expect("state missing from index")
    .to_string();
  match (e.back_hook, e.back_edge) {
    (None, None) => Tree::branch(label, vec![Tree::leaf(sentence[e.start])]),
    (None, Some(child)) => Tree::branch(label, vec![recover(model, chart, sentence, child)]),
    (Some(hid), Some(head_child)) => {
      let hk = chart.hook(hid);
      let arg = recover(model, chart, sentence, hk.back_edge);
      let head = recover(model, chart, sentence, head_child);
      let children = if hk.is_pre_hook() { vec![head, arg] } else { vec![arg, head] };
      Tree::branch(label, children)
    }
    (Some(_), None) => unreachable!("hook completion always records its head child"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::TrainOptions;

  fn model(srcs: &[&str]) -> Model {
    let trees: Vec<Tree> = srcs.iter().map(|s| s.parse().unwrap()).collect();
    Model::train(&trees, TrainOptions::default()).unwrap()
  }

  #[test]
  fn test_recovers_training_tree() {
    let m = model(&["(ROOT (S (NP (DT The) (NN dog)) (VP (VBD barked))))"]);
    let p = BilexParser::new(&m);

    let best = p.parse(&["The", "dog", "barked"]).expect("sentence must parse");
    assert_eq!(best.tree.label(), Some("ROOT"));
    assert_eq!(best.tree.yield_words(), vec!["The", "dog", "barked"]);
    assert_eq!(
      format!("{}", best.tree),
      "(ROOT (S (NP (DT The) (NN dog)) (VP (VBD barked))))"
    );
    assert!(best.score.is_finite());
  }

  #[test]
  fn test_unknown_word_still_parses() {
    let m = model(&["(ROOT (S (NP (DT The) (NN dog)) (VP (VBD barked))))"]);
    let p = BilexParser::new(&m);

    let best = p.parse(&["The", "dog", "meowed"]).expect("unknown verb must not kill the parse");
    assert_eq!(best.tree.yield_words(), vec!["The", "dog", "meowed"]);
    assert!(best.score.is_finite());
  }

  #[test]
  fn test_empty_and_hopeless_inputs_report_no_parse() {
    let m = model(&["(ROOT (S (NP (DT The) (NN dog)) (VP (VBD barked))))"]);
    let p = BilexParser::new(&m);
    assert!(p.parse(&[]).is_none());
    // a single determiner cannot reach ROOT
    assert!(p.parse(&["The"]).is_none());
  }

  #[test]
  fn test_agrees_with_viterbi_on_unambiguous_input() {
    // with a deterministic grammar the lexicalized parse must match the
    // plain PCFG structure
    let m = model(&["(ROOT (S (NP (DT a) (NN cat)) (VP (VBD sat))))"]);
    let p = BilexParser::new(&m);
    let mut q = crate::pcfg::PcfgParserQuery::new(&m, 1);

    let lexicalized = p.parse(&["a", "cat", "sat"]).unwrap();
    assert!(q.parse(&["a", "cat", "sat"]));
    let plain = q.best_parse().unwrap();
    assert_eq!(format!("{}", lexicalized.tree), format!("{}", plain.tree));
  }
}
