//! chartwell: a lexicalized statistical constituency parser.
//!
//! A trained [`Model`] bundles the frozen string indices, the PCFG rule
//! containers, the lexicon with its unknown-word model, and the binned
//! dependency grammar. Parsing drivers borrow a model read-only, so one
//! model can serve concurrent parses as long as each parse owns its own
//! per-sentence chart state; training itself is single-threaded and
//! happens once, before any parsing.

#[macro_use]
extern crate lazy_static;

pub mod beam;
pub mod bilex;
pub mod chart;
pub mod dependency;
pub mod error;
pub mod factored;
pub mod grammar;
pub mod index;
pub mod item;
pub mod lang;
pub mod lattice;
pub mod lexicon;
pub mod pcfg;
pub mod rerank;
pub mod rules;
pub mod tree;
pub mod unknown;

use tracing::debug;

use crate::dependency::{DependencyOptions, MleDependencyGrammar};
use crate::grammar::{Grammar, GrammarExtractor};
use crate::index::Index;
use crate::lang::{HeadFinder, PennLanguagePack, TreebankLanguagePack};
use crate::lexicon::{Lexicon, LexiconOptions};
use crate::rules::State;

pub use crate::error::{ParserError, Result};
pub use crate::tree::{ScoredTree, Tree};

#[derive(Debug, Clone, Default)]
pub struct TrainOptions {
  pub lexicon: LexiconOptions,
  pub dependencies: DependencyOptions,
}

/// A trained parsing model. Everything here is frozen after `train`
/// returns; parser queries only ever read it.
pub struct Model {
  pub words: Index,
  pub tags: Index,
  pub states: Index,
  /// Maps each tag id to the grammar state its preterminal uses.
  pub tag_state: Vec<State>,
  pub boundary_word: usize,
  pub boundary_tag: usize,
  pub grammar: Grammar,
  pub lexicon: Lexicon,
  pub deps: MleDependencyGrammar,
  pub pack: PennLanguagePack,
  pub head_finder: HeadFinder,
}

impl Model {
  /// Trains every component on the same binarized treebank trees, then
  /// freezes the result.
  pub fn train(trees: &[Tree], opts: TrainOptions) -> Result<Model> {
    let pack = PennLanguagePack::new();
    let head_finder = HeadFinder::penn();
    let mut words = Index::new();
    let mut tags = Index::new();
    let mut states = Index::new();

    let boundary_word = words.add(pack.boundary_word());
    let boundary_tag = tags.add(pack.boundary_tag());

    let mut lexicon = Lexicon::new(opts.lexicon.clone(), boundary_tag);
    let mut extractor = GrammarExtractor::new();
    for tree in trees {
      lexicon.train(tree, 1.0, &mut words, &mut tags)?;
      extractor.train(tree, 1.0, &mut states)?;
    }
    lexicon.finish_training(&tags);
    let grammar = extractor.extract()?;

    // every tag doubles as a preterminal grammar state
    let mut tag_state = Vec::with_capacity(tags.len());
    for (_, tag) in tags.iter() {
      tag_state.push(states.add(tag));
    }

    // tag bins are fixed against the now-complete tag index
    let mut deps = MleDependencyGrammar::new(opts.dependencies.clone(), &tags, boundary_tag);
    for tree in trees {
      deps.train(tree, 1.0, &mut words, &mut tags, &head_finder, &pack)?;
    }
    deps.finish_training();

    debug!(
      words = words.len(),
      tags = tags.len(),
      states = states.len(),
      trees = trees.len(),
      "trained model"
    );

    Ok(Model {
      words,
      tags,
      states,
      tag_state,
      boundary_word,
      boundary_tag,
      grammar,
      lexicon,
      deps,
      pack,
      head_finder,
    })
  }
}

#[test]
fn test_scenario_single_tree_round_trip() {
  let tree: Tree = "(ROOT (S (NP (DT The) (NN dog)) (VP (VBD barked))))".parse().unwrap();
  let model = Model::train(std::slice::from_ref(&tree), TrainOptions::default()).unwrap();

  let parser = bilex::BilexParser::new(&model);
  let best = parser.parse(&["The", "dog", "barked"]).expect("training sentence must parse");

  assert_eq!(best.tree.label(), Some("ROOT"));
  assert_eq!(best.tree.yield_words(), vec!["The", "dog", "barked"]);
  assert_eq!(format!("{}", best.tree), format!("{}", tree));
}

#[test]
fn test_scenario_unknown_word_is_recoverable() {
  let tree: Tree = "(ROOT (S (NP (DT The) (NN dog)) (VP (VBD barked))))".parse().unwrap();
  let model = Model::train(std::slice::from_ref(&tree), TrainOptions::default()).unwrap();

  // the lexicon itself must hand out a finite score for some tag
  let vbd = model.tags.index_of("VBD").unwrap();
  assert!(model.lexicon.score(-1, vbd, 2, "meowed").is_finite());

  let mut parser = factored::FastFactoredParser::new(&model, 2);
  assert!(parser.parse(&["The", "dog", "meowed"]).unwrap());
  let best = parser.best_parse().unwrap();
  assert_eq!(best.tree.yield_words(), vec!["The", "dog", "meowed"]);
}

#[test]
fn test_scenario_k_best_and_capacity() {
  let srcs = [
    "(ROOT (A (A (X x) (X x)) (X x)))",
    "(ROOT (A (X x) (A (X x) (X x))))",
  ];
  let trees: Vec<Tree> = srcs.iter().map(|s| s.parse().unwrap()).collect();
  let model = Model::train(&trees, TrainOptions::default()).unwrap();

  let mut parser = factored::FastFactoredParser::new(&model, 3);
  assert!(parser.parse(&["x", "x", "x"]).unwrap());

  let kbest = parser.k_best_parses(3);
  assert!(kbest.len() <= 3);
  for w in kbest.windows(2) {
    assert!(w[0].score >= w[1].score, "k-best must be non-increasing");
  }

  let retained = parser.num_retained();
  assert!(matches!(
    parser.k_good_parses(retained + 2),
    Err(ParserError::Capacity { .. })
  ));
}

#[test]
fn test_training_is_deterministic() {
  let tree: Tree = "(ROOT (S (NP (DT The) (NN dog)) (VP (VBD barked))))".parse().unwrap();
  let m1 = Model::train(std::slice::from_ref(&tree), TrainOptions::default()).unwrap();
  let m2 = Model::train(std::slice::from_ref(&tree), TrainOptions::default()).unwrap();

  let p1 = bilex::BilexParser::new(&m1).parse(&["The", "dog", "barked"]).unwrap();
  let p2 = bilex::BilexParser::new(&m2).parse(&["The", "dog", "barked"]).unwrap();
  assert_eq!(p1.score, p2.score);
  assert_eq!(format!("{}", p1.tree), format!("{}", p2.tree));
}
