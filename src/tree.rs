use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use regex::Regex;

use crate::error::ParserError;

/// A phrase-structure tree over string labels, still in whatever binarized
/// or annotated form the grammar uses. Debinarization to evaluation form is
/// a separate collaborator's job.
#[derive(Debug, Clone, PartialEq)]
pub enum Tree {
  Branch { label: String, children: Vec<Tree> },
  Leaf { word: String },
}

impl Tree {
  pub fn branch(label: impl Into<String>, children: Vec<Tree>) -> Self {
    Self::Branch { label: label.into(), children }
  }

  pub fn leaf(word: impl Into<String>) -> Self {
    Self::Leaf { word: word.into() }
  }

  pub fn is_leaf(&self) -> bool {
    matches!(self, Self::Leaf { .. })
  }

  /// A preterminal is a branch whose only child is a leaf: `(DT The)`.
  pub fn is_preterminal(&self) -> bool {
    match self {
      Self::Branch { children, .. } => children.len() == 1 && children[0].is_leaf(),
      Self::Leaf { .. } => false,
    }
  }

  pub fn label(&self) -> Option<&str> {
    match self {
      Self::Branch { label, .. } => Some(label),
      Self::Leaf { .. } => None,
    }
  }

  pub fn word(&self) -> Option<&str> {
    match self {
      Self::Leaf { word } => Some(word),
      Self::Branch { .. } => None,
    }
  }

  pub fn children(&self) -> &[Tree] {
    match self {
      Self::Branch { children, .. } => children,
      Self::Leaf { .. } => &[],
    }
  }

  /// The terminal words, left to right.
  pub fn yield_words(&self) -> Vec<&str> {
    let mut out = Vec::new();
    self.collect_words(&mut out);
    out
  }

  fn collect_words<'a>(&'a self, out: &mut Vec<&'a str>) {
    match self {
      Self::Leaf { word } => out.push(word),
      Self::Branch { children, .. } => {
        for c in children {
          c.collect_words(out);
        }
      }
    }
  }

  /// The (word, preterminal) pairs, left to right. A leaf with no
  /// preterminal parent yields the pair with an empty tag, which training
  /// rejects.
  pub fn tagged_yield(&self) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    self.collect_tagged(&mut out, "");
    out
  }

  fn collect_tagged<'a>(&'a self, out: &mut Vec<(&'a str, &'a str)>, tag: &'a str) {
    match self {
      Self::Leaf { word } => out.push((word, tag)),
      Self::Branch { label, children } => {
        for c in children {
          c.collect_tagged(out, label);
        }
      }
    }
  }

  pub fn map_labels(&self, f: &impl Fn(&str) -> String) -> Tree {
    match self {
      Self::Leaf { word } => Self::leaf(word.clone()),
      Self::Branch { label, children } => Self::Branch {
        label: f(label),
        children: children.iter().map(|c| c.map_labels(f)).collect(),
      },
    }
  }
}

impl fmt::Display for Tree {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Leaf { word } => write!(f, "{}", word),
      Self::Branch { label, children } => {
        write!(f, "({}", label)?;
        for c in children {
          write!(f, " {}", c)?;
        }
        write!(f, ")")
      }
    }
  }
}

/// A tree with the log score its parser assigned. Ordered by score alone
/// (total order over doubles), so it can live in beams and sorted lists.
#[derive(Debug, Clone)]
pub struct ScoredTree {
  pub tree: Tree,
  pub score: f64,
}

impl ScoredTree {
  pub fn new(tree: Tree, score: f64) -> Self {
    Self { tree, score }
  }
}

impl PartialEq for ScoredTree {
  fn eq(&self, other: &Self) -> bool {
    self.score.total_cmp(&other.score) == Ordering::Equal
  }
}

impl Eq for ScoredTree {}

impl Ord for ScoredTree {
  fn cmp(&self, other: &Self) -> Ordering {
    self.score.total_cmp(&other.score)
  }
}

impl PartialOrd for ScoredTree {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

type ParseResult<'a, T> = Result<(T, &'a str), ParserError>;

/// helper macro for initializing a regex with lazy_static!
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}

/// Try to consume a regex at the start of `s`, returning None if it doesn't
/// match there.
fn optional_re<'a>(re: &'static Regex, s: &'a str) -> (Option<&'a str>, &'a str) {
  if let Some(m) = re.find(s) {
    if m.start() > 0 {
      return (None, s);
    }
    let (_, rest) = s.split_at(m.end());
    (Some(m.as_str()), rest)
  } else {
    (None, s)
  }
}

fn skip_whitespace(s: &str) -> &str {
  regex_static!(WHITESPACE, r"\s+");
  optional_re(&WHITESPACE, s).1
}

/// A label or terminal token: anything up to whitespace or a paren.
fn parse_token(s: &str) -> ParseResult<&str> {
  regex_static!(TOKEN, r"[^\s()]+");
  match optional_re(&TOKEN, s) {
    (Some(t), rest) => Ok((t, rest)),
    (None, _) => Err(ParserError::MalformedTree(format!(
      "expected a token at {:?}",
      truncate(s)
    ))),
  }
}

fn parse_node(s: &str) -> ParseResult<Tree> {
  let s = skip_whitespace(s);
  if let Some(rest) = s.strip_prefix('(') {
    let rest = skip_whitespace(rest);
    let (label, rest) = parse_token(rest)?;

    let mut children = Vec::new();
    let mut rem = rest;
    loop {
      rem = skip_whitespace(rem);
      if let Some(after) = rem.strip_prefix(')') {
        if children.is_empty() {
          return Err(ParserError::MalformedTree(format!("empty node {}", label)));
        }
        return Ok((Tree::branch(label, children), after));
      }
      if rem.is_empty() {
        return Err(ParserError::MalformedTree(format!("unclosed node {}", label)));
      }
      let (child, rest) = parse_node(rem)?;
      children.push(child);
      rem = rest;
    }
  } else {
    let (word, rest) = parse_token(s)?;
    Ok((Tree::leaf(word), rest))
  }
}

fn truncate(s: &str) -> &str {
  let end = s.char_indices().nth(24).map(|(i, _)| i).unwrap_or(s.len());
  &s[..end]
}

impl FromStr for Tree {
  type Err = ParserError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (tree, rest) = parse_node(s)?;
    let rest = skip_whitespace(rest);
    if !rest.is_empty() {
      return Err(ParserError::MalformedTree(format!(
        "trailing input at {:?}",
        truncate(rest)
      )));
    }
    if tree.is_leaf() {
      return Err(ParserError::MalformedTree("bare token is not a tree".to_string()));
    }
    Ok(tree)
  }
}

/// Reads every tree in a bracketed-treebank string.
pub fn read_trees(s: &str) -> Result<Vec<Tree>, ParserError> {
  let mut trees = Vec::new();
  let mut rem = skip_whitespace(s);
  while !rem.is_empty() {
    let (tree, rest) = parse_node(rem)?;
    if tree.is_leaf() {
      return Err(ParserError::MalformedTree("bare token between trees".to_string()));
    }
    trees.push(tree);
    rem = skip_whitespace(rest);
  }
  Ok(trees)
}

#[test]
fn test_read_and_display_round() {
  let src = "(ROOT (S (NP (DT The) (NN dog)) (VP (VBD barked))))";
  let t: Tree = src.parse().unwrap();

  assert_eq!(t.label(), Some("ROOT"));
  assert_eq!(t.yield_words(), vec!["The", "dog", "barked"]);
  assert_eq!(
    t.tagged_yield(),
    vec![("The", "DT"), ("dog", "NN"), ("barked", "VBD")]
  );
  assert_eq!(format!("{}", t), src);
}

#[test]
fn test_read_rejects_malformed() {
  assert!("(S (NP".parse::<Tree>().is_err());
  assert!("(S)".parse::<Tree>().is_err());
  assert!("word".parse::<Tree>().is_err());
  assert!("(S x) trailing (".parse::<Tree>().is_err());
}

#[test]
fn test_read_trees_multiple() {
  let src = "(S (A x))\n  (S (B y))";
  let trees = read_trees(src).unwrap();
  assert_eq!(trees.len(), 2);
  assert_eq!(trees[1].yield_words(), vec!["y"]);
}

#[test]
fn test_preterminal() {
  let t: Tree = "(S (NP (DT The)))".parse().unwrap();
  assert!(!t.is_preterminal());
  assert!(t.children()[0].children()[0].is_preterminal());
}
