use rustc_hash::FxHashMap;

/// Synthetic word appended after the last token; heads the sentence-root
/// dependency.
pub const BOUNDARY_WORD: &str = ".$.";
/// Tag of the boundary word. Excluded from unknown-word fallbacks.
pub const BOUNDARY_TAG: &str = ".$$.";

/// What the core needs to know about a treebank's conventions. Everything
/// else about a language lives in excluded collaborators.
pub trait TreebankLanguagePack {
  /// Strips binarization and annotation decorations from a label:
  /// a leading `@` (binarization continuation) and anything after the
  /// first of `^`, `=`, `|`, or a non-leading `-`.
  fn basic_category<'a>(&self, label: &'a str) -> &'a str {
    let stripped = label.strip_prefix('@').unwrap_or(label);
    let mut end = stripped.len();
    for (i, c) in stripped.char_indices() {
      let cut = match c {
        '^' | '=' | '|' => true,
        '-' => i > 0,
        _ => false,
      };
      if cut {
        end = i;
        break;
      }
    }
    &stripped[..end]
  }

  fn is_punctuation_tag(&self, tag: &str) -> bool;

  fn boundary_word(&self) -> &'static str {
    BOUNDARY_WORD
  }

  fn boundary_tag(&self) -> &'static str {
    BOUNDARY_TAG
  }
}

/// Penn-treebank conventions.
#[derive(Debug, Default, Clone)]
pub struct PennLanguagePack;

impl PennLanguagePack {
  pub fn new() -> Self {
    Self
  }
}

impl TreebankLanguagePack for PennLanguagePack {
  fn is_punctuation_tag(&self, tag: &str) -> bool {
    matches!(tag, "." | "," | ":" | "``" | "''" | "-LRB-" | "-RRB-" | "#" | "$")
  }
}

#[derive(Debug, Copy, Clone, PartialEq)]
enum HeadSide {
  Left,
  Right,
}

/// Collins-style head finder over local trees.
///
/// For each category, a scan direction and a priority list of child
/// categories: the first priority item matching any child (scanned in the
/// category's direction) names the head. Binarized nodes are handled before
/// the table: a child carrying the `@` continuation marker is the head
/// unconditionally, since binarization threads the head through it.
pub struct HeadFinder {
  rules: FxHashMap<&'static str, (HeadSide, Vec<&'static str>)>,
}

impl HeadFinder {
  pub fn penn() -> Self {
    let mut rules = FxHashMap::default();
    let mut put = |cat, side, prio: &[&'static str]| {
      rules.insert(cat, (side, prio.to_vec()));
    };

    put("S", HeadSide::Left, &["VP", "S", "SBAR", "ADJP", "UCP", "NP"]);
    put("SBAR", HeadSide::Left, &[
      "WHNP", "WHPP", "WHADVP", "WHADJP", "IN", "DT", "S", "SQ", "SINV", "SBAR", "FRAG",
    ]);
    put("SBARQ", HeadSide::Left, &["SQ", "S", "SINV", "SBARQ", "FRAG"]);
    put("SINV", HeadSide::Left, &["VBZ", "VBD", "VBP", "VB", "MD", "VP", "S", "SINV", "ADJP", "NP"]);
    put("SQ", HeadSide::Left, &["VBZ", "VBD", "VBP", "VB", "MD", "VP", "SQ"]);
    put("VP", HeadSide::Left, &[
      "TO", "VBD", "VBN", "MD", "VBZ", "VB", "VBG", "VBP", "VP", "ADJP", "NN", "NNS", "NP",
    ]);
    put("NP", HeadSide::Right, &[
      "NN", "NNS", "NNP", "NNPS", "NX", "POS", "JJR", "NP", "ADJP", "PRN", "CD", "JJ", "JJS",
      "RB", "QP", "PRP",
    ]);
    put("PP", HeadSide::Left, &["IN", "TO", "VBG", "VBN", "RP", "FW"]);
    put("ADJP", HeadSide::Left, &[
      "NNS", "QP", "NN", "ADVP", "JJ", "VBN", "VBG", "ADJP", "JJR", "NP", "JJS", "DT", "FW",
      "RBR", "RBS", "SBAR", "RB",
    ]);
    put("ADVP", HeadSide::Right, &[
      "RB", "RBR", "RBS", "FW", "ADVP", "TO", "CD", "JJR", "JJ", "IN", "NP", "JJS", "NN",
    ]);
    put("QP", HeadSide::Left, &[
      "IN", "NNS", "NN", "JJ", "RB", "DT", "CD", "QP", "JJR", "JJS",
    ]);
    put("WHNP", HeadSide::Right, &["WDT", "WP", "WP$", "WHADJP", "WHPP", "WHNP"]);
    put("WHADVP", HeadSide::Right, &["WRB"]);
    put("WHPP", HeadSide::Left, &["IN", "TO", "FW"]);
    put("PRT", HeadSide::Left, &["RP"]);
    put("CONJP", HeadSide::Right, &["CC", "RB", "IN"]);
    put("FRAG", HeadSide::Right, &[]);
    put("INTJ", HeadSide::Left, &[]);
    put("PRN", HeadSide::Left, &[]);
    put("UCP", HeadSide::Left, &[]);
    put("ROOT", HeadSide::Left, &["S", "SQ", "SINV", "SBAR", "FRAG"]);

    Self { rules }
  }

  /// Picks the head child of a local tree, given the parent label and the
  /// child labels in order. The labels may still carry binarization
  /// decorations.
  pub fn head_child(
    &self,
    pack: &impl TreebankLanguagePack,
    parent: &str,
    children: &[&str],
  ) -> usize {
    assert!(!children.is_empty(), "head of a childless node");
    if children.len() == 1 {
      return 0;
    }

    // the binarization continuation carries the head
    if let Some(i) = children.iter().position(|c| c.starts_with('@')) {
      return i;
    }

    let cat = pack.basic_category(parent);
    let (side, prio) = match self.rules.get(cat) {
      Some(r) => r,
      None => return 0,
    };

    let scan: Vec<usize> = match side {
      HeadSide::Left => (0..children.len()).collect(),
      HeadSide::Right => (0..children.len()).rev().collect(),
    };

    for want in prio {
      for &i in &scan {
        if pack.basic_category(children[i]) == *want {
          return i;
        }
      }
    }

    // no priority item matched: take the first non-punctuation child in
    // scan order, else the first in scan order
    for &i in &scan {
      if !pack.is_punctuation_tag(pack.basic_category(children[i])) {
        return i;
      }
    }
    scan[0]
  }
}
