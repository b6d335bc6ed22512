use thiserror::Error;

/// Errors surfaced by training and parsing entry points.
///
/// "No parse found" is deliberately absent: an unparseable sentence is a
/// normal outcome and is reported through boolean / empty-result contracts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParserError {
  /// An optional operation not implemented by this grammar/lexicon variant.
  #[error("operation not supported: {0}")]
  Unsupported(&'static str),

  /// More k-best / k-good parses were requested than were retained.
  #[error("requested {requested} parses but only {retained} were retained")]
  Capacity { requested: usize, retained: usize },

  /// An external cancellation signal fired during a parse.
  #[error("parse interrupted")]
  Interrupted,

  /// A tree could not be read or has a shape the component cannot consume.
  #[error("malformed tree: {0}")]
  MalformedTree(String),

  /// An integer that was never assigned by the relevant index.
  #[error("index {0} was never assigned")]
  UnknownIndex(usize),
}

pub type Result<T> = std::result::Result<T, ParserError>;
