//! colorcat tokenizes source files using TextMate grammars, intended for
//! syntax highlighting.
//!
//! Workflow:
//! 1) decode a JSON or Plist grammar into [`RawGrammar`]
//! 2) the [`Loader`] compiles it into an executable rule tree
//! 3) a [`Tokenizer`] walks the input and emits scoped [`Token`]s
//! 4) optionally, a [`Mapper`] and a [`Theme`] turn the token stream into
//!    styled change points for a renderer

mod error;
mod grammars;
mod loader;
mod mapper;
mod theme;
mod tokenizer;

pub use error::Error;
pub use grammars::{Grammar, GrammarId, MatchOptions, RawGrammar, RawRule, Reference, Regex, Span};
pub use loader::{GRAMMAR_EXTENSION, Loader};
pub use mapper::Mapper;
pub use theme::{Color, ColorMapping, FontStyle, RawTheme, Style, Theme};
pub use tokenizer::{Stack, StackItem, Token, Tokenizer};
