mod compiled;
mod raw;
mod regex;

pub use compiled::{Grammar, GrammarId};
pub use raw::{RawGrammar, RawRule, Reference};
pub use regex::{MatchOptions, Regex, Span};

pub(crate) use compiled::{Capture, Rule, RuleList};
