use std::fmt;
use std::sync::{Arc, OnceLock};

use onig::{Region, SearchOptions};

use crate::error::{ColorcatResult, Error};

/// Byte range of one capture group within the haystack.
/// Group 0 is the whole match. An empty span is a legal zero-width match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Options for a single match attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// The match position is mid-buffer: begin-of-string anchoring must not
    /// fire. `\A` already fails at a nonzero offset under anchored matching;
    /// `\G` is neutralized through an alternate compiled pattern.
    pub not_begin_position: bool,
}

/// Replace the `\G` anchor with something that is very unlikely to match,
/// keeping literal `\\G` sequences intact.
fn suppress_begin_anchor(pattern: &str) -> String {
    pattern
        .replace("\\\\G", "___TEMP___")
        .replace("\\G", "\u{FFFF}")
        .replace("___TEMP___", "\\\\G")
}

/// A compiled Oniguruma pattern.
///
/// Compilation is eager so grammar errors surface while the grammar is being
/// compiled, not in the middle of tokenizing. The anchor-suppressed variant
/// is compiled on first use since most patterns never need it.
pub struct Regex {
    pattern: String,
    compiled: onig::Regex,
    has_begin_anchor: bool,
    suppressed: OnceLock<Option<Arc<onig::Regex>>>,
}

impl fmt::Debug for Regex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.pattern)
    }
}

impl Regex {
    pub fn new(pattern: &str) -> ColorcatResult<Self> {
        if pattern.is_empty() {
            return Err(Error::GrammarSyntax("empty pattern".to_string()));
        }
        let compiled = onig::Regex::new(pattern)
            .map_err(|err| Error::GrammarSyntax(format!("{}: {}", pattern, err)))?;
        let has_begin_anchor = suppress_begin_anchor(pattern) != pattern;

        Ok(Self {
            pattern: pattern.to_string(),
            compiled,
            has_begin_anchor,
            suppressed: OnceLock::new(),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn suppressed(&self) -> ColorcatResult<&onig::Regex> {
        self.suppressed
            .get_or_init(|| {
                onig::Regex::new(&suppress_begin_anchor(&self.pattern))
                    .ok()
                    .map(Arc::new)
            })
            .as_deref()
            .ok_or_else(|| {
                Error::RegexRuntime(format!("anchor variant of {} was invalid", self.pattern))
            })
    }

    /// Try to match at exactly `at` (anchored, not a search).
    ///
    /// Returns one span per capture group; unmatched groups are `None`.
    /// A zero-width match yields `Some` with an empty group 0, which is
    /// distinct from no match at all.
    pub fn match_at(
        &self,
        text: &str,
        at: usize,
        options: MatchOptions,
    ) -> ColorcatResult<Option<Vec<Option<Span>>>> {
        if text.is_empty() {
            return Ok(None);
        }

        let regex = if options.not_begin_position && self.has_begin_anchor {
            self.suppressed()?
        } else {
            &self.compiled
        };

        let mut region = Region::new();
        let result = regex.match_with_options(
            text,
            at,
            SearchOptions::SEARCH_OPTION_NONE,
            Some(&mut region),
        );
        if result.is_none() {
            return Ok(None);
        }

        let groups = (0..region.len())
            .map(|i| region.pos(i).map(|(start, end)| Span { start, end }))
            .collect();
        Ok(Some(groups))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> MatchOptions {
        MatchOptions {
            not_begin_position: true,
        }
    }

    #[test]
    fn matches_at_position() {
        let re = Regex::new(r"\d+").unwrap();

        let groups = re.match_at("ab12cd", 2, opts()).unwrap().unwrap();
        assert_eq!(groups[0], Some(Span { start: 2, end: 4 }));

        // anchored at `at`, not searching forward
        assert!(re.match_at("ab12cd", 0, opts()).unwrap().is_none());
    }

    #[test]
    fn reports_capture_groups() {
        let re = Regex::new(r"(a)(?:x)?(b)").unwrap();
        let groups = re.match_at("ab", 0, opts()).unwrap().unwrap();

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[1], Some(Span { start: 0, end: 1 }));
        assert_eq!(groups[2], Some(Span { start: 1, end: 2 }));
    }

    #[test]
    fn empty_match_is_not_no_match() {
        let re = Regex::new(r"x?").unwrap();
        let groups = re.match_at("abc", 1, opts()).unwrap().unwrap();

        let whole = groups[0].unwrap();
        assert!(whole.is_empty());
        assert_eq!(whole.start, 1);
    }

    #[test]
    fn begin_anchor_suppressed_mid_buffer() {
        let re = Regex::new(r"\Gfoo").unwrap();

        // plain matching honors \G at the match position
        assert!(
            re.match_at("xfoo", 1, MatchOptions::default())
                .unwrap()
                .is_some()
        );
        // with not_begin_position the anchor never fires
        assert!(re.match_at("xfoo", 1, opts()).unwrap().is_none());
    }

    #[test]
    fn literal_backslash_g_survives() {
        assert_eq!(suppress_begin_anchor("a\\\\Gb"), "a\\\\Gb");
        assert_eq!(suppress_begin_anchor("a\\Gb"), "a\u{FFFF}b");
    }

    #[test]
    fn rejects_bad_patterns() {
        assert!(Regex::new("(unclosed").is_err());
        assert!(Regex::new("").is_err());
    }
}
