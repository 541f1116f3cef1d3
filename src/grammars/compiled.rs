use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{ColorcatResult, Error};
use crate::grammars::raw::{RawGrammar, RawRule, Reference};
use crate::grammars::regex::Regex;

/// Index of a grammar inside its loader. Frames on the parse stack use this
/// to name the grammar they belong to without owning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GrammarId(pub(crate) u16);

impl GrammarId {
    pub(crate) fn as_index(self) -> usize {
        self.0 as usize
    }
}

/// A list of child rules shared between the grammar and any stack frames
/// that are currently scanning it.
pub(crate) type RuleList = Arc<[Arc<Rule>]>;

/// An executable grammar rule.
///
/// The graph is acyclic by construction: `Include` carries a reference
/// string, not a pointer, and is dereferenced while tokenizing.
#[derive(Debug)]
pub(crate) enum Rule {
    /// Redirect to another rule, possibly in another grammar.
    Include(Reference),
    /// Container without a regex of its own; tries children in order.
    Expand(ExpandRule),
    /// Concrete regex match without stack effect.
    Match(MatchRule),
    /// Pushing rule: on a begin match, its rule list becomes the stack top.
    BeginEnd(BeginEndRule),
    /// Synthesized pop rule, always first in a BeginEnd's rule list.
    End(EndRule),
}

#[derive(Debug)]
pub(crate) struct ExpandRule {
    #[allow(dead_code)]
    pub(crate) name: Option<String>,
    pub(crate) rules: RuleList,
}

#[derive(Debug)]
pub(crate) struct MatchRule {
    pub(crate) name: Option<String>,
    pub(crate) regex: Regex,
    pub(crate) captures: Vec<Option<Capture>>,
}

#[derive(Debug)]
pub(crate) struct BeginEndRule {
    pub(crate) begin: Regex,
    pub(crate) captures: Vec<Option<Capture>>,
    pub(crate) rules: RuleList,
}

#[derive(Debug)]
pub(crate) struct EndRule {
    /// The block's scope name; the pop emits the whole-block token with it.
    pub(crate) name: Option<String>,
    pub(crate) regex: Regex,
    pub(crate) captures: Vec<Option<Capture>>,
    /// The regex came from a `while` key: keep the block while it matches
    /// at the start of a line, pop when it fails there.
    pub(crate) negate: bool,
}

/// One entry of a compiled capture array. Index k corresponds to regex
/// group k; missing indices are `None` slots in the array.
#[derive(Debug, Clone)]
pub(crate) struct Capture {
    pub(crate) name: Option<String>,
    pub(crate) rules: RuleList,
}

/// A compiled grammar with precompiled regexes and an executable rule tree.
///
/// Immutable once compiled; owned by the loader that produced it. Rule nodes
/// are `Arc`-shared so a stack returned from one tokenization call stays
/// valid for the next.
#[derive(Debug)]
pub struct Grammar {
    pub(crate) id: GrammarId,
    /// Human-readable language name
    pub name: String,
    /// The scope this grammar is registered under, e.g. "source.go"
    pub scope_name: String,
    /// File extensions this grammar claims, leading dots stripped
    pub file_types: Vec<String>,
    first_line: Option<Regex>,
    folding_start: Option<Regex>,
    folding_end: Option<Regex>,
    pub(crate) repository: HashMap<String, Arc<Rule>>,
    pub(crate) root: Arc<Rule>,
}

impl Grammar {
    pub(crate) fn compile(raw: RawGrammar, id: GrammarId) -> ColorcatResult<Self> {
        let first_line = raw
            .first_line_match
            .as_deref()
            .map(Regex::new)
            .transpose()?;
        let folding_start = raw
            .folding_start_marker
            .as_deref()
            .map(Regex::new)
            .transpose()?;
        let folding_end = raw
            .folding_stop_marker
            .as_deref()
            .map(Regex::new)
            .transpose()?;

        let rules = compile_rules(&raw.patterns)?;
        let root = Arc::new(Rule::Expand(ExpandRule {
            name: Some(raw.scope_name.clone()),
            rules,
        }));

        let mut repository = HashMap::with_capacity(raw.repository.len());
        for (name, rule) in &raw.repository {
            repository.insert(name.clone(), compile_rule(rule)?);
        }

        let file_types = raw
            .file_types
            .iter()
            .map(|ft| ft.trim_start_matches('.').to_string())
            .collect();

        Ok(Self {
            id,
            name: raw.name,
            scope_name: raw.scope_name,
            file_types,
            first_line,
            folding_start,
            folding_end,
            repository,
            root,
        })
    }

    /// Regex matched against the first line of a file to detect the language
    pub fn first_line(&self) -> Option<&Regex> {
        self.first_line.as_ref()
    }

    /// Marker regex for the start of a foldable region
    pub fn folding_start(&self) -> Option<&Regex> {
        self.folding_start.as_ref()
    }

    /// Marker regex for the end of a foldable region
    pub fn folding_end(&self) -> Option<&Regex> {
        self.folding_end.as_ref()
    }
}

/// Empty scope strings behave like no scope at all; tokens with empty
/// scopes are reserved for the engine's fillers.
fn scope_name(name: &Option<String>) -> Option<String> {
    name.clone().filter(|name| !name.is_empty())
}

fn compile_rules(raw: &[RawRule]) -> ColorcatResult<RuleList> {
    let mut rules = Vec::with_capacity(raw.len());
    for rule in raw {
        rules.push(compile_rule(rule)?);
    }
    Ok(rules.into())
}

/// Compile a single raw rule. The branch order follows TextMate conventions:
/// include, match, begin/end (or begin/while), container.
fn compile_rule(raw: &RawRule) -> ColorcatResult<Arc<Rule>> {
    if let Some(reference) = &raw.include {
        return Ok(Arc::new(Rule::Include(reference.clone())));
    }

    if let Some(pattern) = &raw.match_ {
        return Ok(Arc::new(Rule::Match(MatchRule {
            name: scope_name(&raw.name),
            regex: Regex::new(pattern)?,
            captures: compile_captures(&raw.captures)?,
        })));
    }

    let (begin, pop_pattern, negate) = match (&raw.begin, &raw.end, &raw.while_) {
        (Some(begin), Some(end), _) => (begin, end, false),
        (Some(begin), None, Some(while_)) => (begin, while_, true),
        (None, None, None) => {
            return Ok(Arc::new(Rule::Expand(ExpandRule {
                name: scope_name(&raw.name),
                rules: compile_rules(&raw.patterns)?,
            })));
        }
        _ => {
            return Err(Error::GrammarSyntax(
                "found rule with begin, end or while omitted".to_string(),
            ));
        }
    };

    let begin = Regex::new(begin)?;
    let pop_regex = Regex::new(pop_pattern)?;

    // A non-empty `captures` is an alias for identical begin- and
    // end-captures and wins over the side-specific maps.
    let (begin_captures, end_captures) = if !raw.captures.is_empty() {
        (
            compile_captures(&raw.captures)?,
            compile_captures(&raw.captures)?,
        )
    } else {
        (
            compile_captures(&raw.begin_captures)?,
            compile_captures(&raw.end_captures)?,
        )
    };

    // The pop rule sits first so the block can always close, even when an
    // inner pattern would match the same text.
    let mut rules = Vec::with_capacity(raw.patterns.len() + 1);
    rules.push(Arc::new(Rule::End(EndRule {
        name: scope_name(&raw.name),
        regex: pop_regex,
        captures: end_captures,
        negate,
    })));
    for child in &raw.patterns {
        rules.push(compile_rule(child)?);
    }

    Ok(Arc::new(Rule::BeginEnd(BeginEndRule {
        begin,
        captures: begin_captures,
        rules: rules.into(),
    })))
}

/// Convert string-indexed captures ("1", "2", ...) to an array sized
/// 0..=max_index with missing indices left as `None`. Each capture carries
/// only a scope name and, if present, a child rule list.
fn compile_captures(raw: &BTreeMap<String, RawRule>) -> ColorcatResult<Vec<Option<Capture>>> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let mut max_index = 0;
    for key in raw.keys() {
        let index: usize = key.parse().map_err(|_| {
            Error::GrammarSyntax(format!("capture index '{}' is not a number", key))
        })?;
        max_index = max_index.max(index);
    }

    let mut result: Vec<Option<Capture>> = vec![None; max_index + 1];
    for (key, rule) in raw {
        // key already checked above
        let index: usize = key.parse().unwrap();
        result[index] = Some(Capture {
            name: scope_name(&rule.name),
            rules: compile_rules(&rule.patterns)?,
        });
    }
    Ok(result)
}
