//! The stack-based tokenization engine.
//!
//! Rules are tried in compiled order against the current stack top; a match
//! may consume bytes, push a nested context or pop back to the parent.
//! Whenever nothing matches, a 1-byte filler token keeps the cursor moving,
//! so tokenization terminates on any input.

use std::cmp::Ordering;
use std::io::{self, BufRead};
use std::sync::Arc;

use crate::error::{ColorcatResult, Error};
use crate::grammars::{
    Capture, Grammar, GrammarId, MatchOptions, Reference, Regex, Rule, RuleList,
};
use crate::loader::Loader;

/// A scoped span of the input.
///
/// Tokens may overlap; render the token with the highest depth at a
/// position. A token with an empty scope is a filler emitted only to
/// guarantee forward progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Scope given by the grammar, e.g. "keyword.control.go"
    pub scope: String,
    /// Byte offset of the start within the original input
    pub start: usize,
    /// Length in bytes
    pub length: usize,
    /// Nesting level at emission; higher wins when tokens overlap
    pub depth: usize,
}

impl Token {
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn is_filler(&self) -> bool {
        self.scope.is_empty()
    }

    /// The stable ordering used to sort a finished token stream:
    /// start, then length, then depth, all ascending.
    pub fn stable_order(left: &Token, right: &Token) -> Ordering {
        left.start
            .cmp(&right.start)
            .then(left.length.cmp(&right.length))
            .then(left.depth.cmp(&right.depth))
    }
}

/// Opaque handle to a parse stack. Feed the handle returned by one
/// `tokenize_sequence` call into the next to keep blocks open across lines.
pub type Stack = Arc<StackItem>;

/// One frame on the parse stack, carrying the active rule context.
///
/// Frames form a persistent linked list: popping restores the previous
/// handle verbatim, and a suspended stack shares its tail with the active
/// one.
#[derive(Debug)]
pub struct StackItem {
    /// Rules eligible at this level; for a block, the pop rule comes first
    rules: RuleList,
    /// The grammar that introduced this frame. `None` for inline frames;
    /// the effective grammar is the nearest ancestor with one.
    grammar: Option<GrammarId>,
    /// Absolute byte offset where the frame was pushed
    offset: usize,
    previous: Option<Stack>,
}

impl StackItem {
    /// Root frame for a grammar; its rule list is exactly the grammar root.
    pub(crate) fn root(grammar: &Grammar) -> Stack {
        Arc::new(StackItem {
            rules: vec![grammar.root.clone()].into(),
            grammar: Some(grammar.id),
            offset: 0,
            previous: None,
        })
    }

    /// 1-based nesting depth of this frame.
    fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self;
        while let Some(previous) = &current.previous {
            depth += 1;
            current = previous;
        }
        depth
    }

    /// True when a context frame for this grammar was already pushed at
    /// this position. Re-entering it could not make progress.
    fn has_context_frame(&self, grammar: GrammarId, offset: usize) -> bool {
        let mut current = Some(self);
        while let Some(frame) = current {
            if frame.grammar == Some(grammar) && frame.offset == offset {
                return true;
            }
            current = frame.previous.as_deref();
        }
        false
    }

    /// Walks up to the nearest frame that carries a grammar.
    fn effective_grammar(&self) -> GrammarId {
        let mut current = self;
        loop {
            if let Some(id) = current.grammar {
                return id;
            }
            current = current
                .previous
                .as_deref()
                .expect("stack does not contain a grammar");
        }
    }
}

/// Outcome of evaluating one rule at a position.
enum Step {
    /// Consumed this many bytes; 0 means "no match, try the next sibling".
    Advance(usize),
    /// The stack top changed without consuming input; rescan from the same
    /// position with the new top.
    Switch,
}

enum Action<'a> {
    /// Plain match, no stack effect.
    None,
    /// Begin side of a block: the list becomes the new stack top.
    Push(&'a RuleList),
    /// End side: emit the whole-block token and restore the parent frame.
    Pop,
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    not_begin_position: true,
};

fn at_line_start(text: &str, at: usize) -> bool {
    at == 0 || text.as_bytes()[at - 1] == b'\n'
}

/// The tokenizer borrows the loader for the duration of a tokenization so
/// cross-grammar includes can be resolved lazily; `base` names the outermost
/// grammar, which `$base` includes refer back to.
pub struct Tokenizer<'l> {
    loader: &'l Loader,
    base: GrammarId,
}

impl<'l> Tokenizer<'l> {
    pub fn new(loader: &'l Loader, grammar: &Grammar) -> Self {
        Self {
            loader,
            base: grammar.id,
        }
    }

    /// A fresh stack holding only the base grammar's root frame.
    pub fn initial_stack(&self) -> Stack {
        StackItem::root(self.loader.grammar(self.base))
    }

    /// Tokenize `text` under the given stack, emitting tokens through the
    /// callback with offsets shifted by `offset`. Returns the updated stack;
    /// blocks may stay open across calls.
    pub fn tokenize_sequence<F>(
        &self,
        offset: usize,
        text: &str,
        top: Stack,
        mut emit: F,
    ) -> ColorcatResult<Stack>
    where
        F: FnMut(Token),
    {
        self.tokenize_span(offset, text, 0, text.len(), top, &mut emit)
    }

    /// Tokenize a whole reader line by line (each line keeps its newline
    /// byte), threading the stack across lines. The collected tokens are
    /// sorted by [`Token::stable_order`].
    pub fn tokenize_reader<R: BufRead>(&self, mut reader: R) -> ColorcatResult<Vec<Token>> {
        let mut tokens = Vec::new();
        let mut top = self.initial_stack();
        let mut offset = 0;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = std::str::from_utf8(&buf)
                .map_err(|err| Error::Io(io::Error::new(io::ErrorKind::InvalidData, err)))?;
            top = self.tokenize_span(offset, line, 0, line.len(), top, &mut |token| {
                tokens.push(token)
            })?;
            offset += line.len();
        }

        tokens.sort_by(Token::stable_order);
        Ok(tokens)
    }

    /// The outer loop: at each position, try the rules of the stack top in
    /// order. A positive advance moves the cursor, a switch rescans with the
    /// new top, and if nothing matched at all a filler token covers one byte.
    fn tokenize_span(
        &self,
        offset: usize,
        text: &str,
        start: usize,
        end: usize,
        mut top: Stack,
        emit: &mut dyn FnMut(Token),
    ) -> ColorcatResult<Stack> {
        let mut at = start;
        while at < end {
            let mut consumed = false;
            // include/expand nodes already visited at this position; bounds
            // the scan to one evaluation per reachable rule even when a
            // grammar includes itself
            let mut seen: Vec<*const Rule> = Vec::new();

            let rules = top.rules.clone();
            for rule in rules.iter() {
                let (new_top, step) = self.evaluate_rule(offset, text, at, top, rule, emit, &mut seen)?;
                top = new_top;
                match step {
                    Step::Advance(0) => {}
                    Step::Advance(n) => {
                        at += n;
                        consumed = true;
                        break;
                    }
                    Step::Switch => {
                        consumed = true;
                        break;
                    }
                }
            }

            if !consumed {
                emit(Token {
                    scope: String::new(),
                    start: at + offset,
                    length: 1,
                    depth: 0,
                });
                at += 1;
            }
        }
        Ok(top)
    }

    fn evaluate_rule(
        &self,
        offset: usize,
        text: &str,
        at: usize,
        top: Stack,
        rule: &Arc<Rule>,
        emit: &mut dyn FnMut(Token),
        seen: &mut Vec<*const Rule>,
    ) -> ColorcatResult<(Stack, Step)> {
        if matches!(&**rule, Rule::Include(_) | Rule::Expand(_)) {
            let ptr = Arc::as_ptr(rule);
            if seen.contains(&ptr) {
                return Ok((top, Step::Advance(0)));
            }
            seen.push(ptr);
        }

        match &**rule {
            Rule::Include(reference) => {
                let (target_id, target_rule) = self.resolve_include(&top, reference)?;
                if target_id != top.effective_grammar() {
                    // mutually including grammars would otherwise re-enter
                    // each other forever at the same position
                    if top.has_context_frame(target_id, at + offset) {
                        return Ok((top, Step::Advance(0)));
                    }
                    // suspend into the other grammar; the new frame carries
                    // it so nested includes resolve against the right
                    // repository
                    let frame = Arc::new(StackItem {
                        rules: vec![target_rule].into(),
                        grammar: Some(target_id),
                        offset: at + offset,
                        previous: Some(top),
                    });
                    Ok((frame, Step::Switch))
                } else {
                    self.evaluate_rule(offset, text, at, top, &target_rule, emit, seen)
                }
            }
            Rule::Expand(expand) => {
                let mut top = top;
                for child in expand.rules.iter() {
                    let (new_top, step) =
                        self.evaluate_rule(offset, text, at, top, child, emit, seen)?;
                    top = new_top;
                    if !matches!(step, Step::Advance(0)) {
                        return Ok((top, step));
                    }
                }
                Ok((top, Step::Advance(0)))
            }
            Rule::Match(rule) => self.evaluate_pattern(
                offset,
                text,
                at,
                top,
                emit,
                rule.name.as_deref(),
                &rule.regex,
                &rule.captures,
                Action::None,
            ),
            Rule::BeginEnd(rule) => self.evaluate_pattern(
                offset,
                text,
                at,
                top,
                emit,
                None,
                &rule.begin,
                &rule.captures,
                Action::Push(&rule.rules),
            ),
            Rule::End(rule) if rule.negate => {
                // while-block: tested only at the start of a line. A match
                // keeps the block open and consumes the marker; a failure
                // closes the block without consuming anything.
                if !at_line_start(text, at) {
                    return Ok((top, Step::Advance(0)));
                }
                if rule.regex.match_at(text, at, MATCH_OPTIONS)?.is_some() {
                    self.evaluate_pattern(
                        offset,
                        text,
                        at,
                        top,
                        emit,
                        rule.name.as_deref(),
                        &rule.regex,
                        &rule.captures,
                        Action::None,
                    )
                } else {
                    if let Some(name) = &rule.name {
                        emit(Token {
                            scope: name.clone(),
                            start: top.offset,
                            length: at + offset - top.offset,
                            depth: top.depth(),
                        });
                    }
                    let previous = top.previous.clone().expect("pop below root frame");
                    Ok((previous, Step::Switch))
                }
            }
            Rule::End(rule) => self.evaluate_pattern(
                offset,
                text,
                at,
                top,
                emit,
                rule.name.as_deref(),
                &rule.regex,
                &rule.captures,
                Action::Pop,
            ),
        }
    }

    /// Shared path for every rule that carries a regex: match at `at`, emit
    /// the scope and capture tokens, then apply the stack action.
    #[allow(clippy::too_many_arguments)]
    fn evaluate_pattern(
        &self,
        offset: usize,
        text: &str,
        at: usize,
        top: Stack,
        emit: &mut dyn FnMut(Token),
        name: Option<&str>,
        regex: &Regex,
        captures: &[Option<Capture>],
        action: Action,
    ) -> ColorcatResult<(Stack, Step)> {
        let Some(groups) = regex.match_at(text, at, MATCH_OPTIONS)? else {
            return Ok((top, Step::Advance(0)));
        };
        let Some(whole) = groups.first().copied().flatten() else {
            return Ok((top, Step::Advance(0)));
        };
        let length = whole.len();

        if let Some(name) = name {
            emit(Token {
                scope: name.to_string(),
                start: whole.start + offset,
                length,
                depth: top.depth() + 1,
            });
        }

        for (index, span) in groups.iter().enumerate().skip(1) {
            if index >= captures.len() {
                break;
            }
            let Some(capture) = &captures[index] else {
                continue;
            };
            let Some(span) = span else {
                continue;
            };
            if span.is_empty() {
                continue;
            }

            if let Some(scope) = &capture.name {
                emit(Token {
                    scope: scope.clone(),
                    start: span.start + offset,
                    length: span.len(),
                    depth: top.depth() + 1,
                });
            }

            if !capture.rules.is_empty() {
                // retokenize the captured bytes under an inline frame; the
                // frame is discarded afterwards
                let frame = Arc::new(StackItem {
                    rules: capture.rules.clone(),
                    grammar: None,
                    offset: span.start + offset,
                    previous: Some(top.clone()),
                });
                self.tokenize_span(offset, text, span.start, span.end, frame, emit)?;
            }
        }

        match action {
            Action::None => Ok((top, Step::Advance(length))),
            Action::Push(rules) => {
                let frame = Arc::new(StackItem {
                    rules: rules.clone(),
                    grammar: None,
                    offset: at + offset,
                    previous: Some(top),
                });
                Ok((frame, Step::Advance(length)))
            }
            Action::Pop => {
                // one token for the whole block, from the remembered begin
                // offset through the end match
                if let Some(name) = name {
                    emit(Token {
                        scope: name.to_string(),
                        start: top.offset,
                        length: at + length + offset - top.offset,
                        depth: top.depth(),
                    });
                }
                let previous = top.previous.clone().expect("pop below root frame");
                Ok((previous, Step::Advance(length)))
            }
        }
    }

    fn resolve_include(
        &self,
        top: &StackItem,
        reference: &Reference,
    ) -> ColorcatResult<(GrammarId, Arc<Rule>)> {
        let effective = top.effective_grammar();
        let (target_id, rule_name) = match reference {
            Reference::Self_ => (effective, None),
            Reference::Base => (self.base, None),
            Reference::Local(rule) => (effective, Some(rule)),
            Reference::OtherComplete(scope) => (self.lookup_scope(scope, reference)?, None),
            Reference::OtherSpecific(scope, rule) => {
                (self.lookup_scope(scope, reference)?, Some(rule))
            }
        };

        let grammar = self.loader.grammar(target_id);
        let rule = match rule_name {
            None => grammar.root.clone(),
            Some(name) => grammar.repository.get(name).cloned().ok_or_else(|| {
                Error::IncludeUnresolved(format!(
                    "`{}`: unknown rule `{}` in `{}`",
                    reference, name, grammar.scope_name
                ))
            })?,
        };
        Ok((target_id, rule))
    }

    fn lookup_scope(&self, scope: &str, reference: &Reference) -> ColorcatResult<GrammarId> {
        self.loader
            .from_scope(scope)
            .map(|grammar| grammar.id)
            .map_err(|_| {
                Error::IncludeUnresolved(format!(
                    "`{}`: no grammar for scope `{}`",
                    reference, scope
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::grammars::RawGrammar;

    fn loader_with(grammars: &[&str]) -> Loader {
        let mut loader = Loader::new();
        for json in grammars {
            loader
                .add_grammar(RawGrammar::from_json_str(json).unwrap())
                .unwrap();
        }
        loader
    }

    fn tokenize(loader: &Loader, scope: &str, input: &str) -> Vec<Token> {
        let grammar = loader.from_scope(scope).unwrap();
        let tokenizer = Tokenizer::new(loader, grammar);
        tokenizer.tokenize_reader(input.as_bytes()).unwrap()
    }

    fn named(tokens: &[Token]) -> Vec<Token> {
        tokens.iter().filter(|t| !t.is_filler()).cloned().collect()
    }

    const PARENS: &str = r#"{
        "name": "Parens",
        "scopeName": "source.parens",
        "patterns": [{
            "begin": "\\(",
            "end": "\\)",
            "name": "meta.parens",
            "patterns": [{"match": "a", "name": "id"}]
        }]
    }"#;

    #[test]
    fn begin_end_pairing() {
        let loader = loader_with(&[PARENS]);
        let tokens = tokenize(&loader, "source.parens", "(a)");

        assert!(tokens.contains(&Token {
            scope: "meta.parens".to_string(),
            start: 0,
            length: 3,
            depth: 2,
        }));
        assert!(tokens.contains(&Token {
            scope: "id".to_string(),
            start: 1,
            length: 1,
            depth: 3,
        }));
    }

    #[test]
    fn tokens_are_stably_ordered() {
        let loader = loader_with(&[PARENS]);
        let tokens = tokenize(&loader, "source.parens", "(a)");

        let mut resorted = tokens.clone();
        resorted.sort_by(Token::stable_order);
        assert_eq!(tokens, resorted);

        // start ascending: the whole block sorts before its contents
        assert_eq!(tokens[0].scope, "meta.parens");
        assert_eq!(tokens[0].start, 0);
    }

    #[test]
    fn nested_block_scenario() {
        let loader = loader_with(&[r#"{
            "name": "Comments",
            "scopeName": "source.comments",
            "patterns": [{
                "begin": "/\\*",
                "end": "\\*/",
                "name": "comment.block",
                "patterns": [{"match": "TODO", "name": "todo"}]
            }]
        }"#]);
        let tokens = tokenize(&loader, "source.comments", "a /* TODO */ b");

        assert!(tokens.contains(&Token {
            scope: "comment.block".to_string(),
            start: 2,
            length: 10,
            depth: 2,
        }));
        assert!(tokens.contains(&Token {
            scope: "todo".to_string(),
            start: 5,
            length: 4,
            depth: 3,
        }));
    }

    #[test]
    fn fillers_guarantee_progress() {
        let loader = loader_with(&[r#"{
            "name": "Digits",
            "scopeName": "source.digits",
            "patterns": [{"match": "\\d+", "name": "num"}]
        }"#]);
        let tokens = tokenize(&loader, "source.digits", "a1b");

        let fillers: Vec<&Token> = tokens.iter().filter(|t| t.is_filler()).collect();
        assert_eq!(fillers.len(), 2);
        for filler in &fillers {
            assert_eq!(filler.length, 1);
        }
        let mut starts: Vec<usize> = fillers.iter().map(|t| t.start).collect();
        starts.dedup();
        assert_eq!(starts, vec![0, 2]);

        assert_eq!(
            named(&tokens),
            vec![Token {
                scope: "num".to_string(),
                start: 1,
                length: 1,
                depth: 2,
            }]
        );
    }

    #[test]
    fn match_captures_are_emitted_and_retokenized() {
        let loader = loader_with(&[r#"{
            "name": "Assign",
            "scopeName": "source.assign",
            "patterns": [{
                "match": "(\\w+)=(\\w+)",
                "name": "meta.assign",
                "captures": {
                    "1": {"name": "variable"},
                    "2": {
                        "name": "value",
                        "patterns": [{"match": "\\d+", "name": "constant.numeric"}]
                    }
                }
            }]
        }"#]);
        let tokens = tokenize(&loader, "source.assign", "x=42");

        assert!(tokens.contains(&Token {
            scope: "meta.assign".to_string(),
            start: 0,
            length: 4,
            depth: 2,
        }));
        assert!(tokens.contains(&Token {
            scope: "variable".to_string(),
            start: 0,
            length: 1,
            depth: 2,
        }));
        assert!(tokens.contains(&Token {
            scope: "value".to_string(),
            start: 2,
            length: 2,
            depth: 2,
        }));
        // the capture body is retokenized one level deeper
        assert!(tokens.contains(&Token {
            scope: "constant.numeric".to_string(),
            start: 2,
            length: 2,
            depth: 4,
        }));
    }

    #[test]
    fn local_include_behaves_like_inlining() {
        let included = loader_with(&[r##"{
            "name": "Repo",
            "scopeName": "source.repo",
            "patterns": [{"include": "#number"}],
            "repository": {
                "number": {"match": "\\d+", "name": "constant.numeric"}
            }
        }"##]);
        let inlined = loader_with(&[r#"{
            "name": "Inline",
            "scopeName": "source.inline",
            "patterns": [{"match": "\\d+", "name": "constant.numeric"}]
        }"#]);

        let via_include = tokenize(&included, "source.repo", "12 34");
        let via_inline = tokenize(&inlined, "source.inline", "12 34");
        assert_eq!(via_include, via_inline);
    }

    #[test]
    fn self_include_reenters_root_patterns() {
        let loader = loader_with(&[r#"{
            "name": "Nested",
            "scopeName": "source.nested",
            "patterns": [
                {
                    "begin": "\\(",
                    "end": "\\)",
                    "name": "meta.parens",
                    "patterns": [{"include": "$self"}]
                },
                {"match": "a", "name": "id"}
            ]
        }"#]);
        let tokens = named(&tokenize(&loader, "source.nested", "(a)"));

        assert!(tokens.contains(&Token {
            scope: "id".to_string(),
            start: 1,
            length: 1,
            depth: 3,
        }));
        assert!(tokens.contains(&Token {
            scope: "meta.parens".to_string(),
            start: 0,
            length: 3,
            depth: 2,
        }));
    }

    #[test]
    fn unknown_repository_rule_is_reported() {
        let loader = loader_with(&[r##"{
            "name": "Broken",
            "scopeName": "source.broken",
            "patterns": [{"include": "#missing"}]
        }"##]);
        let grammar = loader.from_scope("source.broken").unwrap();
        let tokenizer = Tokenizer::new(&loader, grammar);

        let result = tokenizer.tokenize_reader("x".as_bytes());
        assert!(matches!(result, Err(Error::IncludeUnresolved(_))));
    }

    const GRAMMAR_A: &str = r#"{
        "name": "A",
        "scopeName": "source.a",
        "patterns": [{"match": "aa", "name": "keyword.a"}]
    }"#;
    const GRAMMAR_B: &str = r#"{
        "name": "B",
        "scopeName": "source.b",
        "patterns": [
            {"match": "bb", "name": "keyword.b"},
            {"include": "source.a"}
        ]
    }"#;

    #[test]
    fn cross_grammar_include_merges_scopes() {
        let loader = loader_with(&[GRAMMAR_A, GRAMMAR_B]);
        let tokens = named(&tokenize(&loader, "source.b", "bb aa"));

        let scopes: Vec<&str> = tokens.iter().map(|t| t.scope.as_str()).collect();
        assert!(scopes.contains(&"keyword.b"));
        assert!(scopes.contains(&"keyword.a"));
    }

    #[test]
    fn missing_include_target_is_fatal() {
        let loader = loader_with(&[GRAMMAR_B]);
        let grammar = loader.from_scope("source.b").unwrap();
        let tokenizer = Tokenizer::new(&loader, grammar);

        // "bb" never matches at position 0 here, so the include is consulted
        let result = tokenizer.tokenize_reader("aa".as_bytes());
        assert!(matches!(result, Err(Error::IncludeUnresolved(_))));
    }

    #[test]
    fn self_include_cycle_terminates() {
        let loader = loader_with(&[r#"{
            "name": "Cycle",
            "scopeName": "source.cycle",
            "patterns": [{"include": "$self"}]
        }"#]);
        let tokens = tokenize(&loader, "source.cycle", "ab");

        assert_eq!(tokens.len(), 2);
        assert!(tokens.iter().all(Token::is_filler));
    }

    #[test]
    fn mutual_includes_terminate() {
        let loader = loader_with(&[
            r#"{
                "name": "X",
                "scopeName": "source.x",
                "patterns": [
                    {"match": "xx", "name": "keyword.x"},
                    {"include": "source.y"}
                ]
            }"#,
            r#"{
                "name": "Y",
                "scopeName": "source.y",
                "patterns": [
                    {"match": "yy", "name": "keyword.y"},
                    {"include": "source.x"}
                ]
            }"#,
        ]);
        let tokens = tokenize(&loader, "source.x", "xx-yy");

        let named_tokens = named(&tokens);
        let scopes: Vec<&str> = named_tokens.iter().map(|t| t.scope.as_str()).collect();
        assert!(scopes.contains(&"keyword.x"));
        assert!(scopes.contains(&"keyword.y"));
    }

    #[test]
    fn while_block_spans_prefixed_lines() {
        let loader = loader_with(&[r#"{
            "name": "Quote",
            "scopeName": "source.quote",
            "patterns": [{
                "begin": "^>",
                "while": "^>",
                "name": "markup.quote",
                "patterns": [{"match": "[a-z]+", "name": "word"}]
            }]
        }"#]);
        let tokens = tokenize(&loader, "source.quote", ">aa\n>bb\ncc\n");

        // the block covers both prefixed lines and popped at the start of
        // the third
        assert!(tokens.contains(&Token {
            scope: "markup.quote".to_string(),
            start: 0,
            length: 8,
            depth: 2,
        }));
        // inner patterns ran on both prefixed lines
        assert!(tokens.contains(&Token {
            scope: "word".to_string(),
            start: 1,
            length: 2,
            depth: 3,
        }));
        assert!(tokens.contains(&Token {
            scope: "word".to_string(),
            start: 5,
            length: 2,
            depth: 3,
        }));
        // the third line was tokenized outside the block
        assert!(
            !tokens
                .iter()
                .any(|t| t.scope == "word" && t.start >= 8)
        );
    }

    #[test]
    fn stack_survives_across_sequence_calls() {
        let loader = loader_with(&[PARENS]);
        let grammar = loader.from_scope("source.parens").unwrap();
        let tokenizer = Tokenizer::new(&loader, grammar);

        let mut tokens = Vec::new();
        let mut stack = tokenizer.initial_stack();
        stack = tokenizer
            .tokenize_sequence(0, "(a", stack, |t| tokens.push(t))
            .unwrap();
        stack = tokenizer
            .tokenize_sequence(2, "a)", stack, |t| tokens.push(t))
            .unwrap();
        drop(stack);

        tokens.sort_by(Token::stable_order);
        assert!(tokens.contains(&Token {
            scope: "meta.parens".to_string(),
            start: 0,
            length: 4,
            depth: 2,
        }));
        let ids: Vec<usize> = tokens
            .iter()
            .filter(|t| t.scope == "id")
            .map(|t| t.start)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
