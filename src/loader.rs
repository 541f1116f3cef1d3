use std::collections::HashMap;
use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{ColorcatResult, Error};
use crate::grammars::{Grammar, GrammarId, RawGrammar};

/// Default extension for grammar files. Not enforced when loading; used for
/// strict scope-name validation and by lookup tooling.
pub const GRAMMAR_EXTENSION: &str = ".tmLanguage.json";

/// Holds compiled grammars indexed by scope name and by file extension.
///
/// The loader owns every grammar it compiles; the tokenizer borrows it to
/// resolve cross-grammar includes, so it must outlive any tokenization that
/// uses one of its grammars (the borrow checker enforces this).
///
/// Registering a grammar for an already-known scope rebinds the scope to the
/// new grammar: later registrations win. File-extension lists keep insertion
/// order so `from_file_type` can disambiguate by index.
pub struct Loader {
    grammars: Vec<Grammar>,
    by_scope: HashMap<String, GrammarId>,
    by_file_type: HashMap<String, Vec<GrammarId>>,
    grammar_extension: String,
    strict_scope_names: bool,
}

impl Default for Loader {
    fn default() -> Self {
        Self {
            grammars: Vec::new(),
            by_scope: HashMap::new(),
            by_file_type: HashMap::new(),
            grammar_extension: GRAMMAR_EXTENSION.to_string(),
            strict_scope_names: false,
        }
    }
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every file of every directory, one level deep or recursively.
    /// Unreadable or malformed files are logged and skipped. The flag is
    /// true when at least one grammar was registered.
    pub fn from_dirs<I, P>(dirs: I, recursive: bool) -> (Self, bool)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut loader = Self::new();
        for dir in dirs {
            loader.load_dir(dir.as_ref(), recursive);
        }
        let ok = !loader.grammars.is_empty();
        (loader, ok)
    }

    /// The file extension used by strict scope-name validation.
    pub fn set_grammar_extension(&mut self, extension: &str) {
        self.grammar_extension = extension.to_string();
    }

    /// When enabled, a grammar loaded from `foo.tmLanguage.json` must
    /// declare the scope `source.foo`.
    pub fn set_strict_scope_names(&mut self, strict: bool) {
        self.strict_scope_names = strict;
    }

    /// Compile and register a decoded grammar.
    pub fn add_grammar(&mut self, raw: RawGrammar) -> ColorcatResult<&Grammar> {
        let id = GrammarId(self.grammars.len() as u16);
        let grammar = Grammar::compile(raw, id)?;

        self.by_scope.insert(grammar.scope_name.clone(), id);
        for file_type in &grammar.file_types {
            self.by_file_type
                .entry(file_type.clone())
                .or_default()
                .push(id);
        }

        self.grammars.push(grammar);
        Ok(&self.grammars[id.as_index()])
    }

    /// Read a grammar file, JSON if the name ends with `.json`, Plist
    /// otherwise, then compile and register it.
    pub fn add_grammar_from_path(&mut self, path: impl AsRef<Path>) -> ColorcatResult<()> {
        let path = path.as_ref();
        let content = fs::read(path)?;

        let raw = if path.to_string_lossy().ends_with(".json") {
            RawGrammar::from_json_bytes(&content)?
        } else {
            RawGrammar::from_plist_bytes(&content)?
        };

        if self.strict_scope_names {
            self.validate_scope_name(path, &raw.scope_name)?;
        }

        self.add_grammar(raw)?;
        Ok(())
    }

    fn validate_scope_name(&self, path: &Path, scope_name: &str) -> ColorcatResult<()> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();
        let base = file_name
            .strip_suffix(self.grammar_extension.as_str())
            .unwrap_or(&file_name);

        let declared = scope_name.strip_prefix("source.").unwrap_or(scope_name);
        if declared != base {
            return Err(Error::ScopeNameMismatch {
                expected: format!("source.{}", base),
                found: scope_name.to_string(),
            });
        }
        Ok(())
    }

    /// Load all files in a directory, skipping anything that fails to parse
    /// or compile. Returns how many grammars were registered.
    pub fn load_dir(&mut self, dir: &Path, recursive: bool) -> usize {
        let mut loaded = 0;

        if recursive {
            for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
                if entry.file_type().is_file() {
                    loaded += self.load_logged(entry.path());
                }
            }
        } else {
            let Ok(entries) = fs::read_dir(dir) else {
                return 0;
            };
            for entry in entries.filter_map(Result::ok) {
                let path = entry.path();
                if path.is_file() {
                    loaded += self.load_logged(&path);
                }
            }
        }

        loaded
    }

    fn load_logged(&mut self, path: &Path) -> usize {
        match self.add_grammar_from_path(path) {
            Ok(()) => 1,
            Err(err) => {
                log::warn!("skipping grammar {}: {}", path.display(), err);
                0
            }
        }
    }

    /// Look up a grammar by its scope name, e.g. "source.go".
    pub fn from_scope(&self, scope: &str) -> ColorcatResult<&Grammar> {
        self.by_scope
            .get(scope)
            .map(|id| &self.grammars[id.as_index()])
            .ok_or_else(|| Error::NotFound(scope.to_string()))
    }

    /// Look up the `index`-th grammar registered for a file extension.
    pub fn from_file_type(&self, file_type: &str, index: usize) -> ColorcatResult<&Grammar> {
        self.by_file_type
            .get(file_type)
            .and_then(|ids| ids.get(index))
            .map(|id| &self.grammars[id.as_index()])
            .ok_or_else(|| Error::NotFound(file_type.to_string()))
    }

    /// All registered scope names, in no particular order.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.by_scope.keys().map(String::as_str)
    }

    /// All claimed file extensions, in no particular order.
    pub fn file_types(&self) -> impl Iterator<Item = &str> {
        self.by_file_type.keys().map(String::as_str)
    }

    /// File extensions with the display names of the grammars claiming them.
    pub fn file_type_names(&self) -> impl Iterator<Item = (&str, Vec<&str>)> {
        self.by_file_type.iter().map(|(file_type, ids)| {
            let names = ids
                .iter()
                .map(|id| self.grammars[id.as_index()].name.as_str())
                .collect();
            (file_type.as_str(), names)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }

    pub(crate) fn grammar(&self, id: GrammarId) -> &Grammar {
        &self.grammars[id.as_index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grammar_json(scope: &str, file_type: &str) -> RawGrammar {
        RawGrammar::from_json_str(&format!(
            r#"{{
                "name": "{scope}",
                "scopeName": "{scope}",
                "fileTypes": ["{file_type}"],
                "patterns": [{{"match": "x", "name": "noop"}}]
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn looks_up_by_scope_and_file_type() {
        let mut loader = Loader::new();
        loader.add_grammar(grammar_json("source.aa", "aa")).unwrap();
        loader.add_grammar(grammar_json("source.bb", ".bb")).unwrap();

        assert_eq!(loader.from_scope("source.aa").unwrap().scope_name, "source.aa");
        // leading dot was stripped from the declared file type
        assert_eq!(loader.from_file_type("bb", 0).unwrap().scope_name, "source.bb");

        assert!(matches!(
            loader.from_scope("source.cc"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            loader.from_file_type("aa", 1),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn later_registration_wins_for_scope() {
        let mut loader = Loader::new();
        loader.add_grammar(grammar_json("source.aa", "aa")).unwrap();

        let mut second = grammar_json("source.aa", "aa");
        second.name = "Second".to_string();
        loader.add_grammar(second).unwrap();

        assert_eq!(loader.from_scope("source.aa").unwrap().name, "Second");
        // both registrations stay reachable through the file type index
        assert_eq!(loader.from_file_type("aa", 0).unwrap().name, "source.aa");
        assert_eq!(loader.from_file_type("aa", 1).unwrap().name, "Second");
    }

    #[test]
    fn strict_mode_validates_scope_against_file_name() {
        let loader = {
            let mut loader = Loader::new();
            loader.set_strict_scope_names(true);
            loader
        };

        assert!(
            loader
                .validate_scope_name(Path::new("/g/go.tmLanguage.json"), "source.go")
                .is_ok()
        );
        assert!(matches!(
            loader.validate_scope_name(Path::new("/g/go.tmLanguage.json"), "source.python"),
            Err(Error::ScopeNameMismatch { .. })
        ));
    }

    #[test]
    fn load_dir_skips_broken_files() {
        let dir = std::env::temp_dir().join("colorcat-loader-test");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("ok.json"),
            r#"{"name": "Ok", "scopeName": "source.ok", "fileTypes": ["ok"], "patterns": []}"#,
        )
        .unwrap();
        fs::write(dir.join("broken.json"), "{not json").unwrap();

        let (loader, ok) = Loader::from_dirs([&dir], false);
        assert!(ok);
        assert!(loader.from_scope("source.ok").is_ok());

        fs::remove_dir_all(&dir).unwrap();
    }
}
