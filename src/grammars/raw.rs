use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// Parsed form of an `include` string.
///
/// per vscode-textmate, allowed values are:
///  * a scope name, e.g. `source.ts`
///  * a top level scope reference, e.g. `source.ts#entity.name.class`
///  * a relative scope reference, e.g. `#entity.name.class`
///  * `$self`
///  * `$base`
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Reference {
    // The grammar the rule lives in
    Self_,
    // The outermost grammar on the parse stack. If we are rendering Markdown
    // and switched to Python for a code block, `$base` inside the Python
    // grammar still means the Markdown root.
    Base,
    Local(String),
    OtherComplete(String),
    OtherSpecific(String, String),
}

impl From<&str> for Reference {
    fn from(value: &str) -> Self {
        match value {
            "$self" => Self::Self_,
            "$base" => Self::Base,
            s if s.starts_with('#') => Self::Local(s[1..].to_string()),
            s if s.contains('#') => {
                let (scope, rule) = s.split_once('#').unwrap();
                Self::OtherSpecific(scope.to_string(), rule.to_string())
            }
            _ => Self::OtherComplete(value.to_string()),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Self_ => f.write_str("$self"),
            Reference::Base => f.write_str("$base"),
            Reference::Local(rule) => write!(f, "#{}", rule),
            Reference::OtherComplete(scope) => f.write_str(scope),
            Reference::OtherSpecific(scope, rule) => write!(f, "{}#{}", scope, rule),
        }
    }
}

/// Custom deserializer for the include field that parses string references
/// into the Reference enum
fn deserialize_reference<'de, D>(deserializer: D) -> Result<Option<Reference>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt_string = Option::<String>::deserialize(deserializer)?;
    Ok(opt_string.map(|s| Reference::from(s.as_str())))
}

/// A raw grammar rule as found in the grammar file.
///
/// A single flexible struct covers match rules, begin/end and begin/while
/// blocks, includes and plain containers; which fields are set decides the
/// rule kind during compilation.
///
/// Note: capture groups are addressed by string indices "0","1",...
/// They stay strings here, the compiler converts them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRule {
    #[serde(deserialize_with = "deserialize_reference")]
    pub include: Option<Reference>,

    pub name: Option<String>,

    #[serde(rename = "match")]
    pub match_: Option<String>,

    pub begin: Option<String>,
    pub end: Option<String>,
    #[serde(rename = "while")]
    pub while_: Option<String>,

    pub patterns: Vec<RawRule>,

    pub captures: BTreeMap<String, RawRule>,
    pub begin_captures: BTreeMap<String, RawRule>,
    pub end_captures: BTreeMap<String, RawRule>,
}

/// Top-level structure of a TextMate grammar file, JSON or Plist.
///
/// Fields not listed here are ignored by both deserializers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"), default)]
pub struct RawGrammar {
    /// Human-readable name of the language, e.g. "Go"
    pub name: String,
    /// Unique identifier for this grammar's scope, e.g. "source.go"
    pub scope_name: String,
    /// File extensions this grammar claims, e.g. ["go"]
    pub file_types: Vec<String>,
    /// Marker regex for the start of a foldable region
    pub folding_start_marker: Option<String>,
    /// Marker regex for the end of a foldable region
    pub folding_stop_marker: Option<String>,
    /// Regex matched against the first line to detect the language
    pub first_line_match: Option<String>,
    /// Named rules referenced through `#name` includes
    pub repository: BTreeMap<String, RawRule>,
    /// Root patterns, applied first when tokenizing
    pub patterns: Vec<RawRule>,
}

impl RawGrammar {
    pub fn from_json_str(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn from_json_bytes(content: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(content)
    }

    pub fn from_plist_bytes(content: &[u8]) -> Result<Self, plist::Error> {
        plist::from_bytes(content)
    }
}
