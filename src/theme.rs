//! Theme loading and token-set → style resolution.
//!
//! A theme maps scope selectors to colors and font styles. Selectors support
//! descendant chains ("source.go keyword" applies to a keyword token nested
//! inside Go) and dotted-prefix fallback ("keyword.control.go" falls back to
//! "keyword.control", then "keyword").

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ColorcatResult, Error};
use crate::tokenizer::Token;

/// An opaque sRGB color parsed from a hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

fn invalid_hex(value: &str, reason: &str) -> Error {
    Error::InvalidHexColor {
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl Color {
    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (alpha is ignored).
    pub fn from_hex(value: &str) -> ColorcatResult<Self> {
        let hex = value
            .strip_prefix('#')
            .ok_or_else(|| invalid_hex(value, "missing leading '#'"))?;

        let component = |from: usize| {
            u8::from_str_radix(&hex[from..from + 2], 16)
                .map_err(|_| invalid_hex(value, "not a hex digit"))
        };

        match hex.len() {
            3 => {
                let nibble = |from: usize| {
                    u8::from_str_radix(&hex[from..from + 1], 16)
                        .map_err(|_| invalid_hex(value, "not a hex digit"))
                };
                Ok(Self {
                    r: nibble(0)? * 0x11,
                    g: nibble(1)? * 0x11,
                    b: nibble(2)? * 0x11,
                })
            }
            6 | 8 => Ok(Self {
                r: component(0)?,
                g: component(2)?,
                b: component(4)?,
            }),
            _ => Err(invalid_hex(value, "expected 3, 6 or 8 hex digits")),
        }
    }
}

/// Set of font style attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FontStyle {
    bits: u8,
}

impl FontStyle {
    pub const BOLD: Self = Self { bits: 1 };
    pub const ITALIC: Self = Self { bits: 2 };
    pub const UNDERLINE: Self = Self { bits: 4 };
    pub const STRIKETHROUGH: Self = Self { bits: 8 };

    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    pub const fn contains(&self, other: Self) -> bool {
        (self.bits & other.bits) == other.bits
    }

    pub fn insert(&mut self, other: Self) {
        self.bits |= other.bits;
    }

    /// Parse a space-separated attribute list; unknown words are ignored.
    pub fn parse(value: &str) -> Self {
        let mut style = Self::empty();
        for word in value.split_whitespace() {
            match word {
                "bold" => style.insert(Self::BOLD),
                "italic" => style.insert(Self::ITALIC),
                "underline" => style.insert(Self::UNDERLINE),
                "strikethrough" => style.insert(Self::STRIKETHROUGH),
                _ => {}
            }
        }
        style
    }
}

/// Resolved presentation of one span of text. `None` colors mean "inherit
/// from the theme default" (or stay unset when rendering transparently).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Style {
    pub foreground: Option<Color>,
    pub background: Option<Color>,
    pub font_style: FontStyle,
}

/// Custom deserializer for the scope field that can be a string or an array
fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct ScopeVisitor;

    impl<'de> Visitor<'de> for ScopeVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("string or array of strings")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![value.to_owned()])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut scopes = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                scopes.push(item);
            }
            Ok(scopes)
        }
    }

    deserializer.deserialize_any(ScopeVisitor)
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawSettings {
    foreground: Option<String>,
    background: Option<String>,
    #[serde(rename = "fontStyle")]
    font_style: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTokenColor {
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    scope: Vec<String>,
    #[serde(default)]
    settings: RawSettings,
}

/// A theme file as found on disk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTheme {
    #[serde(default)]
    default: RawTokenColor,
    #[serde(default)]
    tokens: Vec<RawTokenColor>,
}

impl RawTheme {
    pub fn from_json_str(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> ColorcatResult<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }

    pub fn compile(self) -> ColorcatResult<Theme> {
        Theme::compile(self)
    }
}

#[derive(Debug, Clone, Default)]
struct Node {
    style: Option<Style>,
    children: HashMap<String, Node>,
}

/// A compiled theme: the default style plus a selector tree keyed by the
/// token's own scope, with ancestor constraints as children.
#[derive(Debug, Clone, Default)]
pub struct Theme {
    pub default: Style,
    tokens: HashMap<String, Node>,
}

/// One change point of the rendered output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorMapping {
    pub offset: usize,
    pub style: Style,
}

fn compile_settings(raw: &RawSettings) -> ColorcatResult<Style> {
    let foreground = raw
        .foreground
        .as_deref()
        .map(Color::from_hex)
        .transpose()?;
    let background = raw
        .background
        .as_deref()
        .map(Color::from_hex)
        .transpose()?;
    let font_style = raw
        .font_style
        .as_deref()
        .map(FontStyle::parse)
        .unwrap_or_default();
    Ok(Style {
        foreground,
        background,
        font_style,
    })
}

/// Look up a scope at one tree level, truncating at the last dot until a
/// selector matches: "keyword.control.go", "keyword.control", "keyword".
fn lookup_prefix<'n>(level: &'n HashMap<String, Node>, scope: &str) -> Option<&'n Node> {
    let mut name = scope;
    loop {
        if let Some(node) = level.get(name) {
            return Some(node);
        }
        match name.rfind('.') {
            Some(index) => name = &name[..index],
            None => return None,
        }
    }
}

impl Theme {
    fn compile(raw: RawTheme) -> ColorcatResult<Self> {
        let mut theme = Theme {
            default: compile_settings(&raw.default.settings)?,
            tokens: HashMap::new(),
        };
        for entry in &raw.tokens {
            let style = compile_settings(&entry.settings)?;
            for scope in &entry.scope {
                theme.insert_selector(scope, style);
            }
        }
        Ok(theme)
    }

    /// A selector is a space-separated descendant chain; the token's own
    /// scope is its last part and becomes the tree root, ancestors hang
    /// below it. The style sits at the end of the chain.
    fn insert_selector(&mut self, selector: &str, style: Style) {
        let mut parts = selector.split_whitespace().rev();
        let Some(own) = parts.next() else {
            return;
        };

        let mut node = self.tokens.entry(own.to_string()).or_default();
        for part in parts {
            node = node.children.entry(part.to_string()).or_default();
        }
        node.style = Some(style);
    }

    /// Resolve the style for one change point. The active tokens are in
    /// stable order, outermost first; matching starts at the innermost
    /// token and walks outward to satisfy ancestor constraints.
    pub fn resolve(&self, active: &[&Token]) -> Style {
        let mut level = &self.tokens;
        let mut found: Option<Style> = None;

        for token in active.iter().rev() {
            let Some(node) = lookup_prefix(level, &token.scope) else {
                continue;
            };
            if let Some(style) = node.style {
                found = Some(style);
            }
            if node.children.is_empty() {
                break;
            }
            level = &node.children;
        }

        found.unwrap_or_default()
    }

    /// Map the Mapper's change points to concrete styles.
    pub fn map_tokens<'a, I>(&self, changes: I) -> Vec<ColorMapping>
    where
        I: IntoIterator<Item = (usize, Vec<&'a Token>)>,
    {
        changes
            .into_iter()
            .map(|(offset, tokens)| ColorMapping {
                offset,
                style: self.resolve(&tokens),
            })
            .collect()
    }
}
