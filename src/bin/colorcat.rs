use std::error::Error;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use argh::FromArgs;

use colorcat::{FontStyle, Loader, Mapper, RawTheme, Style, Theme, Tokenizer};

const GRAMMAR_DIR: &str = "share/colorcat/grammars";
const THEME_DIR: &str = "share/colorcat/themes";

#[derive(FromArgs)]
/// Print a source file to the terminal with syntax highlighting.
struct Args {
    /// syntax to highlight with; defaults to the file extension
    #[argh(option)]
    syntax: Option<String>,

    /// theme name
    #[argh(option, default = "String::from(\"default\")")]
    theme: String,

    /// keep the terminal colors where the theme sets none
    #[argh(switch)]
    transparent: bool,

    /// list all available file types and exit
    #[argh(switch)]
    list: bool,

    /// source file; read from stdin when omitted
    #[argh(positional)]
    file: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args: Args = argh::from_env();
    match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("colorcat: {}", err);
            ExitCode::FAILURE
        }
    }
}

/// System prefix first, then the user's ~/.local prefix.
fn search_dirs(suffix: &str) -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from("/usr").join(suffix)];
    if let Some(home) = std::env::var_os("HOME") {
        dirs.push(PathBuf::from(home).join(".local").join(suffix));
    }
    dirs
}

fn find_theme(name: &str) -> Result<PathBuf, Box<dyn Error>> {
    let file_name = format!("{}.json", name);
    for dir in search_dirs(THEME_DIR) {
        let path = dir.join(&file_name);
        if path.exists() {
            return Ok(path);
        }
    }
    Err(format!("theme '{}' not found", name).into())
}

fn run(args: Args) -> Result<ExitCode, Box<dyn Error>> {
    let (loader, _) = Loader::from_dirs(search_dirs(GRAMMAR_DIR), false);

    if args.list {
        println!("File Types:");
        let mut entries: Vec<(String, Vec<&str>)> = loader
            .file_type_names()
            .map(|(file_type, names)| (file_type.to_string(), names))
            .collect();
        entries.sort();
        for (file_type, names) in entries {
            println!("- {}: {}", file_type, names.join(", "));
        }
        return Ok(ExitCode::FAILURE);
    }

    let mut syntax = args.syntax;
    let source = match &args.file {
        Some(path) => {
            if syntax.is_none() {
                syntax = path
                    .extension()
                    .and_then(|extension| extension.to_str())
                    .map(str::to_string);
            }
            fs::read_to_string(path)
                .map_err(|err| format!("failed to load file `{}`: {}", path.display(), err))?
        }
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let syntax = syntax.ok_or("no syntax given and none could be derived")?;

    let grammar = loader
        .from_file_type(&syntax, 0)
        .map_err(|err| format!("failed to load grammar `{}`: {}", syntax, err))?;

    let theme = RawTheme::load_from_file(find_theme(&args.theme)?)?.compile()?;

    let mut mapper = Mapper::new(source.len());
    let tokenizer = Tokenizer::new(&loader, grammar);
    let mut stack = tokenizer.initial_stack();
    let mut offset = 0;
    for line in source.split_inclusive('\n') {
        stack = tokenizer.tokenize_sequence(offset, line, stack, |token| mapper.add(token))?;
        offset += line.len();
    }

    let mappings = theme.map_tokens(mapper.iter());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut next = 0;
    for (index, ch) in source.char_indices() {
        if next < mappings.len() && mappings[next].offset == index {
            let mut style = mappings[next].style;
            next += 1;
            if !args.transparent {
                merge_default(&mut style, &theme);
            }
            write_csi(&mut out, &style)?;
        }
        write!(out, "{}", ch)?;
    }
    writeln!(out, "\x1b[0m")?;

    Ok(ExitCode::SUCCESS)
}

fn merge_default(style: &mut Style, theme: &Theme) {
    if style.foreground.is_none() {
        style.foreground = theme.default.foreground;
    }
    if style.background.is_none() {
        style.background = theme.default.background;
    }
}

/// Reset attributes, then font style and truecolor sequences.
fn write_csi(out: &mut impl Write, style: &Style) -> io::Result<()> {
    write!(out, "\x1b[0")?;

    if style.font_style.contains(FontStyle::BOLD) {
        write!(out, ";1")?;
    }
    if style.font_style.contains(FontStyle::ITALIC) {
        write!(out, ";3")?;
    }
    if style.font_style.contains(FontStyle::UNDERLINE) {
        write!(out, ";4")?;
    }
    if style.font_style.contains(FontStyle::STRIKETHROUGH) {
        write!(out, ";9")?;
    }

    if let Some(color) = style.foreground {
        write!(out, ";38;2;{};{};{}", color.r, color.g, color.b)?;
    }
    if let Some(color) = style.background {
        write!(out, ";48;2;{};{};{}", color.r, color.g, color.b)?;
    }

    write!(out, "m")
}
