use once_cell::sync::Lazy;
use regex::Regex;

static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid bold pattern"));
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.*?)\*").expect("valid italic pattern"));

/// Drop `**bold**` and `*italic*` delimiters, keeping the inner text, then trim.
///
/// Pairs never span a line break. After the italic pass every line holds at
/// most one `*`, so a second application changes nothing.
pub fn strip_emphasis(text: &str) -> String {
    let without_bold = BOLD.replace_all(text, "$1");
    let without_italic = ITALIC.replace_all(&without_bold, "$1");
    without_italic.trim().to_string()
}
