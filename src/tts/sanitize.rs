//! Text sanitization before TTS synthesis (§4.13).
//!
//! Strips markdown formatting, expands common abbreviations, and substitutes
//! symbols with their spoken form so synthesized speech doesn't read out
//! literal asterisks or "e.g.". Idempotent: `sanitize(sanitize(x)) ==
//! sanitize(x)` (round-trip law, §8).

use once_cell::sync::Lazy;
use regex::Regex;

static MARKDOWN_BOLD_ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[*_]{1,3}").unwrap());
static MARKDOWN_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s*").unwrap());
static MARKDOWN_CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[a-zA-Z]*").unwrap());
static MARKDOWN_INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`").unwrap());
static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());
static MULTI_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());

const ABBREVIATIONS: &[(&str, &str)] = &[
    ("e.g.", "for example"),
    ("i.e.", "that is"),
    ("etc.", "and so on"),
    ("vs.", "versus"),
    ("approx.", "approximately"),
    ("Dr.", "Doctor"),
    ("Mr.", "Mister"),
    ("Mrs.", "Missus"),
];

const SYMBOLS: &[(&str, &str)] = &[
    ("&", " and "),
    ("%", " percent "),
    ("->", " to "),
    ("=>", " leads to "),
];

/// Sanitize `text` for speech synthesis.
#[must_use]
pub fn sanitize(text: &str) -> String {
    let mut out = MARKDOWN_LINK.replace_all(text, "$1").into_owned();
    out = MARKDOWN_CODE_FENCE.replace_all(&out, "").into_owned();
    out = MARKDOWN_INLINE_CODE.replace_all(&out, "").into_owned();
    out = MARKDOWN_HEADING.replace_all(&out, "").into_owned();
    out = MARKDOWN_BOLD_ITALIC.replace_all(&out, "").into_owned();

    for (abbrev, expansion) in ABBREVIATIONS {
        out = out.replace(abbrev, expansion);
    }
    for (symbol, spoken) in SYMBOLS {
        out = out.replace(symbol, spoken);
    }

    out = MULTI_SPACE.replace_all(&out, " ").into_owned();
    out = MULTI_NEWLINE.replace_all(&out, "\n").into_owned();
    out.trim().to_owned()
}
