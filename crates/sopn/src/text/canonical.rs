//! Canonical text form used for every comparison in the pipeline.
//!
//! Page headings, post labels, table headers and party names all pass through
//! [`canonicalize`] before they are compared, so two strings that differ only
//! in case, accents, punctuation, spacing or stray numbering compare equal.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Options for [`canonicalize_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Remove anything inside round brackets, brackets included.
    pub drop_parentheticals: bool,
}

/// Canonicalizes `text` with default options.
pub fn canonicalize(text: &str) -> String {
    canonicalize_with(text, Options::default())
}

/// Canonicalizes `text`.
///
/// Total and idempotent: `canonicalize_with(canonicalize_with(x, o), o)` is
/// always `canonicalize_with(x, o)`.
pub fn canonicalize_with(text: &str, options: Options) -> String {
    let folded = fold(text);
    let folded = if options.drop_parentheticals {
        drop_parentheticals(&folded)
    } else {
        folded
    };
    finish_line(&folded)
}

/// Newline-preserving variant used for whole pages of text.
///
/// Each line is canonicalized on its own; blank lines are removed.
pub fn canonicalize_page(text: &str) -> String {
    let folded = fold(text);
    folded
        .lines()
        .map(finish_line)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lowercase, strip diacritics and map punctuation. Newlines survive.
fn fold(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut out = String::with_capacity(lowered.len());

    for c in lowered.nfd() {
        if is_combining_mark(c) {
            continue;
        }
        match c {
            '\n' | '\r' => out.push('\n'),
            '\'' | '\u{2018}' | '\u{2019}' | '`' | '\u{00b4}' => {}
            '&' => out.push_str(" and "),
            '.' | ',' => {}
            '-' | '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2014}' => out.push('-'),
            c if c.is_whitespace() => out.push(' '),
            c if c.is_ascii() => out.push(c),
            // Ligatures and other letters NFD leaves untouched.
            '\u{00df}' => out.push_str("ss"),
            '\u{00e6}' => out.push_str("ae"),
            '\u{0153}' => out.push_str("oe"),
            '\u{00f8}' => out.push('o'),
            '\u{0131}' => out.push('i'),
            '\u{0142}' => out.push('l'),
            '\u{00f0}' => out.push('d'),
            '\u{00fe}' => out.push_str("th"),
            _ => out.push(' '),
        }
    }

    out
}

fn drop_parentheticals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            ')' => {}
            c if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Hyphen handling, whitespace collapsing and number dropping for one line.
fn finish_line(line: &str) -> String {
    let words: Vec<&str> = line.split_whitespace().collect();
    let joined = words.join(" ");
    // Welsh place names join with "-y-" ("Llan-y-pwll"); keep the "y".
    let joined = joined.replace("-y-", " y ");
    let joined = joined.replace('-', " ");

    joined
        .split_whitespace()
        .filter_map(strip_trailing_digits)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Drops trailing digits from a word; a word made only of digits vanishes.
fn strip_trailing_digits(word: &str) -> Option<&str> {
    let trimmed = word.trim_end_matches(|c: char| c.is_ascii_digit());
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
