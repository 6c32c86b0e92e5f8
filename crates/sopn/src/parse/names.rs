//! Cleaning of candidate names and party descriptions read from table cells.

use std::sync::LazyLock;

use regex::Regex;

static MAC_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(ma?c)(\w{2,})").unwrap());

/// Surnames that start like "Mac" but aren't split.
const MAC_EXCEPTIONS: &[&str] = &[
    "machin", "machlin", "machar", "mackle", "macklin", "mackie", "macquarie", "machado",
    "macevicius", "maciulis", "macias", "macomber", "mack", "mace", "macey", "macon",
];

/// Python-style `isupper`: at least one cased letter and no lowercase ones.
fn is_upper(word: &str) -> bool {
    word.chars().any(char::is_uppercase) && !word.chars().any(char::is_lowercase)
}

fn capitalize(piece: &str) -> String {
    let mut chars = piece.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn capitalize_piece(piece: &str) -> String {
    let lower = piece.to_lowercase();
    if !MAC_EXCEPTIONS.contains(&lower.as_str()) {
        if let Some(caps) = MAC_PREFIX.captures(&lower) {
            return format!("{}{}", capitalize(&caps[1]), capitalize(&caps[2]));
        }
    }
    capitalize(&lower)
}

/// "D'SOUZA" -> "D'Souza", "EDE-COOPER" -> "Ede-Cooper".
fn capitalize_surname(word: &str) -> String {
    word.split('-')
        .map(|part| {
            part.split('\'')
                .map(capitalize_piece)
                .collect::<Vec<_>>()
                .join("'")
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Turns a name cell into "Other Names Surname".
///
/// Words written entirely in capitals are taken as the surname, title-cased
/// and moved last. When a "commonly known as" alias is given, only the alias
/// is kept.
pub fn clean_name(raw: &str) -> String {
    let name = raw
        .replace('\n', " ")
        .replace('`', "'")
        .replace('\u{2013}', "-");
    let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut name = name.replace("- ", "-").replace("' ", "'");

    const ALIAS: &str = "commonly known as";
    if let Some(pos) = name.rfind(ALIAS) {
        name = name[pos + ALIAS.len()..].replace(')', "").trim().to_string();
    }

    let words: Vec<&str> = name.split(' ').filter(|w| !w.is_empty()).collect();
    let first_names: Vec<&str> = words.iter().copied().filter(|w| !is_upper(w)).collect();
    let last_names: Vec<String> = words
        .iter()
        .copied()
        .filter(|w| is_upper(w))
        .map(capitalize_surname)
        .collect();

    format!("{} {}", first_names.join(" "), last_names.join(" "))
        .trim()
        .to_string()
}

/// Normalises a description cell for matching.
pub fn clean_description(raw: &str) -> String {
    let description = raw
        .trim()
        .replace("\\n", " ")
        .replace('\n', " ")
        .replace('`', "'")
        .replace('&', "and")
        .replace('\u{2013}', "-");
    let description = description.split_whitespace().collect::<Vec<_>>().join(" ");

    // Keeps these from matching Welsh-language Green descriptions.
    match description.to_lowercase().as_str() {
        "the green party" | "the green party candidate" => "Green Party".to_string(),
        _ => description,
    }
}
