//! Encoding primitives for token columns.
//!
//! Every index entry is a string built from a parameter code, a system and a
//! value joined by control characters. Those characters can never appear in
//! FHIR system or value strings, so the layout stays unambiguous as long as raw
//! input containing them is rejected. [`check_component`] enforces that.
//!
//! The same module also holds the query-value splitting helpers. Splitting and
//! key building live together so that the write path and the read path cannot
//! drift apart.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{InvalidSearchError, SearchResult};

/// Separates code, system and value inside one entry.
pub const DELIM: char = '\u{1}';

/// Stands in for "no system" so `|value` queries can be told apart from `value`.
pub const NULL_SYSTEM: char = '\u{2}';

/// Joins entries when a text column is serialized for regex matching.
pub const ARRAY_DELIM: char = '\u{3}';

const RESERVED: [char; 3] = [DELIM, NULL_SYSTEM, ARRAY_DELIM];

/// How entries of the `tokens` container are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyFormat {
    /// UUIDv5 of the encoded entry in the NIL namespace (fixed width).
    #[default]
    Hashed,
    /// The encoded entry itself.
    Plain,
}

impl KeyFormat {
    /// Converts an encoded entry into its stored key.
    pub fn key(&self, encoded: &str) -> String {
        match self {
            KeyFormat::Hashed => hash_token_value(encoded),
            KeyFormat::Plain => encoded.to_string(),
        }
    }
}

/// Hashes an encoded entry into a stable fixed-width key.
pub fn hash_token_value(encoded: &str) -> String {
    Uuid::new_v5(&Uuid::nil(), encoded.as_bytes()).to_string()
}

/// Returns true if the string contains any delimiter character.
pub fn contains_reserved(s: &str) -> bool {
    s.chars().any(|c| RESERVED.contains(&c))
}

/// Rejects query components that would corrupt an encoded key.
pub fn check_component(s: &str) -> SearchResult<&str> {
    if contains_reserved(s) {
        return Err(InvalidSearchError::ReservedCharacter {
            value: s.to_string(),
        });
    }
    Ok(s)
}

/// Escapes the regex metacharacters `. ^ $ * + ? ( ) [ ] { } \ |`.
pub fn escape_regex(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(
            c,
            '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '\\' | '|'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Builds the regex that finds `query` inside one entry of a serialized text column.
///
/// The match is anchored at an entry boundary. With `code` set (shared
/// columns) it is anchored at that parameter's entries only. The query may
/// appear anywhere inside the entry's value.
pub fn text_search_pattern(code: Option<&str>, query: &str) -> String {
    let mut pattern = String::new();
    pattern.push(ARRAY_DELIM);
    if let Some(code) = code {
        pattern.push_str(code);
        pattern.push(DELIM);
        pattern.push(DELIM);
    }
    pattern.push_str("[^");
    pattern.push(ARRAY_DELIM);
    pattern.push_str("]*");
    pattern.push_str(&escape_regex(query));
    pattern
}

/// Splits a search value on unescaped commas.
///
/// Backslash escapes are preserved in the returned branches so that a later
/// `|` split can still tell `\|` apart from a separator. Use [`unescape`] on
/// the final components.
///
/// See: https://hl7.org/fhir/r4/search.html#escaping
pub fn split_search_on_comma(input: &str) -> Vec<String> {
    split_unescaped(input, ',', usize::MAX)
}

/// Splits a branch on its first unescaped `|` into `(system, value)`.
///
/// Returns `None` for the system when the branch has no separator. Both parts
/// are unescaped.
pub fn split_system_value(branch: &str) -> (Option<String>, String) {
    let mut parts = split_unescaped(branch, '|', 2).into_iter();
    let first = parts.next().unwrap_or_default();
    match parts.next() {
        Some(value) => (Some(unescape(&first)), unescape(&value)),
        None => (None, unescape(&first)),
    }
}

/// Removes backslash escapes (`\,`, `\|`, `\$`, `\\`).
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push(c),
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn split_unescaped(input: &str, separator: char, limit: usize) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c == separator && result.len() + 1 < limit {
            result.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }

    result.push(current);
    result
}
