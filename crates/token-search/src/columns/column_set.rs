//! Encoded token containers.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::search::Token;

use super::encoding::{ARRAY_DELIM, DELIM, KeyFormat, NULL_SYSTEM, contains_reserved};
use super::layout::TokenColumnLayout;

/// The three containers of one token column group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenColumnSet {
    tokens: BTreeSet<String>,
    text_tokens: BTreeSet<String>,
    sort_values: BTreeMap<String, String>,
}

impl TokenColumnSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Membership keys.
    pub fn tokens(&self) -> &BTreeSet<String> {
        &self.tokens
    }

    /// Free-text entries.
    pub fn text_tokens(&self) -> &BTreeSet<String> {
        &self.text_tokens
    }

    /// Sort scalars by parameter code.
    pub fn sort_values(&self) -> &BTreeMap<String, String> {
        &self.sort_values
    }

    /// Sort scalar of one parameter code.
    pub fn sort_value(&self, code: &str) -> Option<&str> {
        self.sort_values.get(code).map(String::as_str)
    }

    /// Returns true if the `tokens` container holds `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.tokens.contains(key)
    }

    /// Returns true if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.text_tokens.is_empty() && self.sort_values.is_empty()
    }

    /// `textTokens` serialized for regex matching:
    /// `ARRAY_DELIM + join(ARRAY_DELIM) + ARRAY_DELIM`.
    pub fn text_blob(&self) -> String {
        serialize_array(&self.text_tokens)
    }

    /// `tokens` serialized the same way as [`text_blob`](Self::text_blob).
    pub fn tokens_blob(&self) -> String {
        serialize_array(&self.tokens)
    }

    fn offer_sort_value(&mut self, code: &str, value: &str) {
        match self.sort_values.get_mut(code) {
            Some(current) if current.as_str() <= value => {}
            Some(current) => *current = value.to_string(),
            None => {
                self.sort_values.insert(code.to_string(), value.to_string());
            }
        }
    }
}

fn serialize_array(values: &BTreeSet<String>) -> String {
    let mut blob = String::new();
    blob.push(ARRAY_DELIM);
    for value in values {
        blob.push_str(value);
        blob.push(ARRAY_DELIM);
    }
    blob
}

/// Index columns of one resource, keyed by token column group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexColumns {
    groups: BTreeMap<String, TokenColumnSet>,
}

impl IndexColumns {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the set of a group.
    pub fn get(&self, group: &str) -> Option<&TokenColumnSet> {
        self.groups.get(group)
    }

    /// Returns the set of a group, creating it when absent.
    pub fn group_mut(&mut self, group: &str) -> &mut TokenColumnSet {
        self.groups.entry(group.to_string()).or_default()
    }

    /// Iterates groups in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TokenColumnSet)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if no group was written.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Writes one parameter's tokens into a column set.
///
/// Encoding is additive: several parameters sharing a group can encode into
/// the same [`TokenColumnSet`] one after the other.
#[derive(Debug)]
pub struct TokenColumnEncoder<'a> {
    layout: &'a TokenColumnLayout,
    key_format: KeyFormat,
}

impl<'a> TokenColumnEncoder<'a> {
    /// Creates an encoder for one parameter layout.
    pub fn new(layout: &'a TokenColumnLayout, key_format: KeyFormat) -> Self {
        Self { layout, key_format }
    }

    /// Encodes tokens into `set`.
    pub fn encode(&self, tokens: &[Token], set: &mut TokenColumnSet) {
        let layout = self.layout;
        let prefix = layout.prefix();

        for token in tokens {
            if token.code != layout.code {
                warn!(
                    expected = %layout.code,
                    code = %token.code,
                    "token code does not match its search parameter, skipping"
                );
                continue;
            }

            let system = token.system.as_deref().map(str::trim).filter(|s| !s.is_empty());
            let value = token
                .value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| {
                    if layout.case_insensitive {
                        v.to_lowercase()
                    } else {
                        v.to_string()
                    }
                });
            if system.is_none() && value.is_none() {
                continue;
            }

            if system.is_some_and(contains_reserved)
                || value.as_deref().is_some_and(contains_reserved)
            {
                warn!(
                    code = %layout.code,
                    "token contains a reserved delimiter character, skipping"
                );
                continue;
            }

            if let Some(value) = &value {
                if token.is_text() || layout.text_search {
                    let entry = if layout.dedicated {
                        value.clone()
                    } else {
                        format!("{}{}{}{}", layout.code, DELIM, DELIM, value)
                    };
                    set.text_tokens.insert(entry);
                }
            }

            if !layout.dedicated {
                self.add(set, layout.code.clone());
            }

            if let Some(system) = system {
                self.add(set, format!("{}{}", prefix, system));
                if let Some(value) = &value {
                    self.add(set, format!("{}{}{}{}", prefix, system, DELIM, value));
                }
            }

            if let Some(value) = &value {
                set.offer_sort_value(&layout.code, value);
                self.add(set, format!("{}{}{}", prefix, DELIM, value));
                if system.is_none() {
                    self.add(set, format!("{}{}{}{}", prefix, NULL_SYSTEM, DELIM, value));
                }
            }
        }
    }

    fn add(&self, set: &mut TokenColumnSet, entry: String) {
        set.tokens.insert(self.key_format.key(&entry));
    }
}
