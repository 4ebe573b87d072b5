//! Physical layout of a token parameter's columns.

use crate::catalogue::SearchParameterDefinition;
use crate::config::TokenSearchConfig;
use crate::sql::{Column, ColumnTarget};

use super::encoding::DELIM;

/// Token column group shared by every parameter without dedicated columns.
pub const SHARED_TOKENS_COLUMN: &str = "__sharedTokens";

/// Where and how one token parameter is stored.
///
/// Shared parameters prefix every entry with `code + DELIM` and write a bare
/// `code` entry for presence checks. Dedicated parameters store unprefixed
/// entries in `__<code>`; presence is an emptiness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenColumnLayout {
    /// Parameter code.
    pub code: String,
    /// Token column group name.
    pub group: String,
    /// True when the parameter owns its columns.
    pub dedicated: bool,
    /// Values are lower-cased on write and query.
    pub case_insensitive: bool,
    /// Every value is written to the text column.
    pub text_search: bool,
}

impl TokenColumnLayout {
    /// Resolves the layout of a token parameter.
    pub fn for_parameter(param: &SearchParameterDefinition, config: &TokenSearchConfig) -> Self {
        let dedicated = config.has_dedicated_columns(&param.code);
        let group = if dedicated {
            format!("__{}", param.code)
        } else {
            SHARED_TOKENS_COLUMN.to_string()
        };
        Self {
            code: param.code.clone(),
            group,
            dedicated,
            case_insensitive: param.is_case_insensitive(),
            text_search: param.text_search,
        }
    }

    /// Entry prefix: `code + DELIM` for shared groups, empty for dedicated ones.
    pub fn prefix(&self) -> String {
        if self.dedicated {
            String::new()
        } else {
            format!("{}{}", self.code, DELIM)
        }
    }

    /// Code used to anchor text regexes in shared groups.
    pub fn text_anchor(&self) -> Option<&str> {
        (!self.dedicated).then_some(self.code.as_str())
    }

    /// The `tokens` column.
    pub fn tokens_column(&self, table: &str) -> Column {
        Column::new(table, &self.group, ColumnTarget::Tokens)
    }

    /// The text-search column.
    pub fn text_column(&self, table: &str) -> Column {
        Column::new(table, &self.group, ColumnTarget::TextTokens)
    }

    /// The sort column.
    pub fn sort_column(&self, table: &str) -> Column {
        Column::new(
            table,
            &self.group,
            ColumnTarget::Sort {
                code: self.code.clone(),
            },
        )
    }
}
