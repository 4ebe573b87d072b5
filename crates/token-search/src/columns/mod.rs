//! Token column encoding.
//!
//! The write path: tokens from the extractor are encoded into
//! [`TokenColumnSet`]s, one per column group, collected in [`IndexColumns`].

mod builder;
mod column_set;
mod encoding;
mod layout;

pub use builder::TokenIndexBuilder;
pub use column_set::{IndexColumns, TokenColumnEncoder, TokenColumnSet};
pub use encoding::{
    ARRAY_DELIM, DELIM, KeyFormat, NULL_SYSTEM, check_component, contains_reserved,
    escape_regex, hash_token_value, split_search_on_comma, split_system_value,
    text_search_pattern, unescape,
};
pub use layout::{SHARED_TOKENS_COLUMN, TokenColumnLayout};
