//! Configuration for the token search engine.
//!
//! The configuration is plain serde data. It can be built in code with the
//! `with_*` setters or loaded from JSON:
//!
//! ```
//! use helios_token_search::config::TokenSearchConfig;
//!
//! let config = TokenSearchConfig::from_json_str(r#"{
//!     "maxCount": 500,
//!     "dedicatedColumns": ["identifier"]
//! }"#).unwrap();
//!
//! assert_eq!(config.max_count, 500);
//! assert_eq!(config.default_count, 20);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::columns::KeyFormat;
use crate::error::ConfigError;

/// Default page size.
pub const DEFAULT_SEARCH_COUNT: u32 = 20;

/// Largest page size a request may ask for.
pub const DEFAULT_MAX_SEARCH_COUNT: u32 = 1000;

/// Settings shared by the parser, the index builder and the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TokenSearchConfig {
    /// Permitted `_revinclude` values (`ResourceType:param[:Target]`).
    pub revinclude_allow_list: Vec<String>,

    /// Page size callers should use when `_count` is absent.
    pub default_count: u32,

    /// Upper bound applied to `_count`.
    pub max_count: u32,

    /// Token parameter codes stored in their own columns instead of the shared group.
    pub dedicated_columns: Vec<String>,

    /// Parameter codes whose values are folded to lower case.
    pub case_insensitive_parameters: Vec<String>,

    /// Parameter codes whose every value is free-text searchable.
    pub text_search_parameters: Vec<String>,

    /// Storage format of `tokens` entries.
    pub key_format: KeyFormat,
}

impl Default for TokenSearchConfig {
    fn default() -> Self {
        Self {
            revinclude_allow_list: vec![
                "Provenance:target".to_string(),
                "AuditEvent:entity".to_string(),
                "Communication:part-of".to_string(),
            ],
            default_count: DEFAULT_SEARCH_COUNT,
            max_count: DEFAULT_MAX_SEARCH_COUNT,
            dedicated_columns: Vec::new(),
            case_insensitive_parameters: Vec::new(),
            text_search_parameters: Vec::new(),
            key_format: KeyFormat::Hashed,
        }
    }
}

impl TokenSearchConfig {
    /// Parses a JSON configuration document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Replaces the `_revinclude` allow-list.
    pub fn with_revinclude_allow_list<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.revinclude_allow_list = values.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the `_count` upper bound.
    pub fn with_max_count(mut self, max_count: u32) -> Self {
        self.max_count = max_count;
        self
    }

    /// Gives the listed parameters dedicated columns.
    pub fn with_dedicated_columns<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dedicated_columns = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Marks the listed parameters case-insensitive.
    pub fn with_case_insensitive_parameters<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.case_insensitive_parameters = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Marks the listed parameters text-searchable.
    pub fn with_text_search_parameters<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.text_search_parameters = codes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the key format.
    pub fn with_key_format(mut self, key_format: KeyFormat) -> Self {
        self.key_format = key_format;
        self
    }

    /// Returns true if `value` is an allowed `_revinclude` target.
    pub fn allows_revinclude(&self, value: &str) -> bool {
        self.revinclude_allow_list.iter().any(|v| v == value)
    }

    /// Returns true if the parameter is configured for dedicated columns.
    pub fn has_dedicated_columns(&self, code: &str) -> bool {
        self.dedicated_columns.iter().any(|c| c == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TokenSearchConfig::default();
        assert_eq!(config.default_count, 20);
        assert_eq!(config.max_count, 1000);
        assert_eq!(config.key_format, KeyFormat::Hashed);
        assert!(config.allows_revinclude("Provenance:target"));
        assert!(!config.allows_revinclude("Patient:link"));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            TokenSearchConfig::from_json_str(r#"{"keyFormat": "plain", "maxCount": 50}"#).unwrap();
        assert_eq!(config.key_format, KeyFormat::Plain);
        assert_eq!(config.max_count, 50);
        assert_eq!(config.default_count, 20);
        assert_eq!(config.revinclude_allow_list.len(), 3);
    }

    #[test]
    fn test_invalid_json() {
        let err = TokenSearchConfig::from_json_str(r#"{"maxCount": "many"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"dedicatedColumns": ["identifier"]}}"#).unwrap();

        let config = TokenSearchConfig::from_file(file.path()).unwrap();
        assert!(config.has_dedicated_columns("identifier"));
        assert!(!config.has_dedicated_columns("code"));
    }

    #[test]
    fn test_missing_file() {
        let err = TokenSearchConfig::from_file("/nonexistent/token-search.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_builder_setters() {
        let config = TokenSearchConfig::default()
            .with_revinclude_allow_list(["Provenance:target"])
            .with_max_count(10)
            .with_text_search_parameters(["code"]);
        assert_eq!(config.revinclude_allow_list, vec!["Provenance:target"]);
        assert_eq!(config.max_count, 10);
        assert_eq!(config.text_search_parameters, vec!["code"]);
    }
}
