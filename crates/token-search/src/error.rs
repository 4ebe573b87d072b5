//! Error types for the token search engine.
//!
//! Errors are split by phase:
//!
//! - [`InvalidSearchError`] is returned by parsing and compiling. It always names
//!   the offending key, code, or value so it can be reported back as a rejected
//!   request.
//! - [`CatalogueError`] and [`ConfigError`] cover startup: loading search
//!   parameter definitions and reading configuration.
//!
//! The write path (token extraction and column encoding) has no error type. It
//! logs anomalies and indexes what it can.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use thiserror::Error;

/// A search request that cannot be parsed or compiled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidSearchError {
    /// The key does not name a search parameter declared for the resource type.
    #[error("unknown search parameter '{code}' for resource type '{resource_type}'")]
    UnknownParameter { resource_type: String, code: String },

    /// The modifier suffix is unknown or not valid for the parameter's type.
    #[error("unsupported modifier '{modifier}' for search parameter '{code}'")]
    UnsupportedModifier { code: String, modifier: String },

    /// The operator has no meaning for the parameter's storage strategy.
    #[error("search filter '{operator}' not supported for '{code}'")]
    UnsupportedOperator { code: String, operator: String },

    /// The parameter's declared type is outside what this engine handles.
    #[error("search parameter '{code}' has unsupported type '{param_type}'")]
    UnsupportedParameterType { code: String, param_type: String },

    /// The `_revinclude` target is well formed but not in the allow-list.
    #[error("unsupported _revinclude target '{value}'")]
    UnsupportedRevinclude { value: String },

    /// An `_include`/`_revinclude` value is not `ResourceType:param[:Target]`.
    #[error("invalid include value '{value}': must be of the form ResourceType:search-parameter")]
    InvalidIncludeTarget { value: String },

    /// A pagination parameter is not a non-negative integer.
    #[error("invalid integer for {parameter}: '{value}'")]
    InvalidInteger { parameter: String, value: String },

    /// A value is malformed for its parameter (for example a bad date).
    #[error("invalid value for {parameter}: {message}")]
    InvalidValue { parameter: String, message: String },

    /// A query value contains one of the control characters used as index delimiters.
    #[error("search value {value:?} contains a reserved control character")]
    ReservedCharacter { value: String },
}

impl InvalidSearchError {
    /// Returns the search parameter code or key the error refers to, if any.
    pub fn parameter(&self) -> Option<&str> {
        match self {
            InvalidSearchError::UnknownParameter { code, .. }
            | InvalidSearchError::UnsupportedModifier { code, .. }
            | InvalidSearchError::UnsupportedOperator { code, .. }
            | InvalidSearchError::UnsupportedParameterType { code, .. } => Some(code),
            InvalidSearchError::InvalidInteger { parameter, .. }
            | InvalidSearchError::InvalidValue { parameter, .. } => Some(parameter),
            InvalidSearchError::UnsupportedRevinclude { .. }
            | InvalidSearchError::InvalidIncludeTarget { .. } => Some("_revinclude"),
            InvalidSearchError::ReservedCharacter { .. } => None,
        }
    }
}

/// Result type for parse and compile operations.
pub type SearchResult<T> = Result<T, InvalidSearchError>;

/// Errors raised while assembling the search parameter catalogue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogueError {
    #[error("search parameter with URL '{url}' is already registered")]
    DuplicateUrl { url: String },

    #[error("SearchParameter missing required field '{field}' (url: {url:?})")]
    MissingField { field: String, url: Option<String> },

    #[error("invalid SearchParameter (url: {url:?}): {message}")]
    InvalidResource { message: String, url: Option<String> },

    #[error("failed to load search parameters from '{path}': {message}")]
    ConfigLoadFailed { path: String, message: String },
}

/// Errors raised while loading [`TokenSearchConfig`](crate::config::TokenSearchConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_parameter_message() {
        let err = InvalidSearchError::UnknownParameter {
            resource_type: "Patient".to_string(),
            code: "foo".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unknown search parameter 'foo' for resource type 'Patient'"
        );
        assert_eq!(err.parameter(), Some("foo"));
    }

    #[test]
    fn test_invalid_integer_names_parameter() {
        let err = InvalidSearchError::InvalidInteger {
            parameter: "_count".to_string(),
            value: "abc".to_string(),
        };
        assert_eq!(err.parameter(), Some("_count"));
        assert!(err.to_string().contains("abc"));
    }
}
