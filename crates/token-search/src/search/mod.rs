//! Search request parsing, token extraction and in-memory matching.
//!
//! - [`parser`] - query parameters to [`SearchRequest`](crate::types::SearchRequest)
//! - [`path`] - the path expression evaluator behind extraction
//! - [`tokens`] - `(code, system, value)` extraction for token parameters
//! - [`matcher`] - direct evaluation of a request against a resource
//!
//! # Example
//!
//! ```
//! use helios_token_search::catalogue::SearchParameterCatalogue;
//! use helios_token_search::search::{PathEvaluator, TokenExtractor};
//! use serde_json::json;
//!
//! let catalogue = SearchParameterCatalogue::core();
//! let param = catalogue.get("Patient", "identifier").unwrap();
//! let evaluator = PathEvaluator::new();
//!
//! let tokens = TokenExtractor::new(&evaluator).extract_tokens(
//!     &json!({
//!         "resourceType": "Patient",
//!         "identifier": [{"system": "http://example.com/mrn", "value": "123"}]
//!     }),
//!     param,
//! );
//! assert_eq!(tokens[0].system.as_deref(), Some("http://example.com/mrn"));
//! ```

pub mod matcher;
pub mod parser;
pub mod path;
pub mod tokens;

pub use matcher::ResourceMatcher;
pub use parser::SearchRequestParser;
pub use path::{ExpressionEvaluator, PathEvaluator, TypedValue};
pub use tokens::{TEXT_SYSTEM, Token, TokenExtractor};
