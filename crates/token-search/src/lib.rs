//! Helios FHIR Server Token Search
//!
//! This crate indexes FHIR token search parameters into flat, array-encoded
//! columns on the resource row and compiles token queries back into boolean
//! predicates over those columns.
//!
//! # Features
//!
//! - **Token extraction**: Identifier, CodeableConcept, Coding, ContactPoint and
//!   primitive values become normalized `(code, system, value)` tokens
//! - **Column encoding**: system-only, exact, value-only and no-system keys,
//!   free-text entries and a per-code sort scalar
//! - **Query compilation**: `system|value`, `:not`, `:text`, `:contains`,
//!   `:in`/`:not-in`, `:missing`/`:present` and `_sort`
//! - **Two evaluation paths**: SQL rendering for a store, and in-memory
//!   evaluation of both compiled predicates and raw requests
//!
//! # Architecture
//!
//! - [`types`] - Search request model and parameter vocabulary
//! - [`catalogue`] - Read-only search parameter definitions
//! - [`search`] - Request parser, token extractor and in-memory matcher
//! - [`columns`] - Token column encoding and per-resource index building
//! - [`compiler`] - Token filter and sort compilation
//! - [`sql`] - Boolean expression model, SQL rendering and evaluation
//! - [`engine`] - The [`TokenSearchEngine`] facade
//! - [`config`] - Engine configuration
//! - [`error`] - Error types
//!
//! Request parsing and query compilation fail with
//! [`InvalidSearchError`]. Indexing never fails.
//!
//! # Quick Start
//!
//! ```
//! use helios_token_search::TokenSearchEngine;
//! use helios_token_search::config::TokenSearchConfig;
//! use helios_token_search::sql::NoValueSets;
//! use serde_json::json;
//!
//! let engine = TokenSearchEngine::with_core_catalogue(TokenSearchConfig::default());
//!
//! // Write path: encode the resource's token columns
//! let columns = engine.build_index_columns(&json!({
//!     "resourceType": "Patient",
//!     "identifier": [{"system": "https://example.com", "value": "123"}]
//! }));
//!
//! // Read path: parse and compile a query
//! let request = engine
//!     .parse_query_string("Patient", "identifier=https://example.com|123")
//!     .unwrap();
//! let compiled = engine.compile_search_request(&request).unwrap();
//!
//! assert!(compiled.predicate.evaluate(&columns, &NoValueSets));
//! assert!(compiled.predicate.to_sql(0).sql.contains("&&"));
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod catalogue;
pub mod columns;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod search;
pub mod sql;
pub mod types;

// Re-export commonly used types at crate root
pub use catalogue::{CatalogueHandle, SearchParameterCatalogue, SearchParameterDefinition};
pub use columns::{IndexColumns, TokenColumnSet};
pub use config::TokenSearchConfig;
pub use engine::{CompiledSearch, TokenSearchEngine};
pub use error::{InvalidSearchError, SearchResult};
pub use sql::{Expression, OrderBy};
pub use types::{Filter, Operator, SearchRequest, SortRule};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
