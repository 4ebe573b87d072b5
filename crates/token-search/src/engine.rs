//! The token search engine facade.
//!
//! [`TokenSearchEngine`] bundles one catalogue snapshot, the configuration and
//! an expression evaluator, and exposes the operations storage and routing
//! code call: parse, index, compile and match.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::catalogue::{CatalogueHandle, SearchParameterCatalogue};
use crate::columns::{IndexColumns, TokenIndexBuilder};
use crate::compiler::TokenQueryCompiler;
use crate::config::TokenSearchConfig;
use crate::error::SearchResult;
use crate::search::{ExpressionEvaluator, PathEvaluator, ResourceMatcher, SearchRequestParser};
use crate::sql::{Expression, OrderBy};
use crate::types::{Filter, SearchRequest, SortRule};

/// A compiled search: the conjunction of every filter plus the sort order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSearch {
    /// Filters ANDed together. Empty when the request has no filters.
    pub predicate: Expression,
    /// Sort columns in priority order.
    pub order_by: Vec<OrderBy>,
}

/// Parses, indexes, compiles and matches against one catalogue snapshot.
///
/// The engine is immutable and cheap to clone; share it across threads.
#[derive(Clone)]
pub struct TokenSearchEngine {
    catalogue: Arc<SearchParameterCatalogue>,
    config: Arc<TokenSearchConfig>,
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl TokenSearchEngine {
    /// Creates an engine using the built-in [`PathEvaluator`].
    pub fn new(catalogue: Arc<SearchParameterCatalogue>, config: TokenSearchConfig) -> Self {
        Self {
            catalogue,
            config: Arc::new(config),
            evaluator: Arc::new(PathEvaluator::new()),
        }
    }

    /// Creates an engine over the embedded and built-in parameters, with the
    /// configuration's annotations applied.
    pub fn with_core_catalogue(config: TokenSearchConfig) -> Self {
        let catalogue = SearchParameterCatalogue::builder()
            .with_embedded()
            .with_builtins()
            .with_config(&config)
            .build();
        Self::new(Arc::new(catalogue), config)
    }

    /// Creates an engine over the handle's current snapshot.
    ///
    /// Later publishes to the handle do not affect this engine.
    pub fn from_handle(handle: &CatalogueHandle, config: TokenSearchConfig) -> Self {
        Self::new(handle.snapshot(), config)
    }

    /// Replaces the expression evaluator.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// The catalogue snapshot.
    pub fn catalogue(&self) -> &SearchParameterCatalogue {
        &self.catalogue
    }

    /// The configuration.
    pub fn config(&self) -> &TokenSearchConfig {
        &self.config
    }

    /// Parses ordered query parameters into a request.
    pub fn parse_search_request(
        &self,
        resource_type: &str,
        params: &[(String, String)],
    ) -> SearchResult<SearchRequest> {
        SearchRequestParser::new(&self.catalogue, &self.config).parse(resource_type, params)
    }

    /// Parses a URL-encoded query string into a request.
    pub fn parse_query_string(
        &self,
        resource_type: &str,
        query: &str,
    ) -> SearchResult<SearchRequest> {
        SearchRequestParser::new(&self.catalogue, &self.config)
            .parse_query_string(resource_type, query)
    }

    /// Builds the token index columns of a resource.
    pub fn build_index_columns(&self, resource: &Value) -> IndexColumns {
        TokenIndexBuilder::new(&self.catalogue, &self.config, self.evaluator.as_ref())
            .build_index_columns(resource)
    }

    /// Compiles one token filter.
    pub fn compile_filter(&self, resource_type: &str, filter: &Filter) -> SearchResult<Expression> {
        self.compiler().compile_filter(resource_type, filter)
    }

    /// Compiles one token sort rule.
    pub fn compile_sort(&self, resource_type: &str, rule: &SortRule) -> SearchResult<OrderBy> {
        self.compiler().compile_sort(resource_type, rule)
    }

    /// Compiles every filter and sort rule of a request.
    ///
    /// Fails on the first filter or sort rule that is not a token parameter.
    pub fn compile_search_request(&self, request: &SearchRequest) -> SearchResult<CompiledSearch> {
        let compiler = self.compiler();
        let predicates = request
            .filters
            .iter()
            .map(|filter| compiler.compile_filter(&request.resource_type, filter))
            .collect::<SearchResult<Vec<_>>>()?;
        let order_by = request
            .sort_rules
            .iter()
            .map(|rule| compiler.compile_sort(&request.resource_type, rule))
            .collect::<SearchResult<Vec<_>>>()?;

        Ok(CompiledSearch {
            predicate: Expression::Conjunction(predicates),
            order_by,
        })
    }

    /// Matches a resource against a request in memory.
    pub fn matches_search_request(&self, resource: &Value, request: &SearchRequest) -> bool {
        ResourceMatcher::new(&self.catalogue, self.evaluator.as_ref())
            .matches_search_request(resource, request)
    }

    fn compiler(&self) -> TokenQueryCompiler<'_> {
        TokenQueryCompiler::new(&self.catalogue, &self.config)
    }
}

impl fmt::Debug for TokenSearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSearchEngine")
            .field("catalogue", &self.catalogue)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
