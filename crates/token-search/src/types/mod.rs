//! Core types for search requests and search parameters.

mod request;
mod search_params;

pub use request::{
    Filter, IncludeTarget, Operator, SearchRequest, SortRule, SummaryMode, TotalMode,
};
pub use search_params::{SearchModifier, SearchParamType, SearchPrefix};
