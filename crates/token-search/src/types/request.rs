//! Structured search requests.
//!
//! A [`SearchRequest`] is the parsed form of a query string. It is built once by
//! the parser and then only read by the compiler and the in-memory matcher.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{InvalidSearchError, SearchResult};

/// Comparison operator of a single filter.
///
/// Covers both value prefixes (`ge`, `lt`, ...) and key modifiers
/// (`:contains`, `:missing`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    /// `eq` (default).
    Equals,
    /// `ne` prefix or `:not` modifier.
    NotEquals,
    /// `gt` prefix.
    GreaterThan,
    /// `lt` prefix.
    LessThan,
    /// `ge` prefix.
    GreaterThanOrEquals,
    /// `le` prefix.
    LessThanOrEquals,
    /// `sa` prefix.
    StartsAfter,
    /// `eb` prefix.
    EndsBefore,
    /// `ap` prefix.
    Approximately,
    /// `:contains` modifier.
    Contains,
    /// `:exact` modifier.
    Exact,
    /// `:text` modifier.
    Text,
    /// `:missing` modifier.
    Missing,
    /// `:present` modifier.
    Present,
    /// `:above` modifier.
    Above,
    /// `:below` modifier.
    Below,
    /// `:in` modifier.
    In,
    /// `:not-in` modifier.
    NotIn,
    /// `:identifier` modifier.
    Identifier,
    /// `:of-type` modifier.
    OfType,
}

impl Operator {
    /// Returns the wire spelling used in search URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "eq",
            Operator::NotEquals => "ne",
            Operator::GreaterThan => "gt",
            Operator::LessThan => "lt",
            Operator::GreaterThanOrEquals => "ge",
            Operator::LessThanOrEquals => "le",
            Operator::StartsAfter => "sa",
            Operator::EndsBefore => "eb",
            Operator::Approximately => "ap",
            Operator::Contains => "contains",
            Operator::Exact => "exact",
            Operator::Text => "text",
            Operator::Missing => "missing",
            Operator::Present => "present",
            Operator::Above => "above",
            Operator::Below => "below",
            Operator::In => "in",
            Operator::NotIn => "not-in",
            Operator::Identifier => "identifier",
            Operator::OfType => "of-type",
        }
    }

    /// Returns true for `:missing` and `:present`.
    pub fn is_presence(&self) -> bool {
        matches!(self, Operator::Missing | Operator::Present)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `(code, operator, value)` criterion.
///
/// `value` is kept verbatim: it may hold a `system|value` pair or a
/// comma-separated OR list, which the compiler and matcher decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Filter {
    /// Search parameter code.
    pub code: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Raw filter value.
    pub value: String,
    /// Unit system of a quantity filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_system: Option<String>,
    /// Unit code of a quantity filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_code: Option<String>,
}

impl Filter {
    /// Creates a filter without quantity units.
    pub fn new(code: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            operator,
            value: value.into(),
            unit_system: None,
            unit_code: None,
        }
    }

    /// Sets the quantity unit system and code.
    pub fn with_units(mut self, system: Option<String>, code: Option<String>) -> Self {
        self.unit_system = system;
        self.unit_code = code;
        self
    }
}

/// A `_sort` entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortRule {
    /// Search parameter code to sort by.
    pub code: String,
    /// True for `-code`.
    pub descending: bool,
}

impl SortRule {
    /// Parses one `_sort` field (e.g., "-date" for descending).
    pub fn parse(s: &str) -> Self {
        match s.strip_prefix('-') {
            Some(code) => Self {
                code: code.to_string(),
                descending: true,
            },
            None => Self {
                code: s.to_string(),
                descending: false,
            },
        }
    }
}

/// Mode for the `_total` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalMode {
    /// No total.
    None,
    /// Estimated total.
    Estimate,
    /// Accurate total.
    Accurate,
}

impl TotalMode {
    /// Parses a `_total` value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(TotalMode::None),
            "estimate" => Some(TotalMode::Estimate),
            "accurate" => Some(TotalMode::Accurate),
            _ => None,
        }
    }
}

/// Mode for the `_summary` parameter.
///
/// `_summary=count` is not represented here; the parser turns it into an
/// accurate total with a zero page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    /// Return summary elements only.
    True,
    /// Return full resource.
    False,
    /// Return text narrative only.
    Text,
    /// Return data elements only (no text).
    Data,
}

impl SummaryMode {
    /// Parses a `_summary` value other than `count`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "true" => Some(SummaryMode::True),
            "false" => Some(SummaryMode::False),
            "text" => Some(SummaryMode::Text),
            "data" => Some(SummaryMode::Data),
            _ => None,
        }
    }
}

/// Target of an `_include` or `_revinclude` directive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncludeTarget {
    /// Resource type holding the reference.
    pub resource_type: String,
    /// Reference search parameter to follow.
    pub search_param: String,
    /// Optional target type restriction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    /// Set by the `:iterate` modifier.
    #[serde(default)]
    pub iterate: bool,
}

impl IncludeTarget {
    /// Parses `ResourceType:search-param[:TargetType]`.
    pub fn parse(input: &str) -> SearchResult<Self> {
        let invalid = || InvalidSearchError::InvalidIncludeTarget {
            value: input.to_string(),
        };

        let parts: Vec<&str> = input.split(':').collect();
        if parts.contains(&"*") || parts.iter().any(|p| p.is_empty()) {
            return Err(invalid());
        }

        match parts.as_slice() {
            [resource_type, search_param] => Ok(Self {
                resource_type: resource_type.to_string(),
                search_param: search_param.to_string(),
                target_type: None,
                iterate: false,
            }),
            [resource_type, search_param, target_type] => Ok(Self {
                resource_type: resource_type.to_string(),
                search_param: search_param.to_string(),
                target_type: Some(target_type.to_string()),
                iterate: false,
            }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for IncludeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.search_param)?;
        if let Some(target) = &self.target_type {
            write!(f, ":{}", target)?;
        }
        Ok(())
    }
}

/// A fully parsed search request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Resource type being searched.
    pub resource_type: String,
    /// Filters, ANDed together.
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Sort rules in priority order.
    #[serde(default)]
    pub sort_rules: Vec<SortRule>,
    /// Page size (`_count`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Page offset (`_offset`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    /// Total mode (`_total`, or `_summary=count`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_mode: Option<TotalMode>,
    /// Summary mode (`_summary`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummaryMode>,
    /// Requested elements (`_elements` / `_fields`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    /// Forward includes (`_include`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<IncludeTarget>,
    /// Validated `_revinclude` value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse_include: Option<String>,
}

impl SearchRequest {
    /// Creates an empty request for the given resource type.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    /// Adds a filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds a sort rule.
    pub fn with_sort(mut self, rule: SortRule) -> Self {
        self.sort_rules.push(rule);
        self
    }

    /// Sets the page size.
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_rule_parse() {
        let asc = SortRule::parse("date");
        assert_eq!(asc.code, "date");
        assert!(!asc.descending);

        let desc = SortRule::parse("-date");
        assert_eq!(desc.code, "date");
        assert!(desc.descending);
    }

    #[test]
    fn test_include_target_parse() {
        let target = IncludeTarget::parse("Provenance:target").unwrap();
        assert_eq!(target.resource_type, "Provenance");
        assert_eq!(target.search_param, "target");
        assert_eq!(target.target_type, None);

        let typed = IncludeTarget::parse("Observation:subject:Patient").unwrap();
        assert_eq!(typed.target_type.as_deref(), Some("Patient"));
        assert_eq!(typed.to_string(), "Observation:subject:Patient");
    }

    #[test]
    fn test_include_target_rejects_malformed() {
        assert!(IncludeTarget::parse("Provenance").is_err());
        assert!(IncludeTarget::parse("Provenance:*").is_err());
        assert!(IncludeTarget::parse("a:b:c:d").is_err());
        assert!(IncludeTarget::parse("Provenance:").is_err());
    }

    #[test]
    fn test_request_builder() {
        let request = SearchRequest::new("Patient")
            .with_filter(Filter::new("name", Operator::Contains, "smith"))
            .with_sort(SortRule::parse("-birthdate"))
            .with_count(20);

        assert_eq!(request.resource_type, "Patient");
        assert_eq!(request.filters.len(), 1);
        assert_eq!(request.count, Some(20));
    }

    #[test]
    fn test_operator_wire_names() {
        assert_eq!(Operator::NotIn.to_string(), "not-in");
        assert_eq!(Operator::GreaterThanOrEquals.as_str(), "ge");
        assert!(Operator::Missing.is_presence());
    }

    #[test]
    fn test_total_and_summary_parse() {
        assert_eq!(TotalMode::parse("accurate"), Some(TotalMode::Accurate));
        assert_eq!(TotalMode::parse("all"), None);
        assert_eq!(SummaryMode::parse("data"), Some(SummaryMode::Data));
        assert_eq!(SummaryMode::parse("count"), None);
    }
}
