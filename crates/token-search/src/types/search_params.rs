//! FHIR search parameter vocabulary.
//!
//! Parameter types, the modifier suffixes accepted after a `:` in a query key,
//! and the two-character comparison prefixes accepted on ordered values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::request::Operator;

/// FHIR search parameter types.
///
/// See: https://build.fhir.org/search.html#ptypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParamType {
    /// A simple string, like a name or description.
    String,
    /// A search against a URI.
    Uri,
    /// A search for a number.
    Number,
    /// A search for a date, dateTime, or period.
    Date,
    /// A quantity, with a number and units.
    Quantity,
    /// A code from a code system or value set.
    Token,
    /// A reference to another resource.
    Reference,
    /// A composite search parameter that combines others.
    Composite,
    /// Special search parameters with bespoke semantics.
    Special,
}

impl fmt::Display for SearchParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchParamType::String => write!(f, "string"),
            SearchParamType::Uri => write!(f, "uri"),
            SearchParamType::Number => write!(f, "number"),
            SearchParamType::Date => write!(f, "date"),
            SearchParamType::Quantity => write!(f, "quantity"),
            SearchParamType::Token => write!(f, "token"),
            SearchParamType::Reference => write!(f, "reference"),
            SearchParamType::Composite => write!(f, "composite"),
            SearchParamType::Special => write!(f, "special"),
        }
    }
}

impl FromStr for SearchParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(SearchParamType::String),
            "uri" => Ok(SearchParamType::Uri),
            "number" => Ok(SearchParamType::Number),
            "date" => Ok(SearchParamType::Date),
            "quantity" => Ok(SearchParamType::Quantity),
            "token" => Ok(SearchParamType::Token),
            "reference" => Ok(SearchParamType::Reference),
            "composite" => Ok(SearchParamType::Composite),
            "special" => Ok(SearchParamType::Special),
            _ => Err(format!("unknown search parameter type: {}", s)),
        }
    }
}

/// Modifier suffixes accepted on a search key (`code:modifier`).
///
/// See: https://build.fhir.org/search.html#modifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchModifier {
    /// Full-text search over display text.
    Text,
    /// Substring match.
    Contains,
    /// Exact match.
    Exact,
    /// Match if the value is absent (`true`) or present (`false`).
    Missing,
    /// Match if the value is present (`true`) or absent (`false`).
    Present,
    /// Codes above in the hierarchy.
    Above,
    /// Codes below in the hierarchy.
    Below,
    /// Negation.
    Not,
    /// Codes in a value set.
    In,
    /// Codes not in a value set.
    NotIn,
    /// Identifier type and value.
    OfType,
    /// Reference by identifier.
    Identifier,
    /// Follow includes of included resources.
    Iterate,
}

impl fmt::Display for SearchModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchModifier::Text => "text",
            SearchModifier::Contains => "contains",
            SearchModifier::Exact => "exact",
            SearchModifier::Missing => "missing",
            SearchModifier::Present => "present",
            SearchModifier::Above => "above",
            SearchModifier::Below => "below",
            SearchModifier::Not => "not",
            SearchModifier::In => "in",
            SearchModifier::NotIn => "not-in",
            SearchModifier::OfType => "of-type",
            SearchModifier::Identifier => "identifier",
            SearchModifier::Iterate => "iterate",
        };
        f.write_str(s)
    }
}

impl SearchModifier {
    /// Parses a modifier suffix, returning None for unknown modifiers.
    ///
    /// Modifiers are matched case-sensitively, as written in search URLs.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(SearchModifier::Text),
            "contains" => Some(SearchModifier::Contains),
            "exact" => Some(SearchModifier::Exact),
            "missing" => Some(SearchModifier::Missing),
            "present" => Some(SearchModifier::Present),
            "above" => Some(SearchModifier::Above),
            "below" => Some(SearchModifier::Below),
            "not" => Some(SearchModifier::Not),
            "in" => Some(SearchModifier::In),
            "not-in" => Some(SearchModifier::NotIn),
            "of-type" => Some(SearchModifier::OfType),
            "identifier" => Some(SearchModifier::Identifier),
            "iterate" => Some(SearchModifier::Iterate),
            _ => None,
        }
    }

    /// Returns true for `:missing` and `:present`, which apply to every type.
    pub fn is_presence(&self) -> bool {
        matches!(self, SearchModifier::Missing | SearchModifier::Present)
    }

    /// Maps the modifier onto the filter operator it selects.
    ///
    /// `:iterate` only applies to include directives and has no operator.
    pub fn to_operator(&self) -> Option<Operator> {
        match self {
            SearchModifier::Text => Some(Operator::Text),
            SearchModifier::Contains => Some(Operator::Contains),
            SearchModifier::Exact => Some(Operator::Exact),
            SearchModifier::Missing => Some(Operator::Missing),
            SearchModifier::Present => Some(Operator::Present),
            SearchModifier::Above => Some(Operator::Above),
            SearchModifier::Below => Some(Operator::Below),
            SearchModifier::Not => Some(Operator::NotEquals),
            SearchModifier::In => Some(Operator::In),
            SearchModifier::NotIn => Some(Operator::NotIn),
            SearchModifier::OfType => Some(Operator::OfType),
            SearchModifier::Identifier => Some(Operator::Identifier),
            SearchModifier::Iterate => None,
        }
    }
}

/// Comparison prefixes for ordered search parameters.
///
/// See: https://build.fhir.org/search.html#prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchPrefix {
    /// Equal (default).
    #[default]
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Less than.
    Lt,
    /// Greater than or equal.
    Ge,
    /// Less than or equal.
    Le,
    /// Starts after.
    Sa,
    /// Ends before.
    Eb,
    /// Approximately equal.
    Ap,
}

impl fmt::Display for SearchPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchPrefix::Eq => write!(f, "eq"),
            SearchPrefix::Ne => write!(f, "ne"),
            SearchPrefix::Gt => write!(f, "gt"),
            SearchPrefix::Lt => write!(f, "lt"),
            SearchPrefix::Ge => write!(f, "ge"),
            SearchPrefix::Le => write!(f, "le"),
            SearchPrefix::Sa => write!(f, "sa"),
            SearchPrefix::Eb => write!(f, "eb"),
            SearchPrefix::Ap => write!(f, "ap"),
        }
    }
}

impl FromStr for SearchPrefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(SearchPrefix::Eq),
            "ne" => Ok(SearchPrefix::Ne),
            "gt" => Ok(SearchPrefix::Gt),
            "lt" => Ok(SearchPrefix::Lt),
            "ge" => Ok(SearchPrefix::Ge),
            "le" => Ok(SearchPrefix::Le),
            "sa" => Ok(SearchPrefix::Sa),
            "eb" => Ok(SearchPrefix::Eb),
            "ap" => Ok(SearchPrefix::Ap),
            _ => Err(format!("unknown search prefix: {}", s)),
        }
    }
}

impl SearchPrefix {
    /// Extracts a prefix from the beginning of a value string.
    ///
    /// The first two characters are consumed only when they are exactly one of
    /// the known prefixes; otherwise the whole value is returned with `Eq`.
    pub fn extract(value: &str) -> (Self, &str) {
        if let Some(head) = value.get(..2) {
            if let Ok(prefix) = head.parse() {
                return (prefix, &value[2..]);
            }
        }
        (SearchPrefix::Eq, value)
    }

    /// Maps the prefix onto its filter operator.
    pub fn to_operator(&self) -> Operator {
        match self {
            SearchPrefix::Eq => Operator::Equals,
            SearchPrefix::Ne => Operator::NotEquals,
            SearchPrefix::Gt => Operator::GreaterThan,
            SearchPrefix::Lt => Operator::LessThan,
            SearchPrefix::Ge => Operator::GreaterThanOrEquals,
            SearchPrefix::Le => Operator::LessThanOrEquals,
            SearchPrefix::Sa => Operator::StartsAfter,
            SearchPrefix::Eb => Operator::EndsBefore,
            SearchPrefix::Ap => Operator::Approximately,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_param_type_parse() {
        assert_eq!(
            "string".parse::<SearchParamType>().unwrap(),
            SearchParamType::String
        );
        assert_eq!(
            "TOKEN".parse::<SearchParamType>().unwrap(),
            SearchParamType::Token
        );
        assert!("bogus".parse::<SearchParamType>().is_err());
        assert_eq!(SearchParamType::Reference.to_string(), "reference");
    }

    #[test]
    fn test_search_modifier_parse() {
        assert_eq!(SearchModifier::parse("not-in"), Some(SearchModifier::NotIn));
        assert_eq!(SearchModifier::parse("of-type"), Some(SearchModifier::OfType));
        assert_eq!(SearchModifier::parse("Patient"), None);
        assert_eq!(SearchModifier::parse("CONTAINS"), None);
        assert_eq!(SearchModifier::NotIn.to_string(), "not-in");
    }

    #[test]
    fn test_modifier_operator_mapping() {
        assert_eq!(SearchModifier::Not.to_operator(), Some(Operator::NotEquals));
        assert_eq!(SearchModifier::Text.to_operator(), Some(Operator::Text));
        assert_eq!(SearchModifier::Iterate.to_operator(), None);
        assert!(SearchModifier::Present.is_presence());
        assert!(!SearchModifier::Exact.is_presence());
    }

    #[test]
    fn test_search_prefix_extract() {
        assert_eq!(
            SearchPrefix::extract("gt2020-01-01"),
            (SearchPrefix::Gt, "2020-01-01")
        );
        assert_eq!(
            SearchPrefix::extract("2020-01-01"),
            (SearchPrefix::Eq, "2020-01-01")
        );
        assert_eq!(SearchPrefix::extract("le100"), (SearchPrefix::Le, "100"));
        assert_eq!(SearchPrefix::extract("ne"), (SearchPrefix::Ne, ""));
        assert_eq!(SearchPrefix::extract("7"), (SearchPrefix::Eq, "7"));
    }

    #[test]
    fn test_prefix_like_value_is_not_consumed() {
        // "xy" looks like a prefix but is not one
        assert_eq!(SearchPrefix::extract("xy12"), (SearchPrefix::Eq, "xy12"));
        assert_eq!(SearchPrefix::extract("GT5"), (SearchPrefix::Eq, "GT5"));
        // multi-byte input must not split a character
        assert_eq!(SearchPrefix::extract("é5"), (SearchPrefix::Eq, "é5"));
    }
}
