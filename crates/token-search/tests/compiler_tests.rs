//! Tests for token query compilation.
//!
//! This module tests the expressions compiled for each operator and their
//! SQL rendering.

mod common;

use common::*;
use helios_token_search::TokenSearchConfig;
use helios_token_search::columns::{DELIM, KeyFormat, text_search_pattern};
use helios_token_search::sql::{
    Condition, ConditionOperator, ConditionValue, Expression, SqlParam, ValueSetResolver,
};
use helios_token_search::types::{Filter, Operator, SearchRequest, SortRule};
use helios_token_search::InvalidSearchError;

fn compile(resource_type: &str, filter: Filter) -> Expression {
    plain_engine().compile_filter(resource_type, &filter).unwrap()
}

// ============================================================================
// Membership
// ============================================================================

#[test]
fn test_equals_renders_overlap() {
    let expr = compile(
        "Patient",
        Filter::new("identifier", Operator::Equals, "https://example.com|123"),
    );
    let fragment = expr.to_sql(0);
    assert_eq!(fragment.sql, "\"Patient\".\"__sharedTokens\" && ?1::TEXT[]");
    assert_eq!(
        fragment.params,
        vec![SqlParam::TextArray(vec![format!(
            "identifier{d}https://example.com{d}123",
            d = DELIM
        )])]
    );
}

/// Comma branches collapse into one overlap.
#[test]
fn test_or_branches_share_one_condition() {
    let expr = compile("Patient", Filter::new("gender", Operator::Exact, "male, female,"));
    let Expression::Condition(Condition {
        value: ConditionValue::TextArray(keys),
        ..
    }) = expr
    else {
        panic!("expected a single condition");
    };
    assert_eq!(keys.len(), 2);
}

/// An escaped comma stays inside the branch.
#[test]
fn test_escaped_comma() {
    let expr = compile("Patient", Filter::new("identifier", Operator::Equals, "a\\,b"));
    let Expression::Condition(Condition {
        value: ConditionValue::TextArray(keys),
        ..
    }) = expr
    else {
        panic!("expected a single condition");
    };
    assert_eq!(keys, vec![format!("identifier{d}{d}a,b", d = DELIM)]);
}

#[test]
fn test_not_equals_renders_not() {
    let expr = compile("Patient", Filter::new("identifier", Operator::NotEquals, "123"));
    assert!(expr.to_sql(0).sql.starts_with("NOT ("));
}

#[test]
fn test_hashed_query_keys() {
    let engine = default_engine();
    let expr = engine
        .compile_filter("Patient", &Filter::new("gender", Operator::Equals, "male"))
        .unwrap();
    let fragment = expr.to_sql(0);
    let SqlParam::TextArray(keys) = &fragment.params[0] else {
        panic!("expected text array");
    };
    assert_eq!(
        keys[0],
        KeyFormat::Hashed.key(&format!("gender{d}{d}male", d = DELIM))
    );
}

// ============================================================================
// Text Search
// ============================================================================

#[test]
fn test_text_renders_prefilter_and_regex() {
    let expr = compile("Observation", Filter::new("code", Operator::Text, "Quick Brown"));
    let fragment = expr.to_sql(0);
    assert_eq!(
        fragment.sql,
        "(\"Observation\".\"__sharedTokens\" && ?1::TEXT[]) AND \
         ((token_array_to_text(\"Observation\".\"__sharedTokensText\") ~* ?2))"
    );
    assert_eq!(
        fragment.params[1],
        SqlParam::Text(text_search_pattern(Some("code"), "Quick Brown"))
    );
}

#[test]
fn test_contains_escapes_regex() {
    let expr = compile("Observation", Filter::new("code", Operator::Contains, "a.b"));
    let Expression::Disjunction(parts) = expr else {
        panic!("expected disjunction");
    };
    let Expression::Condition(Condition {
        operator: ConditionOperator::TokenArrayIRegex,
        value: ConditionValue::Text(pattern),
        ..
    }) = &parts[0]
    else {
        panic!("expected regex condition");
    };
    assert!(pattern.ends_with("a\\.b"));
}

/// Dedicated text columns are not anchored at a code.
#[test]
fn test_dedicated_text_pattern() {
    let engine = engine_with(TokenSearchConfig::default().with_dedicated_columns(["code"]));
    let expr = engine
        .compile_filter("Observation", &Filter::new("code", Operator::Contains, "rate"))
        .unwrap();
    let fragment = expr.to_sql(0);
    assert!(fragment.sql.contains("\"__codeText\""));
    assert_eq!(fragment.params[0], SqlParam::Text(text_search_pattern(None, "rate")));
}

// ============================================================================
// Presence
// ============================================================================

#[test]
fn test_presence_in_shared_group() {
    let missing = compile("Patient", Filter::new("gender", Operator::Missing, "true"));
    assert!(matches!(missing, Expression::Negation(_)));

    let present = compile("Patient", Filter::new("gender", Operator::Missing, "false"));
    let Expression::Condition(Condition {
        value: ConditionValue::TextArray(keys),
        ..
    }) = present
    else {
        panic!("expected overlap");
    };
    assert_eq!(keys, vec!["gender".to_string()]);
}

#[test]
fn test_presence_in_dedicated_group() {
    let engine = engine_with(TokenSearchConfig::default().with_dedicated_columns(["gender"]));
    let missing = engine
        .compile_filter("Patient", &Filter::new("gender", Operator::Missing, "true"))
        .unwrap();
    assert_eq!(
        missing.to_sql(0).sql,
        "(\"Patient\".\"__gender\" IS NULL OR cardinality(\"Patient\".\"__gender\") = 0)"
    );

    let present = engine
        .compile_filter("Patient", &Filter::new("gender", Operator::Present, "true"))
        .unwrap();
    assert_eq!(present.to_sql(0).sql, "cardinality(\"Patient\".\"__gender\") > 0");
}

// ============================================================================
// Value Sets
// ============================================================================

#[test]
fn test_in_renders_subquery() {
    let expr = compile(
        "Observation",
        Filter::new("code", Operator::In, "http://example.org/ValueSet/vitals"),
    );
    let fragment = expr.to_sql(0);
    assert!(fragment.sql.contains("\"ValueSetElement\""));
    assert!(!fragment.sql.starts_with("NOT"));
    assert_eq!(fragment.params.len(), 3);

    let negated = compile(
        "Observation",
        Filter::new("code", Operator::NotIn, "http://example.org/ValueSet/vitals"),
    );
    assert!(negated.to_sql(0).sql.starts_with("NOT ("));
}

struct EmailAddresses;

impl ValueSetResolver for EmailAddresses {
    fn members(&self, _value_set: &str) -> Vec<(String, String)> {
        vec![("email".to_string(), "Foo@Bar.COM".to_string())]
    }
}

#[test]
fn test_in_folds_case_for_contact_points() {
    let engine = default_engine();
    let patient = PatientFixture::new("p", "Doe")
        .with_telecom("email", "foo@bar.com")
        .to_json();
    let columns = engine.build_index_columns(&patient);

    let value_set = "http://example.org/ValueSet/emails";
    let expr = engine
        .compile_filter("Patient", &Filter::new("telecom", Operator::In, value_set))
        .unwrap();
    assert!(expr.evaluate(&columns, &EmailAddresses));
    assert!(expr.to_sql(0).sql.contains("lower(\"code\")"));

    let not_in = engine
        .compile_filter("Patient", &Filter::new("telecom", Operator::NotIn, value_set))
        .unwrap();
    assert!(!not_in.evaluate(&columns, &EmailAddresses));
}

// ============================================================================
// Requests and Errors
// ============================================================================

#[test]
fn test_request_placeholders_are_sequential() {
    let engine = plain_engine();
    let request = SearchRequest::new("Patient")
        .with_filter(Filter::new("identifier", Operator::Equals, "1"))
        .with_filter(Filter::new("gender", Operator::Equals, "male"))
        .with_sort(SortRule::parse("gender"));
    let compiled = engine.compile_search_request(&request).unwrap();
    let fragment = compiled.predicate.to_sql(2);
    assert!(fragment.sql.contains("?3::TEXT[]"));
    assert!(fragment.sql.contains("?4::TEXT[]"));
    assert_eq!(fragment.params.len(), 2);
    assert_eq!(
        compiled.order_by[0].to_sql(),
        "\"Patient\".\"__genderSort\""
    );
}

#[test]
fn test_compile_errors() {
    let engine = plain_engine();
    assert!(matches!(
        engine.compile_filter("Patient", &Filter::new("birthdate", Operator::Equals, "2020")),
        Err(InvalidSearchError::UnsupportedParameterType { .. })
    ));
    assert!(matches!(
        engine.compile_filter("Observation", &Filter::new("code", Operator::Below, "x")),
        Err(InvalidSearchError::UnsupportedOperator { .. })
    ));
    assert!(matches!(
        engine.compile_filter("Observation", &Filter::new("code", Operator::OfType, "x")),
        Err(InvalidSearchError::UnsupportedOperator { .. })
    ));
    assert!(matches!(
        engine.compile_filter("Patient", &Filter::new("identifier", Operator::Equals, "x\u{3}y")),
        Err(InvalidSearchError::ReservedCharacter { .. })
    ));
    assert!(matches!(
        engine.compile_sort("Patient", &SortRule::parse("name")),
        Err(InvalidSearchError::UnsupportedParameterType { .. })
    ));
}
