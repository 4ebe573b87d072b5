//! In-memory resource matching.
//!
//! Evaluates a [`SearchRequest`] directly against a resource, without going
//! through the index. Only reference, string and token parameters are
//! supported; anything else fails closed.

use serde_json::Value;
use tracing::debug;

use crate::catalogue::{SearchParameterCatalogue, SearchParameterDefinition};
use crate::columns::{split_search_on_comma, split_system_value, unescape};
use crate::compiler::should_token_exist_for_missing_or_present;
use crate::types::{Filter, Operator, SearchParamType, SearchRequest};

use super::path::ExpressionEvaluator;
use super::tokens::{Token, TokenExtractor};

/// Matches resources against search requests.
pub struct ResourceMatcher<'a> {
    catalogue: &'a SearchParameterCatalogue,
    evaluator: &'a dyn ExpressionEvaluator,
}

impl<'a> ResourceMatcher<'a> {
    /// Creates a matcher.
    pub fn new(
        catalogue: &'a SearchParameterCatalogue,
        evaluator: &'a dyn ExpressionEvaluator,
    ) -> Self {
        Self {
            catalogue,
            evaluator,
        }
    }

    /// Returns true if the resource has the request's type and passes every filter.
    pub fn matches_search_request(&self, resource: &Value, request: &SearchRequest) -> bool {
        let resource_type = resource.get("resourceType").and_then(Value::as_str);
        if resource_type != Some(request.resource_type.as_str()) {
            return false;
        }

        request
            .filters
            .iter()
            .all(|filter| self.matches_filter(resource, &request.resource_type, filter))
    }

    /// Evaluates one filter.
    pub fn matches_filter(&self, resource: &Value, resource_type: &str, filter: &Filter) -> bool {
        let Some(param) = self.catalogue.get(resource_type, &filter.code) else {
            debug!(resource_type, code = %filter.code, "unknown search parameter, filter fails");
            return false;
        };

        match param.param_type {
            SearchParamType::Reference => self.matches_reference(resource, param, filter),
            SearchParamType::String => self.matches_string(resource, param, filter),
            SearchParamType::Token => self.matches_token(resource, param, filter),
            other => {
                debug!(
                    code = %filter.code,
                    param_type = %other,
                    "parameter type not matched in memory"
                );
                false
            }
        }
    }

    fn matches_reference(
        &self,
        resource: &Value,
        param: &SearchParameterDefinition,
        filter: &Filter,
    ) -> bool {
        // String results are canonical references and pass through as-is.
        let references: Vec<String> = self
            .evaluator
            .evaluate(&param.expression, resource)
            .into_iter()
            .filter_map(|typed| match typed.value {
                Value::String(s) => Some(s),
                Value::Object(map) => map
                    .get("reference")
                    .and_then(Value::as_str)
                    .map(String::from),
                _ => None,
            })
            .collect();

        if filter.operator.is_presence() {
            return presence_matches(filter, !references.is_empty());
        }

        match_branches(filter, |branch| {
            let branch = unescape(branch);
            references.iter().any(|r| *r == branch)
        })
    }

    fn matches_string(
        &self,
        resource: &Value,
        param: &SearchParameterDefinition,
        filter: &Filter,
    ) -> bool {
        let mut strings = Vec::new();
        for typed in self.evaluator.evaluate(&param.expression, resource) {
            collect_strings(&typed.value, &mut strings);
        }

        if filter.operator.is_presence() {
            return presence_matches(filter, !strings.is_empty());
        }

        let exact = filter.operator == Operator::Exact;
        match_branches(filter, |branch| {
            let branch = unescape(branch);
            if exact {
                strings.iter().any(|s| *s == branch)
            } else {
                let needle = branch.to_lowercase();
                strings.iter().any(|s| s.to_lowercase().contains(&needle))
            }
        })
    }

    fn matches_token(
        &self,
        resource: &Value,
        param: &SearchParameterDefinition,
        filter: &Filter,
    ) -> bool {
        if param.is_boolean() {
            return self.matches_boolean(resource, param, filter);
        }

        let values = self.evaluator.evaluate(&param.expression, resource);
        if !values.is_empty() && values.iter().all(|typed| typed.value.is_boolean()) {
            return self.matches_boolean(resource, param, filter);
        }

        let tokens = TokenExtractor::new(self.evaluator).extract_tokens(resource, param);
        if filter.operator.is_presence() || filter.operator == Operator::Identifier {
            return presence_matches(filter, !tokens.is_empty());
        }

        let compiled_operator = matches!(
            filter.operator,
            Operator::Equals
                | Operator::Exact
                | Operator::NotEquals
                | Operator::Text
                | Operator::Contains
        );
        if compiled_operator && !has_branches(filter) {
            debug!(code = %filter.code, "no OR-branches, falling back to presence");
            return tokens.is_empty() == (filter.operator == Operator::NotEquals);
        }

        match filter.operator {
            Operator::Text => {
                let has_text = tokens.iter().any(Token::is_text);
                has_text && match_branches(filter, |branch| text_matches(&tokens, param, branch))
            }
            Operator::Contains => {
                match_branches(filter, |branch| text_matches(&tokens, param, branch))
            }
            _ => {
                let case_insensitive = param.is_case_insensitive();
                match_branches(filter, |branch| {
                    tokens
                        .iter()
                        .any(|token| token_matches(token, branch, case_insensitive))
                })
            }
        }
    }

    fn matches_boolean(
        &self,
        resource: &Value,
        param: &SearchParameterDefinition,
        filter: &Filter,
    ) -> bool {
        let flags: Vec<bool> = self
            .evaluator
            .evaluate(&param.expression, resource)
            .iter()
            .filter_map(|typed| typed.value.as_bool())
            .collect();

        if filter.operator.is_presence() {
            return presence_matches(filter, !flags.is_empty());
        }

        match_branches(filter, |branch| {
            let wanted = branch == "true";
            flags.iter().any(|&flag| flag == wanted)
        })
    }
}

impl std::fmt::Debug for ResourceMatcher<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMatcher")
            .field("catalogue", self.catalogue)
            .finish()
    }
}

fn presence_matches(filter: &Filter, exists: bool) -> bool {
    exists == should_token_exist_for_missing_or_present(filter.operator, &filter.value)
}

fn has_branches(filter: &Filter) -> bool {
    split_search_on_comma(&filter.value)
        .iter()
        .any(|branch| !branch.trim().is_empty())
}

/// ORs `test` over the trimmed, still escaped comma branches of the filter value.
///
/// Operators outside equality, exact, not-equals, text and contains fail
/// closed. `NOT_EQUALS` negates the combined result.
fn match_branches(filter: &Filter, test: impl Fn(&str) -> bool) -> bool {
    match filter.operator {
        Operator::Equals
        | Operator::Exact
        | Operator::NotEquals
        | Operator::Text
        | Operator::Contains => {}
        other => {
            debug!(code = %filter.code, operator = %other, "operator not matched in memory");
            return false;
        }
    }

    let matched = split_search_on_comma(&filter.value)
        .iter()
        .map(|branch| branch.trim())
        .filter(|branch| !branch.is_empty())
        .any(test);

    if filter.operator == Operator::NotEquals {
        !matched
    } else {
        matched
    }
}

/// Tests one `[system|]value` branch against a token.
///
/// `|value` only matches tokens without a system and `system|` matches any
/// value in that system, mirroring the encoded membership keys.
fn token_matches(token: &Token, branch: &str, case_insensitive: bool) -> bool {
    let system = token.system.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let value = token.value.as_deref().map(str::trim).filter(|v| !v.is_empty());

    let (wanted_system, wanted_value) = split_system_value(branch);
    let wanted_value = if case_insensitive {
        wanted_value.to_lowercase()
    } else {
        wanted_value
    };
    let value_matches = || value == Some(wanted_value.as_str());

    match wanted_system {
        Some(wanted) if wanted.is_empty() => system.is_none() && value_matches(),
        Some(wanted) if wanted_value.is_empty() => system == Some(wanted.as_str()),
        Some(wanted) => system == Some(wanted.as_str()) && value_matches(),
        None => value_matches(),
    }
}

fn text_matches(tokens: &[Token], param: &SearchParameterDefinition, query: &str) -> bool {
    let needle = unescape(query).to_lowercase();
    tokens
        .iter()
        .filter(|token| token.is_text() || param.text_search)
        .filter_map(|token| token.value.as_deref())
        .any(|value| value.trim().to_lowercase().contains(&needle))
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_strings(item, out)),
        _ => {}
    }
}
