//! Token query compilation.
//!
//! Compiles a token [`Filter`] into an [`Expression`] over the encoded
//! columns. Comma-separated values are OR-branches:
//!
//! | Operator | Expression |
//! |----------|------------|
//! | `EQUALS`, `EXACT` | overlap of `tokens` with the branch keys |
//! | `NOT_EQUALS` | negated overlap |
//! | `TEXT` | `code|text` pre-filter AND regex over `textTokens` |
//! | `CONTAINS` | regex over `textTokens` |
//! | `MISSING`, `PRESENT`, `IDENTIFIER` | presence check |
//! | `IN`, `NOT_IN` | value-set membership |

use tracing::debug;

use crate::catalogue::SearchParameterCatalogue;
use crate::columns::{
    DELIM, NULL_SYSTEM, TokenColumnLayout, check_component, split_search_on_comma,
    split_system_value, text_search_pattern, unescape,
};
use crate::config::TokenSearchConfig;
use crate::error::{InvalidSearchError, SearchResult};
use crate::search::TEXT_SYSTEM;
use crate::sql::{
    Condition, ConditionOperator, ConditionValue, Expression, OrderBy, ValueSetMembership,
};
use crate::types::{Filter, Operator, SearchParamType, SortRule};

/// Decides whether a `:missing` / `:present` filter asks for the token to exist.
///
/// `missing=true` and `present=false` ask for absence; any other value asks
/// for presence. Operators other than the two presence modifiers always ask
/// for presence.
pub fn should_token_exist_for_missing_or_present(operator: Operator, value: &str) -> bool {
    match operator {
        Operator::Missing => value != "true",
        Operator::Present => value == "true",
        _ => true,
    }
}

/// Compiles token filters and sort rules for one catalogue snapshot.
#[derive(Debug)]
pub struct TokenQueryCompiler<'a> {
    catalogue: &'a SearchParameterCatalogue,
    config: &'a TokenSearchConfig,
}

impl<'a> TokenQueryCompiler<'a> {
    /// Creates a compiler.
    pub fn new(catalogue: &'a SearchParameterCatalogue, config: &'a TokenSearchConfig) -> Self {
        Self { catalogue, config }
    }

    fn token_layout(&self, resource_type: &str, code: &str) -> SearchResult<TokenColumnLayout> {
        let param = self.catalogue.get(resource_type, code).ok_or_else(|| {
            InvalidSearchError::UnknownParameter {
                resource_type: resource_type.to_string(),
                code: code.to_string(),
            }
        })?;
        if param.param_type != SearchParamType::Token {
            return Err(InvalidSearchError::UnsupportedParameterType {
                code: code.to_string(),
                param_type: param.param_type.to_string(),
            });
        }
        Ok(TokenColumnLayout::for_parameter(param, self.config))
    }

    /// Compiles a filter on a token parameter of `resource_type`.
    pub fn compile_filter(&self, resource_type: &str, filter: &Filter) -> SearchResult<Expression> {
        let layout = self.token_layout(resource_type, &filter.code)?;
        self.compile_with_layout(resource_type, &layout, filter)
    }

    /// Compiles a filter against an already resolved layout.
    ///
    /// `table` is the resource table the columns live in.
    pub fn compile_with_layout(
        &self,
        table: &str,
        layout: &TokenColumnLayout,
        filter: &Filter,
    ) -> SearchResult<Expression> {
        check_component(&filter.value)?;

        match filter.operator {
            Operator::Text | Operator::Contains => {
                Ok(self.compile_text_search(table, layout, filter))
            }
            Operator::Equals | Operator::Exact | Operator::NotEquals => {
                self.compile_membership(table, layout, filter)
            }
            Operator::Missing | Operator::Present | Operator::Identifier => Ok(self.presence(
                table,
                layout,
                should_token_exist_for_missing_or_present(filter.operator, &filter.value),
            )),
            Operator::In | Operator::NotIn => self.build_allowed_set_membership_condition(
                table,
                layout,
                filter.value.trim(),
                filter.operator == Operator::NotIn,
            ),
            Operator::GreaterThan
            | Operator::LessThan
            | Operator::GreaterThanOrEquals
            | Operator::LessThanOrEquals
            | Operator::StartsAfter
            | Operator::EndsBefore
            | Operator::Approximately
            | Operator::Above
            | Operator::Below
            | Operator::OfType => Err(InvalidSearchError::UnsupportedOperator {
                code: filter.code.clone(),
                operator: filter.operator.to_string(),
            }),
        }
    }

    fn compile_text_search(
        &self,
        table: &str,
        layout: &TokenColumnLayout,
        filter: &Filter,
    ) -> Expression {
        let queries: Vec<String> = split_search_on_comma(&filter.value)
            .iter()
            .map(|branch| unescape(branch.trim()))
            .filter(|query| !query.is_empty())
            .collect();
        if queries.is_empty() {
            debug!(code = %filter.code, "empty text search, falling back to presence");
            return self.presence(table, layout, true);
        }

        debug!(
            code = %filter.code,
            operator = %filter.operator,
            value = %filter.value,
            "expensive token query: regex scan over text tokens"
        );

        let text_column = layout.text_column(table);
        let regexes: Vec<Expression> = queries
            .iter()
            .map(|query| {
                Expression::Condition(Condition::new(
                    text_column.clone(),
                    ConditionOperator::TokenArrayIRegex,
                    ConditionValue::Text(text_search_pattern(layout.text_anchor(), query)),
                ))
            })
            .collect();

        if filter.operator == Operator::Text {
            let prefilter = self.overlap(
                table,
                layout,
                vec![format!("{}{}", layout.prefix(), TEXT_SYSTEM)],
            );
            Expression::Conjunction(vec![prefilter, Expression::Disjunction(regexes)])
        } else {
            Expression::Disjunction(regexes)
        }
    }

    fn compile_membership(
        &self,
        table: &str,
        layout: &TokenColumnLayout,
        filter: &Filter,
    ) -> SearchResult<Expression> {
        let negated = filter.operator == Operator::NotEquals;
        let prefix = layout.prefix();
        let mut entries = Vec::new();

        for branch in split_search_on_comma(&filter.value) {
            let branch = branch.trim();
            if branch.is_empty() {
                debug!(code = %filter.code, "skipping empty OR-branch");
                continue;
            }

            let (system, value) = split_system_value(branch);
            check_component(&value)?;
            let value = if layout.case_insensitive {
                value.to_lowercase()
            } else {
                value
            };

            let mut entry = prefix.clone();
            match system {
                Some(system) => {
                    check_component(&system)?;
                    if system.is_empty() {
                        entry.push(NULL_SYSTEM);
                    } else {
                        entry.push_str(&system);
                    }
                    if !value.is_empty() {
                        entry.push(DELIM);
                        entry.push_str(&value);
                    }
                }
                None => {
                    entry.push(DELIM);
                    entry.push_str(&value);
                }
            }
            entries.push(entry);
        }

        if entries.is_empty() {
            debug!(code = %filter.code, "no OR-branches compiled, falling back to presence");
            return Ok(self.presence(table, layout, !negated));
        }

        let condition = self.overlap(table, layout, entries);
        Ok(if negated {
            Expression::negate(condition)
        } else {
            condition
        })
    }

    /// Overlap of the `tokens` column with encoded entries.
    fn overlap(&self, table: &str, layout: &TokenColumnLayout, entries: Vec<String>) -> Expression {
        let keys = entries
            .iter()
            .map(|entry| self.config.key_format.key(entry))
            .collect();
        Expression::Condition(Condition::new(
            layout.tokens_column(table),
            ConditionOperator::ArrayOverlaps,
            ConditionValue::TextArray(keys),
        ))
    }

    /// Presence of any token for the layout's code.
    pub fn presence(&self, table: &str, layout: &TokenColumnLayout, exists: bool) -> Expression {
        if layout.dedicated {
            let operator = if exists {
                ConditionOperator::ArrayNotEmpty
            } else {
                ConditionOperator::ArrayEmpty
            };
            return Expression::Condition(Condition::new(
                layout.tokens_column(table),
                operator,
                ConditionValue::None,
            ));
        }

        let condition = self.overlap(table, layout, vec![layout.code.clone()]);
        if exists {
            condition
        } else {
            Expression::negate(condition)
        }
    }

    /// Builds the `:in` / `:not-in` condition for a value set.
    pub fn build_allowed_set_membership_condition(
        &self,
        table: &str,
        layout: &TokenColumnLayout,
        value_set: &str,
        negated: bool,
    ) -> SearchResult<Expression> {
        if value_set.is_empty() {
            return Err(InvalidSearchError::InvalidValue {
                parameter: layout.code.clone(),
                message: "a value set URL is required".to_string(),
            });
        }
        Ok(Expression::ValueSetMembership(ValueSetMembership {
            column: layout.tokens_column(table),
            prefix: layout.prefix(),
            value_set: value_set.to_string(),
            key_format: self.config.key_format,
            case_insensitive: layout.case_insensitive,
            negated,
        }))
    }

    /// Compiles a sort rule on a token parameter.
    pub fn compile_sort(&self, resource_type: &str, rule: &SortRule) -> SearchResult<OrderBy> {
        let layout = self.token_layout(resource_type, &rule.code)?;
        Ok(OrderBy {
            column: layout.sort_column(resource_type),
            descending: rule.descending,
        })
    }
}
