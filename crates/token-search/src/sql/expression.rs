//! Boolean expressions over token columns.
//!
//! The compiler produces an [`Expression`]; a storage engine renders it with
//! [`Expression::to_sql`], and tests or in-process callers run it directly
//! against [`IndexColumns`] with [`Expression::evaluate`]. Both paths read the
//! same tree, so they cannot disagree on structure.

use std::collections::BTreeSet;
use std::fmt;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::columns::{DELIM, IndexColumns, KeyFormat, TokenColumnSet};

use super::fragment::{SqlFragment, SqlParam};

/// Which container of a column group a [`Column`] refers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnTarget {
    /// The `tokens` membership array.
    Tokens,
    /// The `textTokens` array.
    TextTokens,
    /// The per-code sort scalar.
    Sort {
        /// Parameter code the scalar belongs to.
        code: String,
    },
}

/// A physical column of a resource table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    /// Resource table name.
    pub table: String,
    /// Token column group (e.g. `__sharedTokens`).
    pub group: String,
    /// Container within the group.
    pub target: ColumnTarget,
}

impl Column {
    /// Creates a column reference.
    pub fn new(table: impl Into<String>, group: impl Into<String>, target: ColumnTarget) -> Self {
        Self {
            table: table.into(),
            group: group.into(),
            target,
        }
    }

    /// Returns the physical column name.
    pub fn name(&self) -> String {
        match &self.target {
            ColumnTarget::Tokens => self.group.clone(),
            ColumnTarget::TextTokens => format!("{}Text", self.group),
            ColumnTarget::Sort { code } => format!("__{}Sort", code),
        }
    }

    /// Returns the quoted, table-qualified column name.
    pub fn qualified(&self) -> String {
        format!("\"{}\".\"{}\"", self.table, self.name())
    }

    fn array<'a>(&self, set: &'a TokenColumnSet) -> &'a BTreeSet<String> {
        match self.target {
            ColumnTarget::TextTokens => set.text_tokens(),
            _ => set.tokens(),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

/// Array operators supported on token columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionOperator {
    /// At least one value is present in the array.
    ArrayOverlaps,
    /// The array is null or empty.
    ArrayEmpty,
    /// The array has at least one element.
    ArrayNotEmpty,
    /// Case-insensitive regex over the array serialized with `ARRAY_DELIM`.
    TokenArrayIRegex,
}

/// Right-hand side of a [`Condition`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionValue {
    /// No operand (emptiness checks).
    None,
    /// A single text value (regex pattern).
    Text(String),
    /// A text array (membership keys).
    TextArray(Vec<String>),
}

/// A single column predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    /// Column being tested.
    pub column: Column,
    /// Array operator.
    pub operator: ConditionOperator,
    /// Operand.
    pub value: ConditionValue,
}

impl Condition {
    /// Creates a condition.
    pub fn new(column: Column, operator: ConditionOperator, value: ConditionValue) -> Self {
        Self {
            column,
            operator,
            value,
        }
    }

    fn to_sql(&self, offset: usize) -> SqlFragment {
        let mut fragment = SqlFragment::at_offset(offset);
        let column = self.column.qualified();
        let sql = match (self.operator, &self.value) {
            (ConditionOperator::ArrayOverlaps, ConditionValue::TextArray(values)) => {
                let p = fragment.add_param(SqlParam::TextArray(values.clone()));
                format!("{} && {}::TEXT[]", column, p)
            }
            (ConditionOperator::TokenArrayIRegex, ConditionValue::Text(pattern)) => {
                let p = fragment.add_param(SqlParam::text(pattern.clone()));
                format!("token_array_to_text({}) ~* {}", column, p)
            }
            (ConditionOperator::ArrayEmpty, _) => {
                format!("({} IS NULL OR cardinality({}) = 0)", column, column)
            }
            (ConditionOperator::ArrayNotEmpty, _) => format!("cardinality({}) > 0", column),
            // Operand does not fit the operator
            _ => "FALSE".to_string(),
        };
        fragment.push_sql(&sql);
        fragment
    }

    fn evaluate(&self, columns: &IndexColumns) -> bool {
        let set = columns.get(&self.column.group);
        match (self.operator, &self.value) {
            (ConditionOperator::ArrayEmpty, _) => {
                set.is_none_or(|s| self.column.array(s).is_empty())
            }
            (ConditionOperator::ArrayNotEmpty, _) => {
                set.is_some_and(|s| !self.column.array(s).is_empty())
            }
            (ConditionOperator::ArrayOverlaps, ConditionValue::TextArray(values)) => set
                .is_some_and(|s| {
                    let array = self.column.array(s);
                    values.iter().any(|v| array.contains(v))
                }),
            (ConditionOperator::TokenArrayIRegex, ConditionValue::Text(pattern)) => {
                let Some(set) = set else {
                    return false;
                };
                let blob = match self.column.target {
                    ColumnTarget::TextTokens => set.text_blob(),
                    _ => set.tokens_blob(),
                };
                match RegexBuilder::new(pattern).case_insensitive(true).build() {
                    Ok(re) => re.is_match(&blob),
                    Err(e) => {
                        warn!(error = %e, "invalid token regex");
                        false
                    }
                }
            }
            _ => false,
        }
    }
}

/// Membership of a column's tokens in an external value set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueSetMembership {
    /// `tokens` column tested.
    pub column: Column,
    /// Entry prefix (`code + DELIM` for shared groups, empty for dedicated ones).
    pub prefix: String,
    /// Canonical URL of the value set.
    pub value_set: String,
    /// Key format of the `tokens` column.
    pub key_format: KeyFormat,
    /// Member codes are lower-cased, matching the indexed values.
    pub case_insensitive: bool,
    /// True for `:not-in`.
    pub negated: bool,
}

impl ValueSetMembership {
    /// Encoded `tokens` keys of every value-set member.
    pub fn member_keys(&self, resolver: &dyn ValueSetResolver) -> Vec<String> {
        resolver
            .members(&self.value_set)
            .iter()
            .map(|(system, code)| {
                let mut entry = self.prefix.clone();
                entry.push_str(system);
                entry.push(DELIM);
                if self.case_insensitive {
                    entry.push_str(&code.to_lowercase());
                } else {
                    entry.push_str(code);
                }
                self.key_format.key(&entry)
            })
            .collect()
    }

    fn to_sql(&self, offset: usize) -> SqlFragment {
        let mut fragment = SqlFragment::at_offset(offset);
        let prefix = fragment.add_param(SqlParam::text(self.prefix.clone()));
        let delim = fragment.add_param(SqlParam::text(DELIM.to_string()));
        let value_set = fragment.add_param(SqlParam::text(self.value_set.clone()));

        let code = if self.case_insensitive {
            "lower(\"code\")"
        } else {
            "\"code\""
        };
        let entry = format!("{} || \"system\" || {} || {}", prefix, delim, code);
        let key = match self.key_format {
            KeyFormat::Hashed => format!("uuid_generate_v5(uuid_nil(), {})::TEXT", entry),
            KeyFormat::Plain => entry,
        };
        let membership = format!(
            "{} && ARRAY(SELECT {} FROM \"ValueSetElement\" WHERE \"valueSet\" = {})",
            self.column.qualified(),
            key,
            value_set
        );
        if self.negated {
            fragment.push_sql(&format!("NOT ({})", membership));
        } else {
            fragment.push_sql(&membership);
        }
        fragment
    }

    fn evaluate(&self, columns: &IndexColumns, resolver: &dyn ValueSetResolver) -> bool {
        let keys = self.member_keys(resolver);
        let tokens = columns.get(&self.column.group).map(|s| s.tokens());
        let is_member = tokens.is_some_and(|t| keys.iter().any(|k| t.contains(k)));
        is_member != self.negated
    }
}

/// Resolves value-set members for in-memory evaluation of `:in` / `:not-in`.
pub trait ValueSetResolver {
    /// Returns the `(system, code)` members of a value set.
    fn members(&self, value_set: &str) -> Vec<(String, String)>;
}

/// Resolver that knows no value sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoValueSets;

impl ValueSetResolver for NoValueSets {
    fn members(&self, _value_set: &str) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// A boolean predicate over token columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expression {
    /// A single column condition.
    Condition(Condition),
    /// All sub-expressions hold. Empty means true.
    Conjunction(Vec<Expression>),
    /// At least one sub-expression holds. Empty means false.
    Disjunction(Vec<Expression>),
    /// The sub-expression does not hold.
    Negation(Box<Expression>),
    /// Value-set membership.
    ValueSetMembership(ValueSetMembership),
}

impl Expression {
    /// Wraps an expression in a negation.
    pub fn negate(expression: Expression) -> Self {
        Expression::Negation(Box::new(expression))
    }

    /// Renders the expression with placeholders starting at `?(offset + 1)`.
    pub fn to_sql(&self, offset: usize) -> SqlFragment {
        match self {
            Expression::Condition(condition) => condition.to_sql(offset),
            Expression::Conjunction(parts) => join_sql(parts, " AND ", "TRUE", offset),
            Expression::Disjunction(parts) => join_sql(parts, " OR ", "FALSE", offset),
            Expression::Negation(inner) => {
                let mut fragment = SqlFragment::at_offset(offset);
                fragment.push_sql("NOT (");
                fragment.append(inner.to_sql(offset));
                fragment.push_sql(")");
                fragment
            }
            Expression::ValueSetMembership(membership) => membership.to_sql(offset),
        }
    }

    /// Evaluates the expression against one resource's index columns.
    pub fn evaluate(&self, columns: &IndexColumns, resolver: &dyn ValueSetResolver) -> bool {
        match self {
            Expression::Condition(condition) => condition.evaluate(columns),
            Expression::Conjunction(parts) => parts.iter().all(|p| p.evaluate(columns, resolver)),
            Expression::Disjunction(parts) => parts.iter().any(|p| p.evaluate(columns, resolver)),
            Expression::Negation(inner) => !inner.evaluate(columns, resolver),
            Expression::ValueSetMembership(membership) => membership.evaluate(columns, resolver),
        }
    }
}

fn join_sql(parts: &[Expression], separator: &str, empty: &str, offset: usize) -> SqlFragment {
    let mut fragment = SqlFragment::at_offset(offset);
    if parts.is_empty() {
        fragment.push_sql(empty);
        return fragment;
    }
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            fragment.push_sql(separator);
        }
        fragment.push_sql("(");
        let rendered = part.to_sql(fragment.next_offset());
        fragment.append(rendered);
        fragment.push_sql(")");
    }
    fragment
}

/// Sort directive over a per-code sort scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderBy {
    /// Sort column.
    pub column: Column,
    /// Descending order.
    pub descending: bool,
}

impl OrderBy {
    /// Renders the `ORDER BY` term.
    pub fn to_sql(&self) -> String {
        if self.descending {
            format!("{} DESC", self.column.qualified())
        } else {
            self.column.qualified()
        }
    }

    /// Returns the scalar this directive sorts one resource by.
    pub fn sort_key<'a>(&self, columns: &'a IndexColumns) -> Option<&'a str> {
        let ColumnTarget::Sort { code } = &self.column.target else {
            return None;
        };
        columns.get(&self.column.group)?.sort_value(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens_column() -> Column {
        Column::new("Observation", "__sharedTokens", ColumnTarget::Tokens)
    }

    fn overlap(values: &[&str]) -> Expression {
        Expression::Condition(Condition::new(
            tokens_column(),
            ConditionOperator::ArrayOverlaps,
            ConditionValue::TextArray(values.iter().map(|v| v.to_string()).collect()),
        ))
    }

    #[test]
    fn test_column_names() {
        assert_eq!(tokens_column().name(), "__sharedTokens");
        assert_eq!(
            Column::new("Patient", "__identifier", ColumnTarget::TextTokens).name(),
            "__identifierText"
        );
        let sort = Column::new(
            "Patient",
            "__identifier",
            ColumnTarget::Sort {
                code: "identifier".to_string(),
            },
        );
        assert_eq!(sort.qualified(), "\"Patient\".\"__identifierSort\"");
    }

    #[test]
    fn test_nested_sql_numbering() {
        let expr = Expression::Disjunction(vec![
            overlap(&["a"]),
            Expression::negate(overlap(&["b"])),
        ]);
        let sql = expr.to_sql(1);
        assert_eq!(
            sql.sql,
            "(\"Observation\".\"__sharedTokens\" && ?2::TEXT[]) OR \
             (NOT (\"Observation\".\"__sharedTokens\" && ?3::TEXT[]))"
        );
        assert_eq!(sql.params.len(), 2);
    }

    #[test]
    fn test_empty_combinations() {
        let columns = IndexColumns::default();
        assert!(Expression::Conjunction(vec![]).evaluate(&columns, &NoValueSets));
        assert!(!Expression::Disjunction(vec![]).evaluate(&columns, &NoValueSets));
        assert_eq!(Expression::Disjunction(vec![]).to_sql(0).sql, "FALSE");
    }

    #[test]
    fn test_empty_check_on_missing_group() {
        let columns = IndexColumns::default();
        let empty = Expression::Condition(Condition::new(
            Column::new("Patient", "__identifier", ColumnTarget::Tokens),
            ConditionOperator::ArrayEmpty,
            ConditionValue::None,
        ));
        assert!(empty.evaluate(&columns, &NoValueSets));
        assert!(empty.to_sql(0).sql.contains("cardinality"));
    }

    struct OneValueSet;

    impl ValueSetResolver for OneValueSet {
        fn members(&self, value_set: &str) -> Vec<(String, String)> {
            if value_set == "http://example.org/vs/vitals" {
                vec![("http://loinc.org".to_string(), "8867-4".to_string())]
            } else {
                Vec::new()
            }
        }
    }

    #[test]
    fn test_value_set_membership_keys() {
        let membership = ValueSetMembership {
            column: tokens_column(),
            prefix: format!("code{}", DELIM),
            value_set: "http://example.org/vs/vitals".to_string(),
            key_format: KeyFormat::Plain,
            case_insensitive: false,
            negated: false,
        };
        assert_eq!(
            membership.member_keys(&OneValueSet),
            vec!["code\u{1}http://loinc.org\u{1}8867-4".to_string()]
        );
        assert!(membership.member_keys(&NoValueSets).is_empty());

        let sql = Expression::ValueSetMembership(membership).to_sql(0);
        assert!(sql.sql.contains("\"ValueSetElement\""));
        assert!(!sql.sql.contains("lower("));
        assert_eq!(sql.params.len(), 3);
    }

    struct EmailValueSet;

    impl ValueSetResolver for EmailValueSet {
        fn members(&self, _value_set: &str) -> Vec<(String, String)> {
            vec![("email".to_string(), "Foo@Bar.com".to_string())]
        }
    }

    #[test]
    fn test_case_insensitive_membership_folds_codes() {
        let membership = ValueSetMembership {
            column: tokens_column(),
            prefix: format!("telecom{}", DELIM),
            value_set: "http://example.org/vs/emails".to_string(),
            key_format: KeyFormat::Plain,
            case_insensitive: true,
            negated: false,
        };
        assert_eq!(
            membership.member_keys(&EmailValueSet),
            vec!["telecom\u{1}email\u{1}foo@bar.com".to_string()]
        );

        let sql = Expression::ValueSetMembership(membership).to_sql(0);
        assert!(sql.sql.contains("lower(\"code\")"));
    }
}
