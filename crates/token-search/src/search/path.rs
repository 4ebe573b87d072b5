//! Path expression evaluation.
//!
//! Search parameter expressions are FHIRPath, but token indexing only needs
//! the navigational subset that real definitions use:
//!
//! - `Type.field.field` with a resource type prefix
//! - `a | b` unions
//! - `.ofType(T)`, `as T` and polymorphic `value[x]` fields
//! - `.where(field='literal')`, `.where(resolve() is T)`, `.first()`
//!
//! Anything else navigates as a pass-through, which may over-match but never
//! fails. The indexing path must not reject resources.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;

use crate::catalogue::ValueShape;

/// A value selected by an expression, tagged with its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    /// Shape of the value.
    pub shape: ValueShape,
    /// The raw JSON value.
    pub value: Value,
}

impl TypedValue {
    /// Tags a value with its inferred shape.
    pub fn infer(value: Value) -> Self {
        Self {
            shape: ValueShape::infer(&value),
            value,
        }
    }
}

/// Evaluates search parameter expressions against resources.
pub trait ExpressionEvaluator: Send + Sync {
    /// Returns every value the expression selects. Never fails.
    fn evaluate(&self, expression: &str, resource: &Value) -> Vec<TypedValue>;
}

/// A segment of a parsed path expression.
#[derive(Debug, Clone, PartialEq)]
enum PathSegment {
    /// A field name to navigate to.
    Field(String),
    /// A type filter (from `ofType()` or `as`).
    TypeFilter(String),
    /// A `where()` filter.
    Where(WhereClause),
    /// `first()`.
    First,
}

#[derive(Debug, Clone, PartialEq)]
enum WhereClause {
    /// `where(field='literal')`
    FieldEquals { field: String, literal: String },
    /// `where(resolve() is Type)`
    ResolvesTo(String),
}

/// One `|` branch of an expression.
#[derive(Debug, Clone, PartialEq)]
struct PathBranch {
    resource_type: Option<String>,
    segments: Vec<PathSegment>,
    declared: Option<ValueShape>,
}

/// Navigational path evaluator over JSON resources.
///
/// Parsed expressions are cached, so one evaluator should be shared across
/// resources.
#[derive(Default)]
pub struct PathEvaluator {
    cache: RwLock<HashMap<String, Arc<Vec<PathBranch>>>>,
}

impl PathEvaluator {
    /// Creates a new evaluator.
    pub fn new() -> Self {
        Self::default()
    }

    fn parsed(&self, expression: &str) -> Arc<Vec<PathBranch>> {
        if let Some(branches) = self.cache.read().get(expression) {
            return Arc::clone(branches);
        }
        let branches = Arc::new(parse_expression(expression));
        self.cache
            .write()
            .insert(expression.to_string(), Arc::clone(&branches));
        branches
    }
}

impl ExpressionEvaluator for PathEvaluator {
    fn evaluate(&self, expression: &str, resource: &Value) -> Vec<TypedValue> {
        let resource_type = resource.get("resourceType").and_then(|v| v.as_str());
        let mut results = Vec::new();

        for branch in self.parsed(expression).iter() {
            if let (Some(expected), Some(actual)) = (&branch.resource_type, resource_type) {
                if expected != actual && expected != "Resource" && expected != "DomainResource" {
                    continue;
                }
            }

            let mut values = Vec::new();
            navigate_path(resource, &branch.segments, &mut values);
            results.extend(values.into_iter().map(|value| match branch.declared {
                Some(shape) => TypedValue { shape, value },
                None => TypedValue::infer(value),
            }));
        }

        results
    }
}

impl std::fmt::Debug for PathEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathEvaluator")
            .field("cached_expressions", &self.cache.read().len())
            .finish()
    }
}

fn parse_expression(expression: &str) -> Vec<PathBranch> {
    split_top_level(expression, '|')
        .into_iter()
        .map(|branch| parse_branch(branch.trim()))
        .filter(|branch| !branch.segments.is_empty() || branch.resource_type.is_some())
        .collect()
}

fn parse_branch(branch: &str) -> PathBranch {
    let branch = strip_outer_parens(branch);
    let mut segments = Vec::new();
    let mut resource_type = None;

    for (i, piece) in split_top_level(branch, '.').into_iter().enumerate() {
        let piece = strip_outer_parens(piece.trim());
        if piece.is_empty() {
            continue;
        }

        // `value as Quantity`
        if let Some((field, type_name)) = piece.split_once(" as ") {
            push_field(&mut segments, &mut resource_type, i, field.trim());
            segments.push(PathSegment::TypeFilter(type_name.trim().to_string()));
            continue;
        }

        match piece.find('(') {
            Some(open) if piece.ends_with(')') => {
                let args = piece[open + 1..piece.len() - 1].trim();
                match &piece[..open] {
                    "ofType" | "as" => segments.push(PathSegment::TypeFilter(args.to_string())),
                    "where" => {
                        match parse_where(args) {
                            Some(clause) => segments.push(PathSegment::Where(clause)),
                            None => {
                                warn!(clause = args, "unsupported where() clause, ignoring filter")
                            }
                        }
                    }
                    "first" => segments.push(PathSegment::First),
                    // resolve(), exists() and friends navigate as pass-through
                    _ => {}
                }
            }
            _ => push_field(&mut segments, &mut resource_type, i, piece),
        }
    }

    let declared = segments.iter().rev().find_map(|s| match s {
        PathSegment::TypeFilter(t) => match ValueShape::from_fhir_type(t) {
            ValueShape::Other => None,
            shape => Some(shape),
        },
        _ => None,
    });

    PathBranch {
        resource_type,
        segments,
        declared,
    }
}

fn push_field(
    segments: &mut Vec<PathSegment>,
    resource_type: &mut Option<String>,
    index: usize,
    name: &str,
) {
    // A capitalized first segment is the resource type prefix
    if index == 0 && name.chars().next().is_some_and(|c| c.is_uppercase()) {
        *resource_type = Some(name.to_string());
    } else if !name.is_empty() {
        segments.push(PathSegment::Field(name.to_string()));
    }
}

fn parse_where(args: &str) -> Option<WhereClause> {
    if let Some(type_name) = args.strip_prefix("resolve() is ") {
        return Some(WhereClause::ResolvesTo(type_name.trim().to_string()));
    }
    let (field, literal) = args.split_once('=')?;
    let literal = literal.trim().strip_prefix('\'')?.strip_suffix('\'')?;
    Some(WhereClause::FieldEquals {
        field: field.trim().to_string(),
        literal: literal.to_string(),
    })
}

fn strip_outer_parens(mut s: &str) -> &str {
    while s.starts_with('(') && s.ends_with(')') && matching_close(s) == Some(s.len() - 1) {
        s = s[1..s.len() - 1].trim();
    }
    s
}

fn matching_close(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_quote = false;
    for (i, c) in s.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits on `separator` outside parentheses and quoted literals.
fn split_top_level(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 && !in_quote => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn reference_string(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(obj) => obj.get("reference").and_then(|r| r.as_str()),
        _ => None,
    }
}

/// Navigates a value according to path segments, collecting leaves into `out`.
fn navigate_path(value: &Value, segments: &[PathSegment], out: &mut Vec<Value>) {
    let Some((segment, remaining)) = segments.split_first() else {
        match value {
            Value::Array(arr) => out.extend(arr.iter().filter(|v| !v.is_null()).cloned()),
            Value::Null => {}
            _ => out.push(value.clone()),
        }
        return;
    };

    if let PathSegment::First = segment {
        match value {
            Value::Array(arr) => {
                if let Some(first) = arr.iter().find(|v| !v.is_null()) {
                    navigate_path(first, remaining, out);
                }
            }
            _ => navigate_path(value, remaining, out),
        }
        return;
    }

    if let Value::Array(arr) = value {
        for item in arr {
            navigate_path(item, segments, out);
        }
        return;
    }

    match segment {
        PathSegment::Field(name) => {
            let Value::Object(obj) = value else {
                return;
            };

            // `value.ofType(Quantity)` reads `valueQuantity`
            let typed = matches!(remaining.first(), Some(PathSegment::TypeFilter(_)));
            if let Some(PathSegment::TypeFilter(type_name)) = remaining.first() {
                let typed_key = format!("{}{}", name, upper_first(type_name));
                if let Some(child) = obj.get(&typed_key) {
                    navigate_path(child, &remaining[1..], out);
                    return;
                }
            }

            if let Some(child) = obj.get(name) {
                navigate_path(child, remaining, out);
                return;
            }
            if typed {
                return;
            }

            // Polymorphic field (e.g., "effective" -> "effectiveDateTime")
            let candidates: Vec<&String> = obj
                .keys()
                .filter(|k| {
                    k.strip_prefix(name.as_str())
                        .and_then(|rest| rest.chars().next())
                        .is_some_and(|c| c.is_uppercase())
                })
                .collect();
            if let [only] = candidates.as_slice() {
                navigate_path(&obj[only.as_str()], remaining, out);
            }
        }
        PathSegment::TypeFilter(type_name) => {
            let keep = match value.get("resourceType").and_then(|v| v.as_str()) {
                Some(rt) => rt == type_name,
                None => true,
            };
            if keep {
                navigate_path(value, remaining, out);
            }
        }
        PathSegment::Where(WhereClause::FieldEquals { field, literal }) => {
            if value.get(field).and_then(|v| v.as_str()) == Some(literal.as_str()) {
                navigate_path(value, remaining, out);
            }
        }
        PathSegment::Where(WhereClause::ResolvesTo(type_name)) => {
            let prefix = format!("{}/", type_name);
            let matches = reference_string(value)
                .is_some_and(|r| r.starts_with(&prefix) || r.contains(&format!("/{}", prefix)));
            if matches {
                navigate_path(value, remaining, out);
            }
        }
        PathSegment::First => {}
    }
}
