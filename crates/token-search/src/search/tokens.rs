//! Token extraction.
//!
//! Turns the values a token parameter selects into normalized
//! `(code, system, value)` tokens. Each value shape has one decomposition
//! rule; malformed fields degrade to fewer tokens instead of errors.

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use crate::catalogue::{SearchParameterDefinition, ValueShape};

use super::path::{ExpressionEvaluator, TypedValue};

/// System used for free-text tokens (CodeableConcept text, Coding display).
pub const TEXT_SYSTEM: &str = "text";

/// A normalized `(code, system, value)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token {
    /// Search parameter code.
    pub code: String,
    /// Coding or identifier system.
    pub system: Option<String>,
    /// Code or identifier value.
    pub value: Option<String>,
}

impl Token {
    /// Creates a token, or `None` when neither system nor value is present.
    ///
    /// Both parts are trimmed, and empty strings count as absent.
    pub fn new(
        code: impl Into<String>,
        system: Option<String>,
        value: Option<String>,
    ) -> Option<Self> {
        let system = trimmed(system);
        let value = trimmed(value);
        if system.is_none() && value.is_none() {
            return None;
        }
        Some(Self {
            code: code.into(),
            system,
            value,
        })
    }

    /// Returns true for free-text tokens.
    pub fn is_text(&self) -> bool {
        self.system.as_deref() == Some(TEXT_SYSTEM)
    }
}

/// Extracts tokens for token-typed search parameters.
pub struct TokenExtractor<'a> {
    evaluator: &'a dyn ExpressionEvaluator,
}

impl<'a> TokenExtractor<'a> {
    /// Creates an extractor over the given evaluator.
    pub fn new(evaluator: &'a dyn ExpressionEvaluator) -> Self {
        Self { evaluator }
    }

    /// Evaluates the parameter's expression and decomposes every selected value.
    ///
    /// Tokens are deduplicated, first occurrence wins the position.
    pub fn extract_tokens(
        &self,
        resource: &Value,
        param: &SearchParameterDefinition,
    ) -> Vec<Token> {
        if param.expression.is_empty() {
            return Vec::new();
        }

        let case_insensitive = param.is_case_insensitive();
        let mut raw = Vec::new();
        for typed in self.evaluator.evaluate(&param.expression, resource) {
            self.decompose(&param.code, &typed, param.element_type, &mut raw);
        }

        let mut seen = HashSet::new();
        let mut tokens = Vec::with_capacity(raw.len());
        for (system, value) in raw {
            let value = if case_insensitive {
                value.map(|v| v.to_lowercase())
            } else {
                value
            };
            if let Some(token) = Token::new(param.code.as_str(), system, value) {
                if seen.insert(token.clone()) {
                    tokens.push(token);
                }
            }
        }
        tokens
    }

    fn decompose(
        &self,
        code: &str,
        typed: &TypedValue,
        declared: Option<ValueShape>,
        out: &mut Vec<(Option<String>, Option<String>)>,
    ) {
        let value = &typed.value;
        match typed.shape.refine(declared, value) {
            ValueShape::Identifier => {
                if let Some(text) = value.get("type").and_then(|t| string_field(t, "text")) {
                    out.push((Some(TEXT_SYSTEM.to_string()), Some(text)));
                }
                out.push((string_field(value, "system"), string_field(value, "value")));
            }
            ValueShape::CodeableConcept => {
                if let Some(text) = string_field(value, "text") {
                    out.push((Some(TEXT_SYSTEM.to_string()), Some(text)));
                }
                match value.get("coding") {
                    Some(Value::Array(codings)) => {
                        for coding in codings.iter().filter(|c| c.is_object()) {
                            push_coding(coding, out);
                        }
                    }
                    Some(coding @ Value::Object(_)) => push_coding(coding, out),
                    _ => {}
                }
            }
            ValueShape::Coding => push_coding(value, out),
            ValueShape::ContactPoint => {
                let contact = string_field(value, "value").map(|v| v.to_lowercase());
                out.push((string_field(value, "system"), contact));
            }
            ValueShape::Reference => {
                let reference = match value {
                    Value::String(s) => Some(s.clone()),
                    _ => string_field(value, "reference"),
                };
                out.push((None, reference));
            }
            ValueShape::Boolean | ValueShape::Primitive => {
                out.push((None, scalar_string(value)));
            }
            ValueShape::Other => {
                debug!(code, "skipping value with no token decomposition");
            }
        }
    }
}

impl std::fmt::Debug for TokenExtractor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExtractor").finish()
    }
}

fn push_coding(coding: &Value, out: &mut Vec<(Option<String>, Option<String>)>) {
    if let Some(display) = string_field(coding, "display") {
        out.push((Some(TEXT_SYSTEM.to_string()), Some(display)));
    }
    out.push((string_field(coding, "system"), string_field(coding, "code")));
}

fn trimmed(part: Option<String>) -> Option<String> {
    part.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Reads a scalar field. Lists, objects and other malformed shapes are absent.
fn string_field(value: &Value, field: &str) -> Option<String> {
    value.get(field).and_then(scalar_string)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
