//! Search parameter definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::SearchParamType;

/// Shape of a value produced by evaluating a search parameter expression.
///
/// The extractor matches on this exhaustively, so every value shape is
/// decomposed by an explicit rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueShape {
    /// `Identifier`: system + value.
    Identifier,
    /// `CodeableConcept`: codings + free text.
    CodeableConcept,
    /// `Coding`: system + code + display.
    Coding,
    /// `ContactPoint`: system + value, always case-insensitive.
    ContactPoint,
    /// `Reference` or a canonical string.
    Reference,
    /// `boolean`.
    Boolean,
    /// Any other primitive (string, code, uri, id, number...).
    Primitive,
    /// A complex value with no token decomposition.
    Other,
}

const CONTACT_POINT_SYSTEMS: [&str; 7] = ["phone", "fax", "email", "pager", "url", "sms", "other"];

impl ValueShape {
    /// Maps a FHIR data type name onto a shape.
    pub fn from_fhir_type(type_name: &str) -> Self {
        match type_name {
            "Identifier" => ValueShape::Identifier,
            "CodeableConcept" => ValueShape::CodeableConcept,
            "Coding" => ValueShape::Coding,
            "ContactPoint" => ValueShape::ContactPoint,
            "Reference" => ValueShape::Reference,
            "boolean" => ValueShape::Boolean,
            "string" | "code" | "uri" | "url" | "canonical" | "id" | "oid" | "uuid"
            | "markdown" | "integer" | "unsignedInt" | "positiveInt" | "decimal" | "date"
            | "dateTime" | "instant" | "time" => ValueShape::Primitive,
            _ => ValueShape::Other,
        }
    }

    /// Infers the shape of an untyped JSON value from the fields it carries.
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => ValueShape::Boolean,
            Value::String(_) | Value::Number(_) => ValueShape::Primitive,
            Value::Object(obj) => {
                if obj.contains_key("coding") {
                    ValueShape::CodeableConcept
                } else if obj.contains_key("reference") {
                    ValueShape::Reference
                } else if obj.contains_key("code") {
                    ValueShape::Coding
                } else if obj.contains_key("value") {
                    let contact_system = obj
                        .get("system")
                        .and_then(|s| s.as_str())
                        .map(|s| CONTACT_POINT_SYSTEMS.contains(&s))
                        .unwrap_or(false);
                    if contact_system && !obj.contains_key("assigner") && !obj.contains_key("type")
                    {
                        ValueShape::ContactPoint
                    } else {
                        ValueShape::Identifier
                    }
                } else if obj.contains_key("text") {
                    ValueShape::CodeableConcept
                } else {
                    ValueShape::Other
                }
            }
            _ => ValueShape::Other,
        }
    }

    /// True for shapes that decompose an object's fields.
    pub fn is_structured(self) -> bool {
        matches!(
            self,
            ValueShape::Identifier
                | ValueShape::CodeableConcept
                | ValueShape::Coding
                | ValueShape::ContactPoint
                | ValueShape::Reference
        )
    }

    /// Lets a declared element type override the inferred shape of an object.
    ///
    /// Inference needs the fields that tell shapes apart, so a system-only
    /// Identifier or a code-less Coding cannot be recognized without the
    /// declaration. Scalars keep their inferred shape.
    pub fn refine(self, declared: Option<ValueShape>, value: &Value) -> Self {
        match declared {
            Some(declared) if declared.is_structured() && value.is_object() => declared,
            _ => self,
        }
    }
}

/// Status of a SearchParameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchParameterStatus {
    /// Active - can be used in searches.
    #[default]
    Active,
    /// Draft - informational, not yet active.
    Draft,
    /// Retired - disabled, not usable.
    Retired,
}

impl SearchParameterStatus {
    /// Parse from FHIR status string.
    pub fn from_fhir_status(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(SearchParameterStatus::Active),
            "draft" => Some(SearchParameterStatus::Draft),
            "retired" => Some(SearchParameterStatus::Retired),
            _ => None,
        }
    }

    /// Returns true if this status allows the parameter to be used in searches.
    pub fn is_usable(&self) -> bool {
        *self == SearchParameterStatus::Active
    }
}

/// Source of a SearchParameter definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchParameterSource {
    /// Always-present parameters (`_id`, `_lastUpdated`, ...).
    Builtin,
    /// Standard parameters bundled with the crate.
    #[default]
    Embedded,
    /// Loaded from SearchParameter resources.
    Stored,
    /// Loaded from a configuration file.
    Config,
}

/// Complete definition of a SearchParameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParameterDefinition {
    /// Canonical URL (unique identifier).
    pub url: String,

    /// Parameter code (the URL param name, e.g., "name", "identifier").
    pub code: String,

    /// Human-readable name.
    pub name: Option<String>,

    /// Description of the parameter.
    pub description: Option<String>,

    /// The parameter type.
    pub param_type: SearchParamType,

    /// Path expression for extracting values.
    pub expression: String,

    /// Resource types this parameter applies to.
    pub base: Vec<String>,

    /// Target resource types (for reference parameters).
    pub target: Option<Vec<String>>,

    /// Current status.
    pub status: SearchParameterStatus,

    /// Source of this definition.
    pub source: SearchParameterSource,

    /// Declared type of the element the expression selects.
    pub element_type: Option<ValueShape>,

    /// Values are folded to lower case on write and query.
    pub case_insensitive: bool,

    /// Every value is free-text searchable, not only display text.
    pub text_search: bool,
}

impl SearchParameterDefinition {
    /// Creates a new SearchParameter definition.
    pub fn new(
        url: impl Into<String>,
        code: impl Into<String>,
        param_type: SearchParamType,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            code: code.into(),
            name: None,
            description: None,
            param_type,
            expression: expression.into(),
            base: Vec::new(),
            target: None,
            status: SearchParameterStatus::Active,
            source: SearchParameterSource::Embedded,
            element_type: None,
            case_insensitive: false,
            text_search: false,
        }
    }

    /// Sets the base resource types.
    pub fn with_base<I, S>(mut self, base: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base = base.into_iter().map(Into::into).collect();
        self
    }

    /// Sets target types for reference parameters.
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target = Some(targets.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the source.
    pub fn with_source(mut self, source: SearchParameterSource) -> Self {
        self.source = source;
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: SearchParameterStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the declared element type.
    pub fn with_element_type(mut self, shape: ValueShape) -> Self {
        self.element_type = Some(shape);
        self
    }

    /// Marks the parameter case-insensitive.
    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    /// Marks every value of the parameter text-searchable.
    pub fn text_searchable(mut self) -> Self {
        self.text_search = true;
        self
    }

    /// Returns whether this parameter applies to the given resource type.
    pub fn applies_to(&self, resource_type: &str) -> bool {
        self.base
            .iter()
            .any(|b| b == resource_type || b == "Resource" || b == "DomainResource")
    }

    /// Returns true when values are compared without regard to case.
    ///
    /// ContactPoint values are always case-insensitive.
    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive || self.element_type == Some(ValueShape::ContactPoint)
    }

    /// Returns true when the underlying element is a boolean.
    pub fn is_boolean(&self) -> bool {
        self.element_type == Some(ValueShape::Boolean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_infer_shapes() {
        assert_eq!(
            ValueShape::infer(&json!({"system": "http://x", "value": "1"})),
            ValueShape::Identifier
        );
        assert_eq!(
            ValueShape::infer(&json!({"system": "email", "value": "a@b.c"})),
            ValueShape::ContactPoint
        );
        assert_eq!(
            ValueShape::infer(&json!({"coding": [{"code": "x"}]})),
            ValueShape::CodeableConcept
        );
        assert_eq!(
            ValueShape::infer(&json!({"text": "free text only"})),
            ValueShape::CodeableConcept
        );
        assert_eq!(
            ValueShape::infer(&json!({"system": "http://loinc.org", "code": "1234-5"})),
            ValueShape::Coding
        );
        assert_eq!(
            ValueShape::infer(&json!({"reference": "Patient/1"})),
            ValueShape::Reference
        );
        assert_eq!(ValueShape::infer(&json!(true)), ValueShape::Boolean);
        assert_eq!(ValueShape::infer(&json!("male")), ValueShape::Primitive);
        assert_eq!(ValueShape::infer(&json!({"start": "2020"})), ValueShape::Other);
    }

    #[test]
    fn test_refine_with_declared_type() {
        let contact = json!({"system": "email", "value": "a@b.c"});
        assert_eq!(
            ValueShape::ContactPoint.refine(Some(ValueShape::Identifier), &contact),
            ValueShape::Identifier
        );
        assert_eq!(
            ValueShape::Identifier.refine(Some(ValueShape::ContactPoint), &contact),
            ValueShape::ContactPoint
        );

        let system_only = json!({"system": "http://x"});
        assert_eq!(ValueShape::infer(&system_only), ValueShape::Other);
        assert_eq!(
            ValueShape::Other.refine(Some(ValueShape::Identifier), &system_only),
            ValueShape::Identifier
        );

        let display_only = json!({"system": "http://loinc.org", "display": "Heart rate"});
        assert_eq!(
            ValueShape::infer(&display_only).refine(Some(ValueShape::Coding), &display_only),
            ValueShape::Coding
        );

        assert_eq!(ValueShape::Other.refine(None, &system_only), ValueShape::Other);
        assert_eq!(
            ValueShape::Primitive.refine(Some(ValueShape::Identifier), &json!("123")),
            ValueShape::Primitive
        );
        assert_eq!(
            ValueShape::Other.refine(Some(ValueShape::Primitive), &system_only),
            ValueShape::Other
        );
    }

    #[test]
    fn test_case_policy() {
        let telecom = SearchParameterDefinition::new(
            "http://hl7.org/fhir/SearchParameter/individual-telecom",
            "telecom",
            SearchParamType::Token,
            "Patient.telecom",
        )
        .with_element_type(ValueShape::ContactPoint);
        assert!(telecom.is_case_insensitive());

        let identifier = SearchParameterDefinition::new(
            "http://hl7.org/fhir/SearchParameter/Patient-identifier",
            "identifier",
            SearchParamType::Token,
            "Patient.identifier",
        )
        .with_element_type(ValueShape::Identifier);
        assert!(!identifier.is_case_insensitive());
        assert!(identifier.clone().case_insensitive().is_case_insensitive());
    }

    #[test]
    fn test_applies_to() {
        let def = SearchParameterDefinition::new("u", "_id", SearchParamType::Token, "id")
            .with_base(["Resource"]);
        assert!(def.applies_to("Patient"));

        let patient_only = SearchParameterDefinition::new("u", "name", SearchParamType::String, "x")
            .with_base(["Patient"]);
        assert!(!patient_only.applies_to("Observation"));
    }
}
