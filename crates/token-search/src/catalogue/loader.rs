//! SearchParameter Loader.
//!
//! Loads SearchParameter definitions from:
//! - Embedded core parameters (compiled into the binary)
//! - SearchParameter resources (a Bundle, an array, or a single resource)
//! - Configuration files holding either of the above

use std::path::Path;

use serde_json::Value;

use crate::error::CatalogueError;
use crate::types::SearchParamType;

use super::definition::{
    SearchParameterDefinition, SearchParameterSource, SearchParameterStatus, ValueShape,
};

/// Loader for SearchParameter definitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchParameterLoader;

impl SearchParameterLoader {
    /// Creates a new loader.
    pub fn new() -> Self {
        Self
    }

    /// Returns the embedded core search parameters.
    pub fn load_embedded(&self) -> Vec<SearchParameterDefinition> {
        core_search_parameters()
    }

    /// Loads SearchParameter resources from a JSON bundle, array, or single resource.
    pub fn load_from_json(
        &self,
        json: &Value,
    ) -> Result<Vec<SearchParameterDefinition>, CatalogueError> {
        let mut params = Vec::new();

        if let Some(entries) = json.get("entry").and_then(|e| e.as_array()) {
            for entry in entries {
                if let Some(resource) = entry.get("resource") {
                    if is_search_parameter(resource) {
                        params.push(self.parse_resource(resource)?);
                    }
                }
            }
        } else if let Some(array) = json.as_array() {
            for item in array.iter().filter(|item| is_search_parameter(item)) {
                params.push(self.parse_resource(item)?);
            }
        } else if is_search_parameter(json) {
            params.push(self.parse_resource(json)?);
        }

        Ok(params)
    }

    /// Loads parameters from a JSON file and marks them as config-sourced.
    pub fn load_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Vec<SearchParameterDefinition>, CatalogueError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| CatalogueError::ConfigLoadFailed {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        let json: Value =
            serde_json::from_str(&content).map_err(|e| CatalogueError::ConfigLoadFailed {
                path: path.display().to_string(),
                message: format!("Invalid JSON: {}", e),
            })?;

        let mut params = self.load_from_json(&json)?;
        for param in &mut params {
            param.source = SearchParameterSource::Config;
        }
        Ok(params)
    }

    /// Parses a SearchParameter FHIR resource into a definition.
    pub fn parse_resource(
        &self,
        resource: &Value,
    ) -> Result<SearchParameterDefinition, CatalogueError> {
        let url = resource
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CatalogueError::MissingField {
                field: "url".to_string(),
                url: None,
            })?
            .to_string();

        let code = resource
            .get("code")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CatalogueError::MissingField {
                field: "code".to_string(),
                url: Some(url.clone()),
            })?
            .to_string();

        let type_str = resource
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| CatalogueError::MissingField {
                field: "type".to_string(),
                url: Some(url.clone()),
            })?;

        let param_type =
            type_str
                .parse::<SearchParamType>()
                .map_err(|message| CatalogueError::InvalidResource {
                    message,
                    url: Some(url.clone()),
                })?;

        let expression = resource
            .get("expression")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        // Composite and special parameters may legitimately omit an expression
        if expression.is_empty()
            && !matches!(
                param_type,
                SearchParamType::Composite | SearchParamType::Special
            )
            && !code.starts_with('_')
        {
            return Err(CatalogueError::MissingField {
                field: "expression".to_string(),
                url: Some(url),
            });
        }

        let base = string_array(resource.get("base")).unwrap_or_default();
        if base.is_empty() {
            return Err(CatalogueError::MissingField {
                field: "base".to_string(),
                url: Some(url),
            });
        }

        let status = resource
            .get("status")
            .and_then(|v| v.as_str())
            .and_then(SearchParameterStatus::from_fhir_status)
            .unwrap_or(SearchParameterStatus::Active);

        let mut param = SearchParameterDefinition::new(url, code, param_type, expression)
            .with_base(base)
            .with_status(status)
            .with_source(SearchParameterSource::Stored);
        param.name = resource.get("name").and_then(|v| v.as_str()).map(String::from);
        param.description = resource
            .get("description")
            .and_then(|v| v.as_str())
            .map(String::from);
        param.target = string_array(resource.get("target"));
        Ok(param)
    }
}

fn is_search_parameter(resource: &Value) -> bool {
    resource.get("resourceType").and_then(|t| t.as_str()) == Some("SearchParameter")
}

fn string_array(value: Option<&Value>) -> Option<Vec<String>> {
    value.and_then(|v| v.as_array()).map(|arr| {
        arr.iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect()
    })
}

fn param(
    id: &str,
    code: &str,
    param_type: SearchParamType,
    expression: &str,
    base: &[&str],
) -> SearchParameterDefinition {
    SearchParameterDefinition::new(
        format!("http://hl7.org/fhir/SearchParameter/{}", id),
        code,
        param_type,
        expression,
    )
    .with_base(base.iter().copied())
}

fn core_search_parameters() -> Vec<SearchParameterDefinition> {
    vec![
        // Common parameters for all resource types
        param("Resource-tag", "_tag", SearchParamType::Token, "meta.tag", &["Resource"])
            .with_element_type(ValueShape::Coding),
        param(
            "Resource-security",
            "_security",
            SearchParamType::Token,
            "meta.security",
            &["Resource"],
        )
        .with_element_type(ValueShape::Coding),
        param("Resource-profile", "_profile", SearchParamType::Uri, "meta.profile", &["Resource"]),
        // Patient and friends
        param(
            "Patient-identifier",
            "identifier",
            SearchParamType::Token,
            "Patient.identifier",
            &["Patient"],
        )
        .with_element_type(ValueShape::Identifier),
        param("Patient-name", "name", SearchParamType::String, "Patient.name", &["Patient"]),
        param(
            "individual-family",
            "family",
            SearchParamType::String,
            "Patient.name.family | Practitioner.name.family",
            &["Patient", "Practitioner"],
        ),
        param(
            "individual-given",
            "given",
            SearchParamType::String,
            "Patient.name.given | Practitioner.name.given",
            &["Patient", "Practitioner"],
        ),
        param(
            "individual-gender",
            "gender",
            SearchParamType::Token,
            "Patient.gender | Practitioner.gender",
            &["Patient", "Practitioner"],
        )
        .with_element_type(ValueShape::Primitive),
        param(
            "individual-birthdate",
            "birthdate",
            SearchParamType::Date,
            "Patient.birthDate | Practitioner.birthDate",
            &["Patient", "Practitioner"],
        ),
        param(
            "individual-telecom",
            "telecom",
            SearchParamType::Token,
            "Patient.telecom | Practitioner.telecom",
            &["Patient", "Practitioner"],
        )
        .with_element_type(ValueShape::ContactPoint),
        param(
            "individual-email",
            "email",
            SearchParamType::Token,
            "Patient.telecom.where(system='email') | Practitioner.telecom.where(system='email')",
            &["Patient", "Practitioner"],
        )
        .with_element_type(ValueShape::ContactPoint),
        param("Patient-active", "active", SearchParamType::Token, "Patient.active", &["Patient"])
            .with_element_type(ValueShape::Boolean),
        param(
            "Patient-general-practitioner",
            "general-practitioner",
            SearchParamType::Reference,
            "Patient.generalPractitioner",
            &["Patient"],
        )
        .with_targets(["Organization", "Practitioner", "PractitionerRole"]),
        param(
            "Patient-organization",
            "organization",
            SearchParamType::Reference,
            "Patient.managingOrganization",
            &["Patient"],
        )
        .with_targets(["Organization"]),
        param(
            "Practitioner-identifier",
            "identifier",
            SearchParamType::Token,
            "Practitioner.identifier",
            &["Practitioner"],
        )
        .with_element_type(ValueShape::Identifier),
        param(
            "Practitioner-name",
            "name",
            SearchParamType::String,
            "Practitioner.name",
            &["Practitioner"],
        ),
        param(
            "Organization-identifier",
            "identifier",
            SearchParamType::Token,
            "Organization.identifier",
            &["Organization"],
        )
        .with_element_type(ValueShape::Identifier),
        param(
            "Organization-name",
            "name",
            SearchParamType::String,
            "Organization.name",
            &["Organization"],
        ),
        // Observation
        param("clinical-code", "code", SearchParamType::Token, "Observation.code", &["Observation"])
            .with_element_type(ValueShape::CodeableConcept),
        param(
            "Observation-identifier",
            "identifier",
            SearchParamType::Token,
            "Observation.identifier",
            &["Observation"],
        )
        .with_element_type(ValueShape::Identifier),
        param(
            "Observation-status",
            "status",
            SearchParamType::Token,
            "Observation.status",
            &["Observation"],
        )
        .with_element_type(ValueShape::Primitive),
        param(
            "Observation-category",
            "category",
            SearchParamType::Token,
            "Observation.category",
            &["Observation"],
        )
        .with_element_type(ValueShape::CodeableConcept),
        param(
            "Observation-subject",
            "subject",
            SearchParamType::Reference,
            "Observation.subject",
            &["Observation"],
        ),
        param(
            "clinical-patient",
            "patient",
            SearchParamType::Reference,
            "Observation.subject.where(resolve() is Patient)",
            &["Observation"],
        )
        .with_targets(["Patient"]),
        param(
            "clinical-date",
            "date",
            SearchParamType::Date,
            "Observation.effective",
            &["Observation"],
        ),
        param(
            "Observation-value-quantity",
            "value-quantity",
            SearchParamType::Quantity,
            "(Observation.value as Quantity)",
            &["Observation"],
        ),
        param(
            "Observation-value-string",
            "value-string",
            SearchParamType::String,
            "(Observation.value as string)",
            &["Observation"],
        ),
        param(
            "Observation-combo-code-value-quantity",
            "combo-code-value-quantity",
            SearchParamType::Composite,
            "Observation | Observation.component",
            &["Observation"],
        ),
        // Reverse-include targets
        param(
            "Provenance-target",
            "target",
            SearchParamType::Reference,
            "Provenance.target",
            &["Provenance"],
        ),
        param(
            "AuditEvent-entity",
            "entity",
            SearchParamType::Reference,
            "AuditEvent.entity.what",
            &["AuditEvent"],
        ),
        param(
            "Communication-part-of",
            "part-of",
            SearchParamType::Reference,
            "Communication.partOf",
            &["Communication"],
        ),
        // Terminology
        param("conformance-url", "url", SearchParamType::Uri, "ValueSet.url", &["ValueSet"]),
    ]
}
