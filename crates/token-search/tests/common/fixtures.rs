//! Test fixtures for token search testing.
//!
//! This module provides predefined FHIR resources for use in tests,
//! along with builders for the catalogue and engine under test.

use std::sync::Arc;

use serde_json::{Value, json};

use helios_token_search::catalogue::{SearchParameterDefinition, ValueShape};
use helios_token_search::columns::KeyFormat;
use helios_token_search::types::SearchParamType;
use helios_token_search::{SearchParameterCatalogue, TokenSearchConfig, TokenSearchEngine};

// ============================================================================
// Catalogue and Engine Builders
// ============================================================================

/// Token parameters on `Task` that both land in the shared token group.
pub fn shared_group_params() -> Vec<SearchParameterDefinition> {
    vec![
        SearchParameterDefinition::new(
            "http://example.org/SearchParameter/Task-focus",
            "focus",
            SearchParamType::Token,
            "Task.focus.identifier",
        )
        .with_base(["Task"])
        .with_element_type(ValueShape::Identifier),
        SearchParameterDefinition::new(
            "http://example.org/SearchParameter/Task-location",
            "location",
            SearchParamType::Token,
            "Task.location.identifier",
        )
        .with_base(["Task"])
        .with_element_type(ValueShape::Identifier),
    ]
}

/// Core catalogue plus [`shared_group_params`], annotated by `config`.
pub fn test_catalogue(config: &TokenSearchConfig) -> SearchParameterCatalogue {
    let mut builder = SearchParameterCatalogue::builder()
        .with_embedded()
        .with_builtins();
    builder
        .register_all(shared_group_params())
        .expect("fixture parameters have unique URLs");
    builder.with_config(config).build()
}

/// An engine over [`test_catalogue`].
pub fn engine_with(config: TokenSearchConfig) -> TokenSearchEngine {
    TokenSearchEngine::new(Arc::new(test_catalogue(&config)), config)
}

/// An engine with default configuration (hashed keys).
pub fn default_engine() -> TokenSearchEngine {
    engine_with(TokenSearchConfig::default())
}

/// An engine storing raw encoded keys, for inspecting column contents.
pub fn plain_engine() -> TokenSearchEngine {
    engine_with(TokenSearchConfig::default().with_key_format(KeyFormat::Plain))
}

/// Converts `("k", "v")` slices into owned query parameters.
pub fn query(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ============================================================================
// Resource Fixtures
// ============================================================================

/// A patient fixture for testing.
#[derive(Debug, Clone)]
pub struct PatientFixture {
    /// Patient ID.
    pub id: String,
    /// Patient family name.
    pub family: String,
    /// Patient gender.
    pub gender: Option<String>,
    /// Patient identifiers (system, value pairs).
    pub identifiers: Vec<(Option<String>, String)>,
    /// Contact points (system, value pairs).
    pub telecom: Vec<(String, String)>,
    /// Whether the patient is active.
    pub active: Option<bool>,
}

impl PatientFixture {
    /// Creates a new patient fixture with minimal required fields.
    pub fn new(id: impl Into<String>, family: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            family: family.into(),
            gender: None,
            identifiers: vec![],
            telecom: vec![],
            active: None,
        }
    }

    /// Sets gender.
    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    /// Adds an identifier with a system.
    pub fn with_identifier(mut self, system: impl Into<String>, value: impl Into<String>) -> Self {
        self.identifiers.push((Some(system.into()), value.into()));
        self
    }

    /// Adds an identifier without a system.
    pub fn with_bare_identifier(mut self, value: impl Into<String>) -> Self {
        self.identifiers.push((None, value.into()));
        self
    }

    /// Adds a contact point.
    pub fn with_telecom(mut self, system: impl Into<String>, value: impl Into<String>) -> Self {
        self.telecom.push((system.into(), value.into()));
        self
    }

    /// Sets active status.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    /// Converts to FHIR JSON.
    pub fn to_json(&self) -> Value {
        let mut patient = json!({
            "resourceType": "Patient",
            "id": self.id,
            "name": [{"family": self.family}],
        });

        if let Some(gender) = &self.gender {
            patient["gender"] = json!(gender);
        }

        if let Some(active) = self.active {
            patient["active"] = json!(active);
        }

        if !self.identifiers.is_empty() {
            patient["identifier"] = json!(
                self.identifiers
                    .iter()
                    .map(|(system, value)| match system {
                        Some(system) => json!({"system": system, "value": value}),
                        None => json!({"value": value}),
                    })
                    .collect::<Vec<_>>()
            );
        }

        if !self.telecom.is_empty() {
            patient["telecom"] = json!(
                self.telecom
                    .iter()
                    .map(|(system, value)| json!({"system": system, "value": value}))
                    .collect::<Vec<_>>()
            );
        }

        patient
    }
}

/// Observation with a coded, displayed `code` and free-text `category`.
pub fn observation_with_display(display: &str) -> Value {
    json!({
        "resourceType": "Observation",
        "id": "obs-1",
        "status": "final",
        "code": {
            "coding": [{
                "system": "http://loinc.org",
                "code": "8867-4",
                "display": display
            }]
        },
        "category": [{"text": "Vital Signs"}],
        "subject": {"reference": "Patient/p1"}
    })
}

/// Task whose `focus` and `location` identifiers share one token group.
pub fn task(focus: &[&str], location: &[&str]) -> Value {
    json!({
        "resourceType": "Task",
        "id": "task-1",
        "focus": identifier_refs(focus),
        "location": identifier_refs(location),
    })
}

fn identifier_refs(values: &[&str]) -> Vec<Value> {
    values
        .iter()
        .map(|v| json!({"identifier": {"value": v}}))
        .collect()
}
