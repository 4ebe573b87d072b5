//! Search parameter catalogue.
//!
//! The catalogue is built once, frozen, and then shared read-only by the
//! parser, the extractor, the compiler and the matcher. Reloading means
//! building a new snapshot and publishing it through a [`CatalogueHandle`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::config::TokenSearchConfig;
use crate::error::CatalogueError;
use crate::types::SearchParamType;

use super::definition::{SearchParameterDefinition, SearchParameterSource};
use super::loader::SearchParameterLoader;

/// Parameters every resource type supports, independent of loaded definitions.
///
/// `(code, type, expression)`.
pub const BUILTIN_PARAMETERS: [(&str, SearchParamType, &str); 5] = [
    ("_id", SearchParamType::Token, "id"),
    ("_lastUpdated", SearchParamType::Date, "meta.lastUpdated"),
    ("_project", SearchParamType::Reference, "meta.project"),
    ("_compartment", SearchParamType::Reference, "meta.compartment"),
    ("_account", SearchParamType::Reference, "meta.account"),
];

fn builtin_definitions() -> Vec<SearchParameterDefinition> {
    BUILTIN_PARAMETERS
        .iter()
        .map(|(code, param_type, expression)| {
            let name = code.trim_start_matches('_');
            SearchParameterDefinition::new(
                format!("http://hl7.org/fhir/SearchParameter/Resource-{}", name),
                *code,
                *param_type,
                *expression,
            )
            .with_base(["Resource"])
            .with_source(SearchParameterSource::Builtin)
        })
        .collect()
}

/// Immutable snapshot of search parameter definitions.
///
/// Provides lookup by (resource_type, code) and by URL.
pub struct SearchParameterCatalogue {
    /// Parameters indexed by (resource_type, code). Inner maps are ordered by code.
    params_by_type: HashMap<String, BTreeMap<String, Arc<SearchParameterDefinition>>>,

    /// Parameters indexed by canonical URL.
    params_by_url: HashMap<String, Arc<SearchParameterDefinition>>,
}

impl SearchParameterCatalogue {
    /// Starts a new builder.
    pub fn builder() -> CatalogueBuilder {
        CatalogueBuilder::new()
    }

    /// Builtins plus the embedded core definitions.
    pub fn core() -> Self {
        CatalogueBuilder::new().with_embedded().with_builtins().build()
    }

    /// Returns the number of definitions.
    pub fn len(&self) -> usize {
        self.params_by_url.len()
    }

    /// Returns true if the catalogue is empty.
    pub fn is_empty(&self) -> bool {
        self.params_by_url.is_empty()
    }

    /// Looks up a usable parameter for a resource type.
    ///
    /// Definitions declared on the type itself win over `Resource` and
    /// `DomainResource` definitions with the same code.
    pub fn get(&self, resource_type: &str, code: &str) -> Option<&Arc<SearchParameterDefinition>> {
        [resource_type, "DomainResource", "Resource"]
            .into_iter()
            .filter_map(|base| self.params_by_type.get(base))
            .filter_map(|params| params.get(code))
            .find(|p| p.status.is_usable())
    }

    /// Returns every usable parameter for a resource type, ordered by code.
    pub fn params_for(&self, resource_type: &str) -> Vec<Arc<SearchParameterDefinition>> {
        let mut merged: BTreeMap<&str, &Arc<SearchParameterDefinition>> = BTreeMap::new();
        for base in ["Resource", "DomainResource", resource_type] {
            if let Some(params) = self.params_by_type.get(base) {
                for (code, param) in params {
                    if param.status.is_usable() {
                        merged.insert(code.as_str(), param);
                    }
                }
            }
        }
        merged.into_values().cloned().collect()
    }

    /// Gets a parameter by its canonical URL.
    pub fn get_by_url(&self, url: &str) -> Option<&Arc<SearchParameterDefinition>> {
        self.params_by_url.get(url)
    }

    /// Returns all resource types that have registered parameters.
    pub fn resource_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.params_by_type.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl Default for SearchParameterCatalogue {
    fn default() -> Self {
        CatalogueBuilder::new().with_builtins().build()
    }
}

impl std::fmt::Debug for SearchParameterCatalogue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchParameterCatalogue")
            .field("params_count", &self.params_by_url.len())
            .field("resource_types", &self.resource_types())
            .finish()
    }
}

/// Collects definitions and freezes them into a [`SearchParameterCatalogue`].
#[derive(Debug, Default)]
pub struct CatalogueBuilder {
    params: Vec<SearchParameterDefinition>,
    urls: HashSet<String>,
    case_insensitive: HashSet<String>,
    text_search: HashSet<String>,
}

impl CatalogueBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition, rejecting duplicate URLs.
    pub fn register(&mut self, param: SearchParameterDefinition) -> Result<(), CatalogueError> {
        if self.urls.contains(&param.url) {
            return Err(CatalogueError::DuplicateUrl { url: param.url });
        }
        self.urls.insert(param.url.clone());
        self.params.push(param);
        Ok(())
    }

    /// Registers every definition, stopping at the first duplicate.
    pub fn register_all<I>(&mut self, params: I) -> Result<(), CatalogueError>
    where
        I: IntoIterator<Item = SearchParameterDefinition>,
    {
        for param in params {
            self.register(param)?;
        }
        Ok(())
    }

    /// Adds the builtin parameters. URLs already registered are kept as they are.
    pub fn with_builtins(mut self) -> Self {
        self.register_missing(builtin_definitions());
        self
    }

    /// Adds the embedded core definitions. URLs already registered are kept as they are.
    pub fn with_embedded(mut self) -> Self {
        self.register_missing(SearchParameterLoader::new().load_embedded());
        self
    }

    /// Applies the case and text-search annotations of a configuration.
    pub fn with_config(mut self, config: &TokenSearchConfig) -> Self {
        self.case_insensitive
            .extend(config.case_insensitive_parameters.iter().cloned());
        self.text_search
            .extend(config.text_search_parameters.iter().cloned());
        self
    }

    fn register_missing(&mut self, params: Vec<SearchParameterDefinition>) {
        for param in params {
            // Skip duplicates silently during bulk load
            if !self.urls.contains(&param.url) {
                self.urls.insert(param.url.clone());
                self.params.push(param);
            }
        }
    }

    /// Freezes the collected definitions.
    pub fn build(self) -> SearchParameterCatalogue {
        let mut params_by_type: HashMap<String, BTreeMap<String, Arc<SearchParameterDefinition>>> =
            HashMap::new();
        let mut params_by_url = HashMap::new();

        for mut param in self.params {
            if self.case_insensitive.contains(&param.code) {
                param.case_insensitive = true;
            }
            if self.text_search.contains(&param.code) {
                param.text_search = true;
            }

            let param = Arc::new(param);
            params_by_url.insert(param.url.clone(), Arc::clone(&param));

            for base in &param.base {
                let by_code = params_by_type.entry(base.clone()).or_default();
                if let Some(previous) = by_code.insert(param.code.clone(), Arc::clone(&param)) {
                    debug!(
                        resource_type = %base,
                        code = %param.code,
                        replaced = %previous.url,
                        "search parameter code declared twice, keeping the later definition"
                    );
                }
            }
        }

        SearchParameterCatalogue {
            params_by_type,
            params_by_url,
        }
    }
}

/// Shared, swappable reference to the current catalogue snapshot.
///
/// Readers take a snapshot and keep using it for the whole request; a
/// concurrent [`publish`](Self::publish) never changes a snapshot already
/// handed out.
#[derive(Clone)]
pub struct CatalogueHandle {
    current: Arc<RwLock<Arc<SearchParameterCatalogue>>>,
}

impl CatalogueHandle {
    /// Wraps an initial snapshot.
    pub fn new(catalogue: SearchParameterCatalogue) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(catalogue))),
        }
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<SearchParameterCatalogue> {
        Arc::clone(&self.current.read())
    }

    /// Replaces the current snapshot and returns the previous one.
    pub fn publish(&self, catalogue: SearchParameterCatalogue) -> Arc<SearchParameterCatalogue> {
        let next = Arc::new(catalogue);
        debug!(params = next.len(), "publishing search parameter catalogue");
        std::mem::replace(&mut *self.current.write(), next)
    }
}

impl std::fmt::Debug for CatalogueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogueHandle")
            .field("current", &*self.current.read())
            .finish()
    }
}
