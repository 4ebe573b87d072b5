//! Per-resource index construction.

use serde_json::Value;
use tracing::{debug, warn};

use crate::catalogue::SearchParameterCatalogue;
use crate::config::TokenSearchConfig;
use crate::search::{ExpressionEvaluator, TokenExtractor};
use crate::types::SearchParamType;

use super::column_set::{IndexColumns, TokenColumnEncoder};
use super::layout::TokenColumnLayout;

/// Builds the token index columns of a resource.
///
/// Columns are rebuilt from the resource's current state on every write;
/// nothing is patched incrementally.
pub struct TokenIndexBuilder<'a> {
    catalogue: &'a SearchParameterCatalogue,
    config: &'a TokenSearchConfig,
    evaluator: &'a dyn ExpressionEvaluator,
}

impl<'a> TokenIndexBuilder<'a> {
    /// Creates a builder.
    pub fn new(
        catalogue: &'a SearchParameterCatalogue,
        config: &'a TokenSearchConfig,
        evaluator: &'a dyn ExpressionEvaluator,
    ) -> Self {
        Self {
            catalogue,
            config,
            evaluator,
        }
    }

    /// Encodes every token parameter of the resource's type.
    ///
    /// Never fails. A resource without `resourceType` yields no columns.
    pub fn build_index_columns(&self, resource: &Value) -> IndexColumns {
        let mut columns = IndexColumns::new();
        let Some(resource_type) = resource.get("resourceType").and_then(|v| v.as_str()) else {
            warn!("resource has no resourceType, skipping token indexing");
            return columns;
        };

        let extractor = TokenExtractor::new(self.evaluator);
        for param in self.catalogue.params_for(resource_type) {
            if param.param_type != SearchParamType::Token {
                continue;
            }

            let layout = TokenColumnLayout::for_parameter(&param, self.config);
            let tokens = extractor.extract_tokens(resource, &param);
            if tokens.is_empty() {
                continue;
            }

            debug!(
                resource_type,
                code = %param.code,
                group = %layout.group,
                tokens = tokens.len(),
                "encoding token parameter"
            );
            TokenColumnEncoder::new(&layout, self.config.key_format)
                .encode(&tokens, columns.group_mut(&layout.group));
        }

        columns
    }
}

impl std::fmt::Debug for TokenIndexBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIndexBuilder")
            .field("catalogue", self.catalogue)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::{KeyFormat, SHARED_TOKENS_COLUMN};
    use crate::search::PathEvaluator;
    use serde_json::json;

    #[test]
    fn test_build_shared_and_dedicated_groups() {
        let catalogue = SearchParameterCatalogue::core();
        let config = TokenSearchConfig::default()
            .with_key_format(KeyFormat::Plain)
            .with_dedicated_columns(["identifier"]);
        let evaluator = PathEvaluator::new();
        let builder = TokenIndexBuilder::new(&catalogue, &config, &evaluator);

        let columns = builder.build_index_columns(&json!({
            "resourceType": "Patient",
            "id": "p1",
            "gender": "female",
            "identifier": [{"system": "http://x", "value": "123"}]
        }));

        let dedicated = columns.get("__identifier").unwrap();
        assert!(dedicated.contains("http://x\u{1}123"));

        let shared = columns.get(SHARED_TOKENS_COLUMN).unwrap();
        assert!(shared.contains("gender\u{1}\u{1}female"));
        assert!(shared.contains("_id\u{1}\u{1}p1"));
        assert!(!shared.contains("identifier"));
    }

    #[test]
    fn test_untyped_resource_yields_nothing() {
        let catalogue = SearchParameterCatalogue::core();
        let config = TokenSearchConfig::default();
        let evaluator = PathEvaluator::new();
        let builder = TokenIndexBuilder::new(&catalogue, &config, &evaluator);
        assert!(builder.build_index_columns(&json!({"id": "x"})).is_empty());
    }
}
