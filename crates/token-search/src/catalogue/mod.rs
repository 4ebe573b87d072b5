//! Search parameter catalogue.
//!
//! Definitions come from three places: the builtin parameters every resource
//! type supports, the embedded core set, and SearchParameter resources handed
//! to the [`SearchParameterLoader`]. A [`CatalogueBuilder`] merges them into an
//! immutable [`SearchParameterCatalogue`] snapshot.

mod definition;
mod loader;
mod registry;

pub use definition::{
    SearchParameterDefinition, SearchParameterSource, SearchParameterStatus, ValueShape,
};
pub use loader::SearchParameterLoader;
pub use registry::{
    BUILTIN_PARAMETERS, CatalogueBuilder, CatalogueHandle, SearchParameterCatalogue,
};
