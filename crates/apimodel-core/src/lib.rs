//! The language-neutral API model and the passes that run over it.
//!
//! Ingestors (`apimodel-ingest-proto`, `apimodel-ingest-openapi`) populate an
//! [`Api`] and its [`SymbolTable`]; this crate then supplies:
//!
//! - [`enrich`]: pagination, auto-populated fields, long-running typing
//! - [`cross_reference`]: every referenced ID resolves
//! - [`ServiceConfig`]: the service configuration document
//! - [`path_info_from_rule`]: `google.api.HttpRule` → [`PathInfo`]

pub mod bindings;
pub mod crossref;
pub mod enrich;
pub mod error;
pub mod model;
pub mod service_config;
pub mod symbols;

pub use bindings::{path_info_from_rule, BindingError, CustomHttpPattern, HttpRule};
pub use crossref::cross_reference;
pub use enrich::{enrich, EnrichStats};
pub use error::ModelError;
pub use model::{
    api_name, lower_camel, Api, Enum, EnumValue, Field, FieldBehavior, FieldFormat, Message,
    Method, OneOf, OperationInfo, PaginationInfo, PathBinding, PathInfo, Service, Typez,
};
pub use service_config::{is_mixin_api, selector_of, ServiceConfig, MIXIN_APIS};
pub use symbols::{SymbolTable, WELL_KNOWN_MESSAGES, WELL_KNOWN_PACKAGE};

/// Validate `api` and freeze its symbol table.
pub fn finalize(api: &mut Api) -> Result<(), ModelError> {
    cross_reference(api)?;
    api.state.freeze();
    Ok(())
}
