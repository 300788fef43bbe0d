//! apimodel: build one validated [`Api`] model from an interface definition.
//!
//! The pipeline is fixed:
//!
//! 1. ingest the source (descriptor set or OpenAPI document)
//! 2. compose mixins into the primary services (descriptor sets only)
//! 3. enrich methods with pagination, auto-populated and long-running facts
//! 4. cross-reference every ID and freeze the symbol table
//!
//! ```no_run
//! use apimodel::{build_model_from_path, ModelOptions, SpecificationFormat};
//!
//! let api = build_model_from_path(
//!     SpecificationFormat::OpenApi,
//!     "openapi.json".as_ref(),
//!     None,
//!     ModelOptions::default(),
//! )?;
//! println!("{} methods", api.state.methods().count());
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub use apimodel_core as model;
pub use apimodel_core::{Api, EnrichStats, ServiceConfig};
pub use apimodel_ingest_openapi::OpenApiOptions;
pub use apimodel_ingest_proto::{MixinStats, ProtoIngestStats, ProtobufOptions};
pub use apimodel_template as template;

// ============================================================================
// Options
// ============================================================================

/// The two supported input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecificationFormat {
    Protobuf,
    OpenApi,
}

impl FromStr for SpecificationFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "protobuf" => Ok(Self::Protobuf),
            "openapi" => Ok(Self::OpenApi),
            other => anyhow::bail!(
                "unknown specification format `{other}` (expected `protobuf` or `openapi`)"
            ),
        }
    }
}

impl fmt::Display for SpecificationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Protobuf => "protobuf",
            Self::OpenApi => "openapi",
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelOptions {
    pub protobuf: ProtobufOptions,
    pub openapi: OpenApiOptions,
    pub service_config: Option<ServiceConfig>,
}

/// Counters from each pass of a build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Present for descriptor-set builds.
    pub ingest: Option<ProtoIngestStats>,
    pub mixins: Option<MixinStats>,
    pub enrich: EnrichStats,
}

// ============================================================================
// Pipeline
// ============================================================================

pub fn build_model(format: SpecificationFormat, source: &str, options: &ModelOptions) -> Result<Api> {
    build_model_with_report(format, source, options).map(|(api, _)| api)
}

/// Like [`build_model`], also returning per-pass counters.
pub fn build_model_with_report(
    format: SpecificationFormat,
    source: &str,
    options: &ModelOptions,
) -> Result<(Api, BuildReport)> {
    let config = options.service_config.as_ref();
    let mut report = BuildReport::default();

    let mut api = match format {
        SpecificationFormat::Protobuf => {
            let set = apimodel_ingest_proto::parse_descriptor_set(source)?;
            let (mut api, stats) =
                apimodel_ingest_proto::ingest_descriptor_set(&set, &options.protobuf, config)?;
            let mixins = apimodel_ingest_proto::compose_mixins(&mut api, &set, config)
                .context("failed to compose mixins")?;
            report.ingest = Some(stats);
            report.mixins = Some(mixins);
            api
        }
        SpecificationFormat::OpenApi => {
            apimodel_ingest_openapi::ingest_openapi(source, &options.openapi, config)?
        }
    };

    report.enrich = apimodel_core::enrich(&mut api, config);
    apimodel_core::finalize(&mut api).context("model failed cross-reference validation")?;

    tracing::debug!(
        format = %format,
        api = %api.name,
        services = api.services.len(),
        messages = api.messages.len(),
        "built model"
    );
    Ok((api, report))
}

/// Read `input` (and the optional service configuration) from disk and build
/// the model. A configuration passed here replaces `options.service_config`.
pub fn build_model_from_path(
    format: SpecificationFormat,
    input: &Path,
    service_config: Option<&Path>,
    options: ModelOptions,
) -> Result<Api> {
    build_model_from_path_with_report(format, input, service_config, options).map(|(api, _)| api)
}

pub fn build_model_from_path_with_report(
    format: SpecificationFormat,
    input: &Path,
    service_config: Option<&Path>,
    mut options: ModelOptions,
) -> Result<(Api, BuildReport)> {
    if let Some(path) = service_config {
        options.service_config = Some(load_service_config(path)?);
    }
    let source = std::fs::read_to_string(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    build_model_with_report(format, &source, &options)
        .with_context(|| format!("failed to build a model from {}", input.display()))
}

/// Load a service configuration; `.json` files are parsed as JSON, anything
/// else as YAML.
pub fn load_service_config(path: &Path) -> Result<ServiceConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read service config {}", path.display()))?;
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    let config = if is_json {
        ServiceConfig::from_json(&text)
    } else {
        ServiceConfig::from_yaml(&text)
    };
    config.with_context(|| format!("invalid service config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("protobuf".parse::<SpecificationFormat>().unwrap(), SpecificationFormat::Protobuf);
        assert_eq!("OpenAPI".parse::<SpecificationFormat>().unwrap(), SpecificationFormat::OpenApi);
        let err = "swagger".parse::<SpecificationFormat>().unwrap_err();
        assert!(err.to_string().contains("swagger"));
        assert_eq!(SpecificationFormat::OpenApi.to_string(), "openapi");
    }

    #[test]
    fn openapi_documents_build_frozen_models() {
        let source = r##"{
            "openapi": "3.0.0",
            "info": {"title": "Widgets"},
            "paths": {"/v1/widgets/{widgetId}": {"get": {
                "operationId": "getWidget",
                "parameters": [{"name": "widgetId", "in": "path", "required": true, "schema": {"type": "string"}}],
                "responses": {"200": {"content": {"application/json": {"schema": {"$ref": "#/components/schemas/Widget"}}}}}
            }}},
            "components": {"schemas": {"Widget": {"type": "object", "properties": {"name": {"type": "string"}}}}}
        }"##;
        let (api, report) =
            build_model_with_report(SpecificationFormat::OpenApi, source, &ModelOptions::default()).unwrap();
        assert!(api.state.is_frozen());
        assert!(report.ingest.is_none());
        assert_eq!(report.enrich, EnrichStats::default());
        assert!(api.state.method_by_id(".openapi.Widgets.GetWidget").is_some());
    }

    #[test]
    fn service_config_extension_selects_the_parser() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("svc.json");
        std::fs::File::create(&json)
            .unwrap()
            .write_all(br#"{"name": "widgets.googleapis.com"}"#)
            .unwrap();
        assert_eq!(load_service_config(&json).unwrap().name, "widgets.googleapis.com");

        let yaml = dir.path().join("svc.yaml");
        std::fs::write(&yaml, "name: widgets.googleapis.com\n").unwrap();
        assert_eq!(load_service_config(&yaml).unwrap().name, "widgets.googleapis.com");

        let err = load_service_config(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(err.to_string().contains("missing.yaml"));
    }
}
