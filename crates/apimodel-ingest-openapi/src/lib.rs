//! OpenAPI v3 ingestion (JSON or YAML documents → API model).
//!
//! Component schemas become messages directly: a `$ref` names its target by
//! ID, so there is no forward-reference problem to solve. Every path
//! operation becomes one method of a single service, with a request message
//! synthesized from its parameters and body unless the document already
//! defines `<OperationId>Request`.

pub mod document;

use anyhow::{anyhow, bail, Context, Result};
use apimodel_core::{
    api_name, Api, Field, FieldBehavior, FieldFormat, Message, Method, PathBinding, PathInfo,
    Service, ServiceConfig, Typez,
};
use apimodel_template::PathTemplate;
use document::{json_schema, AdditionalProperties, Operation, Parameter, Schema};
use std::collections::BTreeSet;

pub use document::OpenApiDocument;

const SCHEMA_PREFIX: &str = "#/components/schemas/";
const ANY: &str = ".google.protobuf.Any";
const EMPTY: &str = ".google.protobuf.Empty";
const REQUEST_BODY: &str = "requestBody";
const REQUEST_BODY_FALLBACK: &str = "openapiRequestBody";

// =============================================================================
// Public API
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct OpenApiOptions {
    /// Overrides the package derived from the service configuration.
    pub package_name: Option<String>,
}

/// Parse a JSON or YAML OpenAPI document.
pub fn parse_document(text: &str) -> Result<OpenApiDocument> {
    if text.trim_start().starts_with('{') {
        serde_json::from_str(text).context("failed to parse OpenAPI JSON document")
    } else {
        serde_yaml::from_str(text).context("failed to parse OpenAPI YAML document")
    }
}

pub fn ingest_openapi(
    text: &str,
    options: &OpenApiOptions,
    config: Option<&ServiceConfig>,
) -> Result<Api> {
    let doc = parse_document(text)?;
    ingest_document(&doc, options, config)
}

pub fn ingest_document(
    doc: &OpenApiDocument,
    options: &OpenApiOptions,
    config: Option<&ServiceConfig>,
) -> Result<Api> {
    let package = package_name(options, config);
    let mut builder = Builder {
        doc,
        scope: format!(".{package}"),
        api: Api::new(package),
    };

    for (name, schema) in &doc.components.schemas {
        if !schema.is_object() || schema.is_map() {
            continue;
        }
        let id = builder.schema_id(name);
        builder
            .object_message(name, &id, None, schema)
            .with_context(|| format!("while converting schema `{name}`"))?;
        builder.api.messages.push(id);
    }

    let service_id = builder.build_service(config)?;
    builder.api.services.push(service_id);

    let mut api = builder.api;
    api.name = api_name(config.map(|c| c.name.as_str()), &api.package_name);
    api.title = config
        .map(|c| c.title.clone())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| doc.info.title.clone());
    api.description = config
        .map(|c| c.documentation.summary.clone())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| doc.info.description.clone());

    tracing::debug!(
        messages = api.messages.len(),
        methods = api.state.methods().count(),
        "ingested OpenAPI document"
    );
    Ok(api)
}

/// Package from the options, else from the first non-mixin API in the
/// service configuration, else `openapi`.
fn package_name(options: &OpenApiOptions, config: Option<&ServiceConfig>) -> String {
    if let Some(name) = options.package_name.as_ref().filter(|n| !n.is_empty()) {
        return name.clone();
    }
    config
        .and_then(ServiceConfig::primary_api)
        .and_then(|api| api.rsplit_once('.'))
        .map(|(package, _)| package.to_string())
        .unwrap_or_else(|| "openapi".to_string())
}

/// Host of the first server URL (`https://host:443/v1` → `host:443`).
pub fn default_host(doc: &OpenApiDocument) -> String {
    let Some(server) = doc.servers.first() else {
        return String::new();
    };
    let rest = server
        .url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(&server.url);
    rest.split('/').next().unwrap_or_default().to_string()
}

fn upper_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `Secret Manager API` → `SecretManagerApi`.
fn service_name_from_title(title: &str) -> String {
    let name: String = title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| upper_first(&w.to_ascii_lowercase()))
        .collect();
    if name.is_empty() {
        "Service".to_string()
    } else {
        name
    }
}

// =============================================================================
// Schema conversion
// =============================================================================

/// The type part of a field.
#[derive(Debug, Clone, PartialEq)]
struct FieldType {
    typez: Typez,
    typez_id: String,
    repeated: bool,
    map: bool,
    format: Option<FieldFormat>,
}

impl FieldType {
    fn scalar(typez: Typez) -> Self {
        Self {
            typez,
            typez_id: String::new(),
            repeated: false,
            map: false,
            format: None,
        }
    }

    fn message(id: impl Into<String>) -> Self {
        Self {
            typez_id: id.into(),
            ..Self::scalar(Typez::Message)
        }
    }

    /// The value-type spelling inside a canonical map ID.
    fn map_value_key(&self) -> String {
        if self.typez == Typez::Message {
            self.typez_id.clone()
        } else {
            self.typez.scalar_name().to_string()
        }
    }
}

struct Builder<'a> {
    doc: &'a OpenApiDocument,
    scope: String,
    api: Api,
}

impl<'a> Builder<'a> {
    fn schema_id(&self, name: &str) -> String {
        format!("{}.{name}", self.scope)
    }

    fn component(&self, ref_path: &str) -> Result<(&'a str, &'a Schema)> {
        let name = ref_path
            .strip_prefix(SCHEMA_PREFIX)
            .ok_or_else(|| anyhow!("unsupported reference `{ref_path}`"))?;
        let doc: &'a OpenApiDocument = self.doc;
        doc.components
            .schemas
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| anyhow!("reference to unknown schema `{ref_path}`"))
    }

    /// Register a message for an object schema, including `allOf` members.
    fn object_message(
        &mut self,
        name: &str,
        id: &str,
        parent: Option<&str>,
        schema: &Schema,
    ) -> Result<()> {
        let mut message = Message::new(name, id, self.api.package_name.clone());
        message.parent = parent.map(str::to_string);
        message.documentation = schema.description.clone();
        message.deprecated = schema.deprecated;

        let mut properties = Vec::new();
        let mut required = BTreeSet::new();
        self.collect_properties(schema, &mut properties, &mut required, 0)?;

        for (prop, prop_schema) in properties {
            if message.fields.iter().any(|f| f.name == prop) {
                continue;
            }
            let field = self
                .field(&mut message, &prop, prop_schema, required.contains(&prop))
                .with_context(|| format!("property `{prop}`"))?;
            message.fields.push(field);
        }
        self.api.state.insert_message(message)?;
        Ok(())
    }

    /// Flatten `allOf` composition into one ordered property list.
    fn collect_properties<'s>(
        &self,
        schema: &'s Schema,
        properties: &mut Vec<(String, &'s Schema)>,
        required: &mut BTreeSet<String>,
        depth: usize,
    ) -> Result<()>
    where
        'a: 's,
    {
        if depth > 16 {
            bail!("allOf nesting is too deep");
        }
        if let Some(r) = &schema.ref_path {
            let (_, target) = self.component(r)?;
            return self.collect_properties(target, properties, required, depth + 1);
        }
        for member in &schema.all_of {
            self.collect_properties(member, properties, required, depth + 1)?;
        }
        properties.extend(schema.properties.iter().map(|(k, v)| (k.clone(), v)));
        required.extend(schema.required.iter().cloned());
        Ok(())
    }

    fn field(
        &mut self,
        owner: &mut Message,
        name: &str,
        schema: &Schema,
        required: bool,
    ) -> Result<Field> {
        let ty = self.field_type(owner, name, schema, 0)?;
        let mut field = Field::new(name, format!("{}.{name}", owner.id), ty.typez);
        field.json_name = name.to_string();
        field.typez_id = ty.typez_id;
        field.repeated = ty.repeated;
        field.map = ty.map;
        field.format = ty.format;
        field.optional = !ty.repeated && !ty.map && (!required || ty.typez == Typez::Message);
        if required {
            field.behavior.push(FieldBehavior::Required);
        }
        field.documentation = schema.description.clone();
        field.deprecated = schema.deprecated;
        Ok(field)
    }

    fn field_type(
        &mut self,
        owner: &mut Message,
        name: &str,
        schema: &Schema,
        depth: usize,
    ) -> Result<FieldType> {
        if depth > 16 {
            bail!("schema nesting is too deep");
        }
        if let Some(r) = &schema.ref_path {
            let (target_name, target) = self.component(r)?;
            if target.is_object() && !target.is_map() {
                return Ok(FieldType::message(self.schema_id(target_name)));
            }
            return self.field_type(owner, name, target, depth + 1);
        }
        // A lone `allOf` member stands for the member itself.
        if schema.all_of.len() == 1 && schema.properties.is_empty() {
            return self.field_type(owner, name, &schema.all_of[0], depth + 1);
        }

        match schema.type_name() {
            Some("array") => {
                let items = schema
                    .items
                    .as_deref()
                    .ok_or_else(|| anyhow!("array without `items`"))?;
                let mut ty = self.field_type(owner, name, items, depth + 1)?;
                if ty.repeated || ty.map {
                    bail!("nested arrays and arrays of maps are not supported");
                }
                ty.repeated = true;
                Ok(ty)
            }
            _ if schema.is_map() => {
                let value = match &schema.additional_properties {
                    Some(AdditionalProperties::Schema(value)) if has_type(value) => {
                        self.field_type(owner, name, value, depth + 1)?
                    }
                    _ => FieldType::message(ANY),
                };
                if value.repeated || value.map {
                    bail!("maps of arrays or maps are not supported");
                }
                let id = self.map_message(&value)?;
                Ok(FieldType {
                    map: true,
                    ..FieldType::message(id)
                })
            }
            Some("object") | None if schema.is_object() => {
                let nested_name = upper_first(name);
                let nested_id = format!("{}.{nested_name}", owner.id);
                let owner_id = owner.id.clone();
                self.object_message(&nested_name, &nested_id, Some(&owner_id), schema)?;
                owner.messages.push(nested_id.clone());
                Ok(FieldType::message(nested_id))
            }
            Some("object") | None => Ok(FieldType::message(ANY)),
            Some("string") => Ok(string_type(schema.format.as_deref())),
            Some("integer") => Ok(FieldType::scalar(match schema.format.as_deref() {
                Some("int64") => Typez::Int64,
                Some("uint32") => Typez::UInt32,
                Some("uint64") => Typez::UInt64,
                _ => Typez::Int32,
            })),
            Some("number") => Ok(FieldType::scalar(match schema.format.as_deref() {
                Some("float") => Typez::Float,
                _ => Typez::Double,
            })),
            Some("boolean") => Ok(FieldType::scalar(Typez::Bool)),
            Some(other) => bail!("unsupported schema type `{other}`"),
        }
    }

    /// The canonical map-entry message for `value`, registered on first use.
    fn map_message(&mut self, value: &FieldType) -> Result<String> {
        let name = format!("$map<string, {}>", value.map_value_key());
        let id = format!(".{name}");
        if self.api.state.message_by_id(&id).is_some() {
            return Ok(id);
        }
        let mut entry = Message::new(name, id.clone(), "");
        entry.is_map = true;
        entry
            .fields
            .push(Field::new("key", format!("{id}.key"), Typez::String));
        let mut value_field = Field::new("value", format!("{id}.value"), value.typez);
        value_field.typez_id = value.typez_id.clone();
        value_field.format = value.format;
        entry.fields.push(value_field);
        self.api.state.insert_message(entry)?;
        Ok(id)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    fn build_service(&mut self, config: Option<&ServiceConfig>) -> Result<String> {
        let name = config
            .and_then(ServiceConfig::primary_api)
            .and_then(|api| api.rsplit('.').next())
            .map(str::to_string)
            .unwrap_or_else(|| service_name_from_title(&self.doc.info.title));
        let id = self.schema_id(&name);
        let mut service = Service::new(&name, &id, self.api.package_name.clone());
        service.documentation = self.doc.info.description.clone();
        service.default_host = default_host(self.doc);

        let doc = self.doc;
        for (path, item) in &doc.paths {
            for (verb, op) in item.operations() {
                let operation_id = op
                    .operation_id
                    .as_deref()
                    .ok_or_else(|| anyhow!("{verb} {path} has no operationId"))?;
                let method = self
                    .build_method(&id, path, verb, &item.parameters, op, operation_id)
                    .with_context(|| format!("while converting operation `{operation_id}`"))?;
                if let Some(method) = method {
                    service.methods.push(method.id.clone());
                    self.api.state.insert_method(method)?;
                }
            }
        }

        self.api.state.insert_service(service)?;
        Ok(id)
    }

    /// Returns `None` when the method is dropped with a warning.
    fn build_method(
        &mut self,
        service_id: &str,
        path: &str,
        verb: &str,
        shared: &[Parameter],
        op: &Operation,
        operation_id: &str,
    ) -> Result<Option<Method>> {
        let name = upper_first(operation_id);
        let id = format!("{service_id}.{name}");
        let path_template = match PathTemplate::parse(path) {
            Ok(t) => t,
            Err(err) => {
                tracing::warn!(method = %id, path = %path, error = %err, "dropping method");
                return Ok(None);
            }
        };

        let parameters = merge_parameters(shared, &op.parameters);
        let query_parameters: BTreeSet<String> = parameters
            .iter()
            .filter(|p| p.location == "query")
            .map(|p| p.name.clone())
            .collect();

        let (input_type_id, body_field_path) = self.request_message(&name, &parameters, op)?;
        let output_type_id = self.response_message(&name, op)?;

        let mut documentation = op.description.clone();
        if documentation.is_empty() {
            documentation = op.summary.clone();
        }

        Ok(Some(Method {
            name,
            id,
            service_id: service_id.to_string(),
            documentation,
            input_type_id,
            output_type_id,
            path_info: PathInfo {
                bindings: vec![PathBinding {
                    verb: verb.to_string(),
                    path_template,
                    query_parameters,
                }],
                body_field_path,
            },
            deprecated: op.deprecated,
            ..Default::default()
        }))
    }

    /// The request message ID and the body field path.
    fn request_message(
        &mut self,
        method_name: &str,
        parameters: &[&Parameter],
        op: &Operation,
    ) -> Result<(String, Option<String>)> {
        let body = op.request_body.as_ref().and_then(|b| json_schema(&b.content));
        let request_name = format!("{method_name}Request");
        let request_id = self.schema_id(&request_name);

        // Reuse a request message the document already defines.
        if self.doc.components.schemas.contains_key(&request_name) {
            let mut message = self
                .api
                .state
                .message_by_id(&request_id)
                .cloned()
                .ok_or_else(|| anyhow!("`{request_name}` is not an object schema"))?;
            for param in parameters {
                if message.field(&param.name).is_none() {
                    let field = self.parameter_field(&mut message, param)?;
                    message.fields.push(field);
                }
            }
            self.api.state.insert_message(message)?;
            return Ok((request_id, body.map(|_| "*".to_string())));
        }

        let mut message = Message::new(&request_name, &request_id, self.api.package_name.clone());
        message.documentation = format!("The request message for `{method_name}`.");
        for param in parameters {
            let field = self.parameter_field(&mut message, param)?;
            message.fields.push(field);
        }
        let mut body_field_path = None;
        if let Some(schema) = body {
            let field_name = if parameters.iter().any(|p| p.name == REQUEST_BODY) {
                REQUEST_BODY_FALLBACK
            } else {
                REQUEST_BODY
            };
            let required = op.request_body.as_ref().is_some_and(|b| b.required);
            let mut field = self.field(&mut message, field_name, schema, required)?;
            if let Some(description) = op.request_body.as_ref().map(|b| &b.description) {
                if field.documentation.is_empty() {
                    field.documentation = description.clone();
                }
            }
            message.fields.push(field);
            body_field_path = Some(field_name.to_string());
        }
        self.api.state.insert_message(message)?;
        self.api.messages.push(request_id.clone());
        Ok((request_id, body_field_path))
    }

    fn parameter_field(&mut self, owner: &mut Message, param: &Parameter) -> Result<Field> {
        let schema = param.schema.clone().unwrap_or_default();
        let mut field = self
            .field(owner, &param.name, &schema, param.required)
            .with_context(|| format!("parameter `{}`", param.name))?;
        if field.documentation.is_empty() {
            field.documentation = param.description.clone();
        }
        field.deprecated |= param.deprecated;
        Ok(field)
    }

    /// The response message ID of the first 2xx response.
    fn response_message(&mut self, method_name: &str, op: &Operation) -> Result<String> {
        let response = op
            .responses
            .get("200")
            .or_else(|| {
                op.responses
                    .iter()
                    .find(|(code, _)| code.starts_with('2'))
                    .map(|(_, r)| r)
            });
        let Some(schema) = response.and_then(|r| json_schema(&r.content)) else {
            return Ok(EMPTY.to_string());
        };
        if let Some(r) = &schema.ref_path {
            let (name, target) = self.component(r)?;
            if !target.is_object() || target.is_map() {
                bail!("response schema `{r}` is not an object");
            }
            return Ok(self.schema_id(name));
        }
        if !schema.is_object() || schema.is_map() {
            bail!("inline response schemas must be objects");
        }
        let name = format!("{method_name}Response");
        if self.doc.components.schemas.contains_key(&name) {
            bail!("inline response collides with schema `{name}`");
        }
        let id = self.schema_id(&name);
        self.object_message(&name, &id, None, schema)?;
        self.api.messages.push(id.clone());
        Ok(id)
    }
}

fn has_type(schema: &Schema) -> bool {
    schema.schema_type.is_some() || schema.ref_path.is_some() || !schema.all_of.is_empty()
}

fn string_type(format: Option<&str>) -> FieldType {
    match format {
        Some("byte") | Some("binary") => FieldType::scalar(Typez::Bytes),
        Some("int64") => FieldType::scalar(Typez::Int64),
        Some("uint64") => FieldType::scalar(Typez::UInt64),
        Some("google-duration") => FieldType::message(".google.protobuf.Duration"),
        Some("date-time") | Some("google-datetime") => FieldType::message(".google.protobuf.Timestamp"),
        Some("google-fieldmask") => FieldType::message(".google.protobuf.FieldMask"),
        Some("uuid") => FieldType {
            format: Some(FieldFormat::Uuid4),
            ..FieldType::scalar(Typez::String)
        },
        _ => FieldType::scalar(Typez::String),
    }
}

/// Path and query parameters; operation-level entries override path-level
/// ones with the same name and location.
fn merge_parameters<'p>(shared: &'p [Parameter], own: &'p [Parameter]) -> Vec<&'p Parameter> {
    let mut merged: Vec<&Parameter> = Vec::new();
    for param in shared.iter().chain(own) {
        if param.name.is_empty() {
            tracing::warn!("skipping parameter without a name (referenced parameters are not supported)");
            continue;
        }
        if param.location != "path" && param.location != "query" {
            continue;
        }
        match merged
            .iter_mut()
            .find(|p| p.name == param.name && p.location == param.location)
        {
            Some(slot) => *slot = param,
            None => merged.push(param),
        }
    }
    merged
}
