//! Protobuf ingestion (descriptor sets → API model).
//!
//! This crate is **descriptor-driven**: the input is a compiled
//! `google.protobuf.FileDescriptorSet` rendered as JSON, e.g.
//!
//! ```text
//! buf build --as-file-descriptor-set -o descriptor.json
//! ```
//!
//! Custom options are extensions, and decoding extensions from the binary
//! format requires an extension-aware runtime. The JSON rendering spells them
//! out under bracketed keys instead:
//!
//! ```json
//! { "[google.api.http]": { "get": "/v1/{name=projects/*/secrets/*}" } }
//! ```
//!
//! Ingestion walks the set twice. Pass 1 registers every message and enum of
//! every file so that field types can name messages declared later or in
//! other files. Pass 2 resolves fields for every file and builds services and
//! methods for the files selected by [`ProtobufOptions`].
//!
//! Mixin composition ([`mixin::compose_mixins`]) runs afterwards, over the
//! same descriptor set.

pub mod annotations;
pub mod comments;
pub mod descriptor;
pub mod mixin;

use anyhow::{anyhow, Context, Result};
use apimodel_core::{
    api_name, is_mixin_api, path_info_from_rule, selector_of, Api, Enum, EnumValue, Field,
    Message, Method, OneOf, OperationInfo, PathInfo, Service, ServiceConfig, SymbolTable, Typez,
};
use apimodel_template::parse_routing_rules;
use comments::CommentIndex;
use descriptor::{
    child_path, DescriptorProto, EnumDescriptorProto, FieldDescriptorProto, FileDescriptorProto,
    MethodDescriptorProto, ServiceDescriptorProto, ENUM_VALUE, FILE_ENUM, FILE_MESSAGE,
    FILE_SERVICE, MESSAGE_ENUM, MESSAGE_FIELD, MESSAGE_NESTED, MESSAGE_ONEOF, SERVICE_METHOD,
};

pub use descriptor::FileDescriptorSet;
pub use mixin::{compose_mixins, MixinStats};

// =============================================================================
// Public API
// =============================================================================

/// Selects the files that produce services and top-level declarations.
///
/// With neither a file list nor a prefix every file is a target.
#[derive(Debug, Clone, Default)]
pub struct ProtobufOptions {
    pub target_files: Vec<String>,
    pub target_prefix: Option<String>,
}

impl ProtobufOptions {
    pub fn is_target(&self, file_name: &str) -> bool {
        if self.target_files.is_empty() && self.target_prefix.is_none() {
            return true;
        }
        self.target_files.iter().any(|f| f == file_name)
            || self
                .target_prefix
                .as_deref()
                .is_some_and(|p| file_name.starts_with(p))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProtoIngestStats {
    pub files: usize,
    pub target_files: usize,
    pub messages: usize,
    pub enums: usize,
    pub services: usize,
    pub methods: usize,
    pub dropped_methods: usize,
}

pub fn parse_descriptor_set(text: &str) -> Result<FileDescriptorSet> {
    serde_json::from_str(text).context("failed to parse descriptor set JSON")
}

/// Parse a descriptor set JSON document and ingest it.
pub fn ingest_descriptor_set_json(
    text: &str,
    options: &ProtobufOptions,
    config: Option<&ServiceConfig>,
) -> Result<Api> {
    let set = parse_descriptor_set(text)?;
    let (api, _) = ingest_descriptor_set(&set, options, config)?;
    Ok(api)
}

/// Build an [`Api`] from `set`. Mixins are not composed here.
pub fn ingest_descriptor_set(
    set: &FileDescriptorSet,
    options: &ProtobufOptions,
    config: Option<&ServiceConfig>,
) -> Result<(Api, ProtoIngestStats)> {
    let mut api = Api::new(target_package(set, options));
    let mut stats = ProtoIngestStats {
        files: set.file.len(),
        ..Default::default()
    };

    // -------------------------------------------------------------------------
    // Pass 1: register every message and enum.
    // -------------------------------------------------------------------------
    for file in &set.file {
        register_file(&mut api.state, file, &mut stats)
            .with_context(|| format!("while registering `{}`", file.name))?;
    }

    // -------------------------------------------------------------------------
    // Pass 2: resolve fields; build services for target files.
    // -------------------------------------------------------------------------
    for file in &set.file {
        let target = options.is_target(&file.name);
        if target {
            stats.target_files += 1;
        }
        resolve_file(&mut api, file, target, &mut stats)
            .with_context(|| format!("while resolving `{}`", file.name))?;
    }

    api.name = api_name(config.map(|c| c.name.as_str()), &api.package_name);
    if let Some(config) = config {
        api.title = config.title.clone();
        api.description = config.documentation.summary.clone();
    }

    tracing::debug!(
        files = stats.files,
        target_files = stats.target_files,
        messages = stats.messages,
        services = stats.services,
        methods = stats.methods,
        dropped = stats.dropped_methods,
        "ingested descriptor set"
    );
    Ok((api, stats))
}

/// Package of the first target file declaring a non-mixin service, else of
/// the first target file.
fn target_package(set: &FileDescriptorSet, options: &ProtobufOptions) -> String {
    let targets = || set.file.iter().filter(|f| options.is_target(&f.name));
    targets()
        .find(|f| {
            f.service
                .iter()
                .any(|s| !is_mixin_api(&format!("{}.{}", f.package, s.name)))
        })
        .or_else(|| targets().next())
        .map(|f| f.package.clone())
        .unwrap_or_default()
}

// =============================================================================
// Pass 1
// =============================================================================

fn package_scope(package: &str) -> String {
    if package.is_empty() {
        String::new()
    } else {
        format!(".{package}")
    }
}

fn register_file(
    state: &mut SymbolTable,
    file: &FileDescriptorProto,
    stats: &mut ProtoIngestStats,
) -> Result<()> {
    let comments = CommentIndex::for_file(file);
    let scope = package_scope(&file.package);
    for (i, m) in file.message_type.iter().enumerate() {
        let path = child_path(&[], FILE_MESSAGE, i);
        register_message(state, &file.package, &comments, &scope, None, m, path, stats)?;
    }
    for (i, e) in file.enum_type.iter().enumerate() {
        let path = child_path(&[], FILE_ENUM, i);
        register_enum(state, &file.package, &comments, &scope, None, e, path)?;
        stats.enums += 1;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn register_message(
    state: &mut SymbolTable,
    package: &str,
    comments: &CommentIndex,
    scope: &str,
    parent: Option<&str>,
    desc: &DescriptorProto,
    path: Vec<i32>,
    stats: &mut ProtoIngestStats,
) -> Result<String> {
    let id = format!("{scope}.{}", desc.name);
    let mut message = Message::new(&desc.name, &id, package);
    message.parent = parent.map(str::to_string);
    message.documentation = comments.get(&path);
    message.is_map = annotations::map_entry(&desc.options);
    message.deprecated = annotations::deprecated(&desc.options);
    stats.messages += 1;

    for (i, nested) in desc.nested_type.iter().enumerate() {
        let nested_path = child_path(&path, MESSAGE_NESTED, i);
        let nested_id = register_message(
            state,
            package,
            comments,
            &id,
            Some(&id),
            nested,
            nested_path,
            stats,
        )?;
        message.messages.push(nested_id);
    }
    for (i, e) in desc.enum_type.iter().enumerate() {
        let enum_path = child_path(&path, MESSAGE_ENUM, i);
        let enum_id = register_enum(state, package, comments, &id, Some(&id), e, enum_path)?;
        message.enums.push(enum_id);
        stats.enums += 1;
    }

    state.insert_message(message)?;
    Ok(id)
}

/// Enums carry no references, so they are complete after pass 1.
fn register_enum(
    state: &mut SymbolTable,
    package: &str,
    comments: &CommentIndex,
    scope: &str,
    parent: Option<&str>,
    desc: &EnumDescriptorProto,
    path: Vec<i32>,
) -> Result<String> {
    let id = format!("{scope}.{}", desc.name);
    let mut e = Enum::new(&desc.name, &id, package);
    e.parent = parent.map(str::to_string);
    e.documentation = comments.get(&path);
    e.deprecated = annotations::deprecated(&desc.options);
    for (i, v) in desc.value.iter().enumerate() {
        e.values.push(EnumValue {
            name: v.name.clone(),
            id: format!("{id}.{}", v.name),
            number: v.number,
            documentation: comments.get(&child_path(&path, ENUM_VALUE, i)),
            deprecated: annotations::deprecated(&v.options),
        });
    }
    state.insert_enum(e)?;
    Ok(id)
}

// =============================================================================
// Pass 2
// =============================================================================

fn resolve_file(
    api: &mut Api,
    file: &FileDescriptorProto,
    target: bool,
    stats: &mut ProtoIngestStats,
) -> Result<()> {
    let comments = CommentIndex::for_file(file);
    let scope = package_scope(&file.package);

    for (i, m) in file.message_type.iter().enumerate() {
        let id = format!("{scope}.{}", m.name);
        resolve_message(&mut api.state, file, &comments, &id, m, child_path(&[], FILE_MESSAGE, i))?;
        if target {
            api.messages.push(id);
        }
    }
    if !target {
        return Ok(());
    }
    for e in &file.enum_type {
        api.enums.push(format!("{scope}.{}", e.name));
    }
    for (i, s) in file.service.iter().enumerate() {
        let path = child_path(&[], FILE_SERVICE, i);
        let id = build_service(&mut api.state, file, &comments, s, path, stats)?;
        // Mixins stay in the table for composition but are never primary.
        if !is_mixin_api(&id) {
            api.services.push(id);
        }
    }
    Ok(())
}

fn resolve_message(
    state: &mut SymbolTable,
    file: &FileDescriptorProto,
    comments: &CommentIndex,
    id: &str,
    desc: &DescriptorProto,
    path: Vec<i32>,
) -> Result<()> {
    for (i, nested) in desc.nested_type.iter().enumerate() {
        let nested_id = format!("{id}.{}", nested.name);
        let nested_path = child_path(&path, MESSAGE_NESTED, i);
        resolve_message(state, file, comments, &nested_id, nested, nested_path)?;
    }

    let mut message = state
        .message_by_id(id)
        .cloned()
        .ok_or_else(|| anyhow!("message `{id}` was not registered"))?;

    let mut one_ofs: Vec<OneOf> = desc
        .oneof_decl
        .iter()
        .enumerate()
        .map(|(i, o)| OneOf {
            name: o.name.clone(),
            id: format!("{id}.{}", o.name),
            documentation: comments.get(&child_path(&path, MESSAGE_ONEOF, i)),
            fields: Vec::new(),
        })
        .collect();

    message.fields = Vec::with_capacity(desc.field.len());
    for (i, f) in desc.field.iter().enumerate() {
        let mut field = resolve_field(state, file, id, f)
            .with_context(|| format!("field `{id}.{}`", f.name))?;
        field.documentation = comments.get(&child_path(&path, MESSAGE_FIELD, i));
        // proto3 `optional` fields sit in a synthetic single-field oneof.
        let group = f
            .oneof_index
            .filter(|_| !f.proto3_optional)
            .and_then(|idx| one_ofs.get_mut(idx));
        if let Some(group) = group {
            group.fields.push(field.name.clone());
            field.is_oneof = true;
        }
        message.fields.push(field);
    }
    one_ofs.retain(|o| !o.fields.is_empty());
    message.one_ofs = one_ofs;

    state.insert_message(message)?;
    Ok(())
}

fn resolve_field(
    state: &SymbolTable,
    file: &FileDescriptorProto,
    message_id: &str,
    f: &FieldDescriptorProto,
) -> Result<Field> {
    let typez = Typez::from_descriptor(&f.typ)
        .ok_or_else(|| anyhow!("unsupported field type `{}`", f.typ))?;
    let mut field = Field::new(&f.name, format!("{message_id}.{}", f.name), typez);
    if !f.json_name.is_empty() {
        field.json_name = f.json_name.clone();
    }
    if typez.is_reference() {
        field.typez_id = normalize_type_name(&f.type_name);
    }

    let is_map = typez == Typez::Message
        && f.is_repeated()
        && state
            .message_by_id(&field.typez_id)
            .is_some_and(|m| m.is_map);
    field.map = is_map;
    field.repeated = f.is_repeated() && !is_map;
    field.optional = !f.is_repeated()
        && (f.proto3_optional
            || matches!(typez, Typez::Message | Typez::Group)
            || (file.has_explicit_presence() && f.is_label_optional()));

    field.behavior = annotations::field_behavior(&f.options);
    field.format = annotations::field_format(&f.options);
    field.deprecated = annotations::deprecated(&f.options);
    Ok(field)
}

/// Descriptor type names are fully qualified; some generators omit the
/// leading dot.
fn normalize_type_name(name: &str) -> String {
    if name.starts_with('.') {
        name.to_string()
    } else {
        format!(".{name}")
    }
}

// =============================================================================
// Services & methods
// =============================================================================

pub(crate) fn build_service(
    state: &mut SymbolTable,
    file: &FileDescriptorProto,
    comments: &CommentIndex,
    desc: &ServiceDescriptorProto,
    path: Vec<i32>,
    stats: &mut ProtoIngestStats,
) -> Result<String> {
    let id = format!("{}.{}", package_scope(&file.package), desc.name);
    let mut service = Service::new(&desc.name, &id, &file.package);
    service.documentation = comments.get(&path);
    service.default_host = annotations::default_host(&desc.options).unwrap_or_default();
    service.deprecated = annotations::deprecated(&desc.options);

    for (i, m) in desc.method.iter().enumerate() {
        let method_id = format!("{id}.{}", m.name);
        match build_method(state, &file.package, &id, m) {
            Ok(mut method) => {
                method.documentation = comments.get(&child_path(&path, SERVICE_METHOD, i));
                state.insert_method(method)?;
                service.methods.push(method_id);
                stats.methods += 1;
            }
            Err(err) => {
                tracing::warn!(method = %method_id, error = %format!("{err:#}"), "dropping method");
                stats.dropped_methods += 1;
            }
        }
    }

    state.insert_service(service)?;
    stats.services += 1;
    Ok(id)
}

/// Build one method. Errors here drop the method, not the run.
fn build_method(
    state: &SymbolTable,
    package: &str,
    service_id: &str,
    desc: &MethodDescriptorProto,
) -> Result<Method> {
    let id = format!("{service_id}.{}", desc.name);
    let selector = selector_of(&id);
    let input_type_id = normalize_type_name(&desc.input_type);
    let output_type_id = normalize_type_name(&desc.output_type);
    let request = state
        .message_by_id(&input_type_id)
        .ok_or_else(|| anyhow!("request message `{input_type_id}` not found"))?;

    let path_info = match annotations::http_rule(&desc.options)? {
        Some(rule) => path_info_from_rule(selector, &rule, request)?,
        None => PathInfo::default(),
    };
    let routing = match annotations::routing_rules(&desc.options)? {
        Some(rules) => parse_routing_rules(&rules)
            .with_context(|| format!("invalid routing rules on `{selector}`"))?,
        None => Vec::new(),
    };
    let operation_info = annotations::operation_info(&desc.options)?.map(|info| OperationInfo {
        response_type_id: qualify_operation_type(state, package, &info.response_type),
        metadata_type_id: qualify_operation_type(state, package, &info.metadata_type),
    });

    Ok(Method {
        name: desc.name.clone(),
        id: id.clone(),
        service_id: service_id.to_string(),
        input_type_id,
        output_type_id,
        client_side_streaming: desc.client_streaming,
        server_side_streaming: desc.server_streaming,
        path_info,
        routing,
        operation_info,
        deprecated: annotations::deprecated(&desc.options),
        ..Default::default()
    })
}

/// `operation_info` type names are relative to the method's package unless
/// they start with a dot; a name that does not resolve there is taken as
/// fully qualified (`google.protobuf.Empty`).
fn qualify_operation_type(state: &SymbolTable, package: &str, name: &str) -> String {
    if name.starts_with('.') {
        return name.to_string();
    }
    let local = format!("{}.{name}", package_scope(package));
    if state.message_by_id(&local).is_some() {
        local
    } else {
        format!(".{name}")
    }
}
