//! The language-neutral API model.
//!
//! Containers (`Api`, `Message`, `Service`) hold ordered lists of IDs; the
//! entities themselves live in the [`SymbolTable`](crate::SymbolTable) so that
//! forward references and mixin copies never alias each other.

use crate::symbols::SymbolTable;
use apimodel_template::{PathTemplate, RoutingInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// =============================================================================
// Api
// =============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct Api {
    pub name: String,
    pub title: String,
    pub description: String,
    pub package_name: String,
    /// Service IDs, in declaration order.
    pub services: Vec<String>,
    /// Top-level message IDs of the target files, in declaration order.
    pub messages: Vec<String>,
    /// Top-level enum IDs of the target files, in declaration order.
    pub enums: Vec<String>,
    pub state: SymbolTable,
}

impl Api {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            state: SymbolTable::with_well_known_types(),
            ..Default::default()
        }
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services
            .iter()
            .filter_map(|id| self.state.service_by_id(id))
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter_map(|id| self.state.message_by_id(id))
    }

    pub fn enums(&self) -> impl Iterator<Item = &Enum> {
        self.enums.iter().filter_map(|id| self.state.enum_by_id(id))
    }

    /// Methods of `service`, in declaration order.
    pub fn methods<'a>(&'a self, service: &'a Service) -> impl Iterator<Item = &'a Method> + 'a {
        service
            .methods
            .iter()
            .filter_map(|id| self.state.method_by_id(id))
    }
}

/// Derive the short API name.
///
/// `secretmanager.googleapis.com` becomes `secretmanager`; without a service
/// name the last non-version package component is used
/// (`google.cloud.secretmanager.v1` becomes `secretmanager`).
pub fn api_name(service_name: Option<&str>, package: &str) -> String {
    if let Some(name) = service_name.filter(|n| !n.is_empty()) {
        let short = name.strip_suffix(".googleapis.com").unwrap_or(name);
        return short.split('.').next().unwrap_or(short).to_string();
    }
    package
        .rsplit('.')
        .find(|part| !part.is_empty() && !is_version_component(part))
        .unwrap_or(package)
        .to_string()
}

fn is_version_component(part: &str) -> bool {
    let Some(rest) = part.strip_prefix('v') else {
        return false;
    };
    rest.chars().next().is_some_and(|c| c.is_ascii_digit())
}

// =============================================================================
// Messages & fields
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub name: String,
    pub id: String,
    pub package: String,
    pub documentation: String,
    /// Enclosing message ID for nested messages.
    pub parent: Option<String>,
    pub fields: Vec<Field>,
    /// Nested message IDs.
    pub messages: Vec<String>,
    /// Nested enum IDs.
    pub enums: Vec<String>,
    pub one_ofs: Vec<OneOf>,
    /// Synthetic two-field (`key`, `value`) entry of a map field.
    pub is_map: bool,
    pub deprecated: bool,
    /// Set by the enricher on list responses.
    pub pagination: Option<PaginationInfo>,
}

impl Message {
    pub fn new(name: impl Into<String>, id: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            package: package.into(),
            ..Default::default()
        }
    }

    /// Find a field by its proto name or its JSON name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.name == name || f.json_name == name)
    }

    pub fn is_pageable_response(&self) -> bool {
        self.pagination.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub next_page_token: String,
    pub pageable_item: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub id: String,
    pub json_name: String,
    pub documentation: String,
    pub typez: Typez,
    /// Referenced message or enum ID; empty for scalars.
    pub typez_id: String,
    pub repeated: bool,
    pub optional: bool,
    pub map: bool,
    pub is_oneof: bool,
    /// Set when any method using this request allow-lists the field. Methods
    /// sharing a request can disagree; [`Method::auto_populated`] is the
    /// per-method answer.
    pub auto_populated: bool,
    pub deprecated: bool,
    pub behavior: Vec<FieldBehavior>,
    pub format: Option<FieldFormat>,
}

impl Field {
    pub fn new(name: impl Into<String>, id: impl Into<String>, typez: Typez) -> Self {
        let name = name.into();
        Self {
            json_name: lower_camel(&name),
            name,
            id: id.into(),
            typez,
            ..Default::default()
        }
    }

    pub fn is_required(&self) -> bool {
        self.behavior.contains(&FieldBehavior::Required)
    }

    /// True when the field is a single string (not a list or a map).
    pub fn is_singular_string(&self) -> bool {
        self.typez == Typez::String && !self.repeated && !self.map
    }
}

/// `snake_case` → `lowerCamelCase`, the way protoc derives `json_name`.
pub fn lower_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneOf {
    pub name: String,
    pub id: String,
    pub documentation: String,
    /// Member field names, in declaration order.
    pub fields: Vec<String>,
}

/// Wire type of a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Typez {
    Double,
    Float,
    Int64,
    UInt64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    #[default]
    String,
    Group,
    Message,
    Bytes,
    UInt32,
    Enum,
    SFixed32,
    SFixed64,
    SInt32,
    SInt64,
}

impl Typez {
    /// Map a `FieldDescriptorProto.Type` name (`TYPE_INT32`, ...).
    pub fn from_descriptor(name: &str) -> Option<Self> {
        let typez = match name {
            "TYPE_DOUBLE" => Typez::Double,
            "TYPE_FLOAT" => Typez::Float,
            "TYPE_INT64" => Typez::Int64,
            "TYPE_UINT64" => Typez::UInt64,
            "TYPE_INT32" => Typez::Int32,
            "TYPE_FIXED64" => Typez::Fixed64,
            "TYPE_FIXED32" => Typez::Fixed32,
            "TYPE_BOOL" => Typez::Bool,
            "TYPE_STRING" => Typez::String,
            "TYPE_GROUP" => Typez::Group,
            "TYPE_MESSAGE" => Typez::Message,
            "TYPE_BYTES" => Typez::Bytes,
            "TYPE_UINT32" => Typez::UInt32,
            "TYPE_ENUM" => Typez::Enum,
            "TYPE_SFIXED32" => Typez::SFixed32,
            "TYPE_SFIXED64" => Typez::SFixed64,
            "TYPE_SINT32" => Typez::SInt32,
            "TYPE_SINT64" => Typez::SInt64,
            _ => return None,
        };
        Some(typez)
    }

    /// The proto scalar spelling, used in canonical map IDs.
    pub fn scalar_name(self) -> &'static str {
        match self {
            Typez::Double => "double",
            Typez::Float => "float",
            Typez::Int64 => "int64",
            Typez::UInt64 => "uint64",
            Typez::Int32 => "int32",
            Typez::Fixed64 => "fixed64",
            Typez::Fixed32 => "fixed32",
            Typez::Bool => "bool",
            Typez::String => "string",
            Typez::Group => "group",
            Typez::Message => "message",
            Typez::Bytes => "bytes",
            Typez::UInt32 => "uint32",
            Typez::Enum => "enum",
            Typez::SFixed32 => "sfixed32",
            Typez::SFixed64 => "sfixed64",
            Typez::SInt32 => "sint32",
            Typez::SInt64 => "sint64",
        }
    }

    /// Message, group and enum fields carry a `typez_id`.
    pub fn is_reference(self) -> bool {
        matches!(self, Typez::Message | Typez::Group | Typez::Enum)
    }
}

/// `google.api.field_behavior` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldBehavior {
    Optional,
    Required,
    OutputOnly,
    InputOnly,
    Immutable,
    UnorderedList,
    NonEmptyDefault,
    Identifier,
}

impl FieldBehavior {
    pub fn from_annotation(name: &str) -> Option<Self> {
        let behavior = match name {
            "OPTIONAL" => FieldBehavior::Optional,
            "REQUIRED" => FieldBehavior::Required,
            "OUTPUT_ONLY" => FieldBehavior::OutputOnly,
            "INPUT_ONLY" => FieldBehavior::InputOnly,
            "IMMUTABLE" => FieldBehavior::Immutable,
            "UNORDERED_LIST" => FieldBehavior::UnorderedList,
            "NON_EMPTY_DEFAULT" => FieldBehavior::NonEmptyDefault,
            "IDENTIFIER" => FieldBehavior::Identifier,
            _ => return None,
        };
        Some(behavior)
    }
}

/// `google.api.field_info.format` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldFormat {
    Uuid4,
    Ipv4,
    Ipv6,
    Ipv4OrIpv6,
}

impl FieldFormat {
    pub fn from_annotation(name: &str) -> Option<Self> {
        match name {
            "UUID4" => Some(FieldFormat::Uuid4),
            "IPV4" => Some(FieldFormat::Ipv4),
            "IPV6" => Some(FieldFormat::Ipv6),
            "IPV4_OR_IPV6" => Some(FieldFormat::Ipv4OrIpv6),
            _ => None,
        }
    }
}

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enum {
    pub name: String,
    pub id: String,
    pub package: String,
    pub documentation: String,
    pub parent: Option<String>,
    pub values: Vec<EnumValue>,
    pub deprecated: bool,
}

impl Enum {
    pub fn new(name: impl Into<String>, id: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            package: package.into(),
            ..Default::default()
        }
    }

    /// Values with aliases collapsed: the first value declared for each
    /// number wins.
    pub fn unique_values(&self) -> Vec<&EnumValue> {
        let mut seen = BTreeSet::new();
        self.values
            .iter()
            .filter(|v| seen.insert(v.number))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    pub name: String,
    pub id: String,
    pub number: i32,
    pub documentation: String,
    pub deprecated: bool,
}

// =============================================================================
// Services & methods
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub id: String,
    pub package: String,
    pub documentation: String,
    pub default_host: String,
    /// Method IDs, in declaration order.
    pub methods: Vec<String>,
    pub deprecated: bool,
}

impl Service {
    pub fn new(name: impl Into<String>, id: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            package: package.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub id: String,
    pub service_id: String,
    pub documentation: String,
    pub input_type_id: String,
    pub output_type_id: String,
    pub client_side_streaming: bool,
    pub server_side_streaming: bool,
    pub path_info: PathInfo,
    pub routing: Vec<RoutingInfo>,
    pub operation_info: Option<OperationInfo>,
    /// Name of the request's page-token field, set on pageable methods.
    pub pagination: Option<String>,
    /// Request fields the client fills in when left unset.
    pub auto_populated: Vec<String>,
    /// The mixin service a composed method was copied from.
    pub source_service_id: Option<String>,
    pub deprecated: bool,
}

impl Method {
    pub fn is_long_running(&self) -> bool {
        self.operation_info.is_some()
    }

    pub fn is_pageable(&self) -> bool {
        self.pagination.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathInfo {
    pub bindings: Vec<PathBinding>,
    /// `*` for the whole request, a field name, or `None` for no body.
    pub body_field_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathBinding {
    pub verb: String,
    pub path_template: PathTemplate,
    pub query_parameters: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationInfo {
    pub response_type_id: String,
    pub metadata_type_id: String,
}
