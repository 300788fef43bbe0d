//! `google.protobuf.FileDescriptorSet` in its JSON rendering (subset).
//!
//! Buf emits lowerCamelCase member names; `protoc`-based tooling that keeps
//! proto field names emits snake_case. Both are accepted.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Message/field/method options, keyed by option name. Extensions appear as
/// bracketed keys such as `[google.api.http]`.
pub type OptionsJson = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileDescriptorSet {
    #[serde(default)]
    pub file: Vec<FileDescriptorProto>,
}

impl FileDescriptorSet {
    pub fn file_by_name(&self, name: &str) -> Option<&FileDescriptorProto> {
        self.file.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileDescriptorProto {
    pub name: String,
    pub package: String,
    #[serde(rename = "messageType", alias = "message_type")]
    pub message_type: Vec<DescriptorProto>,
    #[serde(rename = "enumType", alias = "enum_type")]
    pub enum_type: Vec<EnumDescriptorProto>,
    pub service: Vec<ServiceDescriptorProto>,
    pub options: OptionsJson,
    #[serde(rename = "sourceCodeInfo", alias = "source_code_info")]
    pub source_code_info: Option<SourceCodeInfo>,
    pub syntax: String,
}

impl FileDescriptorProto {
    /// Fields without a label-level presence marker have explicit presence
    /// unless the file is proto3.
    pub fn has_explicit_presence(&self) -> bool {
        self.syntax != "proto3"
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DescriptorProto {
    pub name: String,
    pub field: Vec<FieldDescriptorProto>,
    #[serde(rename = "nestedType", alias = "nested_type")]
    pub nested_type: Vec<DescriptorProto>,
    #[serde(rename = "enumType", alias = "enum_type")]
    pub enum_type: Vec<EnumDescriptorProto>,
    #[serde(rename = "oneofDecl", alias = "oneof_decl")]
    pub oneof_decl: Vec<OneofDescriptorProto>,
    pub options: OptionsJson,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OneofDescriptorProto {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FieldDescriptorProto {
    pub name: String,
    pub number: i32,
    pub label: String,
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(rename = "typeName", alias = "type_name")]
    pub type_name: String,
    #[serde(rename = "jsonName", alias = "json_name")]
    pub json_name: String,
    pub options: OptionsJson,
    #[serde(rename = "oneofIndex", alias = "oneof_index")]
    pub oneof_index: Option<usize>,
    #[serde(rename = "proto3Optional", alias = "proto3_optional")]
    pub proto3_optional: bool,
}

impl FieldDescriptorProto {
    pub fn is_repeated(&self) -> bool {
        self.label == "LABEL_REPEATED"
    }

    pub fn is_label_optional(&self) -> bool {
        self.label == "LABEL_OPTIONAL" || self.label.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnumDescriptorProto {
    pub name: String,
    pub value: Vec<EnumValueDescriptorProto>,
    pub options: OptionsJson,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EnumValueDescriptorProto {
    pub name: String,
    pub number: i32,
    pub options: OptionsJson,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceDescriptorProto {
    pub name: String,
    pub method: Vec<MethodDescriptorProto>,
    pub options: OptionsJson,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MethodDescriptorProto {
    pub name: String,
    #[serde(rename = "inputType", alias = "input_type")]
    pub input_type: String,
    #[serde(rename = "outputType", alias = "output_type")]
    pub output_type: String,
    #[serde(rename = "clientStreaming", alias = "client_streaming")]
    pub client_streaming: bool,
    #[serde(rename = "serverStreaming", alias = "server_streaming")]
    pub server_streaming: bool,
    pub options: OptionsJson,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceCodeInfo {
    pub location: Vec<Location>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Location {
    pub path: Vec<i32>,
    #[serde(rename = "leadingComments", alias = "leading_comments")]
    pub leading_comments: Option<String>,
    #[serde(rename = "trailingComments", alias = "trailing_comments")]
    pub trailing_comments: Option<String>,
}

// =============================================================================
// Source-location path indexes (descriptor.proto field numbers)
// =============================================================================

pub(crate) const FILE_MESSAGE: i32 = 4;
pub(crate) const FILE_ENUM: i32 = 5;
pub(crate) const FILE_SERVICE: i32 = 6;
pub(crate) const MESSAGE_FIELD: i32 = 2;
pub(crate) const MESSAGE_NESTED: i32 = 3;
pub(crate) const MESSAGE_ENUM: i32 = 4;
pub(crate) const MESSAGE_ONEOF: i32 = 8;
pub(crate) const ENUM_VALUE: i32 = 2;
pub(crate) const SERVICE_METHOD: i32 = 2;

/// `base` extended by `(kind, index)`.
pub(crate) fn child_path(base: &[i32], kind: i32, index: usize) -> Vec<i32> {
    let mut path = Vec::with_capacity(base.len() + 2);
    path.extend_from_slice(base);
    path.push(kind);
    path.push(index as i32);
    path
}
