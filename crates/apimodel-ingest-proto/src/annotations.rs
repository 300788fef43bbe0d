//! Decoding of the `google.api` / `google.longrunning` extension options.

use crate::descriptor::OptionsJson;
use anyhow::{Context, Result};
use apimodel_core::{FieldBehavior, FieldFormat, HttpRule};
use apimodel_template::RoutingRule;
use serde::Deserialize;
use serde_json::Value;

pub const HTTP: &str = "[google.api.http]";
pub const ROUTING: &str = "[google.api.routing]";
pub const OPERATION_INFO: &str = "[google.longrunning.operation_info]";
pub const FIELD_BEHAVIOR: &str = "[google.api.field_behavior]";
pub const FIELD_INFO: &str = "[google.api.field_info]";
pub const DEFAULT_HOST: &str = "[google.api.default_host]";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RoutingAnnotation {
    #[serde(rename = "routingParameters", alias = "routing_parameters")]
    routing_parameters: Vec<RoutingRule>,
}

/// `google.longrunning.OperationInfo`, as written in the `.proto` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OperationInfoAnnotation {
    #[serde(rename = "responseType", alias = "response_type")]
    pub response_type: String,
    #[serde(rename = "metadataType", alias = "metadata_type")]
    pub metadata_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct FieldInfoAnnotation {
    format: String,
}

fn decode<T: for<'de> Deserialize<'de>>(options: &OptionsJson, key: &str) -> Result<Option<T>> {
    options
        .get(key)
        .map(|v| serde_json::from_value(v.clone()).with_context(|| format!("malformed {key} option")))
        .transpose()
}

pub fn http_rule(options: &OptionsJson) -> Result<Option<HttpRule>> {
    decode(options, HTTP)
}

/// Routing rules in declaration order; `None` when the method has no
/// routing annotation.
pub fn routing_rules(options: &OptionsJson) -> Result<Option<Vec<RoutingRule>>> {
    Ok(decode::<RoutingAnnotation>(options, ROUTING)?.map(|a| a.routing_parameters))
}

pub fn operation_info(options: &OptionsJson) -> Result<Option<OperationInfoAnnotation>> {
    decode(options, OPERATION_INFO)
}

/// Field behaviors; unknown values are skipped. Accepts a list or a single
/// value.
pub fn field_behavior(options: &OptionsJson) -> Vec<FieldBehavior> {
    match options.get(FIELD_BEHAVIOR) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter_map(FieldBehavior::from_annotation)
            .collect(),
        Some(Value::String(s)) => FieldBehavior::from_annotation(s).into_iter().collect(),
        _ => Vec::new(),
    }
}

pub fn field_format(options: &OptionsJson) -> Option<FieldFormat> {
    let info: FieldInfoAnnotation = decode(options, FIELD_INFO).ok().flatten()?;
    FieldFormat::from_annotation(&info.format)
}

pub fn default_host(options: &OptionsJson) -> Option<String> {
    options
        .get(DEFAULT_HOST)
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub fn deprecated(options: &OptionsJson) -> bool {
    options
        .get("deprecated")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

pub fn map_entry(options: &OptionsJson) -> bool {
    options
        .get("mapEntry")
        .or_else(|| options.get("map_entry"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(v: Value) -> OptionsJson {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn decodes_method_annotations() {
        let opts = options(json!({
            "[google.api.http]": {"post": "/v1/{parent=projects/*}/secrets", "body": "secret"},
            "[google.api.routing]": {"routingParameters": [
                {"field": "parent", "pathTemplate": "{routing_id=projects/*}/**"},
                {"field": "parent"}
            ]},
            "[google.longrunning.operation_info]": {"responseType": "Secret", "metadataType": "google.protobuf.Empty"}
        }));
        let rule = http_rule(&opts).unwrap().unwrap();
        assert_eq!(rule.post.as_deref(), Some("/v1/{parent=projects/*}/secrets"));
        let rules = routing_rules(&opts).unwrap().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].path_template, "");
        let lro = operation_info(&opts).unwrap().unwrap();
        assert_eq!(lro.response_type, "Secret");
        assert_eq!(lro.metadata_type, "google.protobuf.Empty");
    }

    #[test]
    fn malformed_http_option_is_an_error() {
        let opts = options(json!({"[google.api.http]": {"get": 7}}));
        assert!(http_rule(&opts).is_err());
        assert!(http_rule(&OptionsJson::new()).unwrap().is_none());
    }

    #[test]
    fn decodes_field_annotations() {
        let opts = options(json!({
            "[google.api.field_behavior]": ["REQUIRED", "IMMUTABLE", "SOMETHING_NEW"],
            "[google.api.field_info]": {"format": "UUID4"},
            "deprecated": true
        }));
        assert_eq!(
            field_behavior(&opts),
            vec![FieldBehavior::Required, FieldBehavior::Immutable]
        );
        assert_eq!(field_format(&opts), Some(FieldFormat::Uuid4));
        assert!(deprecated(&opts));
        assert!(!map_entry(&opts));
    }
}
