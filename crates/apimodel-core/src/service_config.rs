//! The service configuration document (`*_v1.yaml` / `*.json`).
//!
//! Only the parts the model builder consumes are typed. `authentication` and
//! `backend` are kept as opaque values.

use crate::bindings::HttpRule;
use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    pub name: String,
    pub title: String,
    pub apis: Vec<ApiEntry>,
    pub documentation: Documentation,
    pub http: Http,
    pub publishing: Publishing,
    pub authentication: Option<Value>,
    pub backend: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiEntry {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Documentation {
    pub summary: String,
    pub overview: String,
    pub rules: Vec<DocumentationRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentationRule {
    pub selector: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Http {
    pub rules: Vec<HttpRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Publishing {
    #[serde(alias = "method_settings")]
    pub method_settings: Vec<MethodSettings>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MethodSettings {
    pub selector: String,
    #[serde(alias = "auto_populated_fields")]
    pub auto_populated_fields: Vec<String>,
}

impl ServiceConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ModelError> {
        serde_yaml::from_str(text).map_err(|e| ModelError::ServiceConfig(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, ModelError> {
        serde_json::from_str(text).map_err(|e| ModelError::ServiceConfig(e.to_string()))
    }

    /// Fully-qualified names of the declared APIs, without a leading dot.
    pub fn api_names(&self) -> impl Iterator<Item = &str> {
        self.apis.iter().map(|a| a.name.as_str())
    }

    /// The first declared API that is not a mixin.
    pub fn primary_api(&self) -> Option<&str> {
        self.api_names().find(|name| !is_mixin_api(name))
    }

    /// The HTTP rule whose selector names `method_id` (with or without the
    /// leading dot).
    pub fn http_rule(&self, method_id: &str) -> Option<&HttpRule> {
        let selector = selector_of(method_id);
        self.http.rules.iter().find(|r| r.selector == selector)
    }

    pub fn documentation_rule(&self, id: &str) -> Option<&str> {
        let selector = selector_of(id);
        self.documentation
            .rules
            .iter()
            .find(|r| r.selector == selector)
            .map(|r| r.description.as_str())
    }

    /// The auto-populated allow-list for `method_id`; empty when the method
    /// has no settings.
    pub fn auto_populated_fields(&self, method_id: &str) -> &[String] {
        let selector = selector_of(method_id);
        self.publishing
            .method_settings
            .iter()
            .find(|s| s.selector == selector)
            .map(|s| s.auto_populated_fields.as_slice())
            .unwrap_or(&[])
    }
}

/// Services that are composed into primary services rather than generated
/// on their own.
pub const MIXIN_APIS: [&str; 3] = [
    "google.cloud.location.Locations",
    "google.iam.v1.IAMPolicy",
    "google.longrunning.Operations",
];

pub fn is_mixin_api(name: &str) -> bool {
    MIXIN_APIS.contains(&selector_of(name))
}

/// Configuration selectors are IDs without the leading dot.
pub fn selector_of(id: &str) -> &str {
    id.strip_prefix('.').unwrap_or(id)
}
