//! `google.api.HttpRule` and its conversion into a [`PathInfo`].
//!
//! The same rule shape arrives from two places: the `[google.api.http]`
//! method option in a descriptor set and `http.rules[]` in a service
//! configuration. Both accept lowerCamelCase and snake_case keys.

use crate::model::{Message, PathBinding, PathInfo};
use apimodel_template::{query_parameters, PathTemplate, PathTemplateError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HttpRule {
    pub selector: String,
    pub get: Option<String>,
    pub put: Option<String>,
    pub post: Option<String>,
    pub delete: Option<String>,
    pub patch: Option<String>,
    pub custom: Option<CustomHttpPattern>,
    pub body: String,
    #[serde(alias = "response_body")]
    pub response_body: String,
    #[serde(alias = "additional_bindings")]
    pub additional_bindings: Vec<HttpRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomHttpPattern {
    pub kind: String,
    pub path: String,
}

impl HttpRule {
    /// The `(verb, path)` pair of this rule, if any pattern is set.
    pub fn pattern(&self) -> Option<(String, &str)> {
        let simple = [
            ("GET", &self.get),
            ("PUT", &self.put),
            ("POST", &self.post),
            ("DELETE", &self.delete),
            ("PATCH", &self.patch),
        ];
        for (verb, path) in simple {
            if let Some(path) = path {
                return Some((verb.to_string(), path.as_str()));
            }
        }
        self.custom
            .as_ref()
            .map(|c| (c.kind.to_ascii_uppercase(), c.path.as_str()))
    }

    pub fn body_field_path(&self) -> Option<&str> {
        Some(self.body.as_str()).filter(|b| !b.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("http rule for `{selector}` has no path pattern")]
    MissingPattern { selector: String },

    #[error("http rule for `{selector}`: {source}")]
    Template {
        selector: String,
        #[source]
        source: PathTemplateError,
    },
}

/// Build the [`PathInfo`] of a method from its HTTP rule.
///
/// `selector` names the method in error messages. Query parameters are
/// inferred per binding from `request`'s top-level fields. When an
/// additional binding disagrees with the primary one on the body, the
/// primary body wins and a warning is logged.
pub fn path_info_from_rule(
    selector: &str,
    rule: &HttpRule,
    request: &Message,
) -> Result<PathInfo, BindingError> {
    let body = rule.body_field_path();
    let mut bindings = vec![binding_from_rule(selector, rule, request)?];
    for extra in &rule.additional_bindings {
        if extra.body_field_path() != body {
            tracing::warn!(
                selector = %selector,
                primary_body = ?body,
                additional_body = ?extra.body_field_path(),
                "additional binding disagrees on the request body"
            );
        }
        bindings.push(binding_from_rule(selector, extra, request)?);
    }
    Ok(PathInfo {
        bindings,
        body_field_path: body.map(str::to_string),
    })
}

fn binding_from_rule(
    selector: &str,
    rule: &HttpRule,
    request: &Message,
) -> Result<PathBinding, BindingError> {
    let (verb, path) = rule.pattern().ok_or_else(|| BindingError::MissingPattern {
        selector: selector.to_string(),
    })?;
    let path_template = PathTemplate::parse(path).map_err(|source| BindingError::Template {
        selector: selector.to_string(),
        source,
    })?;
    let query_parameters = query_parameters(
        request.fields.iter().map(|f| f.name.as_str()),
        &path_template,
        rule.body_field_path(),
    );
    Ok(PathBinding {
        verb,
        path_template,
        query_parameters,
    })
}
