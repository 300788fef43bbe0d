//! AIP-4222 routing header templates.
//!
//! A routing rule names a request field and, optionally, a template that
//! extracts a header value from it:
//!
//! ```text
//! RoutingTemplate = [ Spec "/" ] "{" VarBody "}" [ "/" Spec ] ;
//! VarBody         = Name [ "=" Spec ] ;
//! Spec            = SpecSeg { "/" SpecSeg } ;
//! SpecSeg         = "*" | "**" | Literal ;
//! ```
//!
//! `{parent}` is shorthand for `{parent=*}`. A rule without a template routes
//! the whole field (`{field=**}`). A rule with neither field nor template is
//! the explicit "no routing header" marker and yields no variant.
//!
//! Rules that name the same header merge into one [`RoutingInfo`]. Variant
//! order is the rule order: callers try variants in sequence and the first
//! structural match wins.

use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::char as pchar,
    combinator::{map, opt},
    multi::separated_list1,
    sequence::{delimited, preceded, terminated},
    IResult,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::{describe_failure, ident, literal};

pub const SINGLE_WILDCARD: &str = "*";
pub const MULTI_WILDCARD: &str = "**";

/// One `routing_parameters` entry, as written in the annotation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    #[serde(default)]
    pub field: String,
    #[serde(default, rename = "pathTemplate", alias = "path_template")]
    pub path_template: String,
}

impl RoutingRule {
    pub fn new(field: impl Into<String>, path_template: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            path_template: path_template.into(),
        }
    }
}

/// A `/`-separated run of literals and wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingPathSpec {
    pub segments: Vec<String>,
}

impl RoutingPathSpec {
    pub fn new<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    fn multi_wildcards(&self) -> usize {
        self.segments.iter().filter(|s| *s == MULTI_WILDCARD).count()
    }

    fn multi_wildcard_is_last_or_absent(&self) -> bool {
        let last = self.segments.len().saturating_sub(1);
        self.segments
            .iter()
            .enumerate()
            .all(|(i, s)| s != MULTI_WILDCARD || i == last)
    }
}

impl fmt::Display for RoutingPathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingVariant {
    /// Source request field, split on `.`.
    pub field_path: Vec<String>,
    pub prefix: RoutingPathSpec,
    pub matching: RoutingPathSpec,
    pub suffix: RoutingPathSpec,
}

/// All variants feeding one routing header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingInfo {
    pub name: String,
    pub variants: Vec<RoutingVariant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("routing rule has a path template `{template}` but no field")]
    MissingField { template: String },
    #[error("invalid routing template `{template}` at offset {offset}: {message}")]
    Syntax {
        template: String,
        offset: usize,
        message: String,
    },
    #[error("routing template `{template}` has no variable name")]
    MissingVariableName { template: String },
    #[error("routing template `{template}` uses `**` before the variable")]
    MultiWildcardInPrefix { template: String },
    #[error("routing template `{template}` uses `**` more than once")]
    TooManyMultiWildcards { template: String },
    #[error("routing template `{template}` uses `**` before the end of a segment list")]
    MisplacedMultiWildcard { template: String },
    #[error("{} routing rules failed to parse:\n{}", .0.len(), join_errors(.0))]
    Aggregate(Vec<RoutingError>),
}

fn join_errors(errors: &[RoutingError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse one rule into `(header name, variant)`.
///
/// Returns `Ok(None)` for the empty "no routing header" rule.
pub fn parse_routing_rule(rule: &RoutingRule) -> Result<Option<(String, RoutingVariant)>, RoutingError> {
    let field = rule.field.trim();
    let template = rule.path_template.trim();
    if field.is_empty() && template.is_empty() {
        return Ok(None);
    }
    if field.is_empty() {
        return Err(RoutingError::MissingField {
            template: template.to_string(),
        });
    }
    let field_path = field.split('.').map(str::to_string).collect();

    if template.is_empty() {
        return Ok(Some((
            field.to_string(),
            RoutingVariant {
                field_path,
                prefix: RoutingPathSpec::default(),
                matching: RoutingPathSpec::new([MULTI_WILDCARD]),
                suffix: RoutingPathSpec::default(),
            },
        )));
    }

    let (name, prefix, matching, suffix) = parse_routing_template(template)?;
    Ok(Some((
        name,
        RoutingVariant {
            field_path,
            prefix,
            matching,
            suffix,
        },
    )))
}

/// Parse every rule of a method and merge variants by header name.
///
/// Errors from individual rules are collected; more than one is reported as
/// [`RoutingError::Aggregate`].
pub fn parse_routing_rules<'a, I>(rules: I) -> Result<Vec<RoutingInfo>, RoutingError>
where
    I: IntoIterator<Item = &'a RoutingRule>,
{
    let mut infos: Vec<RoutingInfo> = Vec::new();
    let mut errors: Vec<RoutingError> = Vec::new();

    for rule in rules {
        match parse_routing_rule(rule) {
            Ok(Some((name, variant))) => match infos.iter_mut().find(|i| i.name == name) {
                Some(info) => info.variants.push(variant),
                None => infos.push(RoutingInfo {
                    name,
                    variants: vec![variant],
                }),
            },
            Ok(None) => {}
            Err(e) => errors.push(e),
        }
    }

    match errors.len() {
        0 => Ok(infos),
        1 => Err(errors.remove(0)),
        _ => Err(RoutingError::Aggregate(errors)),
    }
}

// ============================================================================
// Grammar
// ============================================================================

type Parsed = (String, RoutingPathSpec, RoutingPathSpec, RoutingPathSpec);

fn spec_segment(input: &str) -> IResult<&str, &str> {
    alt((tag(MULTI_WILDCARD), tag(SINGLE_WILDCARD), literal))(input)
}

fn spec(input: &str) -> IResult<&str, RoutingPathSpec> {
    map(separated_list1(pchar('/'), spec_segment), |segments: Vec<&str>| {
        RoutingPathSpec::new(segments)
    })(input)
}

fn var_body(input: &str) -> IResult<&str, &str> {
    take_while1(|c| c != '{' && c != '}')(input)
}

fn routing_template(input: &str) -> IResult<&str, (Option<RoutingPathSpec>, &str, Option<RoutingPathSpec>)> {
    let (input, prefix) = opt(terminated(spec, pchar('/')))(input)?;
    let (input, body) = delimited(pchar('{'), var_body, pchar('}'))(input)?;
    let (input, suffix) = opt(preceded(pchar('/'), spec))(input)?;
    Ok((input, (prefix, body, suffix)))
}

fn parse_routing_template(template: &str) -> Result<Parsed, RoutingError> {
    let syntax = |rest: &str| RoutingError::Syntax {
        template: template.to_string(),
        offset: template.len() - rest.len(),
        message: describe_failure(rest),
    };

    let (rest, (prefix, body, suffix)) = match routing_template(template) {
        Ok(ok) => ok,
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => return Err(syntax(e.input)),
        Err(nom::Err::Incomplete(_)) => return Err(syntax("")),
    };
    if !rest.is_empty() {
        return Err(syntax(rest));
    }
    let prefix = prefix.unwrap_or_default();
    let suffix = suffix.unwrap_or_default();

    // The variable body is itself a path spec, possibly with `name=` in front.
    let (name, matching) = match body.split_once('=') {
        Some((name, pattern)) => {
            let name = match ident(name) {
                Ok(("", name)) => name.to_string(),
                _ => return Err(RoutingError::MissingVariableName {
                    template: template.to_string(),
                }),
            };
            (Some(name), parse_body_spec(template, body, pattern)?)
        }
        None => (None, parse_body_spec(template, body, body)?),
    };

    if prefix.multi_wildcards() > 0 {
        return Err(RoutingError::MultiWildcardInPrefix {
            template: template.to_string(),
        });
    }
    if matching.multi_wildcards() + suffix.multi_wildcards() > 1 {
        return Err(RoutingError::TooManyMultiWildcards {
            template: template.to_string(),
        });
    }
    if !matching.multi_wildcard_is_last_or_absent() || !suffix.multi_wildcard_is_last_or_absent() {
        return Err(RoutingError::MisplacedMultiWildcard {
            template: template.to_string(),
        });
    }

    let (name, matching) = match name {
        Some(name) => (name, matching),
        // `{parent}` means `{parent=*}`.
        None => match matching.segments.as_slice() {
            [token] if token != SINGLE_WILDCARD && token != MULTI_WILDCARD && is_name(token) => {
                (token.clone(), RoutingPathSpec::new([SINGLE_WILDCARD]))
            }
            _ => {
                return Err(RoutingError::MissingVariableName {
                    template: template.to_string(),
                })
            }
        },
    };

    Ok((name, prefix, matching, suffix))
}

fn parse_body_spec(template: &str, body: &str, pattern: &str) -> Result<RoutingPathSpec, RoutingError> {
    match spec(pattern) {
        Ok(("", spec)) => Ok(spec),
        Ok((rest, _)) => {
            // Offsets are reported against the whole template.
            let body_start = template.find(body).unwrap_or(0);
            let pattern_start = body_start + (body.len() - pattern.len());
            Err(RoutingError::Syntax {
                template: template.to_string(),
                offset: pattern_start + (pattern.len() - rest.len()),
                message: describe_failure(rest),
            })
        }
        Err(_) => Err(RoutingError::Syntax {
            template: template.to_string(),
            offset: template.find(body).unwrap_or(0),
            message: "empty variable pattern".to_string(),
        }),
    }
}

fn is_name(token: &str) -> bool {
    matches!(ident(token), Ok(("", _)))
}
