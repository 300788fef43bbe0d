//! AIP-127 path templates.
//!
//! Grammar (from `google/api/http.proto`, restricted to what AIP-127 allows):
//!
//! ```text
//! Template  = "/" Segments [ ":" Literal ] ;
//! Segments  = Segment { "/" Segment } ;
//! Segment   = Literal | Variable ;
//! Variable  = "{" FieldPath [ "=" Pattern ] "}" ;
//! Pattern   = PatSeg { "/" PatSeg } ;
//! PatSeg    = "*" | "**" | Literal ;
//! FieldPath = Ident { "." Ident } ;
//! ```
//!
//! A variable without a pattern matches exactly one segment. `**` may only be
//! the last segment of a variable pattern.

use std::collections::BTreeSet;
use std::fmt;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char as pchar, satisfy},
    combinator::{map, opt, recognize},
    multi::separated_list1,
    sequence::{pair, preceded},
    IResult,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// AST
// ============================================================================

/// A parsed path template: literals and variables, optionally ending in a
/// custom verb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathTemplate {
    pub segments: Vec<PathSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSegment {
    Literal(String),
    Variable(PathVariable),
    /// Trailing `:verb`. Always the last segment when present.
    Verb(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathVariable {
    /// Dotted request field path, split on `.`.
    pub field_path: Vec<String>,
    pub segments: Vec<VariableSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableSegment {
    Literal(String),
    /// `*`
    Single,
    /// `**`
    Multi,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathTemplateError {
    #[error("path template `{template}` must start with `/`")]
    MissingLeadingSlash { template: String },
    #[error("invalid path template `{template}` at offset {offset}: {message}")]
    Syntax {
        template: String,
        offset: usize,
        message: String,
    },
    #[error("path template `{template}`: `**` must be the last segment of variable `{variable}`")]
    MisplacedMultiWildcard { template: String, variable: String },
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self, PathTemplateError> {
        if !template.starts_with('/') {
            return Err(PathTemplateError::MissingLeadingSlash {
                template: template.to_string(),
            });
        }

        let (rest, segments) = match parse_template(template) {
            Ok(ok) => ok,
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                return Err(syntax_error(template, e.input))
            }
            Err(nom::Err::Incomplete(_)) => return Err(syntax_error(template, "")),
        };
        if !rest.is_empty() {
            return Err(syntax_error(template, rest));
        }

        for segment in &segments {
            if let PathSegment::Variable(var) = segment {
                let last = var.segments.len().saturating_sub(1);
                let misplaced = var
                    .segments
                    .iter()
                    .enumerate()
                    .any(|(i, s)| *s == VariableSegment::Multi && i != last);
                if misplaced {
                    return Err(PathTemplateError::MisplacedMultiWildcard {
                        template: template.to_string(),
                        variable: var.field_path.join("."),
                    });
                }
            }
        }

        Ok(Self { segments })
    }

    pub fn variables(&self) -> impl Iterator<Item = &PathVariable> {
        self.segments.iter().filter_map(|s| match s {
            PathSegment::Variable(v) => Some(v),
            _ => None,
        })
    }

    pub fn verb(&self) -> Option<&str> {
        self.segments.iter().find_map(|s| match s {
            PathSegment::Verb(v) => Some(v.as_str()),
            _ => None,
        })
    }

    /// Dotted field paths referenced by the template, in order.
    pub fn field_paths(&self) -> Vec<String> {
        self.variables().map(|v| v.field_path.join(".")).collect()
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                PathSegment::Literal(l) => write!(f, "/{l}")?,
                PathSegment::Variable(v) => write!(f, "/{v}")?,
                PathSegment::Verb(v) => write!(f, ":{v}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for PathVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}", self.field_path.join("."))?;
        if self.segments != [VariableSegment::Single] {
            let pattern = self
                .segments
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("/");
            write!(f, "={pattern}")?;
        }
        write!(f, "}}")
    }
}

impl fmt::Display for VariableSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableSegment::Literal(l) => f.write_str(l),
            VariableSegment::Single => f.write_str("*"),
            VariableSegment::Multi => f.write_str("**"),
        }
    }
}

/// Infer the query parameters of a binding.
///
/// Starts from the top-level request fields, removes every field path bound
/// in the template and the body field. A `*` body leaves nothing for the
/// query string.
pub fn query_parameters<'a, I>(fields: I, template: &PathTemplate, body: Option<&str>) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a str>,
{
    if body == Some("*") {
        return BTreeSet::new();
    }
    let mut params: BTreeSet<String> = fields.into_iter().map(str::to_string).collect();
    if let Some(body) = body {
        params.remove(body);
    }
    for path in template.field_paths() {
        params.remove(&path);
    }
    params
}

// ============================================================================
// Grammar
// ============================================================================

pub(crate) fn is_literal_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-._~%!$&'()+,;=@".contains(c)
}

pub(crate) fn literal(input: &str) -> IResult<&str, &str> {
    take_while1(is_literal_char)(input)
}

pub(crate) fn ident(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

fn field_path(input: &str) -> IResult<&str, Vec<String>> {
    map(separated_list1(pchar('.'), ident), |parts| {
        parts.into_iter().map(str::to_string).collect()
    })(input)
}

fn variable_segment(input: &str) -> IResult<&str, VariableSegment> {
    alt((
        map(tag("**"), |_| VariableSegment::Multi),
        map(tag("*"), |_| VariableSegment::Single),
        map(literal, |l: &str| VariableSegment::Literal(l.to_string())),
    ))(input)
}

fn variable(input: &str) -> IResult<&str, PathVariable> {
    let (input, _) = pchar('{')(input)?;
    let (input, field_path) = field_path(input)?;
    let (input, pattern) = opt(preceded(
        pchar('='),
        separated_list1(pchar('/'), variable_segment),
    ))(input)?;
    let (input, _) = pchar('}')(input)?;
    Ok((
        input,
        PathVariable {
            field_path,
            segments: pattern.unwrap_or_else(|| vec![VariableSegment::Single]),
        },
    ))
}

fn segment(input: &str) -> IResult<&str, PathSegment> {
    alt((
        map(variable, PathSegment::Variable),
        map(literal, |l: &str| PathSegment::Literal(l.to_string())),
    ))(input)
}

fn parse_template(input: &str) -> IResult<&str, Vec<PathSegment>> {
    let (input, _) = pchar('/')(input)?;
    let (input, mut segments) = separated_list1(pchar('/'), segment)(input)?;
    let (input, verb) = opt(preceded(pchar(':'), literal))(input)?;
    if let Some(verb) = verb {
        segments.push(PathSegment::Verb(verb.to_string()));
    }
    Ok((input, segments))
}

fn syntax_error(template: &str, rest: &str) -> PathTemplateError {
    PathTemplateError::Syntax {
        template: template.to_string(),
        offset: template.len() - rest.len(),
        message: describe_failure(rest),
    }
}

/// Explain why parsing stopped at `rest`.
pub(crate) fn describe_failure(rest: &str) -> String {
    let after = rest.strip_prefix('/').unwrap_or(rest);
    match after.chars().next() {
        None if rest.starts_with('/') => "trailing `/`".to_string(),
        None => "unexpected end of template".to_string(),
        Some('/') => "empty segment".to_string(),
        Some('{') if after.contains('}') => "malformed variable".to_string(),
        Some('{') => "unbalanced `{`".to_string(),
        Some('}') => "unbalanced `}`".to_string(),
        Some('*') => "wildcards are only allowed inside a variable".to_string(),
        Some(c) => format!("unexpected character `{c}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> PathSegment {
        PathSegment::Literal(s.to_string())
    }

    #[test]
    fn parses_variable_with_pattern_and_verb() {
        let t = PathTemplate::parse("/v1/{parent=projects/*}/foos:bulkCreate").expect("parse");
        assert_eq!(
            t.segments,
            vec![
                lit("v1"),
                PathSegment::Variable(PathVariable {
                    field_path: vec!["parent".to_string()],
                    segments: vec![
                        VariableSegment::Literal("projects".to_string()),
                        VariableSegment::Single,
                    ],
                }),
                lit("foos"),
                PathSegment::Verb("bulkCreate".to_string()),
            ]
        );
        assert_eq!(t.verb(), Some("bulkCreate"));
        assert_eq!(t.to_string(), "/v1/{parent=projects/*}/foos:bulkCreate");
    }

    #[test]
    fn variable_without_pattern_matches_one_segment() {
        let t = PathTemplate::parse("/v1/{book.name}").expect("parse");
        let var = t.variables().next().expect("variable");
        assert_eq!(var.field_path, vec!["book", "name"]);
        assert_eq!(var.segments, vec![VariableSegment::Single]);
        assert_eq!(t.field_paths(), vec!["book.name".to_string()]);
    }

    #[test]
    fn multi_wildcard_must_be_last_in_variable() {
        assert!(PathTemplate::parse("/v1/{name=projects/*/secrets/**}").is_ok());
        let err = PathTemplate::parse("/v1/{name=projects/**/secrets}").unwrap_err();
        assert!(matches!(err, PathTemplateError::MisplacedMultiWildcard { .. }));
    }

    #[test]
    fn reports_unbalanced_braces_with_offset() {
        let err = PathTemplate::parse("/v1/{name=projects/*").unwrap_err();
        match err {
            PathTemplateError::Syntax {
                offset, message, ..
            } => {
                assert_eq!(offset, 3);
                assert_eq!(message, "unbalanced `{`");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_disallowed_characters_and_relative_paths() {
        let err = PathTemplate::parse("/v1/foo bar").unwrap_err();
        assert!(err.to_string().contains("unexpected character ` `"), "{err}");
        assert!(matches!(
            PathTemplate::parse("v1/foo"),
            Err(PathTemplateError::MissingLeadingSlash { .. })
        ));
        assert!(PathTemplate::parse("/v1/foo/").is_err());
        assert!(PathTemplate::parse("/v1/*/foo").is_err());
    }

    #[test]
    fn query_parameters_exclude_path_and_body_fields() {
        let t = PathTemplate::parse("/v1/{parent=projects/*}/secrets").expect("parse");
        let fields = ["parent", "secret_id", "secret", "request_id"];

        let params = query_parameters(fields, &t, Some("secret"));
        assert_eq!(
            params.into_iter().collect::<Vec<_>>(),
            vec!["request_id".to_string(), "secret_id".to_string()]
        );

        assert!(query_parameters(fields, &t, Some("*")).is_empty());
        assert_eq!(query_parameters(fields, &t, None).len(), 3);
    }
}
