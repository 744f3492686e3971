//! Path template compilation.
//!
//! A template such as `/users/<id>/posts/<post_id>/` is tokenized into
//! literal and placeholder segments, each placeholder name is validated, and
//! the segments are compiled into an anchored matcher. Placeholders capture
//! one or more of `[a-zA-Z0-9_]`; every other character must match exactly,
//! including a trailing slash.

use regex::Regex;
use thiserror::Error;

use super::Handler;
use crate::http::Method;

/// Errors raised while registering a route. Registration must stop on these.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid placeholder name `{name}` in route `{template}`")]
    InvalidPlaceholder { template: String, name: String },

    #[error("unterminated placeholder in route `{template}`")]
    UnterminatedPlaceholder { template: String },

    #[error("placeholder `{name}` appears more than once in route `{template}`")]
    DuplicatePlaceholder { template: String, name: String },

    #[error("failed to compile route `{template}`: {source}")]
    Pattern {
        template: String,
        #[source]
        source: regex::Error,
    },
}

// One piece of a tokenized template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Path parameters captured by a route match, in declaration order.
///
/// # Examples
///
/// ```
/// use burette::router::PathParams;
///
/// let params = PathParams::from_iter([("k1", "x"), ("k2", "y")]);
/// assert_eq!(params.get("k2"), Some("y"));
/// assert_eq!(params.names().collect::<Vec<_>>(), ["k1", "k2"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    entries: Vec<(String, String)>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value captured for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates placeholder names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Iterates `(name, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, name: String, value: String) {
        self.entries.push((name, value));
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A compiled path template bound to a method and a handler.
///
/// Immutable once built.
#[derive(Debug, Clone)]
pub struct Route {
    template: String,
    method: Method,
    handler: Handler,
    param_names: Vec<String>,
    pattern: Regex,
}

impl Route {
    /// Compiles `template` for `method`.
    ///
    /// # Errors
    ///
    /// Any [`RouteError`]: a placeholder name outside
    /// `[a-zA-Z_][a-zA-Z0-9_]*`, a `<` without its `>`, a name used twice.
    pub fn new(
        template: impl Into<String>,
        method: impl Into<Method>,
        handler: Handler,
    ) -> Result<Self, RouteError> {
        let template = template.into();
        let segments = tokenize(&template)?;

        let mut param_names: Vec<String> = Vec::new();
        let mut expr = String::from("^");
        for segment in &segments {
            match segment {
                Segment::Literal(text) => expr.push_str(&regex::escape(text)),
                Segment::Param(name) => {
                    if param_names.contains(name) {
                        return Err(RouteError::DuplicatePlaceholder {
                            template,
                            name: name.clone(),
                        });
                    }
                    expr.push_str("([a-zA-Z0-9_]+)");
                    param_names.push(name.clone());
                }
            }
        }
        expr.push('$');

        let pattern = match Regex::new(&expr) {
            Ok(pattern) => pattern,
            Err(source) => return Err(RouteError::Pattern { template, source }),
        };

        Ok(Self {
            template,
            method: method.into(),
            handler,
            param_names,
            pattern,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Placeholder names in declaration order.
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Matches the whole of `path`, ignoring the method.
    ///
    /// Returns the captured parameters, or `None` when the path does not
    /// have this route's shape. A non-match is not an error.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let captures = self.pattern.captures(path)?;
        let mut params = PathParams::new();
        for (index, name) in self.param_names.iter().enumerate() {
            let value = captures.get(index + 1)?.as_str();
            params.push(name.clone(), value.to_owned());
        }
        Some(params)
    }
}

fn tokenize(template: &str) -> Result<Vec<Segment>, RouteError> {
    let mut segments = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('<') {
        if open > 0 {
            segments.push(Segment::Literal(rest[..open].to_owned()));
        }
        let after = &rest[open + 1..];
        let close = after
            .find('>')
            .ok_or_else(|| RouteError::UnterminatedPlaceholder {
                template: template.to_owned(),
            })?;
        let name = &after[..close];
        if !is_identifier(name) {
            return Err(RouteError::InvalidPlaceholder {
                template: template.to_owned(),
                name: name.to_owned(),
            });
        }
        segments.push(Segment::Param(name.to_owned()));
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_owned()));
    }

    Ok(segments)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
