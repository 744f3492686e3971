//! Error kinds a dispatch can end in.
//!
//! [`HttpError`] is an *expected* failure with a status of its own (no
//! route, wrong method, or anything a handler chooses to signal).
//! [`HandlerError`] is what a handler returns: either such an `HttpError` or
//! an unexpected failure that the dispatcher turns into a 500.

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

use super::StatusCode;
use super::request::RequestError;
use crate::template::RenderError;

/// An expected failure carrying its own status and optional HTML body.
///
/// # Examples
///
/// ```
/// use burette::http::{HttpError, StatusCode};
///
/// let err = HttpError::new(StatusCode::FORBIDDEN).with_body("<html><body>no</body></html>");
/// assert_eq!(err.status(), StatusCode::FORBIDDEN);
/// assert_eq!(HttpError::not_found().status().as_u16(), 404);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status}")]
pub struct HttpError {
    status: StatusCode,
    body: String,
}

impl HttpError {
    /// An error with `status` and an empty body.
    pub fn new(status: impl Into<StatusCode>) -> Self {
        Self {
            status: status.into(),
            body: String::new(),
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// No registered route matches the request path.
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND).with_body("<html><body>not found</body></html>")
    }

    /// A route matches the path, but none is registered for the method.
    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED)
            .with_body("<html><body>method not allowed</body></html>")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

/// Everything a handler can fail with.
///
/// Only [`HandlerError::Http`] reaches the client as-is. Every other variant
/// is logged and answered with a generic 500; its message never appears in
/// a response body.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("request error: {0}")]
    Request(#[from] RequestError),

    #[error("template error: {0}")]
    Render(#[from] RenderError),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(Box<dyn StdError + Send + Sync + 'static>),
}

impl HandlerError {
    /// Wraps an arbitrary error as an unexpected handler failure.
    pub fn other(err: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self::Other(err.into())
    }

    /// Returns the expected-failure payload, if this is one.
    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            Self::Http(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_dispatch_errors() {
        let nf = HttpError::not_found();
        assert_eq!(nf.status(), StatusCode::NOT_FOUND);
        assert_eq!(nf.body(), "<html><body>not found</body></html>");

        let mna = HttpError::method_not_allowed();
        assert_eq!(mna.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(mna.to_string(), "405 Method Not Allowed");
    }

    #[test]
    fn default_body_is_empty() {
        assert_eq!(HttpError::new(StatusCode::from_u16(418)).body(), "");
    }

    #[test]
    fn other_wraps_strings() {
        let err = HandlerError::other("boom");
        assert!(err.as_http().is_none());
        assert_eq!(err.to_string(), "boom");

        let err: HandlerError = HttpError::not_found().into();
        assert_eq!(err.as_http().map(HttpError::status), Some(StatusCode::NOT_FOUND));
    }
}
