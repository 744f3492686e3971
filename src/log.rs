//! Dispatch event logging.
//!
//! The [`App`](crate::App) owns one [`Logger`] for its lifetime and reports
//! every failure it absorbs through it. [`TracingLogger`] forwards events to
//! [`tracing`]; supply your own implementation to route them elsewhere.

use std::fmt;

use tracing::{debug, error, warn};

use crate::http::{HandlerError, Method, StatusCode};

/// Receiver for the events the dispatcher absorbs instead of propagating.
pub trait Logger: Send + Sync {
    /// A handler returned an unexpected error; the client got a 500.
    fn handler_failed(&self, method: &Method, path: &str, error: &HandlerError);

    /// A handler panicked; the client got a 500.
    fn handler_panicked(&self, method: &Method, path: &str, message: &str);

    /// The request ended in an expected error (404, 405 or a handler's own
    /// [`HttpError`](crate::http::HttpError)).
    fn request_rejected(&self, method: &Method, path: &str, status: StatusCode);

    /// A response charset had no encoder; the body was sent as UTF-8.
    fn unknown_charset(&self, charset: &str);
}

/// Default [`Logger`] emitting structured [`tracing`] events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn handler_failed(&self, method: &Method, path: &str, err: &HandlerError) {
        error!(%method, path, error = %err, "handler failed");
    }

    fn handler_panicked(&self, method: &Method, path: &str, message: &str) {
        error!(%method, path, panic = message, "handler panicked");
    }

    fn request_rejected(&self, method: &Method, path: &str, status: StatusCode) {
        debug!(%method, path, status = status.as_u16(), "request rejected");
    }

    fn unknown_charset(&self, charset: &str) {
        warn!(charset, "unknown response charset, encoding body as UTF-8");
    }
}

impl fmt::Debug for dyn Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Logger")
    }
}
