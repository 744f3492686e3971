//! The dispatcher façade wiring routing, request construction and response
//! coercion around one inbound call.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::http::{Environ, HandlerError, Method, Request, WireResponse, coerce};
use crate::log::{Logger, TracingLogger};
use crate::router::{Handler, HandlerResult, IntoHandler, RouteError, Router};

/// A micro web application: a route table plus the logger it reports to.
///
/// Routes are registered at startup through `&mut self`; afterwards the app
/// is only read, so one instance behind an `Arc` can serve any number of
/// concurrent calls.
///
/// [`call`](App::call) never fails: dispatch errors, handler errors and
/// handler panics all come back as a response.
///
/// # Examples
///
/// ```
/// use burette::App;
/// use burette::http::{Environ, Request, redirect};
/// use serde_json::json;
///
/// let mut app = App::new();
/// app.get("/hello", |req: &Request| {
///     format!("hello {}", req.query_param("name").unwrap_or("world"))
/// })?
/// .get("/json", || json!({"a": "b"}))?
/// .get("/old", || redirect("/hello"))?;
///
/// let response = app.call(Environ::new("GET", "/hello").query_string("name=rust"));
/// assert_eq!(response.status_line(), "200 OK");
/// assert_eq!(response.body().as_ref(), b"hello rust");
///
/// let response = app.call(Environ::new("GET", "/old"));
/// assert_eq!(response.headers().get("Location"), Some("/hello"));
/// # Ok::<(), burette::router::RouteError>(())
/// ```
#[derive(Debug, Clone)]
pub struct App {
    router: Router,
    log: Arc<dyn Logger>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// An empty app logging through [`TracingLogger`].
    pub fn new() -> Self {
        Self::with_logger(Arc::new(TracingLogger))
    }

    /// An empty app reporting absorbed failures to `log`.
    pub fn with_logger(log: Arc<dyn Logger>) -> Self {
        Self {
            router: Router::new(),
            log,
        }
    }

    /// Registers `handler` for `method` requests whose path matches `template`.
    ///
    /// Any method string is accepted and compared exactly.
    ///
    /// # Errors
    ///
    /// Returns the [`RouteError`] for a malformed template. Startup should
    /// stop on it rather than run without the route.
    pub fn route<M>(
        &mut self,
        template: &str,
        method: impl Into<Method>,
        handler: impl IntoHandler<M>,
    ) -> Result<&mut Self, RouteError> {
        self.router
            .add(template, method, Handler::from_fn(handler))?;
        Ok(self)
    }

    /// Registers a `GET` route.
    pub fn get<M>(
        &mut self,
        template: &str,
        handler: impl IntoHandler<M>,
    ) -> Result<&mut Self, RouteError> {
        self.route(template, Method::Get, handler)
    }

    /// Registers a `POST` route.
    pub fn post<M>(
        &mut self,
        template: &str,
        handler: impl IntoHandler<M>,
    ) -> Result<&mut Self, RouteError> {
        self.route(template, Method::Post, handler)
    }

    /// Registers a `PUT` route.
    pub fn put<M>(
        &mut self,
        template: &str,
        handler: impl IntoHandler<M>,
    ) -> Result<&mut Self, RouteError> {
        self.route(template, Method::Put, handler)
    }

    /// Registers a `DELETE` route.
    pub fn delete<M>(
        &mut self,
        template: &str,
        handler: impl IntoHandler<M>,
    ) -> Result<&mut Self, RouteError> {
        self.route(template, Method::Delete, handler)
    }

    /// Registers a `PATCH` route.
    pub fn patch<M>(
        &mut self,
        template: &str,
        handler: impl IntoHandler<M>,
    ) -> Result<&mut Self, RouteError> {
        self.route(template, Method::Patch, handler)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Handles one inbound call from the host adapter.
    pub fn call(&self, env: Environ) -> WireResponse {
        let mut request = Request::new(env);
        let outcome = self.invoke(&mut request);
        coerce(outcome, request.charset(), self.log.as_ref())
    }

    // Dispatches and reports anything that will not be a success response.
    fn invoke(&self, request: &mut Request) -> HandlerResult {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.router.dispatch(request)));

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.log
                    .handler_panicked(request.method(), request.path(), message);
                return Err(HandlerError::other(format!("handler panicked: {message}")));
            }
        };

        match &outcome {
            Ok(_) => {}
            Err(HandlerError::Http(err)) => {
                self.log
                    .request_rejected(request.method(), request.path(), err.status());
            }
            Err(err) => self.log.handler_failed(request.method(), request.path(), err),
        }

        outcome
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
