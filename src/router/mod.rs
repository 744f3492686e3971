//! Request routing: map path templates and methods to handler functions.
//!
//! Templates embed named placeholders in angle brackets:
//!
//! | Template             | Example match     | Captured params        |
//! |----------------------|-------------------|------------------------|
//! | `/users`             | `/users`          | *(none)*               |
//! | `/users/<id>`        | `/users/42`       | `id → "42"`            |
//! | `/a/<k1>/<k2>/`      | `/a/x/y/`         | `k1 → "x"`, `k2 → "y"` |
//!
//! Matching is anchored and trailing slashes are significant: `/users` and
//! `/users/` are different routes.
//!
//! Routes are tried in registration order and the first one matching both
//! path and method wins. When some route matches the path but none has the
//! method, dispatch fails with `405`; when no route matches the path at all,
//! with `404`.

use std::fmt;
use std::sync::Arc;

use crate::http::{HandlerError, HttpError, IntoReply, Method, Reply, Request};

mod route;

pub use route::{PathParams, Route, RouteError};

/// What a handler invocation produces.
pub type HandlerResult = Result<Reply, HandlerError>;

type NoArgFn = dyn Fn() -> HandlerResult + Send + Sync + 'static;
type RequestFn = dyn Fn(&Request) -> HandlerResult + Send + Sync + 'static;

/// A registered handler, tagged with how it is called.
///
/// The variant is fixed at registration from the function's signature:
/// `Fn()` handlers never see the request, `Fn(&Request)` handlers receive it
/// with path parameters already populated.
#[derive(Clone)]
pub enum Handler {
    NoArg(Arc<NoArgFn>),
    WithRequest(Arc<RequestFn>),
}

impl Handler {
    /// Wraps a function taking either no arguments or a `&Request`.
    ///
    /// # Examples
    ///
    /// ```
    /// use burette::http::Request;
    /// use burette::router::Handler;
    ///
    /// let hello = Handler::from_fn(|| "hello");
    /// let echo = Handler::from_fn(|req: &Request| req.path().to_owned());
    /// assert_eq!(hello.arity(), 0);
    /// assert_eq!(echo.arity(), 1);
    /// ```
    pub fn from_fn<M>(handler: impl IntoHandler<M>) -> Self {
        handler.into_handler()
    }

    /// Number of arguments the handler is called with.
    pub fn arity(&self) -> usize {
        match self {
            Self::NoArg(_) => 0,
            Self::WithRequest(_) => 1,
        }
    }

    /// Invokes the handler. The outcome is returned untouched.
    pub fn call(&self, request: &Request) -> HandlerResult {
        match self {
            Self::NoArg(handler) => handler(),
            Self::WithRequest(handler) => handler(request),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoArg(_) => f.write_str("Handler::NoArg"),
            Self::WithRequest(_) => f.write_str("Handler::WithRequest"),
        }
    }
}

/// Marker for handlers of the form `Fn() -> R`.
#[derive(Debug)]
pub struct NoArgs;

/// Marker for handlers of the form `Fn(&Request) -> R`.
#[derive(Debug)]
pub struct TakesRequest;

/// Conversion from a plain function into a [`Handler`].
///
/// The marker type `M` lets the compiler pick the variant from the
/// function's signature, so registration never inspects arity at runtime.
/// `R` can be anything implementing [`IntoReply`].
pub trait IntoHandler<M>: Send + Sync + 'static {
    fn into_handler(self) -> Handler;
}

impl<F, R> IntoHandler<NoArgs> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoReply,
{
    fn into_handler(self) -> Handler {
        Handler::NoArg(Arc::new(move || self().into_reply()))
    }
}

impl<F, R> IntoHandler<TakesRequest> for F
where
    F: Fn(&Request) -> R + Send + Sync + 'static,
    R: IntoReply,
{
    fn into_handler(self) -> Handler {
        Handler::WithRequest(Arc::new(move |request: &Request| {
            self(request).into_reply()
        }))
    }
}

impl IntoHandler<Handler> for Handler {
    fn into_handler(self) -> Handler {
        self
    }
}

/// Ordered route table.
///
/// Built once at startup and only read afterwards, so a shared `Router` can
/// serve concurrent calls without locking.
///
/// # Examples
///
/// ```
/// use burette::http::{Environ, Request, Reply, StatusCode};
/// use burette::router::{Handler, Router};
///
/// let mut router = Router::new();
/// router.add("/users/<id>", "GET", Handler::from_fn(|req: &Request| {
///     format!("user {}", req.path_param("id").unwrap_or_default())
/// }))?;
///
/// let mut request = Request::new(Environ::new("GET", "/users/42"));
/// assert_eq!(router.dispatch(&mut request).unwrap(), Reply::Text("user 42".into()));
///
/// let mut request = Request::new(Environ::new("POST", "/users/42"));
/// let err = router.dispatch(&mut request).unwrap_err();
/// assert_eq!(err.as_http().unwrap().status(), StatusCode::METHOD_NOT_ALLOWED);
/// # Ok::<(), burette::router::RouteError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an already compiled route. It is tried after every earlier one.
    pub fn add_route(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// Compiles `template` and appends it.
    ///
    /// # Errors
    ///
    /// Returns the [`RouteError`] when the template is malformed; the table is
    /// left unchanged.
    pub fn add(
        &mut self,
        template: &str,
        method: impl Into<Method>,
        handler: Handler,
    ) -> Result<(), RouteError> {
        self.add_route(Route::new(template, method, handler)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered routes in matching order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Finds the first route matching both `path` and `method`.
    ///
    /// # Errors
    ///
    /// - `405` when at least one route matches the path but none the method.
    /// - `404` when no route matches the path.
    pub fn resolve(&self, path: &str, method: &Method) -> Result<(&Route, PathParams), HttpError> {
        let mut path_matched = false;

        for route in &self.routes {
            let Some(params) = route.matches(path) else {
                continue;
            };
            if route.method() == method {
                return Ok((route, params));
            }
            path_matched = true;
        }

        if path_matched {
            Err(HttpError::method_not_allowed())
        } else {
            Err(HttpError::not_found())
        }
    }

    /// Resolves `request`, stores its path parameters and calls the handler.
    ///
    /// The handler's outcome, success or error, is returned as-is; coercion
    /// into a response happens elsewhere.
    pub fn dispatch(&self, request: &mut Request) -> HandlerResult {
        let (route, params) = self.resolve(request.path(), request.method())?;
        request.set_path_params(params);
        route.handler().call(request)
    }
}
