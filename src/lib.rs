//! # burette
//!
//! A minimal web micro-framework: register handlers against path templates
//! and HTTP methods, and let the [`App`] turn each inbound call into a
//! response.
//!
//! Handlers take either nothing or a [`&Request`](Request) and return text,
//! JSON, an explicit [`Response`] (see [`redirect`]) or an error. Whatever
//! happens inside a handler, the caller always gets a response back.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use burette::{App, Request};
//! use burette::server::{ServerConfig, run_local};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut app = App::new();
//!     app.get("/hello/<name>", |req: &Request| {
//!         format!("Hello, {}!", req.path_param("name").unwrap_or("stranger"))
//!     })?;
//!
//!     run_local(app, &ServerConfig::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod http;
pub mod log;
pub mod router;
pub mod server;
pub mod template;

pub use app::App;
pub use http::{
    Environ, HandlerError, Headers, HttpError, Method, Reply, Request, Response, StatusCode,
    WireResponse, redirect,
};
pub use log::{Logger, TracingLogger};
pub use router::{RouteError, Router};
pub use server::{Server, ServerConfig, ServerError};
