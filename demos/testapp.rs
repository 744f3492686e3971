//! A small demo application served by the development server.
//!
//! ```sh
//! RUST_LOG=burette=debug cargo run --example testapp
//! ```
//!
//! Then visit `http://localhost:5963/hoge/path?q=hello`.

use burette::server::{ServerConfig, run_local};
use burette::template;
use burette::{App, HandlerError, Request, redirect};
use serde_json::json;
use tracing_subscriber::EnvFilter;

const FORM: &str = "<form method='POST' action='/post'>\
    <input name=mytext type=text><input name='POST' type=submit></form>";

fn build_app() -> Result<App, burette::RouteError> {
    let mut app = App::new();

    app.get("/hoge/path", |req: &Request| {
        let q = req.query_param("q").unwrap_or_default();
        format!("<html><body>my first app: q = {q}{FORM}</body></html>")
    })?
    .get("/empty", || format!("<html><body>{FORM}</body></html>"))?
    .post("/post", |req: &Request| -> Result<String, HandlerError> {
        let text = req.text()?;
        Ok(format!("<html><body> posted body = {text}{FORM}</body></html>"))
    })?
    .get("/json", || json!({ "a": "b", "aa": [1, 2, 3] }))?
    .get("/redirect", || redirect("/empty"))?
    .get("/jinja2", || -> Result<String, HandlerError> {
        let users = json!({
            "users": [
                { "url": "http://www.yahoo.com", "name": "Yahoo" },
                { "url": "http://www.gmail.com", "name": "GMAIL" },
            ]
        });
        Ok(template::render("hoge.tpl", "./tests/templates", users)?)
    })?
    .get("/users/<id>/", |req: &Request| {
        format!("user {}", req.path_param("id").unwrap_or_default())
    })?;

    Ok(app)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("burette=info")),
        )
        .init();

    let app = build_app()?;
    run_local(app, &ServerConfig::default()).await?;
    Ok(())
}
