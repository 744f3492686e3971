//! Template rendering for handlers.
//!
//! Handlers call [`render`] (or keep a [`Templates`] around) to turn a
//! template file plus serializable data into HTML. Failures are logged and
//! returned; inside a handler `?` turns them into a 500.

use std::fmt;
use std::path::{Path, PathBuf};

use minijinja::Environment;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Directory searched when no template path is given.
pub const DEFAULT_TEMPLATE_PATH: &str = "./templates";

/// Errors raised while loading or rendering a template.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to load template `{name}`: {source}")]
    Load {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("failed to render template `{name}`: {source}")]
    Render {
        name: String,
        #[source]
        source: minijinja::Error,
    },
}

/// A template search path with its loaded environment.
///
/// Templates are read from disk on first use and cached afterwards.
///
/// # Examples
///
/// ```no_run
/// use burette::template::Templates;
/// use serde_json::json;
///
/// let templates = Templates::new("./tests/templates");
/// let html = templates.render("hoge.tpl", json!({ "users": [] }))?;
/// # Ok::<(), burette::template::RenderError>(())
/// ```
pub struct Templates {
    path: PathBuf,
    env: Environment<'static>,
}

impl Templates {
    /// Loads templates from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut env = Environment::new();
        env.set_loader(minijinja::path_loader(path.clone()));
        Self { path, env }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Renders template `name` with `context`.
    ///
    /// # Errors
    ///
    /// - [`RenderError::Load`]: missing file or syntax error.
    /// - [`RenderError::Render`]: evaluation failed.
    pub fn render<S: Serialize>(&self, name: &str, context: S) -> Result<String, RenderError> {
        let template = self.env.get_template(name).map_err(|source| {
            error!(template = name, path = %self.path.display(), error = %source, "failed to load template");
            RenderError::Load {
                name: name.to_owned(),
                source,
            }
        })?;

        template.render(context).map_err(|source| {
            error!(template = name, error = %source, "failed to render template");
            RenderError::Render {
                name: name.to_owned(),
                source,
            }
        })
    }
}

impl fmt::Debug for Templates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Templates").field("path", &self.path).finish_non_exhaustive()
    }
}

impl Default for Templates {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE_PATH)
    }
}

/// One-shot render of `name` from the `path` directory.
///
/// # Errors
///
/// See [`Templates::render`].
pub fn render<S: Serialize>(
    name: &str,
    path: impl Into<PathBuf>,
    context: S,
) -> Result<String, RenderError> {
    Templates::new(path).render(name, context)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::*;

    const USERS: &str =
        "<ul>{% for user in users %}<li><a href=\"{{ user.url }}\">{{ user.name }}</a></li>{% endfor %}</ul>";

    fn template_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hoge.tpl"), USERS).unwrap();
        fs::write(dir.path().join("broken.tpl"), "{% for x in %}").unwrap();
        dir
    }

    #[test]
    fn renders_with_data() {
        let dir = template_dir();
        let html = render(
            "hoge.tpl",
            dir.path(),
            json!({ "users": [{ "url": "http://www.yahoo.com", "name": "Yahoo" }] }),
        )
        .unwrap();
        assert_eq!(html, "<ul><li><a href=\"http://www.yahoo.com\">Yahoo</a></li></ul>");
    }

    #[test]
    fn templates_are_reusable() {
        let dir = template_dir();
        let templates = Templates::new(dir.path());
        assert_eq!(templates.path(), dir.path());
        for name in ["A", "B"] {
            let html = templates
                .render("hoge.tpl", json!({ "users": [{ "url": "/", "name": name }] }))
                .unwrap();
            assert!(html.contains(name));
        }
    }

    #[test]
    fn missing_template_is_load_error() {
        let dir = template_dir();
        let err = render("nope.tpl", dir.path(), json!({})).unwrap_err();
        assert!(matches!(err, RenderError::Load { name, .. } if name == "nope.tpl"));
    }

    #[test]
    fn syntax_error_is_load_error() {
        let dir = template_dir();
        assert!(matches!(
            render("broken.tpl", dir.path(), json!({})),
            Err(RenderError::Load { .. })
        ));
    }
}
