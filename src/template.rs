//! Template resolution and rendering.
//!
//! Every directory owns a [`TemplateResolver`] scoped to its `.template/`
//! sub-directory and chained to its parent directory's resolver. A name is
//! looked up in the nearest scope first and then up the chain, so a
//! directory can override any template for its own subtree:
//!
//! ```text
//! site/
//! ├── .template/
//! │   ├── default.html        # used by every article...
//! │   └── nav.html
//! └── docs/
//!     ├── .template/
//!     │   └── default.html    # ...except those under docs/
//!     └── guide.md
//! ```
//!
//! Template sources are handlebars. A layout may pull in other templates
//! with `{{> name}}`; those are resolved through the same chain.

use crate::config::Mapping;
use handlebars::Handlebars;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::SystemTime;
use thiserror::Error;

/// Name of the per-directory template override location.
pub const TEMPLATE_DIR_NAME: &str = ".template";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template not found: {0}")]
    NotFound(String),
    #[error("invalid template name: {0:?}")]
    InvalidName(String),
    #[error("failed to read template {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("template syntax error: {0}")]
    Syntax(#[from] Box<handlebars::TemplateError>),
    #[error("template render error: {0}")]
    Render(#[from] handlebars::RenderError),
}

impl From<handlebars::TemplateError> for TemplateError {
    fn from(err: handlebars::TemplateError) -> Self {
        TemplateError::Syntax(Box::new(err))
    }
}

/// A template found by [`TemplateResolver::resolve`].
#[derive(Debug, Clone)]
pub struct ResolvedTemplate {
    pub name: String,
    pub source: String,
    /// Canonical path of the file the source came from.
    pub identity: PathBuf,
    mtime: Option<SystemTime>,
}

impl ResolvedTemplate {
    /// Whether the file on disk still has the modification time it had when
    /// it was resolved. A file that vanished, or whose mtime could not be
    /// read either time, is stale.
    pub fn is_fresh(&self) -> bool {
        match (self.mtime, modified(&self.identity)) {
            (Some(then), Some(now)) => then == now,
            _ => false,
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Directory-scoped template lookup with fallback to the parent scope.
#[derive(Debug)]
pub struct TemplateResolver {
    scope: PathBuf,
    parent: Option<Arc<TemplateResolver>>,
}

impl TemplateResolver {
    /// Resolver for the directory `dir`, looking in `dir/.template/`.
    pub fn new(dir: &Path, parent: Option<Arc<TemplateResolver>>) -> Self {
        Self {
            scope: dir.join(TEMPLATE_DIR_NAME),
            parent,
        }
    }

    /// Find `name` in this scope or the nearest ancestor scope that has it.
    pub fn resolve(&self, name: &str) -> Result<ResolvedTemplate, TemplateError> {
        validate_name(name)?;
        let mut resolver = Some(self);
        while let Some(current) = resolver {
            let candidate = current.scope.join(name);
            if candidate.is_file() {
                return load(name, &candidate);
            }
            resolver = current.parent.as_deref();
        }
        Err(TemplateError::NotFound(name.to_string()))
    }

    /// Render the layout `name` with `context`.
    ///
    /// Partials referenced from the layout (transitively) are resolved
    /// through this resolver's chain, each name at most once. A fresh
    /// handlebars registry is built per call so nothing leaks between
    /// pages or between rebuilds.
    ///
    /// Names declared with `{{#*inline}}` are left to handlebars, and so is
    /// a missing `{{#> name}}` block partial, which renders its fallback
    /// content instead.
    pub fn render(&self, name: &str, context: &Mapping) -> Result<String, TemplateError> {
        let layout = self.resolve(name)?;

        let mut engine = Handlebars::new();
        engine.register_escape_fn(handlebars::no_escape);

        let mut inline = inline_names(&layout.source);
        let mut missing = Vec::new();
        let mut seen = HashSet::from([name.to_string()]);
        let mut pending = partial_refs(&layout.source);
        while let Some(partial) = pending.pop() {
            if !seen.insert(partial.name.clone()) {
                continue;
            }
            let resolved = match self.resolve(&partial.name) {
                Ok(resolved) => resolved,
                Err(TemplateError::NotFound(_)) if partial.block => continue,
                Err(TemplateError::NotFound(missing_name)) => {
                    missing.push(missing_name);
                    continue;
                }
                Err(e) => return Err(e),
            };
            inline.extend(inline_names(&resolved.source));
            pending.extend(partial_refs(&resolved.source));
            engine.register_partial(&partial.name, &resolved.source)?;
        }
        if let Some(name) = missing.into_iter().find(|n| !inline.contains(n)) {
            return Err(TemplateError::NotFound(name));
        }

        engine.register_template_string(name, &layout.source)?;
        Ok(engine.render(name, context)?)
    }
}

fn load(name: &str, path: &Path) -> Result<ResolvedTemplate, TemplateError> {
    let io_error = |source| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    };
    let identity = path.canonicalize().map_err(io_error)?;
    let mtime = modified(&identity);
    let source = fs::read_to_string(&identity).map_err(io_error)?;
    Ok(ResolvedTemplate {
        name: name.to_string(),
        source,
        identity,
        mtime,
    })
}

/// Names must stay inside the template scope.
fn validate_name(name: &str) -> Result<(), TemplateError> {
    let path = Path::new(name);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if name.is_empty() || escapes {
        return Err(TemplateError::InvalidName(name.to_string()));
    }
    Ok(())
}

static PARTIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{~?(#?)>\s*([A-Za-z0-9_./-]+)").expect("partial pattern is valid")
});

static INLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{~?#\*inline\s+"([^"]+)""#).expect("inline pattern is valid")
});

/// A `{{> name}}` reference, or a `{{#> name}}` block with fallback content.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PartialRef {
    name: String,
    block: bool,
}

/// Partials referenced by a template source, in order of appearance.
fn partial_refs(source: &str) -> Vec<PartialRef> {
    PARTIAL_RE
        .captures_iter(source)
        .map(|c| PartialRef {
            name: c[2].to_string(),
            block: !c[1].is_empty(),
        })
        .collect()
}

/// Partials a template source declares itself with `{{#*inline}}`.
fn inline_names(source: &str) -> HashSet<String> {
    INLINE_RE
        .captures_iter(source)
        .map(|c| c[1].to_string())
        .collect()
}
