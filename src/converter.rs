//! Content converters.
//!
//! A converter turns a renderable page's raw body into an HTML fragment. It
//! is looked up by the page's source suffix (`.md`, `.html`, ...) in a
//! [`ConverterRegistry`]. Suffix keys are case-insensitive. A suffix with no
//! registered converter is not an error: the body passes through unchanged.
//!
//! ## Built-in Converters
//!
//! | Suffix | Converter |
//! |--------|-----------|
//! | `.md`, `.markdown` | [`Markdown`] (pulldown-cmark) |
//! | `.html` | [`HtmlTemplate`]: the body is a handlebars template expanded with the page context |
//!
//! ## External Converters
//!
//! The root `.bg.yml` may map further suffixes to commands:
//!
//! ```yaml
//! converters:
//!   .rst: rst2html5 --no-doc-title
//! ```
//!
//! Each command receives the body on stdin and must print the fragment on
//! stdout ([`ExternalCommand`]).

use crate::config::{Config, Mapping};
use handlebars::Handlebars;
use pulldown_cmark::{Options, Parser, html as md_html};
use serde_json::Value;
use std::collections::HashMap;
use std::io::{self, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::string::FromUtf8Error;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("template expansion failed: {0}")]
    Template(#[from] handlebars::RenderError),
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` exited with {status}: {stderr}")]
    Command {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("converter output is not UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

/// Converts raw page content into rendered content.
///
/// `context` is the page's full rendering context (merged directory config,
/// relations and `page` info).
pub trait Converter: Send + Sync {
    fn convert(&self, content: &str, context: &Mapping) -> Result<String, ConvertError>;
}

impl<F> Converter for F
where
    F: Fn(&str, &Mapping) -> Result<String, ConvertError> + Send + Sync,
{
    fn convert(&self, content: &str, context: &Mapping) -> Result<String, ConvertError> {
        self(content, context)
    }
}

/// Passes content through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Converter for Identity {
    fn convert(&self, content: &str, _context: &Mapping) -> Result<String, ConvertError> {
        Ok(content.to_string())
    }
}

static IDENTITY: Identity = Identity;

/// Markdown to HTML.
#[derive(Debug, Clone, Copy)]
pub struct Markdown {
    options: Options,
}

impl Default for Markdown {
    fn default() -> Self {
        Self {
            options: Options::ENABLE_TABLES
                | Options::ENABLE_FOOTNOTES
                | Options::ENABLE_STRIKETHROUGH,
        }
    }
}

impl Converter for Markdown {
    fn convert(&self, content: &str, _context: &Mapping) -> Result<String, ConvertError> {
        let parser = Parser::new_ext(content, self.options);
        let mut html = String::with_capacity(content.len() * 3 / 2);
        md_html::push_html(&mut html, parser);
        Ok(html)
    }
}

/// Expands the body as a handlebars template against the page context.
///
/// Output is not escaped: the body is HTML already.
#[derive(Debug)]
pub struct HtmlTemplate {
    engine: Handlebars<'static>,
}

impl Default for HtmlTemplate {
    fn default() -> Self {
        let mut engine = Handlebars::new();
        engine.register_escape_fn(handlebars::no_escape);
        Self { engine }
    }
}

impl Converter for HtmlTemplate {
    fn convert(&self, content: &str, context: &Mapping) -> Result<String, ConvertError> {
        if !content.contains("{{") {
            return Ok(content.to_string());
        }
        Ok(self.engine.render_template(content, context)?)
    }
}

/// Pipes content through an external command.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
}

impl ExternalCommand {
    /// Split a command line on whitespace. Returns `None` for a blank line.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut words = command_line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }
}

impl Converter for ExternalCommand {
    fn convert(&self, content: &str, _context: &Mapping) -> Result<String, ConvertError> {
        let spawn_error = |source| ConvertError::Spawn {
            program: self.program.clone(),
            source,
        };
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        // Feed stdin from a separate thread so a chatty child can't deadlock
        // against a full stdout pipe.
        let stdin = child.stdin.take();
        let output = std::thread::scope(|scope| {
            if let Some(mut stdin) = stdin {
                scope.spawn(move || {
                    // A child that exits without reading is reported via its status.
                    let _ = stdin.write_all(content.as_bytes());
                });
            }
            child.wait_with_output()
        })
        .map_err(spawn_error)?;

        if !output.status.success() {
            return Err(ConvertError::Command {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8(output.stdout)?)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Suffix-keyed converter table, shared read-only across a build.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<String, Arc<dyn Converter>>,
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.converters.keys().collect();
        keys.sort();
        f.debug_struct("ConverterRegistry")
            .field("keys", &keys)
            .finish()
    }
}

impl ConverterRegistry {
    /// An empty registry: every lookup yields [`Identity`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the Markdown and HTML converters installed.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(".md", Markdown::default());
        registry.register(".markdown", Markdown::default());
        registry.register(".html", HtmlTemplate::default());
        registry
    }

    pub fn register(&mut self, key: &str, converter: impl Converter + 'static) {
        self.converters
            .insert(key.to_lowercase(), Arc::new(converter));
    }

    /// Find the converter for `key`; unknown or absent keys give [`Identity`].
    pub fn lookup(&self, key: Option<&str>) -> &dyn Converter {
        key.and_then(|k| self.converters.get(&k.to_lowercase()))
            .map_or(&IDENTITY as &dyn Converter, |c| c.as_ref())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.converters.contains_key(&key.to_lowercase())
    }

    /// Register the `converters` mapping from a root config as
    /// [`ExternalCommand`]s. Entries that aren't non-blank strings are
    /// skipped with a warning.
    pub fn register_commands(&mut self, config: &Config) {
        let Some(Value::Object(commands)) = config.get("converters") else {
            return;
        };
        for (suffix, command) in commands {
            match command.as_str().and_then(ExternalCommand::parse) {
                Some(external) => {
                    tracing::debug!(suffix, command = %command, "registering external converter");
                    self.register(suffix, external);
                }
                None => tracing::warn!(suffix, "ignoring converter entry that is not a command line"),
            }
        }
    }
}
