//! Site configuration module.
//!
//! Handles loading and merging `.bg.yml` files. Configuration is hierarchical:
//! every directory's file is merged over the effective configuration of its
//! parent directory, so a key set at the root applies everywhere below it
//! until a deeper directory overrides it.
//!
//! ## Config File Location
//!
//! ```text
//! site/
//! ├── .bg.yml                  # Root config
//! ├── about.md
//! └── blog/
//!     ├── .bg.yml              # Merged over the root config
//!     └── first-post.md
//! ```
//!
//! ## Merge Semantics
//!
//! Mappings merge key-by-key, recursively. Anything else (scalars, sequences)
//! in the child replaces the parent's value wholesale; sequences are never
//! concatenated. This is a right-biased overlay, not an algebraic merge:
//! `merge(merge(a, b), c)` and `merge(a, merge(b, c))` can differ when one
//! layer replaces a mapping with a scalar.
//!
//! ## Missing Keys
//!
//! A missing key and a key explicitly set to `null` are indistinguishable
//! through [`Config::get`]; both resolve to `None`.
//!
//! Front matter in renderable pages is parsed with the same machinery
//! ([`Config::parse`]), so pages and directories share one value type.

use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Name of the per-directory configuration file.
pub const CONFIG_FILE_NAME: &str = ".bg.yml";

/// A string-keyed mapping of JSON-like values.
pub type Mapping = Map<String, Value>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("config document must be a mapping, found {0}")]
    NotAMapping(&'static str),
    #[error("{}: {source}", .path.display())]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<ConfigError>,
    },
}

/// A materialized configuration view.
///
/// Construction eagerly merges the parent's view with the node's own data, so
/// lookups never walk the chain. Values are shared behind an [`Arc`], making
/// clones cheap; a `Config` is never mutated after construction.
#[derive(Debug, Clone, Default)]
pub struct Config {
    values: Arc<Mapping>,
    parent: Option<Arc<Config>>,
}

impl Config {
    /// Build a config from raw data, merged over `parent` when given.
    pub fn new(data: Mapping, parent: Option<&Config>) -> Self {
        let values = match parent {
            Some(parent) => merge_mappings(parent.values.as_ref().clone(), data),
            None => data,
        };
        Self {
            values: Arc::new(values),
            parent: parent.map(|p| Arc::new(p.clone())),
        }
    }

    /// Parse a YAML document and merge it over `parent`.
    ///
    /// An empty document (or one that is just `null`) is an empty mapping.
    pub fn parse(text: &str, parent: Option<&Config>) -> Result<Self, ConfigError> {
        Ok(Self::new(parse_mapping(text)?, parent))
    }

    /// Load `.bg.yml` from a directory.
    ///
    /// A missing file is not an error: the result is an empty document
    /// merged over `parent`. A file that exists but fails to parse is.
    pub fn from_directory(dir: &Path, parent: Option<&Config>) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE_NAME);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(ConfigError::InFile {
                    path,
                    source: Box::new(e.into()),
                });
            }
        };
        Self::parse(&text, parent).map_err(|e| ConfigError::InFile {
            path,
            source: Box::new(e),
        })
    }

    /// Return a child config whose own data is `extra`.
    ///
    /// `self` is left untouched; the result records `self` as its parent.
    pub fn overlay(&self, extra: Mapping) -> Self {
        Self::new(extra, Some(self))
    }

    /// Look up a top-level key. `null` values read as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).filter(|v| !v.is_null())
    }

    /// The parent this config was merged over, if any.
    pub fn parent(&self) -> Option<&Config> {
        self.parent.as_deref()
    }

    /// The materialized view.
    pub fn as_map(&self) -> &Mapping {
        &self.values
    }

    /// The materialized view as a standalone JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.as_ref().clone())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PartialEq for Config {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl From<Mapping> for Config {
    fn from(data: Mapping) -> Self {
        Self::new(data, None)
    }
}

// =============================================================================
// Merging and parsing
// =============================================================================

/// Recursively merge `overlay` on top of `base`.
///
/// - Mappings are merged key-by-key (overlay keys override base keys).
/// - Non-mapping values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_values(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            Value::Object(merge_mappings(base_map, overlay_map))
        }
        (_, overlay) => overlay,
    }
}

/// [`merge_values`] specialised to two mappings.
pub fn merge_mappings(mut base: Mapping, overlay: Mapping) -> Mapping {
    for (key, overlay_val) in overlay {
        let merged = match base.remove(&key) {
            Some(base_val) => merge_values(base_val, overlay_val),
            None => overlay_val,
        };
        base.insert(key, merged);
    }
    base
}

/// Parse a YAML document that must be a mapping (or empty).
pub fn parse_mapping(text: &str) -> Result<Mapping, ConfigError> {
    if text.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(text)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        other => Err(ConfigError::NotAMapping(value_kind(&other))),
    }
}

/// Loose truthiness used for feature switches: absent, `null`, `false`, zero, and empty
/// strings/sequences/mappings are false.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

/// Returns a fully-commented stock `.bg.yml` with all keys and explanations.
///
/// Used by the `--gen-config` CLI flag.
pub fn stock_config_yaml() -> &'static str {
    r##"# bgsite directory configuration
# ==============================
# Place a .bg.yml in any directory of the source tree. Each file is merged
# over its parent directory's effective configuration: mappings merge
# key-by-key, everything else (strings, numbers, lists) replaces the
# inherited value. Every key is optional. All keys are also visible to
# templates, so arbitrary site data (titles, menus, ...) can live here too.

# Trailing-slash policy for index page URLs:
#   "index.html" -> /blog/index.html
#   false        -> /blog
#   anything else (or absent) -> /blog/   (the root is always /)
directory_slash: true

# Configuration shared by auto-generated index pages in this directory.
page:
  title: Index

# Synthesize index pages when the directory has no index.* of its own.
# Accepts a layout name, a mapping, or a list of mappings:
#   source:   glob selecting the children listed (default "*")
#   target:   output filename template (default "index.html"); it can use
#             {{pagenate.num}} (0-based) and {{pagenate.max}}
#   layout:   template used to render the page (default "index.html")
#   pagenate: children per page (default: all children on one page)
autoindex: false
#autoindex:
#  source: "*.md"
#  target: "{{#if pagenate.num}}page{{pagenate.num}}.html{{else}}index.html{{/if}}"
#  layout: index.html
#  pagenate: 10

# Bound how deep children/brothers listings nest in the rendering context.
# Omit for unlimited.
#relations_depth: 2

# External converters, read from the root .bg.yml only. The command gets the
# page body on stdin and must print HTML on stdout.
#converters:
#  .rst: rst2html5 --no-doc-title
"##
}
