//! The site tree: every directory and page of one build.
//!
//! [`SiteTree::load`] walks the source directory once and stores what it
//! finds in two flat tables, one for directories and one for pages. Nodes
//! refer to each other by index ([`DirId`], [`PageId`]), and each directory
//! records its parent's index, so navigation can walk upwards without any
//! shared ownership.
//!
//! ## Loading Order
//!
//! A directory's configuration and template scope are resolved before any
//! of its entries are loaded, so every page sees a finished configuration
//! chain. Once the whole tree is loaded, each directory's index page is
//! chosen: a user `index.*` page if one exists, else the auto-index pages
//! described by its `autoindex` setting.
//!
//! ## Failures
//!
//! Only an unreadable root (or a broken root `.bg.yml`) fails the load. A
//! broken `.bg.yml` further down drops that directory's subtree, and an
//! unreadable page drops that page; both are recorded in
//! [`SiteTree::failures`] and loading carries on.
//!
//! The tree is rebuilt from scratch for every build; nothing is cached
//! between builds.

use crate::autoindex::AutoIndexSpec;
use crate::config::{Config, ConfigError};
use crate::converter::ConverterRegistry;
use crate::page::{
    ArticlePage, AssetPage, AutoIndexPage, IndexPage, Page, PageKind, PageNode, classify, sniff,
};
use crate::template::TemplateResolver;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid autoindex source pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("invalid autoindex target {target:?}: {source}")]
    Target {
        target: String,
        #[source]
        source: handlebars::RenderError,
    },
    #[error("path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),
}

/// Index of a directory in its [`SiteTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirId(usize);

impl DirId {
    pub const ROOT: DirId = DirId(0);
}

/// Index of a page in its [`SiteTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(usize);

/// A directory listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entry {
    Page(PageId),
    Directory(DirId),
}

#[derive(Debug)]
pub struct Directory {
    /// Absolute source path.
    pub source: PathBuf,
    /// Path relative to the tree root; empty for the root.
    pub path: PathBuf,
    pub parent: Option<DirId>,
    /// Effective configuration: this directory's `.bg.yml` over its parent's.
    pub config: Config,
    pub templates: Arc<TemplateResolver>,
    entries: Vec<Entry>,
    auto_index: Vec<PageId>,
    user_index: Option<PageId>,
    /// An `index.*` page was present but failed to load.
    broken_index: bool,
}

/// Something that couldn't be loaded, and why.
#[derive(Debug)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub error: TreeError,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Absolute paths skipped during traversal, such as an output
    /// directory nested inside the source tree.
    pub exclude: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct SiteTree {
    dirs: Vec<Directory>,
    pages: Vec<Page>,
    by_path: HashMap<PathBuf, Entry>,
    failures: Vec<LoadFailure>,
    converters: Arc<ConverterRegistry>,
}

impl SiteTree {
    /// Load the tree rooted at `root`.
    ///
    /// External converters named in the root `.bg.yml` are added to
    /// `registry` before any page is loaded.
    pub fn load(
        root: &Path,
        mut registry: ConverterRegistry,
        options: &LoadOptions,
    ) -> Result<Self, TreeError> {
        let root = root.canonicalize().map_err(|source| TreeError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let config = Config::from_directory(&root, None)?;
        registry.register_commands(&config);

        let mut tree = SiteTree {
            dirs: Vec::new(),
            pages: Vec::new(),
            by_path: HashMap::new(),
            failures: Vec::new(),
            converters: Arc::new(registry),
        };
        tree.load_dir(root, PathBuf::new(), None, config, options)?;
        tree.resolve_indexes();
        Ok(tree)
    }

    fn load_dir(
        &mut self,
        source: PathBuf,
        path: PathBuf,
        parent: Option<DirId>,
        config: Config,
        options: &LoadOptions,
    ) -> Result<DirId, TreeError> {
        let listing = list_entries(&source, &options.exclude)?;
        let parent_templates = parent.map(|p| self.dir(p).templates.clone());
        let id = DirId(self.dirs.len());
        self.dirs.push(Directory {
            templates: Arc::new(TemplateResolver::new(&source, parent_templates)),
            source,
            path: path.clone(),
            parent,
            config,
            entries: Vec::new(),
            auto_index: Vec::new(),
            user_index: None,
            broken_index: false,
        });
        self.by_path.insert(path.clone(), Entry::Directory(id));

        let mut entries = Vec::with_capacity(listing.len());
        for child in listing {
            let Some(name) = child.file_name() else {
                continue;
            };
            let child_path = path.join(name);
            let metadata = match fs::metadata(&child) {
                Ok(metadata) => metadata,
                Err(source) => {
                    self.fail(child.clone(), TreeError::Io { path: child, source });
                    continue;
                }
            };
            // Linked directories can loop back into the tree.
            if metadata.is_dir() && child.is_symlink() {
                tracing::warn!(path = %child.display(), "not following symlinked directory");
                continue;
            }

            let loaded = if metadata.is_dir() {
                Config::from_directory(&child, Some(&self.dir(id).config))
                    .map_err(TreeError::from)
                    .and_then(|config| {
                        self.load_dir(child.clone(), child_path, Some(id), config, options)
                    })
                    .map(Entry::Directory)
            } else if metadata.is_file() {
                self.load_page(child.clone(), child_path, id).map(Entry::Page)
            } else {
                continue;
            };

            match loaded {
                Ok(entry) => entries.push(entry),
                Err(error) => {
                    if metadata.is_file() && is_index_name(&child) {
                        self.dirs[id.0].broken_index = true;
                    }
                    self.fail(child, error);
                }
            }
        }
        self.dirs[id.0].entries = entries;
        Ok(id)
    }

    fn load_page(&mut self, source: PathBuf, path: PathBuf, dir: DirId) -> Result<PageId, TreeError> {
        let kind = classify(&path, &sniff(&source));
        tracing::debug!(path = %path.display(), kind = kind.label(), "classified");

        let page = if kind == PageKind::Asset {
            Page::Asset(AssetPage {
                source,
                path: path.clone(),
                dir,
            })
        } else {
            let text = fs::read_to_string(&source).map_err(|e| TreeError::Io {
                path: source.clone(),
                source: e,
            })?;
            let article = ArticlePage::new(source.clone(), &path, dir, &text).map_err(|e| {
                ConfigError::InFile {
                    path: source.clone(),
                    source: Box::new(e),
                }
            })?;
            if kind == PageKind::Index {
                Page::Index(IndexPage::new(article))
            } else {
                Page::Article(article)
            }
        };

        let id = self.push_page(page);
        self.by_path.insert(path, Entry::Page(id));
        Ok(id)
    }

    fn push_page(&mut self, page: Page) -> PageId {
        self.pages.push(page);
        PageId(self.pages.len() - 1)
    }

    fn fail(&mut self, path: PathBuf, error: TreeError) {
        tracing::warn!(path = %path.display(), error = %error, "skipping");
        self.failures.push(LoadFailure { path, error });
    }

    // =========================================================================
    // Index resolution
    // =========================================================================

    fn resolve_indexes(&mut self) {
        for i in 0..self.dirs.len() {
            let id = DirId(i);
            let user_index = self.find_user_index(id);
            self.dirs[i].user_index = user_index;
            if user_index.is_some() {
                continue;
            }
            if self.dirs[i].broken_index {
                tracing::debug!(dir = %self.dirs[i].path.display(), "index failed to load, no auto index");
                continue;
            }
            match self.build_auto_index(id) {
                Ok(pages) => {
                    let ids: Vec<PageId> = pages.into_iter().map(|p| self.push_page(p)).collect();
                    tracing::debug!(dir = %self.dirs[i].path.display(), pages = ids.len(), "auto index");
                    self.dirs[i].auto_index = ids;
                }
                Err(error) => {
                    let path = self.dirs[i].source.clone();
                    self.fail(path, error);
                }
            }
        }
    }

    /// The first `index.*` entry, by name, that is `.html` or renderable.
    fn find_user_index(&self, id: DirId) -> Option<PageId> {
        self.dir(id).entries.iter().find_map(|entry| {
            let Entry::Page(page_id) = *entry else {
                return None;
            };
            let source = self.page(page_id).source()?;
            let is_candidate = is_index_name(source)
                && (source.extension().is_some_and(|e| e == "html")
                    || self.page(page_id).kind() != PageKind::Asset);
            is_candidate.then_some(page_id)
        })
    }

    fn build_auto_index(&self, id: DirId) -> Result<Vec<Page>, TreeError> {
        let dir = self.dir(id);
        let specs = AutoIndexSpec::from_config(dir.config.get("autoindex"));
        if specs.is_empty() {
            return Ok(Vec::new());
        }
        let page_config = match dir.config.get("page") {
            Some(Value::Object(map)) => Config::from(map.clone()),
            _ => Config::default(),
        };

        let mut pages = Vec::new();
        for spec in &specs {
            let members = self.select(id, &spec.source)?;
            for bucket in spec.buckets(&members) {
                let name = spec
                    .target_file_name(bucket.page_num, bucket.page_max)
                    .map_err(|source| TreeError::Target {
                        target: spec.target.clone(),
                        source,
                    })?;
                pages.push(Page::AutoIndex(AutoIndexPage::new(
                    dir.path.join(name),
                    id,
                    page_config.clone(),
                    bucket.members,
                    bucket.page_num,
                    bucket.page_max,
                    spec.layout.clone(),
                )));
            }
        }
        Ok(pages)
    }

    /// Entries matching `pattern` relative to the directory, sorted by path.
    ///
    /// Hidden paths and anything with stem `index` are never selected.
    fn select(&self, id: DirId, pattern: &str) -> Result<Vec<Entry>, TreeError> {
        let dir = self.dir(id);
        let base = dir
            .source
            .to_str()
            .ok_or_else(|| TreeError::NonUtf8Path(dir.source.clone()))?;
        let full = format!("{}/{}", glob::Pattern::escape(base), pattern);
        let mut matched: Vec<PathBuf> = glob::glob(&full)
            .map_err(|source| TreeError::Pattern {
                pattern: pattern.to_string(),
                source,
            })?
            .filter_map(Result::ok)
            .collect();
        matched.sort();

        Ok(matched
            .iter()
            .filter_map(|found| {
                let within = found.strip_prefix(&dir.source).ok()?;
                if is_hidden(within) || found.file_stem().is_some_and(|s| s == "index") {
                    return None;
                }
                self.by_path.get(&dir.path.join(within)).copied()
            })
            .collect())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn root(&self) -> DirId {
        DirId::ROOT
    }

    pub fn dir(&self, id: DirId) -> &Directory {
        &self.dirs[id.0]
    }

    pub fn page(&self, id: PageId) -> &Page {
        &self.pages[id.0]
    }

    /// Entry at a source path relative to the root.
    pub fn lookup(&self, path: &Path) -> Option<Entry> {
        self.by_path.get(path).copied()
    }

    /// Directory listing: auto-index pages first, then the directory's
    /// own entries sorted by name.
    pub fn entries(&self, id: DirId) -> impl Iterator<Item = Entry> + '_ {
        let dir = self.dir(id);
        dir.auto_index
            .iter()
            .map(|&p| Entry::Page(p))
            .chain(dir.entries.iter().copied())
    }

    /// The pages a directory lists for navigation.
    ///
    /// Index pages are left out (they stand for the directory itself), each
    /// sub-directory is represented by its index page, and assets are not
    /// pages.
    pub fn pages(&self, id: DirId) -> Vec<PageId> {
        self.entries(id)
            .filter_map(|entry| match entry {
                Entry::Page(page) => {
                    let kind = self.page(page).kind();
                    (!kind.is_index() && kind != PageKind::Asset).then_some(page)
                }
                Entry::Directory(child) => self
                    .index_page(child)
                    .filter(|&index| self.page(index).kind() != PageKind::Asset),
            })
            .collect()
    }

    /// The page standing for a directory: its user index, else its first
    /// auto-index page.
    pub fn index_page(&self, id: DirId) -> Option<PageId> {
        let dir = self.dir(id);
        dir.user_index.or_else(|| dir.auto_index.first().copied())
    }

    /// Pre-order traversal below `id`: each directory is yielded before its
    /// own contents.
    pub fn walk(&self, id: DirId) -> Vec<Entry> {
        let mut out = Vec::new();
        self.walk_into(id, &mut out);
        out
    }

    fn walk_into(&self, id: DirId, out: &mut Vec<Entry>) {
        for entry in self.entries(id) {
            out.push(entry);
            if let Entry::Directory(child) = entry {
                self.walk_into(child, out);
            }
        }
    }

    /// Every page below `id` in traversal order.
    pub fn walk_pages(&self, id: DirId) -> Vec<PageId> {
        self.walk(id)
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Page(page) => Some(page),
                Entry::Directory(_) => None,
            })
            .collect()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn failures(&self) -> &[LoadFailure] {
        &self.failures
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    /// Display name of a page's origin: its source file, or for auto-index
    /// pages the directory that generated it.
    pub fn origin(&self, id: PageId) -> &Path {
        let page = self.page(id);
        page.source()
            .unwrap_or_else(|| self.dir(page.dir()).source.as_path())
    }
}

/// Non-hidden, non-excluded children of `dir`, sorted by name.
fn list_entries(dir: &Path, exclude: &[PathBuf]) -> Result<Vec<PathBuf>, TreeError> {
    let read = fs::read_dir(dir).map_err(|source| TreeError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut entries: Vec<PathBuf> = read
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            let hidden = p
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with('.'));
            !hidden && !exclude.iter().any(|x| x == p)
        })
        .collect();
    entries.sort();
    Ok(entries)
}

fn is_index_name(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().starts_with("index."))
}

fn is_hidden(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
}
