//! Page variants, classification and URL derivation.
//!
//! Every file in the source tree becomes exactly one page, classified once
//! from its content when the tree is loaded:
//!
//! | Variant | Trigger | Output path |
//! |---------|---------|-------------|
//! | [`AssetPage`] | no front matter | source path, unchanged |
//! | [`ArticlePage`] | front matter | source stem + `.html` |
//! | [`IndexPage`] | front matter, stem `index` | `index.html` |
//! | [`AutoIndexPage`] | synthesized from directory config | configured target name |
//!
//! A file has front matter when its first four bytes are `---\n`.
//!
//! The index variants share their URL and navigation rules through an
//! [`IndexPolicy`]: an index page stands in for its directory, so its parent
//! is the grandparent directory's index and its children are its own
//! directory's pages.

use crate::config::{Config, ConfigError, Mapping};
use crate::tree::{DirId, Entry, PageId, SiteTree};
use serde_json::Value;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Opening and closing line of a front matter block.
pub const FRONT_MATTER_MARKER: &str = "---\n";

/// Closed set of page classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    Asset,
    Article,
    Index,
    AutoIndex,
}

impl PageKind {
    pub fn is_index(self) -> bool {
        matches!(self, PageKind::Index | PageKind::AutoIndex)
    }

    pub fn label(self) -> &'static str {
        match self {
            PageKind::Asset => "asset",
            PageKind::Article => "article",
            PageKind::Index => "index",
            PageKind::AutoIndex => "autoindex",
        }
    }
}

/// Classify a file from its path and first bytes.
///
/// `head` holds up to the first four bytes of the file. Never returns
/// [`PageKind::AutoIndex`]; those pages have no file behind them.
pub fn classify(path: &Path, head: &[u8]) -> PageKind {
    if head != FRONT_MATTER_MARKER.as_bytes() {
        PageKind::Asset
    } else if path.file_stem().is_some_and(|s| s == "index") {
        PageKind::Index
    } else {
        PageKind::Article
    }
}

/// Read up to the first four bytes of a file. Unreadable files yield an
/// empty head and therefore classify as assets.
pub fn sniff(path: &Path) -> Vec<u8> {
    let mut head = Vec::with_capacity(FRONT_MATTER_MARKER.len());
    let read = File::open(path).and_then(|f| {
        f.take(FRONT_MATTER_MARKER.len() as u64)
            .read_to_end(&mut head)
    });
    match read {
        Ok(_) => head,
        Err(_) => Vec::new(),
    }
}

pub fn is_renderable(path: &Path) -> bool {
    sniff(path) == FRONT_MATTER_MARKER.as_bytes()
}

/// Split a renderable file into front matter text and body text.
///
/// The first line (the opening marker) is dropped. The first later line
/// that is exactly the marker ends the front matter; any further marker
/// lines belong to the body verbatim.
pub fn split_front_matter(text: &str) -> (String, String) {
    let mut header = String::new();
    let mut body = String::new();
    let mut in_body = false;
    for line in text.split_inclusive('\n').skip(1) {
        if !in_body && line == FRONT_MATTER_MARKER {
            in_body = true;
        } else if in_body {
            body.push_str(line);
        } else {
            header.push_str(line);
        }
    }
    (header, body)
}

/// Parse a renderable file's text into its front matter config and body.
pub fn read_renderable(text: &str) -> Result<(Config, String), ConfigError> {
    let (header, body) = split_front_matter(text);
    Ok((Config::parse(&header, None)?, body))
}

/// Render a relative path with `/` separators.
pub fn posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// URL of a non-index page: its output path, root-relative.
pub fn url_for(path: &Path) -> String {
    format!("/{}", posix(path))
}

/// The `{path, url}` pair every page contributes to templates.
fn location_info(path: &Path, url: String) -> Mapping {
    let mut info = Mapping::new();
    info.insert("path".into(), Value::String(url_for(path)));
    info.insert("url".into(), Value::String(url));
    info
}

// =============================================================================
// Capability set
// =============================================================================

/// Behaviour shared by every page variant.
///
/// The defaults describe an ordinary page living in a directory: no
/// children, its siblings as brothers, and the directory's index as parent.
pub trait PageNode {
    /// Output path relative to the destination root.
    fn path(&self) -> &Path;

    /// The directory the page belongs to.
    fn dir(&self) -> DirId;

    /// Front matter (or auto-index page config), if the variant has one.
    fn own_config(&self) -> Option<&Config> {
        None
    }

    fn url(&self, _tree: &SiteTree) -> String {
        url_for(self.path())
    }

    /// The page's config with its `path` and `url` laid over it.
    fn page_info(&self, tree: &SiteTree) -> Config {
        let info = location_info(self.path(), self.url(tree));
        match self.own_config() {
            Some(config) => config.overlay(info),
            None => Config::from(info),
        }
    }

    fn parent_page(&self, tree: &SiteTree) -> Option<PageId> {
        tree.index_page(self.dir())
    }

    fn children(&self, _tree: &SiteTree) -> Vec<PageId> {
        Vec::new()
    }

    fn brothers(&self, tree: &SiteTree) -> Vec<PageId> {
        let own = self.url(tree);
        tree.pages(self.dir())
            .into_iter()
            .filter(|&id| tree.page(id).url(tree) != own)
            .collect()
    }
}

/// Navigation and URL rules for pages that stand in for their directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexPolicy {
    dir: DirId,
}

impl IndexPolicy {
    pub fn new(dir: DirId) -> Self {
        Self { dir }
    }

    /// URL under the `directory_slash` setting, read from the page's own
    /// config first and the directory's config second.
    pub fn url(&self, tree: &SiteTree, own: Option<&Config>, path: &Path) -> String {
        let slash = own
            .and_then(|c| c.get("directory_slash"))
            .or_else(|| tree.dir(self.dir).config.get("directory_slash"));

        if slash.and_then(Value::as_str) == Some("index.html") {
            return url_for(path);
        }

        let mut url = url_for(path.parent().unwrap_or(Path::new("")));
        if slash != Some(&Value::Bool(false)) && url != "/" {
            url.push('/');
        }
        url
    }

    pub fn parent_page(&self, tree: &SiteTree) -> Option<PageId> {
        tree.dir(self.dir)
            .parent
            .and_then(|grandparent| tree.index_page(grandparent))
    }

    pub fn children(&self, tree: &SiteTree) -> Vec<PageId> {
        tree.pages(self.dir)
    }

    pub fn brothers(&self, tree: &SiteTree, own_url: &str) -> Vec<PageId> {
        let Some(grandparent) = tree.dir(self.dir).parent else {
            return Vec::new();
        };
        tree.pages(grandparent)
            .into_iter()
            .filter(|&id| tree.page(id).url(tree) != own_url)
            .collect()
    }
}

// =============================================================================
// Variants
// =============================================================================

/// A file copied to the output unchanged.
#[derive(Debug, Clone)]
pub struct AssetPage {
    pub source: PathBuf,
    pub path: PathBuf,
    pub dir: DirId,
}

impl PageNode for AssetPage {
    fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> DirId {
        self.dir
    }
}

/// A file with front matter, converted and laid out into HTML.
#[derive(Debug, Clone)]
pub struct ArticlePage {
    pub source: PathBuf,
    pub path: PathBuf,
    pub dir: DirId,
    pub config: Config,
    /// Raw body, not yet converted.
    pub content: String,
}

impl ArticlePage {
    /// Build from a source file's relative path and text.
    pub fn new(
        source: PathBuf,
        rel: &Path,
        dir: DirId,
        text: &str,
    ) -> Result<Self, ConfigError> {
        let (config, content) = read_renderable(text)?;
        let mut name = rel.file_stem().unwrap_or_default().to_os_string();
        name.push(".html");
        let path = rel.parent().unwrap_or(Path::new("")).join(name);
        Ok(Self {
            source,
            path,
            dir,
            config,
            content,
        })
    }

    /// Converter key: the source suffix including its dot.
    pub fn suffix(&self) -> Option<String> {
        self.source
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
    }

    /// `page.layout` from the front matter, defaulting to `default.html`.
    pub fn layout(&self) -> String {
        self.config
            .get("page")
            .and_then(|page| page.get("layout"))
            .and_then(Value::as_str)
            .filter(|layout| !layout.is_empty())
            .unwrap_or("default.html")
            .to_string()
    }
}

impl PageNode for ArticlePage {
    fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> DirId {
        self.dir
    }

    fn own_config(&self) -> Option<&Config> {
        Some(&self.config)
    }
}

/// A user-authored `index.*` page.
#[derive(Debug, Clone)]
pub struct IndexPage {
    pub article: ArticlePage,
    policy: IndexPolicy,
}

impl IndexPage {
    pub fn new(article: ArticlePage) -> Self {
        let policy = IndexPolicy::new(article.dir);
        Self { article, policy }
    }
}

impl PageNode for IndexPage {
    fn path(&self) -> &Path {
        &self.article.path
    }

    fn dir(&self) -> DirId {
        self.article.dir
    }

    fn own_config(&self) -> Option<&Config> {
        Some(&self.article.config)
    }

    fn url(&self, tree: &SiteTree) -> String {
        self.policy.url(tree, self.own_config(), self.path())
    }

    fn parent_page(&self, tree: &SiteTree) -> Option<PageId> {
        self.policy.parent_page(tree)
    }

    fn children(&self, tree: &SiteTree) -> Vec<PageId> {
        self.policy.children(tree)
    }

    fn brothers(&self, tree: &SiteTree) -> Vec<PageId> {
        self.policy.brothers(tree, &self.url(tree))
    }
}

/// A synthesized index over a bucket of a directory's entries.
#[derive(Debug, Clone)]
pub struct AutoIndexPage {
    pub path: PathBuf,
    pub dir: DirId,
    pub config: Config,
    pub members: Vec<Entry>,
    /// Zero-based bucket number.
    pub page_num: usize,
    pub page_max: usize,
    pub layout: String,
    policy: IndexPolicy,
}

impl AutoIndexPage {
    pub fn new(
        path: PathBuf,
        dir: DirId,
        config: Config,
        members: Vec<Entry>,
        page_num: usize,
        page_max: usize,
        layout: String,
    ) -> Self {
        Self {
            path,
            dir,
            config,
            members,
            page_num,
            page_max,
            layout,
            policy: IndexPolicy::new(dir),
        }
    }
}

impl PageNode for AutoIndexPage {
    fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> DirId {
        self.dir
    }

    fn own_config(&self) -> Option<&Config> {
        Some(&self.config)
    }

    fn url(&self, tree: &SiteTree) -> String {
        self.policy.url(tree, self.own_config(), self.path())
    }

    fn parent_page(&self, tree: &SiteTree) -> Option<PageId> {
        self.policy.parent_page(tree)
    }

    fn children(&self, tree: &SiteTree) -> Vec<PageId> {
        self.policy.children(tree)
    }

    fn brothers(&self, tree: &SiteTree) -> Vec<PageId> {
        self.policy.brothers(tree, &self.url(tree))
    }
}

/// Any page in the tree.
#[derive(Debug, Clone)]
pub enum Page {
    Asset(AssetPage),
    Article(ArticlePage),
    Index(IndexPage),
    AutoIndex(AutoIndexPage),
}

impl Page {
    pub fn kind(&self) -> PageKind {
        match self {
            Page::Asset(_) => PageKind::Asset,
            Page::Article(_) => PageKind::Article,
            Page::Index(_) => PageKind::Index,
            Page::AutoIndex(_) => PageKind::AutoIndex,
        }
    }

    /// The file the page was loaded from. Auto-index pages have none.
    pub fn source(&self) -> Option<&Path> {
        match self {
            Page::Asset(p) => Some(&p.source),
            Page::Article(p) => Some(&p.source),
            Page::Index(p) => Some(&p.article.source),
            Page::AutoIndex(_) => None,
        }
    }

    fn node(&self) -> &dyn PageNode {
        match self {
            Page::Asset(p) => p,
            Page::Article(p) => p,
            Page::Index(p) => p,
            Page::AutoIndex(p) => p,
        }
    }
}

impl PageNode for Page {
    fn path(&self) -> &Path {
        self.node().path()
    }

    fn dir(&self) -> DirId {
        self.node().dir()
    }

    fn own_config(&self) -> Option<&Config> {
        self.node().own_config()
    }

    fn url(&self, tree: &SiteTree) -> String {
        self.node().url(tree)
    }

    fn page_info(&self, tree: &SiteTree) -> Config {
        self.node().page_info(tree)
    }

    fn parent_page(&self, tree: &SiteTree) -> Option<PageId> {
        self.node().parent_page(tree)
    }

    fn children(&self, tree: &SiteTree) -> Vec<PageId> {
        self.node().children(tree)
    }

    fn brothers(&self, tree: &SiteTree) -> Vec<PageId> {
        self.node().brothers(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    // =========================================================================
    // Classification
    // =========================================================================

    #[test]
    fn classify_by_marker_and_stem() {
        assert_eq!(classify(Path::new("a.md"), b"---\n"), PageKind::Article);
        assert_eq!(classify(Path::new("index.md"), b"---\n"), PageKind::Index);
        assert_eq!(classify(Path::new("index.md"), b"# Ti"), PageKind::Asset);
        assert_eq!(classify(Path::new("a.txt"), b"---"), PageKind::Asset);
        assert_eq!(classify(Path::new("a.txt"), b""), PageKind::Asset);
    }

    #[test]
    fn crlf_marker_is_not_front_matter() {
        assert_eq!(classify(Path::new("a.md"), b"---\r"), PageKind::Asset);
    }

    #[test]
    fn sniff_missing_file_is_empty() {
        assert!(sniff(Path::new("/definitely/not/here.md")).is_empty());
        assert!(!is_renderable(Path::new("/definitely/not/here.md")));
    }

    #[test]
    fn sniff_reads_at_most_four_bytes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a.md");
        std::fs::write(&path, "---\ntitle: x\n---\n").unwrap();
        assert_eq!(sniff(&path), b"---\n");
        assert!(is_renderable(&path));
    }

    // =========================================================================
    // Front matter
    // =========================================================================

    #[test]
    fn split_front_matter_basic() {
        let (header, body) = split_front_matter("---\ntitle: hi\n---\nbody\n");
        assert_eq!(header, "title: hi\n");
        assert_eq!(body, "body\n");
    }

    #[test]
    fn second_marker_stays_in_body() {
        let (header, body) = split_front_matter("---\na: 1\n---\none\n---\ntwo\n");
        assert_eq!(header, "a: 1\n");
        assert_eq!(body, "one\n---\ntwo\n");
    }

    #[test]
    fn unterminated_front_matter_has_empty_body() {
        let (header, body) = split_front_matter("---\na: 1\nb: 2\n");
        assert_eq!(header, "a: 1\nb: 2\n");
        assert_eq!(body, "");
    }

    #[test]
    fn read_renderable_parses_config() {
        let (config, body) = read_renderable("---\ntitle: hi\n---\nbody\n").unwrap();
        assert_eq!(config.to_value(), json!({"title": "hi"}));
        assert_eq!(body, "body\n");
    }

    #[test]
    fn read_renderable_rejects_bad_yaml() {
        assert!(read_renderable("---\n: : [\n---\nbody\n").is_err());
    }

    // =========================================================================
    // Paths
    // =========================================================================

    #[test]
    fn article_path_swaps_extension() {
        let article = ArticlePage::new(
            PathBuf::from("/src/blog/post.md"),
            Path::new("blog/post.md"),
            DirId::ROOT,
            "---\n---\nx\n",
        )
        .unwrap();
        assert_eq!(article.path, PathBuf::from("blog/post.html"));
        assert_eq!(article.suffix().as_deref(), Some(".md"));
        assert_eq!(url_for(&article.path), "/blog/post.html");
    }

    #[test]
    fn article_layout_defaults() {
        let page = |text: &str| {
            ArticlePage::new(PathBuf::from("a.md"), Path::new("a.md"), DirId::ROOT, text)
                .unwrap()
        };
        assert_eq!(page("---\n---\n").layout(), "default.html");
        assert_eq!(page("---\npage: plain\n---\n").layout(), "default.html");
        assert_eq!(page("---\npage: {layout: ''}\n---\n").layout(), "default.html");
        assert_eq!(page("---\npage: {layout: wide.html}\n---\n").layout(), "wide.html");
    }

    #[test]
    fn posix_joins_with_slashes() {
        let path: PathBuf = ["blog", "2024", "post.html"].iter().collect();
        assert_eq!(posix(&path), "blog/2024/post.html");
        assert_eq!(url_for(Path::new("")), "/");
    }
}
