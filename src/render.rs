//! Rendering a single page.
//!
//! Each page moves through a fixed sequence of stages:
//!
//! ```text
//! Classified → ConfigResolved → RelationsResolved → ContentConverted → TemplateResolved → Rendered
//! ```
//!
//! Assets jump straight from `Classified` to `Rendered` as a byte copy.
//! A failure at any stage abandons the page; nothing is emitted for it.
//!
//! ## Rendering Context
//!
//! Templates and converters see one mapping built in layers, later layers
//! winning:
//!
//! 1. the page's directory configuration,
//! 2. its relations (`children`, `brothers`, `parent`),
//! 3. `page`: the page's front matter plus `path` and `url`,
//! 4. `pagenate: {num, max}` for auto-index pages,
//! 5. `content`: the converted body, or for auto-index pages the list of
//!    member contexts.

use crate::config::{Config, Mapping};
use crate::converter::ConvertError;
use crate::page::{Page, PageNode};
use crate::relations::relations_info_limited;
use crate::template::TemplateError;
use crate::tree::{Entry, PageId, SiteTree};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Per-page pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Classified,
    ConfigResolved,
    RelationsResolved,
    ContentConverted,
    TemplateResolved,
    Rendered,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Classified => "classify",
            Stage::ConfigResolved => "resolve config",
            Stage::RelationsResolved => "resolve relations",
            Stage::ContentConverted => "convert content",
            Stage::TemplateResolved => "resolve template",
            Stage::Rendered => "render",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum StageFailure {
    #[error(transparent)]
    Convert(#[from] ConvertError),
    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// A page that failed to render, and the stage it failed to reach.
#[derive(Error, Debug)]
#[error("failed to {stage}: {source}")]
pub struct RenderError {
    pub stage: Stage,
    #[source]
    pub source: StageFailure,
}

fn reached(page: &Page, stage: Stage) {
    tracing::trace!(page = %page.path().display(), stage = ?stage, "stage reached");
}

impl RenderError {
    fn at(stage: Stage, source: impl Into<StageFailure>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

impl From<TemplateError> for RenderError {
    /// Lookup failures belong to template resolution, everything else to
    /// rendering proper.
    fn from(err: TemplateError) -> Self {
        let stage = match err {
            TemplateError::NotFound(_) | TemplateError::InvalidName(_) | TemplateError::Io { .. } => {
                Stage::TemplateResolved
            }
            TemplateError::Syntax(_) | TemplateError::Render(_) => Stage::Rendered,
        };
        RenderError::at(stage, err)
    }
}

/// What to write for a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    /// Copy this source file unchanged.
    Copy(PathBuf),
    /// Write these bytes.
    Bytes(Vec<u8>),
}

/// Render one page. Nothing touches the output tree here.
pub fn render_page(tree: &SiteTree, id: PageId) -> Result<Rendered, RenderError> {
    let page = tree.page(id);
    reached(page, Stage::Classified);
    if let Page::Asset(asset) = page {
        reached(page, Stage::Rendered);
        return Ok(Rendered::Copy(asset.source.clone()));
    }

    let context = rendering_context_with_content(tree, id)?;
    let layout = layout(page);
    tracing::debug!(page = %page.path().display(), layout = %layout, "rendering");
    let html = tree
        .dir(page.dir())
        .templates
        .render(&layout, context.as_map())?;
    reached(page, Stage::Rendered);
    Ok(Rendered::Bytes(html.into_bytes()))
}

/// Layout template name for a renderable page.
pub fn layout(page: &Page) -> String {
    match page {
        Page::Article(article) => article.layout(),
        Page::Index(index) => index.article.layout(),
        Page::AutoIndex(auto) => auto.layout.clone(),
        Page::Asset(_) => String::new(),
    }
}

/// Directory config, relations and `page` info, without `content`.
pub fn rendering_context(tree: &SiteTree, id: PageId) -> Config {
    let page = tree.page(id);
    let dir = tree.dir(page.dir());
    let depth = dir
        .config
        .get("relations_depth")
        .and_then(Value::as_u64)
        .and_then(|d| usize::try_from(d).ok());

    reached(page, Stage::ConfigResolved);

    let relations = relations_info_limited(tree, id, &HashSet::new(), depth);
    reached(page, Stage::RelationsResolved);
    let mut page_entry = Mapping::new();
    page_entry.insert("page".into(), page.page_info(tree).to_value());

    let context = dir.config.overlay(relations).overlay(page_entry);
    match page {
        Page::AutoIndex(auto) => {
            let mut pagenate = Mapping::new();
            pagenate.insert(
                "pagenate".into(),
                json!({"num": auto.page_num, "max": auto.page_max}),
            );
            context.overlay(pagenate)
        }
        _ => context,
    }
}

/// The full context: [`rendering_context`] plus `content`.
pub fn rendering_context_with_content(tree: &SiteTree, id: PageId) -> Result<Config, RenderError> {
    let context = rendering_context(tree, id);
    let content = match tree.page(id) {
        Page::Article(article) => convert(tree, article.suffix(), &article.content, &context)?,
        Page::Index(index) => {
            let article = &index.article;
            convert(tree, article.suffix(), &article.content, &context)?
        }
        Page::AutoIndex(auto) => {
            let mut members = Vec::with_capacity(auto.members.len());
            for &entry in &auto.members {
                if let Some(member) = member_context(tree, entry)? {
                    members.push(member);
                }
            }
            Value::Array(members)
        }
        Page::Asset(_) => Value::Null,
    };
    reached(tree.page(id), Stage::ContentConverted);
    let mut extra = Mapping::new();
    extra.insert("content".into(), content);
    Ok(context.overlay(extra))
}

fn convert(
    tree: &SiteTree,
    suffix: Option<String>,
    content: &str,
    context: &Config,
) -> Result<Value, RenderError> {
    let converter = tree.converters().lookup(suffix.as_deref());
    converter
        .convert(content, context.as_map())
        .map(Value::String)
        .map_err(|e| RenderError::at(Stage::ContentConverted, e))
}

/// What an auto-index page lists for one member: a page's full context, a
/// directory's index page context, or an asset's page info. Directories
/// without an index contribute nothing.
fn member_context(tree: &SiteTree, entry: Entry) -> Result<Option<Value>, RenderError> {
    let page = match entry {
        Entry::Page(page) => page,
        Entry::Directory(dir) => match tree.index_page(dir) {
            Some(index) => index,
            None => return Ok(None),
        },
    };
    let value = match tree.page(page) {
        Page::Asset(asset) => asset.page_info(tree).to_value(),
        _ => rendering_context_with_content(tree, page)?.to_value(),
    };
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use pretty_assertions::assert_eq;

    const LAYOUT: &str = "<h1>{{page.title}}</h1>{{content}}";

    fn html(rendered: Rendered) -> String {
        match rendered {
            Rendered::Bytes(bytes) => String::from_utf8(bytes).unwrap(),
            Rendered::Copy(path) => panic!("expected bytes, got copy of {}", path.display()),
        }
    }

    // =========================================================================
    // Articles and assets
    // =========================================================================

    #[test]
    fn article_renders_through_default_layout() {
        let tmp = site(&[
            (".template/default.html", LAYOUT),
            ("a.md", "---\ntitle: A\n---\nSome *text*.\n"),
        ]);
        let tree = load(tmp.path());
        let out = html(render_page(&tree, find_page(&tree, "a.html")).unwrap());
        assert_eq!(out, "<h1>A</h1><p>Some <em>text</em>.</p>\n");
    }

    #[test]
    fn asset_is_copied() {
        let tmp = site(&[("b.txt", "bytes")]);
        let tree = load(tmp.path());
        let rendered = render_page(&tree, find_page(&tree, "b.txt")).unwrap();
        let Rendered::Copy(source) = rendered else {
            panic!("asset should be copied");
        };
        assert!(source.ends_with("b.txt"));
    }

    #[test]
    fn front_matter_selects_layout() {
        let tmp = site(&[
            (".template/default.html", "default"),
            (".template/wide.html", "wide {{content}}"),
            ("a.html", "---\npage:\n  layout: wide.html\n---\n<b>{{page.url}}</b>"),
        ]);
        let tree = load(tmp.path());
        let out = html(render_page(&tree, find_page(&tree, "a.html")).unwrap());
        assert_eq!(out, "wide <b>/a.html</b>");
    }

    #[test]
    fn unknown_suffix_passes_content_through() {
        let tmp = site(&[
            (".template/default.html", "{{content}}"),
            ("notes.txt", "---\n---\n*not markdown*\n"),
        ]);
        let tree = load(tmp.path());
        let out = html(render_page(&tree, find_page(&tree, "notes.html")).unwrap());
        assert_eq!(out, "*not markdown*\n");
    }

    #[test]
    fn directory_config_reaches_templates() {
        let tmp = site(&[
            (".bg.yml", "site_name: Demo\n"),
            (".template/default.html", "{{site_name}}|{{page.path}}"),
            ("blog/post.md", "---\n---\n"),
        ]);
        let tree = load(tmp.path());
        let out = html(render_page(&tree, find_page(&tree, "blog/post.html")).unwrap());
        assert_eq!(out, "Demo|/blog/post.html");
    }

    #[test]
    fn relations_reach_templates() {
        let tmp = site(&[
            (".template/default.html", "{{#each brothers}}[{{url}}]{{/each}}"),
            ("a.md", "---\n---\n"),
            ("b.md", "---\n---\n"),
            ("c.md", "---\n---\n"),
        ]);
        let tree = load(tmp.path());
        let out = html(render_page(&tree, find_page(&tree, "b.html")).unwrap());
        assert_eq!(out, "[/a.html][/c.html]");
    }

    // =========================================================================
    // Failures
    // =========================================================================

    #[test]
    fn missing_layout_fails_at_template_resolution() {
        let tmp = site(&[("a.md", "---\n---\nbody\n")]);
        let tree = load(tmp.path());
        let err = render_page(&tree, find_page(&tree, "a.html")).unwrap_err();
        assert_eq!(err.stage, Stage::TemplateResolved);
        assert!(err.to_string().contains("default.html"));
    }

    #[test]
    fn converter_failure_names_its_stage() {
        let tmp = site(&[
            (".template/default.html", "{{content}}"),
            ("a.boom", "---\n---\nx\n"),
        ]);
        let mut registry = crate::converter::ConverterRegistry::new();
        registry.register(".boom", |_: &str, _: &Mapping| {
            Err(ConvertError::Utf8(String::from_utf8(vec![0xff]).unwrap_err()))
        });
        let tree =
            SiteTree::load(tmp.path(), registry, &crate::tree::LoadOptions::default()).unwrap();
        let err = render_page(&tree, find_page(&tree, "a.html")).unwrap_err();
        assert_eq!(err.stage, Stage::ContentConverted);
    }

    #[test]
    fn template_syntax_error_fails_at_render() {
        let tmp = site(&[
            (".template/default.html", "{{#each}}"),
            ("a.md", "---\n---\n"),
        ]);
        let tree = load(tmp.path());
        let err = render_page(&tree, find_page(&tree, "a.html")).unwrap_err();
        assert_eq!(err.stage, Stage::Rendered);
    }

    // =========================================================================
    // Auto-index pages
    // =========================================================================

    #[test]
    fn autoindex_context_lists_members() {
        let tmp = site(&[
            (".bg.yml", "autoindex: {pagenate: 2}\npage: {title: Posts}\n"),
            (
                ".template/index.html",
                "{{page.title}} {{pagenate.num}}/{{pagenate.max}}:{{#each content}} {{page.url}}={{content}}{{/each}}",
            ),
            ("a.md", "---\n---\nA\n"),
            ("b.md", "---\n---\nB\n"),
            ("c.md", "---\n---\nC\n"),
        ]);
        let tree = load(tmp.path());
        let first = tree.index_page(tree.root()).unwrap();
        let out = html(render_page(&tree, first).unwrap());
        assert_eq!(out, "Posts 0/2: /a.html=<p>A</p>\n /b.html=<p>B</p>\n");
    }

    #[test]
    fn autoindex_members_include_assets_and_directories() {
        let tmp = site(&[
            (".bg.yml", "autoindex: true\n"),
            ("logo.png", "png"),
            ("sub/index.md", "---\ntitle: Sub\n---\n"),
        ]);
        let tree = load(tmp.path());
        let first = tree.index_page(tree.root()).unwrap();
        let context = rendering_context_with_content(&tree, first).unwrap();
        let members = context.get("content").unwrap().as_array().unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0], json!({"path": "/logo.png", "url": "/logo.png"}));
        assert_eq!(members[1]["page"]["title"], "Sub");
    }

    #[test]
    fn relations_depth_limits_context() {
        let tmp = site(&[
            (".bg.yml", "relations_depth: 0\n"),
            ("a.md", "---\n---\n"),
            ("b.md", "---\n---\n"),
        ]);
        let tree = load(tmp.path());
        let context = rendering_context(&tree, find_page(&tree, "a.html"));
        assert_eq!(context.get("brothers"), Some(&json!([])));
    }
}
