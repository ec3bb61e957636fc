//! # bgsite
//!
//! A static site generator where the source directory tree is the site.
//! Files that open with a `---` front matter block are rendered through a
//! layout template; everything else is copied verbatim. Directories carry
//! a `.bg.yml` configuration and a `.template/` directory, both inherited by
//! everything below them.
//!
//! # Architecture: Load, Then Render
//!
//! ```text
//! 1. Load     site/   →  SiteTree     (classify, configs, indexes; serial)
//! 2. Render   tree    →  _site/       (relations, convert, layout; parallel)
//! ```
//!
//! Loading builds an arena of directories and pages once per build. After
//! that the tree is read-only, so every page renders independently on the
//! rayon pool. Navigation data is always computed from the tree on demand,
//! never cached between pages or builds.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `.bg.yml` parsing and the inheritance merge |
//! | [`converter`] | Suffix-keyed content converters (Markdown, HTML templates, external commands) |
//! | [`template`] | `.template/` lookup through the directory chain, handlebars rendering |
//! | [`page`] | Page variants, classification, front matter, URL rules |
//! | [`tree`] | The per-build arena: directory listing, `pages()`, `walk()`, index resolution |
//! | [`autoindex`] | `autoindex` normalization and pagination |
//! | [`relations`] | Children / brothers / parent navigation data |
//! | [`render`] | Rendering context and the per-page render stages |
//! | [`build`] | Whole-site orchestration and the build report |
//! | [`output`] | CLI output formatting |
//! | [`watch`] | Rebuild on change |
//!
//! # Design Decisions
//!
//! ## Arena Instead of Back-Pointers
//!
//! Pages need their parent directory, grandparent index and siblings. The
//! tree stores directories and pages in flat vectors addressed by
//! [`tree::DirId`] and [`tree::PageId`], and each node keeps only its
//! directory's id. Queries go through [`tree::SiteTree`], which keeps
//! ownership linear and makes the loaded tree trivially `Sync`.
//!
//! ## Config Cascading
//!
//! ```text
//! site/.bg.yml               ← root
//! site/blog/.bg.yml          ← overrides root
//! ```
//!
//! Mappings merge key by key; any other value replaces the inherited one.
//! Each directory's config is merged over its parent's once, at load time,
//! so a lookup is a single map access and a key set at the root is visible
//! to every page and template. A page's front matter is kept apart from
//! this chain: templates see it under `page`. See [`config::Config`].
//!
//! ## Handlebars, Unescaped
//!
//! Layouts are handlebars templates rendered with HTML escaping switched
//! off: `{{content}}` is already HTML by the time a layout sees it.
//! Partials (`{{> nav.html}}`) resolve through the same `.template/` chain
//! as layouts, so a subdirectory can override just one piece of its
//! parent's look.
//!
//! ## One Bad Page Never Stops a Build
//!
//! Page failures and broken subdirectory configs are collected into a
//! [`build::BuildReport`]; the rest of the site still builds. Only an
//! unreadable root configuration aborts the whole build.

pub mod autoindex;
pub mod build;
pub mod config;
pub mod converter;
pub mod output;
pub mod page;
pub mod relations;
pub mod render;
pub mod template;
pub mod tree;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
