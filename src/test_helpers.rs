//! Shared test utilities for the bgsite test suite.
//!
//! Provides fixture setup, small tree builders and lookup helpers that work
//! with a loaded [`SiteTree`].
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = site(&[
//!     ("a.md", "---\ntitle: A\n---\nbody\n"),
//!     ("blog/.bg.yml", "autoindex: true\n"),
//! ]);
//! let tree = load(tmp.path());
//! let page = find_page(&tree, "a.html");
//! assert_eq!(tree.page(page).url(&tree), "/a.html");
//! ```

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::converter::ConverterRegistry;
use crate::page::PageNode;
use crate::tree::{LoadOptions, PageId, SiteTree};

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/site/` to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Write `content` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    path
}

/// Build a temp source tree from `(relative path, content)` pairs.
pub fn site(files: &[(&str, &str)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    for (rel, content) in files {
        write_file(tmp.path(), rel, content);
    }
    tmp
}

/// Load a tree with the built-in converters and no exclusions.
pub fn load(root: &Path) -> SiteTree {
    SiteTree::load(root, ConverterRegistry::with_builtins(), &LoadOptions::default()).unwrap()
}

// =========================================================================
// Lookups — panics with a clear message on miss
// =========================================================================

/// Find a page by output path (relative, `/`-separated). Panics if not found.
pub fn find_page(tree: &SiteTree, path: &str) -> PageId {
    tree.walk_pages(tree.root())
        .into_iter()
        .find(|&id| crate::page::posix(tree.page(id).path()) == path)
        .unwrap_or_else(|| {
            let paths = page_paths(tree);
            panic!("page '{path}' not found. Available: {paths:?}")
        })
}

/// Output paths of every page, in traversal order.
pub fn page_paths(tree: &SiteTree) -> Vec<String> {
    tree.walk_pages(tree.root())
        .into_iter()
        .map(|id| crate::page::posix(tree.page(id).path()))
        .collect()
}

/// URLs of the given pages, in order.
pub fn urls(tree: &SiteTree, ids: &[PageId]) -> Vec<String> {
    ids.iter().map(|&id| tree.page(id).url(tree)).collect()
}
