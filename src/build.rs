//! Whole-site builds.
//!
//! [`build`] loads the source tree, renders every page and writes the
//! results under the destination, mirroring each page's output path:
//!
//! ```text
//! site/                        _site/
//! ├── index.md           →     ├── index.html
//! ├── logo.png           →     ├── logo.png
//! └── blog/                    └── blog/
//!     ├── .bg.yml                  ├── index.html    (auto-index)
//!     └── first.md       →         └── first.html
//! ```
//!
//! Rendering runs on the rayon pool once the tree is fully loaded; the
//! tree is read-only by then, so pages render independently. Every page
//! either succeeds or lands in the report's failures; a failing page never
//! leaves a partial file behind.

use crate::converter::ConverterRegistry;
use crate::page::{PageKind, PageNode, posix};
use crate::render::{Rendered, render_page};
use crate::tree::{LoadOptions, PageId, SiteTree, TreeError};
use rayon::prelude::*;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("failed to prepare output directory {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("output directory {} is the source directory", .0.display())]
    OutputIsSource(PathBuf),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// A page written to the output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub url: String,
    pub kind: PageKind,
}

/// Something that could not be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub source: PathBuf,
    /// Where the page would have been written; unknown for subtree failures.
    pub destination: Option<PathBuf>,
    pub url: Option<String>,
    pub message: String,
}

/// Outcome of a build, in traversal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub pages: Vec<PageRecord>,
    pub failures: Vec<Failure>,
}

impl BuildReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Build `source` into `dest`.
///
/// Only an unusable destination or an unloadable root fails the build as
/// a whole; everything else is reported per page.
pub fn build(
    source: &Path,
    dest: &Path,
    registry: ConverterRegistry,
) -> Result<BuildReport, BuildError> {
    let output_error = |source| BuildError::Output {
        path: dest.to_path_buf(),
        source,
    };
    fs::create_dir_all(dest).map_err(output_error)?;
    let dest = dest.canonicalize().map_err(output_error)?;
    let root = source.canonicalize().map_err(|e| TreeError::Io {
        path: source.to_path_buf(),
        source: e,
    })?;
    if dest == root {
        return Err(BuildError::OutputIsSource(dest));
    }

    let options = LoadOptions {
        exclude: if dest.starts_with(&root) {
            vec![dest.clone()]
        } else {
            Vec::new()
        },
    };
    let tree = SiteTree::load(&root, registry, &options)?;

    let mut report = BuildReport::default();
    report
        .failures
        .extend(tree.failures().iter().map(|failure| Failure {
            source: failure.path.clone(),
            destination: None,
            url: None,
            message: failure.error.to_string(),
        }));

    let ids = claim_outputs(&tree, &dest, &mut report);
    let results: Vec<Result<PageRecord, Failure>> = ids
        .par_iter()
        .map(|&id| emit(&tree, id, &dest))
        .collect();
    for result in results {
        match result {
            Ok(record) => report.pages.push(record),
            Err(failure) => {
                tracing::error!(source = %failure.source.display(), error = %failure.message, "page failed");
                report.failures.push(failure);
            }
        }
    }

    tracing::info!(
        pages = report.pages.len(),
        failures = report.failures.len(),
        "build finished"
    );
    Ok(report)
}

/// Pages in traversal order, minus those whose output path an earlier page
/// already claimed. Each clash is recorded as a failure naming the winner.
fn claim_outputs(tree: &SiteTree, dest: &Path, report: &mut BuildReport) -> Vec<PageId> {
    let mut claimed: HashMap<&Path, PageId> = HashMap::new();
    let mut ids = Vec::new();
    for id in tree.walk_pages(tree.root()) {
        let page = tree.page(id);
        match claimed.entry(page.path()) {
            Entry::Vacant(slot) => {
                slot.insert(id);
                ids.push(id);
            }
            Entry::Occupied(winner) => {
                let destination = dest.join(page.path());
                let message = format!(
                    "output path {} is already produced by {}",
                    posix(page.path()),
                    tree.origin(*winner.get()).display()
                );
                tracing::error!(source = %tree.origin(id).display(), error = %message, "output clash");
                report.failures.push(Failure {
                    source: tree.origin(id).to_path_buf(),
                    destination: Some(destination),
                    url: Some(page.url(tree)),
                    message,
                });
            }
        }
    }
    ids
}

/// Render one page and write it under `dest`.
fn emit(tree: &SiteTree, id: PageId, dest: &Path) -> Result<PageRecord, Failure> {
    let page = tree.page(id);
    let destination = dest.join(page.path());
    let url = page.url(tree);
    let fail = |message: String| Failure {
        source: tree.origin(id).to_path_buf(),
        destination: Some(destination.clone()),
        url: Some(url.clone()),
        message,
    };

    let rendered = render_page(tree, id).map_err(|e| fail(e.to_string()))?;
    write_output(&destination, &rendered)
        .map_err(|e| fail(format!("failed to write {}: {e}", destination.display())))?;

    Ok(PageRecord {
        source: tree.origin(id).to_path_buf(),
        destination: destination.clone(),
        url: url.clone(),
        kind: page.kind(),
    })
}

fn write_output(destination: &Path, rendered: &Rendered) -> io::Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    match rendered {
        Rendered::Copy(source) => fs::copy(source, destination).map(|_| ()),
        Rendered::Bytes(bytes) => fs::write(destination, bytes),
    }
}

/// Resolve the effective render thread count.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(jobs: Option<usize>) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    jobs.map(|n| n.clamp(1, cores)).unwrap_or(cores)
}
