//! Watch mode: rebuild whenever the source tree changes.
//!
//! The source directory is watched recursively. Events are collected until
//! the tree has been quiet for [`DEBOUNCE`], then the whole batch triggers
//! one rebuild. Rebuilds run on the watching thread, one at a time.
//!
//! Changes under hidden names are ignored, with two exceptions: `.bg.yml`
//! files and anything inside a `.template/` directory, since both change
//! the output. Changes inside the destination directory are always
//! ignored so a build never triggers itself.

use crate::config::CONFIG_FILE_NAME;
use crate::template::TEMPLATE_DIR_NAME;
use notify::{EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;
use thiserror::Error;

/// Quiet period that ends a batch of events.
pub const DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("file watcher error: {0}")]
    Notify(#[from] notify::Error),
    #[error("cannot watch {}: {source}", .path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Watch `source` until the watcher shuts down, calling `on_change` with
/// each debounced batch of relevant paths.
///
/// `on_change` is expected to run a full rebuild and report its own
/// failures; the loop keeps going whatever it does.
pub fn run(
    source: &Path,
    dest: &Path,
    on_change: impl FnMut(&[PathBuf]),
) -> Result<(), WatchError> {
    let canonical = |path: &Path| {
        path.canonicalize().map_err(|source| WatchError::Path {
            path: path.to_path_buf(),
            source,
        })
    };
    let source = canonical(source)?;
    // The destination may not exist yet; an absent path matches nothing.
    let dest = canonical(dest).unwrap_or_else(|_| dest.to_path_buf());

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res| {
        // The receiver only goes away when the loop below has ended.
        let _ = tx.send(res);
    })?;
    watcher.watch(&source, RecursiveMode::Recursive)?;
    tracing::info!(source = %source.display(), "watching for changes");

    rebuild_loop(rx, &source, &dest, DEBOUNCE, on_change);
    Ok(())
}

/// Drain `rx` in debounced batches until it disconnects.
pub fn rebuild_loop(
    rx: Receiver<notify::Result<notify::Event>>,
    source: &Path,
    dest: &Path,
    quiet: Duration,
    mut on_change: impl FnMut(&[PathBuf]),
) {
    while let Ok(first) = rx.recv() {
        let mut changed = relevant_paths(first, source, dest);
        while let Ok(next) = rx.recv_timeout(quiet) {
            changed.extend(relevant_paths(next, source, dest));
        }
        if changed.is_empty() {
            continue;
        }
        on_change(&changed);
    }
}

fn relevant_paths(
    event: notify::Result<notify::Event>,
    source: &Path,
    dest: &Path,
) -> Vec<PathBuf> {
    let event = match event {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "file watcher error");
            return Vec::new();
        }
    };
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return Vec::new();
    }
    event
        .paths
        .into_iter()
        .filter(|path| is_relevant(path, source, dest))
        .collect()
}

/// Whether a change at `path` can affect the built site.
pub fn is_relevant(path: &Path, source: &Path, dest: &Path) -> bool {
    if path.starts_with(dest) {
        return false;
    }
    let Ok(rel) = path.strip_prefix(source) else {
        return false;
    };
    let names: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if names.iter().any(|n| n == TEMPLATE_DIR_NAME) {
        return true;
    }
    match names.split_last() {
        Some((last, parents)) => {
            let visible = !last.starts_with('.') || last == CONFIG_FILE_NAME;
            visible && !parents.iter().any(|n| n.starts_with('.'))
        }
        None => true,
    }
}
