//! CLI output formatting.
//!
//! # Output Format
//!
//! One line per emitted page, source on the left and destination on the
//! right, paths relative to their roots:
//!
//! ```text
//! index.md -> index.html (/)
//! about.md -> about.html (/about.html)
//! logo.png -> logo.png (/logo.png)
//! blog/ -> blog/index.html (/blog/)
//! FAILED drafts/bad.md -> drafts/bad.html (/drafts/bad.html)
//!     failed to resolve template: template not found: missing.html
//!
//! Built 4 pages, 1 failure
//! ```
//!
//! Auto-index pages have no source file and show their directory instead.
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>` or `String`)
//! for testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::build::{BuildReport, Failure, PageRecord};
use crate::page::{PageKind, posix};
use std::path::{Path, PathBuf};

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `path` relative to `root` with `/` separators, or the full path when it
/// lies outside `root`.
fn relative(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => posix(rel),
        Err(_) => path.display().to_string(),
    }
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

// ============================================================================
// Build output
// ============================================================================

/// `source -> destination (url)` for one emitted page.
pub fn format_page_line(record: &PageRecord, source_root: &Path, dest_root: &Path) -> String {
    let mut source = relative(&record.source, source_root);
    if record.kind == PageKind::AutoIndex && source != "." {
        source.push('/');
    }
    format!(
        "{} -> {} ({})",
        source,
        relative(&record.destination, dest_root),
        record.url
    )
}

/// Header line plus the indented error message.
pub fn format_failure(failure: &Failure, source_root: &Path, dest_root: &Path) -> Vec<String> {
    let source = relative(&failure.source, source_root);
    let header = match (&failure.destination, &failure.url) {
        (Some(dest), Some(url)) => {
            format!("FAILED {} -> {} ({})", source, relative(dest, dest_root), url)
        }
        (Some(dest), None) => format!("FAILED {} -> {}", source, relative(dest, dest_root)),
        (None, _) => format!("FAILED {}", source),
    };
    vec![header, format!("{}{}", indent(1), failure.message)]
}

pub fn format_summary(report: &BuildReport) -> String {
    let mut summary = format!("Built {}", plural(report.pages.len(), "page"));
    if report.has_failures() {
        summary.push_str(&format!(", {}", plural(report.failures.len(), "failure")));
    }
    summary
}

pub fn format_report(report: &BuildReport, source_root: &Path, dest_root: &Path) -> Vec<String> {
    let mut lines: Vec<String> = report
        .pages
        .iter()
        .map(|record| format_page_line(record, source_root, dest_root))
        .collect();
    for failure in &report.failures {
        lines.extend(format_failure(failure, source_root, dest_root));
    }
    lines.push(String::new());
    lines.push(format_summary(report));
    lines
}

/// Print build output to stdout.
pub fn print_report(report: &BuildReport, source_root: &Path, dest_root: &Path) {
    for line in format_report(report, source_root, dest_root) {
        println!("{}", line);
    }
}

// ============================================================================
// Watch output
// ============================================================================

/// Announce a rebuild and the changed paths that triggered it.
pub fn format_rebuild(changed: &[PathBuf], source_root: &Path) -> String {
    let mut names: Vec<String> = changed.iter().map(|p| relative(p, source_root)).collect();
    names.sort();
    names.dedup();
    format!("==> Rebuilding (changed: {})", names.join(", "))
}

pub fn print_rebuild(changed: &[PathBuf], source_root: &Path) {
    println!("{}", format_rebuild(changed, source_root));
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(source: &str, destination: &str, url: &str, kind: PageKind) -> PageRecord {
        PageRecord {
            source: PathBuf::from(source),
            destination: PathBuf::from(destination),
            url: url.to_string(),
            kind,
        }
    }

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn relative_strips_root() {
        assert_eq!(relative(Path::new("/src/blog/a.md"), Path::new("/src")), "blog/a.md");
    }

    #[test]
    fn relative_root_itself_is_dot() {
        assert_eq!(relative(Path::new("/src"), Path::new("/src")), ".");
    }

    #[test]
    fn relative_outside_root_is_full_path() {
        assert_eq!(relative(Path::new("/elsewhere/a"), Path::new("/src")), "/elsewhere/a");
    }

    #[test]
    fn plural_forms() {
        assert_eq!(plural(1, "page"), "1 page");
        assert_eq!(plural(0, "page"), "0 pages");
        assert_eq!(plural(3, "failure"), "3 failures");
    }

    // =========================================================================
    // Build output
    // =========================================================================

    #[test]
    fn page_line_shows_source_destination_and_url() {
        let line = format_page_line(
            &record("/src/blog/a.md", "/out/blog/a.html", "/blog/a.html", PageKind::Article),
            Path::new("/src"),
            Path::new("/out"),
        );
        assert_eq!(line, "blog/a.md -> blog/a.html (/blog/a.html)");
    }

    #[test]
    fn autoindex_line_shows_directory() {
        let line = format_page_line(
            &record("/src/blog", "/out/blog/index.html", "/blog/", PageKind::AutoIndex),
            Path::new("/src"),
            Path::new("/out"),
        );
        assert_eq!(line, "blog/ -> blog/index.html (/blog/)");
    }

    #[test]
    fn root_autoindex_line() {
        let line = format_page_line(
            &record("/src", "/out/index.html", "/", PageKind::AutoIndex),
            Path::new("/src"),
            Path::new("/out"),
        );
        assert_eq!(line, ". -> index.html (/)");
    }

    #[test]
    fn failure_lines() {
        let failure = Failure {
            source: PathBuf::from("/src/bad.md"),
            destination: Some(PathBuf::from("/out/bad.html")),
            url: Some("/bad.html".into()),
            message: "failed to render: boom".into(),
        };
        assert_eq!(
            format_failure(&failure, Path::new("/src"), Path::new("/out")),
            vec!["FAILED bad.md -> bad.html (/bad.html)", "    failed to render: boom"]
        );
    }

    #[test]
    fn subtree_failure_has_no_destination() {
        let failure = Failure {
            source: PathBuf::from("/src/broken"),
            destination: None,
            url: None,
            message: "Config error: bad yaml".into(),
        };
        assert_eq!(
            format_failure(&failure, Path::new("/src"), Path::new("/out"))[0],
            "FAILED broken"
        );
    }

    #[test]
    fn summary_mentions_failures_only_when_present() {
        let mut report = BuildReport::default();
        report.pages.push(record("/s/a", "/o/a", "/a", PageKind::Asset));
        assert_eq!(format_summary(&report), "Built 1 page");
        report.failures.push(Failure {
            source: PathBuf::from("/s/b"),
            destination: None,
            url: None,
            message: "x".into(),
        });
        assert_eq!(format_summary(&report), "Built 1 page, 1 failure");
    }

    #[test]
    fn report_ends_with_blank_line_and_summary() {
        let report = BuildReport {
            pages: vec![record("/s/a.txt", "/o/a.txt", "/a.txt", PageKind::Asset)],
            failures: Vec::new(),
        };
        assert_eq!(
            format_report(&report, Path::new("/s"), Path::new("/o")),
            vec!["a.txt -> a.txt (/a.txt)", "", "Built 1 page"]
        );
    }

    // =========================================================================
    // Watch output
    // =========================================================================

    #[test]
    fn rebuild_line_lists_changes_once() {
        let changed = vec![
            PathBuf::from("/s/b.md"),
            PathBuf::from("/s/a.md"),
            PathBuf::from("/s/b.md"),
        ];
        assert_eq!(
            format_rebuild(&changed, Path::new("/s")),
            "==> Rebuilding (changed: a.md, b.md)"
        );
    }
}
