//! Navigation relations between pages.
//!
//! For a page, [`relations_info`] returns
//!
//! ```text
//! { children: [...], brothers: [...], parent: {...} | null }
//! ```
//!
//! where every listed entry is that page's `page_info` with its own
//! relations merged in, recursively. A URL already on the path from the
//! starting page is never listed again, so the result is a tree no deeper
//! than the site itself even though index pages list their directory and
//! their directory's pages list the index as parent.
//!
//! Nothing is cached: relations are recomputed from the tree on each call.

use crate::config::{Config, Mapping};
use crate::page::PageNode;
use crate::tree::{PageId, SiteTree};
use serde_json::Value;
use std::collections::HashSet;

/// Relations of `page`, fully expanded.
pub fn relations_info(tree: &SiteTree, page: PageId, ignore_urls: &HashSet<String>) -> Mapping {
    relations_info_limited(tree, page, ignore_urls, None)
}

/// Relations of `page` with nested lists expanded at most `depth` levels.
///
/// The page's own `children` and `brothers` are level 1. Past the limit
/// both lists are empty; `parent` is always filled in. `None` means no
/// limit.
pub fn relations_info_limited(
    tree: &SiteTree,
    page: PageId,
    ignore_urls: &HashSet<String>,
    depth: Option<usize>,
) -> Mapping {
    let node = tree.page(page);
    let mut ignore = ignore_urls.clone();
    ignore.insert(node.url(tree));

    let (children, brothers) = match depth {
        Some(0) => (Vec::new(), Vec::new()),
        _ => {
            let next = depth.map(|d| d - 1);
            (
                expand(tree, node.children(tree), &ignore, next),
                expand(tree, node.brothers(tree), &ignore, next),
            )
        }
    };
    let parent = node
        .parent_page(tree)
        .map_or(Value::Null, |p| tree.page(p).page_info(tree).to_value());

    let mut info = Mapping::new();
    info.insert("children".into(), Value::Array(children));
    info.insert("brothers".into(), Value::Array(brothers));
    info.insert("parent".into(), parent);
    info
}

fn expand(
    tree: &SiteTree,
    pages: Vec<PageId>,
    ignore: &HashSet<String>,
    depth: Option<usize>,
) -> Vec<Value> {
    pages
        .into_iter()
        .filter(|&id| !ignore.contains(&tree.page(id).url(tree)))
        .map(|id| {
            let info: Config = tree.page(id).page_info(tree);
            info.overlay(relations_info_limited(tree, id, ignore, depth))
                .to_value()
        })
        .collect()
}
