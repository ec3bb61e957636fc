//! Auto-index specification and pagination.
//!
//! A directory without an `index.*` page can have index pages synthesized
//! from its entries by setting `autoindex` in its `.bg.yml`:
//!
//! ```yaml
//! # one index over everything, rendered with the `index.html` layout
//! autoindex: true
//!
//! # one index with a custom layout
//! autoindex: listing.html
//!
//! # several, with pagination
//! autoindex:
//!   - source: "*.md"
//!     target: "{{#if pagenate.num}}page{{pagenate.num}}.html{{else}}index.html{{/if}}"
//!     layout: listing.html
//!     pagenate: 10
//!   - layout: archive.html
//!     target: archive.html
//! ```
//!
//! Each specification selects entries with a glob, splits them into pages of
//! `pagenate` entries (all on one page when unset), and names each page by
//! expanding `target` with `pagenate.num` (zero-based) and `pagenate.max`
//! (page count).

use handlebars::Handlebars;
use serde::Deserialize;
use serde_json::{Value, json};

pub const DEFAULT_SOURCE: &str = "*";
pub const DEFAULT_TARGET: &str = "index.html";
pub const DEFAULT_LAYOUT: &str = "index.html";

/// One normalized `autoindex` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoIndexSpec {
    /// Glob selecting entries, relative to the directory.
    pub source: String,
    /// Filename template for each generated page.
    pub target: String,
    pub layout: String,
    /// Entries per page, at least 1. `None` puts every entry on one page.
    pub page_size: Option<usize>,
}

impl Default for AutoIndexSpec {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            target: DEFAULT_TARGET.to_string(),
            layout: DEFAULT_LAYOUT.to_string(),
            page_size: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSpec {
    source: Option<String>,
    target: Option<String>,
    layout: Option<String>,
    #[serde(alias = "paginate")]
    pagenate: Option<Value>,
}

impl From<RawSpec> for AutoIndexSpec {
    fn from(raw: RawSpec) -> Self {
        let defaults = AutoIndexSpec::default();
        Self {
            source: raw.source.unwrap_or(defaults.source),
            target: raw.target.unwrap_or(defaults.target),
            layout: raw.layout.unwrap_or(defaults.layout),
            page_size: page_size(raw.pagenate.as_ref()),
        }
    }
}

/// Page size from a `pagenate` value. Anything set that isn't a positive
/// integer counts as 1.
fn page_size(value: Option<&Value>) -> Option<usize> {
    let size = value?
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .filter(|&n| n > 0)
        .unwrap_or(1);
    Some(size)
}

impl AutoIndexSpec {
    /// Normalize an `autoindex` config value.
    ///
    /// A falsy value yields no specifications. `true` yields one default
    /// specification, a string one specification with that layout, a
    /// mapping one specification, and a sequence one per usable item.
    pub fn from_config(value: Option<&Value>) -> Vec<AutoIndexSpec> {
        if !crate::config::is_truthy(value) {
            return Vec::new();
        }
        match value {
            Some(Value::Array(items)) => items.iter().filter_map(Self::from_item).collect(),
            Some(Value::Bool(true)) => vec![AutoIndexSpec::default()],
            Some(other) => Self::from_item(other).into_iter().collect(),
            None => Vec::new(),
        }
    }

    fn from_item(item: &Value) -> Option<AutoIndexSpec> {
        match item {
            Value::String(layout) => Some(AutoIndexSpec {
                layout: layout.clone(),
                ..AutoIndexSpec::default()
            }),
            Value::Object(_) => match RawSpec::deserialize(item) {
                Ok(raw) => Some(raw.into()),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring malformed autoindex entry");
                    None
                }
            },
            other => {
                tracing::warn!(entry = %other, "ignoring autoindex entry that is not a string or mapping");
                None
            }
        }
    }

    /// Split the selected entries into this specification's pages.
    pub fn buckets<T: Clone>(&self, members: &[T]) -> Vec<Bucket<T>> {
        paginate(members, self.page_size.unwrap_or(members.len()))
    }

    /// Expand `target` for one page.
    pub fn target_file_name(
        &self,
        page_num: usize,
        page_max: usize,
    ) -> Result<String, handlebars::RenderError> {
        if !self.target.contains("{{") {
            return Ok(self.target.clone());
        }
        let mut engine = Handlebars::new();
        engine.register_escape_fn(handlebars::no_escape);
        engine.render_template(
            &self.target,
            &json!({"pagenate": {"num": page_num, "max": page_max}}),
        )
    }
}

/// A group of consecutive entries making up one generated page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket<T> {
    pub members: Vec<T>,
    /// Zero-based.
    pub page_num: usize,
    pub page_max: usize,
}

/// Slice `members` into consecutive buckets of `size` (clamped to 1).
///
/// No members means no buckets.
pub fn paginate<T: Clone>(members: &[T], size: usize) -> Vec<Bucket<T>> {
    let size = size.max(1);
    let page_max = members.len().div_ceil(size);
    members
        .chunks(size)
        .enumerate()
        .map(|(page_num, chunk)| Bucket {
            members: chunk.to_vec(),
            page_num,
            page_max,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn specs(yaml: &str) -> Vec<AutoIndexSpec> {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        AutoIndexSpec::from_config(Some(&value))
    }

    // =========================================================================
    // Normalization
    // =========================================================================

    #[test]
    fn falsy_values_disable() {
        assert!(AutoIndexSpec::from_config(None).is_empty());
        for yaml in ["false", "null", "''", "[]", "{}", "0"] {
            assert!(specs(yaml).is_empty(), "{yaml} should disable autoindex");
        }
    }

    #[test]
    fn true_is_one_default_spec() {
        assert_eq!(specs("true"), vec![AutoIndexSpec::default()]);
    }

    #[test]
    fn string_is_layout() {
        assert_eq!(
            specs("listing.html"),
            vec![AutoIndexSpec {
                layout: "listing.html".into(),
                ..AutoIndexSpec::default()
            }]
        );
    }

    #[test]
    fn mapping_fills_defaults() {
        assert_eq!(
            specs("{source: '*.md', pagenate: 3}"),
            vec![AutoIndexSpec {
                source: "*.md".into(),
                page_size: Some(3),
                ..AutoIndexSpec::default()
            }]
        );
    }

    #[test]
    fn paginate_alias_accepted() {
        assert_eq!(specs("{paginate: 5}")[0].page_size, Some(5));
    }

    #[test]
    fn bad_page_sizes_clamp_to_one() {
        for yaml in ["{pagenate: 0}", "{pagenate: -4}", "{pagenate: 2.5}", "{pagenate: lots}"] {
            assert_eq!(specs(yaml)[0].page_size, Some(1), "{yaml}");
        }
    }

    #[test]
    fn list_mixes_strings_and_mappings() {
        let result = specs("- a.html\n- {layout: b.html, target: b.html}\n- 42\n- {source: 7}\n");
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].layout, "a.html");
        assert_eq!(result[1].target, "b.html");
    }

    // =========================================================================
    // Target names
    // =========================================================================

    #[test]
    fn literal_target_is_unchanged() {
        let spec = AutoIndexSpec::default();
        assert_eq!(spec.target_file_name(3, 5).unwrap(), "index.html");
    }

    #[test]
    fn target_template_expands_page_numbers() {
        let spec = AutoIndexSpec {
            target: "{{#if pagenate.num}}page{{pagenate.num}}.html{{else}}index.html{{/if}}"
                .into(),
            ..AutoIndexSpec::default()
        };
        assert_eq!(spec.target_file_name(0, 3).unwrap(), "index.html");
        assert_eq!(spec.target_file_name(2, 3).unwrap(), "page2.html");
    }

    #[test]
    fn target_template_sees_page_max() {
        let spec = AutoIndexSpec {
            target: "p{{pagenate.num}}-of-{{pagenate.max}}.html".into(),
            ..AutoIndexSpec::default()
        };
        assert_eq!(spec.target_file_name(1, 4).unwrap(), "p1-of-4.html");
    }

    // =========================================================================
    // Bucketing
    // =========================================================================

    #[test]
    fn seven_by_three() {
        let items: Vec<u32> = (1..=7).collect();
        let buckets = paginate(&items, 3);
        let sizes: Vec<usize> = buckets.iter().map(|b| b.members.len()).collect();
        let nums: Vec<usize> = buckets.iter().map(|b| b.page_num).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(nums, vec![0, 1, 2]);
        assert!(buckets.iter().all(|b| b.page_max == 3));
        assert_eq!(buckets[2].members, vec![7]);
    }

    #[test]
    fn unpaginated_spec_is_one_page() {
        let buckets = AutoIndexSpec::default().buckets(&["a", "b", "c"]);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].members.len(), 3);
        assert_eq!(buckets[0].page_max, 1);
        assert!(AutoIndexSpec::default().buckets::<&str>(&[]).is_empty());
    }

    #[test]
    fn size_one_is_one_page_per_member() {
        let buckets = paginate(&["a", "b"], 1);
        assert_eq!(buckets.len(), 2);
        assert!(buckets.iter().all(|b| b.page_max == 2));
    }

    #[test]
    fn zero_size_clamps() {
        assert_eq!(paginate(&["a", "b"], 0).len(), 2);
    }

    #[test]
    fn empty_members_yield_no_pages() {
        assert!(paginate::<u8>(&[], 3).is_empty());
    }

    #[test]
    fn exact_multiple() {
        let items: Vec<u32> = (0..6).collect();
        let buckets = paginate(&items, 3);
        assert_eq!(buckets.len(), 2);
        assert!(buckets.iter().all(|b| b.members.len() == 3 && b.page_max == 2));
    }
}
