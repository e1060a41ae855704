use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

use super::import_export::format_key;
use crate::index::{Ancestry, GraphIndex, IndexOptions, IndexStatsSnapshot};
use crate::types::Result;

/// Ancestry result with keys rendered as text, sorted for stable output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AncestryReport {
    /// Found keys and their parents.
    pub parent_map: BTreeMap<String, Vec<String>>,
    /// Keys absent from every index.
    pub missing_keys: Vec<String>,
}

impl From<&Ancestry> for AncestryReport {
    fn from(ancestry: &Ancestry) -> Self {
        let parent_map = ancestry
            .parent_map
            .iter()
            .map(|(key, parents)| (format_key(key), parents.iter().map(format_key).collect()))
            .collect();
        let mut missing_keys: Vec<String> = ancestry.missing_keys.iter().map(format_key).collect();
        missing_keys.sort();
        Self {
            parent_map,
            missing_keys,
        }
    }
}

/// Shape and read counters of one index.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    /// Index file.
    pub path: String,
    /// Number of entries.
    pub key_count: u64,
    /// Ref lists per key.
    pub node_ref_lists: usize,
    /// Elements per key.
    pub key_elements: usize,
    /// Read counters accumulated while producing this summary.
    pub stats: IndexStatsSnapshot,
}

impl IndexSummary {
    /// Loads the header of `index` and snapshots its counters.
    pub fn collect(path: &Path, index: &GraphIndex) -> Result<Self> {
        Ok(Self {
            path: path.display().to_string(),
            key_count: index.key_count()?,
            node_ref_lists: index.node_ref_lists()?,
            key_elements: index.key_elements()?,
            stats: index.stats_snapshot(),
        })
    }
}

/// Outcome of validating one index.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    /// Index file.
    pub path: String,
    /// Whether every structural check passed.
    pub success: bool,
    /// The failure, when there was one.
    pub error: Option<String>,
}

impl ValidationReport {
    /// Validates `index`, capturing the failure instead of returning it.
    pub fn run(path: &Path, index: &GraphIndex) -> Self {
        Self::from_outcome(path, index.validate())
    }

    /// Opens the index file at `path` and validates it. A file that cannot
    /// be opened is reported as a failure like any other.
    pub fn open_and_run(path: &Path, page_size: u32, options: &IndexOptions) -> Self {
        match GraphIndex::open_file(path, page_size, options.clone()) {
            Ok(index) => Self::run(path, &index),
            Err(err) => Self::from_outcome(path, Err(err)),
        }
    }

    fn from_outcome(path: &Path, outcome: Result<()>) -> Self {
        Self {
            path: path.display().to_string(),
            success: outcome.is_ok(),
            error: outcome.err().map(|err| err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{BuilderOptions, IndexBuilder, Key, KeySet, ParentMap};
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn ancestry_report_sorts_and_renders_keys() {
        let mut parent_map = ParentMap::new();
        parent_map.insert(Key::from(["b", "1"]), vec![Key::from(["a", "1"])]);
        let missing_keys = KeySet::from([Key::from(["z", "9"]), Key::from(["a", "1"])]);
        let report = AncestryReport::from(&Ancestry {
            parent_map,
            missing_keys,
        });
        assert_eq!(report.parent_map["b:1"], vec!["a:1".to_string()]);
        assert_eq!(report.missing_keys, vec!["a:1".to_string(), "z:9".to_string()]);
    }

    #[test]
    fn validation_reports_unopenable_files_and_keeps_going() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.idx");
        let truncated = dir.path().join("truncated.idx");
        let absent = dir.path().join("absent.idx");
        for path in [&good, &truncated] {
            let mut builder =
                IndexBuilder::with_options(1, 1, BuilderOptions::default().page_size(1024));
            builder.add_node(Key::from("a"), "", vec![vec![]]).unwrap();
            builder.finish_to_file(path).unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&truncated).unwrap();
        file.write_all(&[0u8; 10]).unwrap();
        drop(file);

        let options = IndexOptions::default();
        let reports: Vec<ValidationReport> = [&truncated, &absent, &good]
            .into_iter()
            .map(|path| ValidationReport::open_and_run(path, 1024, &options))
            .collect();
        assert!(!reports[0].success);
        assert!(reports[0].error.is_some());
        assert!(!reports[1].success);
        assert!(reports[2].success);
        assert!(reports[2].error.is_none());
    }

    #[test]
    fn summary_reads_only_the_header_page() {
        let mut builder =
            IndexBuilder::with_options(1, 1, BuilderOptions::default().page_size(512));
        for i in 0..200u32 {
            let key = Key::from_slices([format!("rev-{i:04}").as_bytes()]);
            builder.add_node(key, "", vec![vec![]]).unwrap();
        }
        let pages = builder.finish().unwrap();
        assert!(pages.len() > 2);
        let index = GraphIndex::from_pages(pages);

        let summary = IndexSummary::collect(Path::new("mem.idx"), &index).unwrap();
        assert_eq!(summary.key_count, 200);
        assert_eq!(summary.stats.page_fetches, 1);
        assert_eq!(summary.stats.leaf_reads, 0);
    }
}
