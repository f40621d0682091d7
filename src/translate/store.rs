use crate::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Mapping between one dumped cell and the file the kernel debugger runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellDumpRecord {
    /// Kernel-visible file returned by `dumpCell`. Unique within a store.
    pub debug_file_path: String,
    /// Identity of the originating cell.
    pub logical_source_id: String,
    /// `source.path` the editor expects for this cell.
    pub display_path: String,
    /// Added to a kernel line to get the editor line.
    pub line_offset: i64,
    /// 0-based line index where the cell starts in its owning document.
    pub sort_key: i64,
    /// Lines of code the kernel received.
    pub line_count: usize,
}

type OrderKey = (i64, String);

/// Dump records of one debug session.
///
/// Records are ordered by `(sort_key, logical_source_id)` so that the
/// nearest cell preceding a document line is a single range query.
#[derive(Debug, Default)]
pub struct CellDumpStore {
    ordered: BTreeMap<OrderKey, CellDumpRecord>,
    by_path: HashMap<String, OrderKey>,
    by_logical: HashMap<String, OrderKey>,
    dumped_paths: Vec<String>,
    seen_paths: HashSet<String>,
}

impl CellDumpStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record`, replacing any earlier record for the same cell.
    ///
    /// Fails if the debug file already belongs to a different cell.
    pub fn record_dump(&mut self, record: CellDumpRecord) -> Result<()> {
        if let Some(owner) = self
            .by_path
            .get(&record.debug_file_path)
            .and_then(|key| self.ordered.get(key))
        {
            if owner.logical_source_id != record.logical_source_id {
                return Err(Error::DuplicatePath {
                    path: record.debug_file_path.clone(),
                    existing: owner.logical_source_id.clone(),
                    incoming: record.logical_source_id.clone(),
                });
            }
        }

        if let Some(old_key) = self.by_logical.remove(&record.logical_source_id) {
            if let Some(old) = self.ordered.remove(&old_key) {
                debug!(
                    "Superseding dump of {}: {} -> {}",
                    old.logical_source_id, old.debug_file_path, record.debug_file_path
                );
                self.by_path.remove(&old.debug_file_path);
            }
        }

        if self.seen_paths.insert(record.debug_file_path.clone()) {
            self.dumped_paths.push(record.debug_file_path.clone());
        }

        let key = (record.sort_key, record.logical_source_id.clone());
        self.by_path.insert(record.debug_file_path.clone(), key.clone());
        self.by_logical.insert(record.logical_source_id.clone(), key.clone());
        self.ordered.insert(key, record);

        Ok(())
    }

    pub fn find_by_debug_path(&self, path: &str) -> Option<&CellDumpRecord> {
        self.by_path.get(path).and_then(|key| self.ordered.get(key))
    }

    pub fn find_by_logical_id(&self, id: &str) -> Option<&CellDumpRecord> {
        self.by_logical.get(id).and_then(|key| self.ordered.get(key))
    }

    /// First record, in descending `sort_key` order, shown to the editor as `path`.
    pub fn find_by_display_path(&self, path: &str) -> Option<&CellDumpRecord> {
        self.all_records().find(|record| record.display_path == path)
    }

    /// Record with the greatest `sort_key` strictly below `line`.
    ///
    /// `sort_key` is a 0-based line index and `line` a 1-based DAP line, so a
    /// cell starting at index `k` owns lines `k + 1` onward.
    pub fn find_nearest_preceding(&self, line: i64) -> Option<&CellDumpRecord> {
        self.ordered
            .range(..(line, String::new()))
            .next_back()
            .map(|(_, record)| record)
    }

    /// Like [`find_nearest_preceding`](Self::find_nearest_preceding), limited
    /// to the cells of one document.
    pub fn find_nearest_preceding_in(&self, display_path: &str, line: i64) -> Option<&CellDumpRecord> {
        self.ordered
            .range(..(line, String::new()))
            .rev()
            .map(|(_, record)| record)
            .find(|record| record.display_path == display_path)
    }

    /// All current records, descending by `sort_key`.
    pub fn all_records(&self) -> impl Iterator<Item = &CellDumpRecord> + '_ {
        self.ordered.values().rev()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Every debug file recorded in this session, superseded ones included,
    /// in the order they were first recorded.
    pub fn dump_files_for_deletion(&self) -> Vec<String> {
        self.dumped_paths.clone()
    }
}
