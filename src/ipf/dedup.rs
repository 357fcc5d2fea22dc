//! Removal of superseded entries.
//!
//! Patch pipelines append newer versions of a file at higher indices without
//! dropping the old ones, so for every safe filename only the entry with the
//! highest index is current.

use std::collections::HashMap;

use super::entry::ArchiveEntry;

/// Surviving entries plus statistics.
#[derive(Debug, Clone)]
pub struct DeduplicationOutcome {
    by_name: HashMap<String, ArchiveEntry>,
    /// Survivors in ascending index order.
    pub retained: Vec<ArchiveEntry>,
    pub total_files: usize,
    pub unique_files: usize,
    pub removed_duplicates: usize,
}

impl DeduplicationOutcome {
    /// The entry kept for `safe_filename`.
    pub fn get(&self, safe_filename: &str) -> Option<&ArchiveEntry> {
        self.by_name.get(safe_filename)
    }

    pub fn has_duplicates(&self) -> bool {
        self.removed_duplicates > 0
    }
}

/// Keep the highest-index entry for every safe filename.
pub fn dedupe(entries: &[ArchiveEntry]) -> DeduplicationOutcome {
    let mut by_name: HashMap<String, ArchiveEntry> = HashMap::with_capacity(entries.len());

    for entry in entries {
        match by_name.get(&entry.safe_filename) {
            Some(kept) if kept.index >= entry.index => {}
            _ => {
                by_name.insert(entry.safe_filename.clone(), entry.clone());
            }
        }
    }

    let mut retained: Vec<ArchiveEntry> = by_name.values().cloned().collect();
    retained.sort_by_key(|e| e.index);

    let unique_files = retained.len();
    DeduplicationOutcome {
        by_name,
        retained,
        total_files: entries.len(),
        unique_files,
        removed_duplicates: entries.len() - unique_files,
    }
}
