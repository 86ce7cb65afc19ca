//! Bounded log of past runs with a navigable cursor.
//!
//! Every mutation rewrites the whole file; the format is a single JSON
//! object wrapping the entry list under a `history` key. Load problems
//! never propagate: a missing or malformed file just means an empty
//! history.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use shared::history::HistoryEntry;
use tracing::warn;

pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Serialize)]
struct HistoryDoc<'a> {
    history: &'a [HistoryEntry],
}

#[derive(Deserialize)]
struct LoadedHistoryDoc {
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

pub struct HistoryStore {
    path: PathBuf,
    capacity: usize,
    entries: Vec<HistoryEntry>,
    cursor: Option<usize>,
}

impl HistoryStore {
    pub fn load(path: PathBuf) -> Self {
        Self::load_with_capacity(path, DEFAULT_CAPACITY)
    }

    /// Loads from `path`, keeping only the newest `capacity` entries.
    /// The cursor lands on the most recent entry, or nowhere when the
    /// store is empty.
    pub fn load_with_capacity(path: PathBuf, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut entries = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<LoadedHistoryDoc>(&text) {
                Ok(doc) => doc.history,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "history file malformed, starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };
        if entries.len() > capacity {
            entries.drain(..entries.len() - capacity);
        }
        let cursor = entries.len().checked_sub(1);
        Self {
            path,
            capacity,
            entries,
            cursor,
        }
    }

    /// Appends an entry, evicting the oldest when full, and moves the
    /// cursor to it.
    pub fn add(&mut self, pattern: &str, input: &str, output: &str) -> &HistoryEntry {
        self.entries.push(HistoryEntry::new(pattern, input, output));
        if self.entries.len() > self.capacity {
            self.entries.remove(0);
        }
        let index = self.entries.len() - 1;
        self.cursor = Some(index);
        self.persist();
        &self.entries[index]
    }

    /// Overwrites the output of the entry under the cursor. The cursor
    /// does not move. Does nothing on an empty store.
    pub fn update_current_output(&mut self, output: &str) {
        let Some(index) = self.cursor else { return };
        if let Some(entry) = self.entries.get_mut(index) {
            entry.output = output.to_string();
            self.persist();
        }
    }

    /// Moves the cursor one entry back. At the oldest entry the cursor
    /// stays put and `None` comes back; there is no wraparound.
    pub fn previous(&mut self) -> Option<&HistoryEntry> {
        let index = self.cursor?;
        if index == 0 {
            return None;
        }
        self.cursor = Some(index - 1);
        self.entries.get(index - 1)
    }

    /// Moves the cursor one entry forward, mirror of
    /// [`previous`](Self::previous).
    pub fn next(&mut self) -> Option<&HistoryEntry> {
        let index = self.cursor?;
        if index + 1 >= self.entries.len() {
            return None;
        }
        self.cursor = Some(index + 1);
        self.entries.get(index + 1)
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.cursor?)
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write errors are logged and swallowed; the in-memory state is
    /// already updated and the next mutation retries anyway.
    fn persist(&self) {
        let doc = HistoryDoc {
            history: &self.entries,
        };
        let json = match serde_json::to_string_pretty(&doc) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "could not encode history");
                return;
            }
        };
        if let Err(err) = std::fs::write(&self.path, json) {
            warn!(path = %self.path.display(), error = %err, "could not write history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir, capacity: usize) -> HistoryStore {
        HistoryStore::load_with_capacity(dir.path().join("history.json"), capacity)
    }

    fn inputs(store: &HistoryStore) -> Vec<&str> {
        store.entries().iter().map(|e| e.input.as_str()).collect()
    }

    #[test]
    fn test_capacity_eviction_keeps_newest_in_order() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir, 3);
        for i in 0..5 {
            store.add("summarize", &format!("input {i}"), "");
        }
        assert_eq!(store.len(), 3);
        assert_eq!(inputs(&store), vec!["input 2", "input 3", "input 4"]);
        assert_eq!(store.cursor(), Some(2));
    }

    #[test]
    fn test_cursor_points_at_newest_after_add() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir, 10);
        store.add("a", "first", "");
        assert_eq!(store.cursor(), Some(0));
        store.add("b", "second", "");
        assert_eq!(store.cursor(), Some(1));
        assert_eq!(store.current().map(|e| e.input.as_str()), Some("second"));
    }

    #[test]
    fn test_navigation_stops_at_both_ends() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir, 10);
        for input in ["one", "two", "three"] {
            store.add("p", input, "");
        }
        assert_eq!(store.previous().map(|e| e.input.as_str()), Some("two"));
        assert_eq!(store.previous().map(|e| e.input.as_str()), Some("one"));
        assert!(store.previous().is_none());
        assert_eq!(store.cursor(), Some(0));

        assert_eq!(store.next().map(|e| e.input.as_str()), Some("two"));
        assert_eq!(store.next().map(|e| e.input.as_str()), Some("three"));
        assert!(store.next().is_none());
        assert_eq!(store.cursor(), Some(2));
    }

    #[test]
    fn test_empty_store_has_no_cursor() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir, 10);
        assert!(store.is_empty());
        assert_eq!(store.cursor(), None);
        assert!(store.current().is_none());
        assert!(store.previous().is_none());
        assert!(store.next().is_none());
        // Updating with no cursor is a no-op, not a panic.
        store.update_current_output("ignored");
    }

    #[test]
    fn test_update_current_output_survives_reload() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = store_in(&dir, 10);
            store.add("summarize", "hello", "");
            store.update_current_output("HELLO\n");
        }
        let store = store_in(&dir, 10);
        assert_eq!(store.len(), 1);
        assert_eq!(store.current().map(|e| e.output.as_str()), Some("HELLO\n"));
        assert_eq!(store.current().map(|e| e.pattern.as_str()), Some("summarize"));
    }

    #[test]
    fn test_reload_truncates_to_newest_capacity() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = store_in(&dir, 10);
            for i in 0..5 {
                store.add("p", &format!("input {i}"), "");
            }
        }
        let store = store_in(&dir, 3);
        assert_eq!(inputs(&store), vec!["input 2", "input 3", "input 4"]);
        assert_eq!(store.cursor(), Some(2));
    }

    #[test]
    fn test_malformed_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("history.json"), "{definitely not json").unwrap();
        let mut store = store_in(&dir, 10);
        assert!(store.is_empty());
        // And the store is usable afterwards.
        store.add("p", "in", "out");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_disk_format_wraps_entries_in_an_object() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir, 10);
        store.add("summarize", "hello", "HELLO\n");

        let text = std::fs::read_to_string(dir.path().join("history.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        let entries = value["history"].as_array().expect("history key");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["pattern"], "summarize");
    }
}
