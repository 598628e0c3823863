//! Line mapping: generated source line → template file and line.
//!
//! The writer records the template location active when each generated line
//! starts. Consecutive lines from the same template line collapse into one
//! range, so the map stays proportional to the template, not the output.
//! The host uses it to attribute run-time failures to template lines.

use serde::{Deserialize, Serialize};

/// A complete line map for one compiled unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineMap {
    pub entries: Vec<LineMapEntry>,
}

/// Generated lines `generated_start..=generated_end` come from `file:source_line`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMapEntry {
    pub generated_start: u32,
    pub generated_end: u32,
    pub file: String,
    pub source_line: u32,
}

impl LineMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record that `generated_line` came from `file:source_line`.
    ///
    /// Lines must be recorded in increasing order.
    pub fn record(&mut self, generated_line: u32, file: &str, source_line: u32) {
        if let Some(last) = self.entries.last_mut() {
            if last.file == file
                && last.source_line == source_line
                && last.generated_end + 1 == generated_line
            {
                last.generated_end = generated_line;
                return;
            }
        }
        self.entries.push(LineMapEntry {
            generated_start: generated_line,
            generated_end: generated_line,
            file: file.to_string(),
            source_line,
        });
    }

    /// Template location of a generated line, if it was mapped.
    pub fn lookup(&self, generated_line: u32) -> Option<(&str, u32)> {
        let idx = self
            .entries
            .partition_point(|e| e.generated_end < generated_line);
        self.entries
            .get(idx)
            .filter(|e| e.generated_start <= generated_line)
            .map(|e| (e.file.as_str(), e.source_line))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_json(data: &str) -> Option<Self> {
        serde_json::from_str(data).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_lines_collapse() {
        let mut map = LineMap::new();
        map.record(10, "index.tpl", 3);
        map.record(11, "index.tpl", 3);
        map.record(12, "index.tpl", 4);
        map.record(20, "index.tpl", 4);
        assert_eq!(map.len(), 3);
        assert_eq!(map.entries[0].generated_end, 11);
    }

    #[test]
    fn lookup_finds_ranges() {
        let mut map = LineMap::new();
        map.record(5, "a.tpl", 1);
        map.record(6, "a.tpl", 1);
        map.record(9, "b.tpl", 7);

        assert_eq!(map.lookup(6), Some(("a.tpl", 1)));
        assert_eq!(map.lookup(9), Some(("b.tpl", 7)));
        assert_eq!(map.lookup(7), None);
        assert_eq!(map.lookup(1), None);
        assert_eq!(map.lookup(100), None);
    }

    #[test]
    fn round_trip_json() {
        let mut map = LineMap::new();
        map.record(1, "index.tpl", 2);
        let back = LineMap::from_json(&map.to_json()).expect("parse failed");
        assert_eq!(back, map);
    }
}
