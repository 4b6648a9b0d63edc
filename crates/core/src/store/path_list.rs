//! Minimal reader for the path-list sibling of an index directory (spec.md
//! §6): one UTF-8 path per line, line `i` naming fid `i`. Path-list I/O is
//! explicitly an external collaborator's job (spec.md §1) — this type
//! exists only so tests and doc examples can resolve a candidate fid set
//! back to paths without reaching outside the crate, not as a supported
//! public surface callers should build against.

use std::io::{BufRead, BufReader};

use sigfilter_runtime::CoreError;

pub struct PathList {
    paths: Vec<String>,
}

impl PathList {
    /// Read `path`, one line per fid, fid `i` being line `i` (0-indexed).
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, CoreError> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut paths = Vec::new();
        for line in reader.lines() {
            paths.push(line?);
        }
        Ok(Self { paths })
    }

    pub fn path_for(&self, fid: u32) -> Option<&str> {
        self.paths.get(fid as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
