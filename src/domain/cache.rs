//! Deduplication cache of resolved absolute paths.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::util::path::PathExt;

/// Append-only set of absolute paths already included.
///
/// Paths are normalized on entry, so `a/./b.js` and `a/b.js` are the same file.
#[derive(Debug, Default, Clone)]
pub struct Cache {
    paths: HashSet<PathBuf>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(&path.normalized())
    }

    #[instrument(level = "trace", skip(self))]
    pub fn add(&mut self, path: &Path) {
        self.paths.insert(path.normalized());
    }

    pub fn reset(&mut self) {
        self.paths.clear();
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
