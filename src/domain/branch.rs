//! Explicit stack of the files currently being resolved.
//!
//! Native recursion drives the resolution; this stack is what ancestor
//! queries (`non_inserted_parent`, cycle checks) look at.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::domain::deferred::DeferredEntry;
use crate::domain::directive::DirectiveKind;
use crate::domain::record::FileRecord;
use crate::util::path::PathExt;

/// One file being resolved.
#[derive(Debug, Clone)]
pub struct BranchFrame {
    pub path: String,
    pub abs_path: PathBuf,
    pub dir_path: PathBuf,
    pub kind: DirectiveKind,
    /// Finished output of files included before this one
    pub before: Vec<String>,
    /// Files to resolve once this file's body is done
    pub after: VecDeque<DeferredEntry>,
    /// Set once the body starts template evaluation
    pub ready: bool,
}

impl BranchFrame {
    fn new(record: &FileRecord, ready: bool) -> Self {
        Self {
            path: record.path.clone(),
            abs_path: record.abs_path.clone(),
            dir_path: record.dir_path.clone(),
            kind: record.kind,
            before: Vec::new(),
            after: VecDeque::new(),
            ready,
        }
    }
}

#[derive(Debug, Default)]
pub struct Branch {
    frames: Vec<BranchFrame>,
}

impl Branch {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(level = "trace", skip(self, record), fields(path = %record.path))]
    pub fn push(&mut self, record: &FileRecord, ready: bool) {
        self.frames.push(BranchFrame::new(record, ready));
    }

    #[instrument(level = "trace", skip(self))]
    pub fn pop(&mut self) -> Option<BranchFrame> {
        self.frames.pop()
    }

    pub fn current(&self) -> Option<&BranchFrame> {
        self.frames.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut BranchFrame> {
        self.frames.last_mut()
    }

    /// Top frame when ready, else the one beneath it.
    pub fn current_ready(&self) -> Option<&BranchFrame> {
        match self.frames.last() {
            Some(top) if top.ready => Some(top),
            Some(_) => self.frames.iter().rev().nth(1),
            None => None,
        }
    }

    /// Frame below the top one.
    pub fn parent(&self) -> Option<&BranchFrame> {
        self.frames.iter().rev().nth(1)
    }

    /// Position of the closest frame below the top whose kind is not an insert.
    pub fn non_inserted_parent_index(&self) -> Option<usize> {
        let below_top = self.frames.len().checked_sub(1)?;
        self.frames[..below_top]
            .iter()
            .rposition(|f| !f.kind.is_insert())
    }

    /// Closest ancestor owning before/after buckets: inserted frames are skipped.
    pub fn non_inserted_parent(&self) -> Option<&BranchFrame> {
        self.non_inserted_parent_index().map(|i| &self.frames[i])
    }

    pub fn non_inserted_parent_mut(&mut self) -> Option<&mut BranchFrame> {
        self.non_inserted_parent_index()
            .map(move |i| &mut self.frames[i])
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut BranchFrame> {
        self.frames.get_mut(index)
    }

    /// Exactly one file is open.
    pub fn is_root_file(&self) -> bool {
        self.frames.len() == 1
    }

    pub fn contains_path(&self, abs_path: &Path) -> bool {
        let abs_path = abs_path.normalized();
        self.frames.iter().any(|f| f.abs_path == abs_path)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn mark_ready(&mut self) {
        if let Some(top) = self.frames.last_mut() {
            top.ready = true;
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
