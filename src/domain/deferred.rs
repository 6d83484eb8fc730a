//! Deferred (`after` / `later`) files waiting for their emission point.

use std::collections::VecDeque;
use std::path::Path;

use generational_arena::Index;
use tracing::{debug, instrument};

use crate::domain::branch::BranchFrame;
use crate::domain::record::{FileRecord, RebuiltFile};
use crate::util::path::PathExt;

/// A rebuilt file whose template evaluation is postponed.
#[derive(Debug, Clone)]
pub struct DeferredEntry {
    /// Map node created when the directive was met
    pub node: Index,
    pub record: FileRecord,
    pub build: RebuiltFile,
}

/// Global `later` list, drained when a root document closes.
///
/// Holds at most one entry per absolute path.
#[derive(Debug, Default)]
pub struct DeferredQueue {
    later: VecDeque<DeferredEntry>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending_later(&self, abs_path: &Path) -> bool {
        let abs_path = abs_path.normalized();
        self.later.iter().any(|e| e.record.abs_path == abs_path)
    }

    /// Enqueue unless the same path is already pending; returns whether it was added.
    #[instrument(level = "trace", skip(self, entry), fields(path = %entry.record.path))]
    pub fn push_later(&mut self, entry: DeferredEntry) -> bool {
        if self.is_pending_later(&entry.record.abs_path) {
            return false;
        }
        self.later.push_back(entry);
        true
    }

    /// Take the pending entry of a path pulled forward by a direct inclusion.
    /// The caller removes its map node.
    #[instrument(level = "trace", skip(self))]
    pub fn cancel_later(&mut self, abs_path: &Path) -> Option<DeferredEntry> {
        let abs_path = abs_path.normalized();
        let pos = self
            .later
            .iter()
            .position(|e| e.record.abs_path == abs_path)?;
        let entry = self.later.remove(pos);
        if let Some(entry) = &entry {
            debug!("Cancelled later file: {}", entry.record.path);
        }
        entry
    }

    pub fn pop_front_later(&mut self) -> Option<DeferredEntry> {
        self.later.pop_front()
    }

    pub fn len(&self) -> usize {
        self.later.len()
    }

    pub fn is_empty(&self) -> bool {
        self.later.is_empty()
    }

    pub fn clear(&mut self) {
        self.later.clear();
    }
}

/// Detach the after-list of a closed frame for draining.
pub fn take_after(frame: &mut BranchFrame) -> VecDeque<DeferredEntry> {
    std::mem::take(&mut frame.after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::directive::DirectiveKind;
    use generational_arena::Arena;
    use std::path::PathBuf;

    fn entry(arena: &mut Arena<()>, path: &str) -> DeferredEntry {
        DeferredEntry {
            node: arena.insert(()),
            record: FileRecord::new(
                path,
                &PathBuf::from("/p").join(path),
                Path::new("/p"),
                "",
                DirectiveKind::Later,
                Some("a.js".into()),
            ),
            build: RebuiltFile::default(),
        }
    }

    #[test]
    fn given_same_path_twice_when_pushing_later_then_second_is_ignored() {
        let mut arena = Arena::new();
        let mut queue = DeferredQueue::new();

        assert!(queue.push_later(entry(&mut arena, "g.js")));
        assert!(!queue.push_later(entry(&mut arena, "g.js")));
        assert!(queue.push_later(entry(&mut arena, "c.js")));

        assert_eq!(queue.len(), 2);
        assert!(queue.is_pending_later(Path::new("/p/./g.js")));
    }

    #[test]
    fn given_pending_path_when_cancelled_then_removed_and_order_kept() {
        let mut arena = Arena::new();
        let mut queue = DeferredQueue::new();
        queue.push_later(entry(&mut arena, "g.js"));
        queue.push_later(entry(&mut arena, "x.js"));
        queue.push_later(entry(&mut arena, "c.js"));

        let cancelled = queue.cancel_later(Path::new("/p/x.js"));

        assert_eq!(cancelled.map(|e| e.record.path), Some("x.js".to_string()));
        assert!(queue.cancel_later(Path::new("/p/x.js")).is_none());
        assert_eq!(queue.pop_front_later().unwrap().record.path, "g.js");
        assert_eq!(queue.pop_front_later().unwrap().record.path, "c.js");
        assert!(queue.is_empty());
    }
}
