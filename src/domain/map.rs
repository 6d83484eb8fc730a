//! Dependency map: arena-backed forest of resolved files plus the flat include order.
//!
//! Top-level nodes are "root files" (no includer). Every other node is owned by
//! its parent's `children` list; `parent` is a back reference only.

use std::path::PathBuf;

use generational_arena::{Arena, Index};
use termtree::Tree;
use tracing::instrument;

use crate::domain::directive::DirectiveKind;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::record::FileRecord;
use crate::util::path::to_url_separators;

/// One resolved file occurrence in the map.
#[derive(Debug, Clone)]
pub struct MapNode {
    /// Path relative to the source root
    pub path: String,
    pub abs_path: PathBuf,
    /// Path relative to the project root
    pub cwd_path: String,
    /// Position relative to the parent
    pub kind: DirectiveKind,
    /// Includer, `None` for root files
    pub parent: Option<Index>,
    /// Included files, in textual order
    pub children: Vec<Index>,
}

impl MapNode {
    fn from_record(record: &FileRecord, parent: Option<Index>) -> Self {
        Self {
            path: record.path.clone(),
            abs_path: record.abs_path.clone(),
            cwd_path: record.cwd_path.clone(),
            kind: record.kind,
            parent,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct DependencyMap {
    arena: Arena<MapNode>,
    roots: Vec<Index>,
    /// First-finalized order, insert kinds excluded
    ordered: Vec<Index>,
    /// Nodes currently being built, innermost last
    open: Vec<Index>,
}

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node below the innermost open node (top level when none is open)
    /// and open it.
    #[instrument(level = "trace", skip(self, record), fields(path = %record.path))]
    pub fn add_file(&mut self, record: &FileRecord) -> Index {
        let parent = self.open.last().copied();
        let idx = self.arena.insert(MapNode::from_record(record, parent));

        match parent.and_then(|p| self.arena.get_mut(p)) {
            Some(parent) => parent.children.push(idx),
            None => self.roots.push(idx),
        }
        self.open.push(idx);
        idx
    }

    /// Open an existing node again, for a deferred file being drained.
    #[instrument(level = "trace", skip(self))]
    pub fn reopen(&mut self, idx: Index) {
        self.open.push(idx);
    }

    /// Unlink a node from its parent (or the top level) and the ordered list,
    /// dropping its whole subtree.
    #[instrument(level = "trace", skip(self))]
    pub fn remove_file(&mut self, idx: Index) {
        let Some(parent) = self.arena.get(idx).map(|n| n.parent) else {
            return;
        };
        match parent.and_then(|p| self.arena.get_mut(p)) {
            Some(parent) => parent.children.retain(|&c| c != idx),
            None => self.roots.retain(|&r| r != idx),
        }

        let mut pending = vec![idx];
        while let Some(current) = pending.pop() {
            if let Some(node) = self.arena.remove(current) {
                pending.extend(node.children);
            }
            self.ordered.retain(|&o| o != current);
            self.open.retain(|&o| o != current);
        }
    }

    /// Close the innermost open node; `written` nodes of non-insert kinds
    /// join the ordered list.
    #[instrument(level = "trace", skip(self))]
    pub fn end_file(&mut self, written: bool) -> DomainResult<Index> {
        let idx = self.open.pop().ok_or_else(|| {
            DomainError::StackConsistency("problem by building the file map".to_string())
        })?;
        let is_insert = self.arena.get(idx).map_or(true, |n| n.kind.is_insert());
        if written && !is_insert && !self.ordered.contains(&idx) {
            self.ordered.push(idx);
        }
        Ok(idx)
    }

    pub fn is_root(&self, idx: Index) -> bool {
        self.arena.get(idx).is_some_and(|n| n.parent.is_none())
    }

    pub fn get(&self, idx: Index) -> Option<&MapNode> {
        self.arena.get(idx)
    }

    pub fn roots(&self) -> &[Index] {
        &self.roots
    }

    /// Pre-order walk; the callback receives the node, its depth, its index
    /// among its siblings and its pre-order index.
    pub fn walk<F>(&self, mut cb: F)
    where
        F: FnMut(&MapNode, usize, usize, usize),
    {
        let mut global = 0;
        let mut stack: Vec<(Index, usize, usize)> = self
            .roots
            .iter()
            .enumerate()
            .rev()
            .map(|(i, &idx)| (idx, 0, i))
            .collect();

        while let Some((idx, depth, sibling)) = stack.pop() {
            if let Some(node) = self.arena.get(idx) {
                cb(node, depth, sibling, global);
                global += 1;
                for (i, &child) in node.children.iter().enumerate().rev() {
                    stack.push((child, depth + 1, i));
                }
            }
        }
    }

    #[instrument(level = "trace", skip(self))]
    pub fn iter(&self) -> MapIterator<'_> {
        MapIterator::new(self)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn iter_postorder(&self) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self)
    }

    /// Accumulate top-down: a file before the files it includes.
    pub fn reduce<T, F>(&self, init: T, mut cb: F) -> T
    where
        F: FnMut(T, &MapNode) -> T,
    {
        self.iter().fold(init, |acc, (_, node)| cb(acc, node))
    }

    /// Accumulate bottom-up: included files before their includer.
    pub fn ireduce<T, F>(&self, init: T, mut cb: F) -> T
    where
        F: FnMut(T, &MapNode) -> T,
    {
        self.iter_postorder().fold(init, |acc, (_, node)| cb(acc, node))
    }

    /// Total number of nodes.
    pub fn deep_len(&self) -> usize {
        self.arena.len()
    }

    pub fn ordered_len(&self) -> usize {
        self.ordered.len()
    }

    /// Number of root files.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Non-inserted files in first-finalized order.
    pub fn dependency_list(&self) -> Vec<&MapNode> {
        self.ordered
            .iter()
            .filter_map(|&idx| self.arena.get(idx))
            .collect()
    }

    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        self.roots
            .iter()
            .map(|&root| self.calculate_depth(root))
            .max()
            .unwrap_or(0)
    }

    fn calculate_depth(&self, idx: Index) -> usize {
        self.arena.get(idx).map_or(0, |node| {
            1 + node
                .children
                .iter()
                .map(|&child| self.calculate_depth(child))
                .max()
                .unwrap_or(0)
        })
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.roots.clear();
        self.ordered.clear();
        self.open.clear();
    }

    /// Indented tree with kind signs and pre-order numbers.
    pub fn to_tree_string(&self) -> String {
        let mut out = String::from("[sniff map]\n");
        let mut counter = 0;
        for &root in &self.roots {
            self.write_tree_node(root, "", &mut counter, &mut out);
        }
        out.push_str("[/sniff map]\n");
        out
    }

    fn write_tree_node(&self, idx: Index, tab: &str, counter: &mut usize, out: &mut String) {
        let Some(node) = self.arena.get(idx) else {
            return;
        };
        out.push_str(&format!(
            "{tab}({}) #{} {}\n",
            node.kind.tree_sign(),
            counter,
            node.path
        ));
        *counter += 1;

        let next_tab = if tab.is_empty() {
            "    ".to_string()
        } else {
            format!("{tab}|   ")
        };
        for &child in &node.children {
            self.write_tree_node(child, &next_tab, counter, out);
        }
    }

    /// `termtree` rendering; several root files hang below a `.` node.
    pub fn to_termtree(&self) -> Tree<String> {
        fn build(map: &DependencyMap, idx: Index) -> Option<Tree<String>> {
            let node = map.arena.get(idx)?;
            let leaves: Vec<_> = node
                .children
                .iter()
                .filter_map(|&child| build(map, child))
                .collect();
            Some(Tree::new(format!("({}) {}", node.kind.tree_sign(), node.path)).with_leaves(leaves))
        }

        let mut trees: Vec<_> = self
            .roots
            .iter()
            .filter_map(|&root| build(self, root))
            .collect();
        match trees.len() {
            0 => Tree::new("Empty map".to_string()),
            1 => trees.remove(0),
            _ => Tree::new(".".to_string()).with_leaves(trees),
        }
    }

    /// Ordered list, one path per line, prefixed with `dir`.
    pub fn to_dependency_list(&self, dir: &str, for_url: bool) -> String {
        let mut dir = check_dir(dir);
        if for_url {
            dir = to_url_separators(&dir);
        }
        self.dependency_list()
            .into_iter()
            .map(|node| {
                let path = if for_url {
                    to_url_separators(&node.path)
                } else {
                    node.path.clone()
                };
                format!("{dir}{path}\n")
            })
            .collect()
    }

    /// `<script>` tags, dependencies before their includer.
    pub fn to_html(&self, dir: &str) -> String {
        let dir = to_url_separators(&check_dir(dir));
        self.ireduce(String::new(), |mut acc, node| {
            acc.push_str(&format!(
                "<script src=\"{dir}{}\"></script>\n",
                to_url_separators(&node.path)
            ));
            acc
        })
    }

    pub fn to_resume(&self) -> String {
        format!(
            "{} files\n\n---- Tree ----\n\n{}\n\n---- Include order ----\n\n{}",
            self.deep_len(),
            self.to_tree_string(),
            self.to_dependency_list("", false)
        )
    }
}

fn check_dir(dir: &str) -> String {
    if dir.is_empty() || dir.ends_with('/') || dir.ends_with('\\') {
        dir.to_string()
    } else {
        format!("{dir}/")
    }
}

pub struct MapIterator<'a> {
    map: &'a DependencyMap,
    stack: Vec<Index>,
}

impl<'a> MapIterator<'a> {
    fn new(map: &'a DependencyMap) -> Self {
        Self {
            map,
            stack: map.roots.iter().rev().copied().collect(),
        }
    }
}

impl<'a> Iterator for MapIterator<'a> {
    type Item = (Index, &'a MapNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current) = self.stack.pop() {
            if let Some(node) = self.map.arena.get(current) {
                // reverse push keeps left-to-right order
                self.stack.extend(node.children.iter().rev());
                return Some((current, node));
            }
        }
        None
    }
}

pub struct PostOrderIterator<'a> {
    map: &'a DependencyMap,
    stack: Vec<(Index, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(map: &'a DependencyMap) -> Self {
        Self {
            map,
            stack: map.roots.iter().rev().map(|&r| (r, false)).collect(),
        }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (Index, &'a MapNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current, visited)) = self.stack.pop() {
            if let Some(node) = self.map.arena.get(current) {
                if visited {
                    return Some((current, node));
                }
                self.stack.push((current, true));
                for &child in node.children.iter().rev() {
                    self.stack.push((child, false));
                }
            }
        }
        None
    }
}
