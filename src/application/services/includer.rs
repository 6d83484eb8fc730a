//! Directive resolution service
//!
//! Walks a root file, resolves every directive met during template
//! evaluation and assembles the output. Files included *before* their parent
//! are collected in the parent's frame; *after* files wait in the parent
//! frame until its body is done; *later* files wait until the enclosing root
//! document closes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use encoding_rs::Encoding;
use generational_arena::Index;
use tracing::{debug, info, instrument, warn};

use crate::application::options::{Hook, IncluderOptions};
use crate::application::{ApplicationError, ApplicationResult};
use crate::config::Settings;
use crate::domain::directive::{
    cut_pragma, rewrite_requires, split_leading_directives, strip_leading_blank_lines,
};
use crate::domain::{
    take_after, Branch, BranchFrame, Cache, DeferredEntry, DeferredQueue, DependencyMap,
    DirectiveKind, DomainError, DomainResult, FileRecord, RebuiltFile, TemplateScope,
};
use crate::infrastructure::traits::FileSystem;
use crate::util::path::{is_source_rooted, PathExt};

const FORCED_PRAGMA: &str = "\"use strict\";";

/// What is left of a file once its frame is popped and its deferred files drained.
struct ClosedFile {
    frame: BranchFrame,
    node: Index,
    after: String,
    later: String,
}

/// Session state a failed root is rolled back to.
struct Checkpoint {
    cache: Cache,
    globals: BTreeMap<String, String>,
    inserted: usize,
    roots: usize,
}

/// Resolves directives for one build session.
///
/// Cache, map, globals and the later queue persist across [`Includer::resolve`]
/// calls until [`Includer::reset`], so several roots can share one session.
pub struct Includer {
    settings: Settings,
    options: IncluderOptions,
    fs: Arc<dyn FileSystem>,
    encoding: &'static Encoding,
    project_root: PathBuf,
    cache: Cache,
    branch: Branch,
    map: DependencyMap,
    deferred: DeferredQueue,
    inserted: usize,
    globals: BTreeMap<String, String>,
    announced: bool,
}

impl Includer {
    /// Create an includer rooted at the working directory.
    pub fn new(settings: Settings, fs: Arc<dyn FileSystem>) -> ApplicationResult<Self> {
        settings.validate()?;
        let encoding = Encoding::for_label(settings.text_encoding.as_bytes()).ok_or_else(|| {
            ApplicationError::Config {
                message: format!("unknown text encoding: {}", settings.text_encoding),
            }
        })?;
        let cwd = std::env::current_dir().map_err(|e| ApplicationError::OperationFailed {
            context: "determine working directory".to_string(),
            source: Box::new(e),
        })?;

        Ok(Self {
            globals: settings.globals.clone(),
            settings,
            options: IncluderOptions::default(),
            fs,
            encoding,
            project_root: cwd.normalized(),
            cache: Cache::new(),
            branch: Branch::new(),
            map: DependencyMap::new(),
            deferred: DeferredQueue::new(),
            inserted: 0,
            announced: false,
        })
    }

    /// Plug in hooks, surrounders, a template engine or another project root.
    pub fn with_options(mut self, options: IncluderOptions) -> Self {
        if let Some(root) = &options.project_root {
            self.project_root = if root.is_absolute() {
                root.normalized()
            } else {
                self.project_root.join(root).normalized()
            };
        }
        self.options = options;
        self
    }

    /// Resolve a root file. `source` replaces the file content when given.
    pub fn resolve(
        &mut self,
        root: impl AsRef<Path>,
        source: Option<String>,
    ) -> ApplicationResult<String> {
        let root = root.as_ref();
        let passed = if root.is_absolute() {
            pathdiff::diff_paths(root, &self.project_root).unwrap_or_else(|| root.to_path_buf())
        } else {
            root.to_path_buf()
        }
        .to_string_lossy_owned();

        if !self.announced && self.settings.verbosity >= 1 {
            info!(
                "sniff: resolving {} in {}",
                passed,
                self.project_root.display()
            );
            self.announced = true;
        }

        let checkpoint = self.checkpoint();
        self.include(&passed, source, DirectiveKind::Before, None, None)
            .map_err(|e| {
                self.rollback(checkpoint);
                ApplicationError::from(e)
            })
    }

    /// Resolve a root given as in-memory text; `root` still names its location.
    pub fn resolve_str(&mut self, root: impl AsRef<Path>, source: &str) -> ApplicationResult<String> {
        self.resolve(root, Some(source.to_string()))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn dependency_map(&self) -> &DependencyMap {
        &self.map
    }

    /// Files finalized since the last reset.
    pub fn inserted_count(&self) -> usize {
        self.inserted
    }

    pub fn globals(&self) -> &BTreeMap<String, String> {
        &self.globals
    }

    /// Forget everything resolved so far; globals return to their configured values.
    pub fn reset(&mut self) {
        self.cache.reset();
        self.branch.clear();
        self.map.clear();
        self.deferred.clear();
        self.inserted = 0;
        self.globals = self.settings.globals.clone();
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            cache: self.cache.clone(),
            globals: self.globals.clone(),
            inserted: self.inserted,
            roots: self.map.len(),
        }
    }

    /// Undo everything a failed root left behind, so the next root of the
    /// session sees the state it would have seen without it.
    fn rollback(&mut self, checkpoint: Checkpoint) {
        self.branch.clear();
        while let Some(entry) = self.deferred.pop_front_later() {
            self.map.remove_file(entry.node);
        }
        let failed: Vec<Index> = self.map.roots().iter().skip(checkpoint.roots).copied().collect();
        for idx in failed {
            self.map.remove_file(idx);
        }
        self.cache = checkpoint.cache;
        self.globals = checkpoint.globals;
        self.inserted = checkpoint.inserted;
        debug!("rollback: session restored to {} root files", self.map.len());
    }

    /// Turn legacy `require("type:path")` statements into template calls.
    pub fn replace_requires(&self, src: &str) -> String {
        rewrite_requires(src, self.settings.rewrite_all_unknown_requires)
    }

    /// Record of `passed` as if met in the file currently being resolved.
    pub fn file_record(&self, passed: &str, kind: DirectiveKind) -> ApplicationResult<FileRecord> {
        Ok(self.complete_record(passed, kind)?)
    }

    /// Pragma cut, leading-run split and surrounders for `src`.
    pub fn rebuild_file(&mut self, record: &FileRecord, src: &str) -> ApplicationResult<RebuiltFile> {
        Ok(self.rebuild(record, src)?)
    }

    #[instrument(level = "debug", skip(self, source, args, sink), fields(kind = %kind))]
    fn include(
        &mut self,
        passed: &str,
        source: Option<String>,
        kind: DirectiveKind,
        args: Option<String>,
        sink: Option<String>,
    ) -> DomainResult<String> {
        let record = self.complete_record(passed, kind)?.with_args(args, sink);

        if self
            .branch
            .current()
            .is_some_and(|frame| frame.abs_path == record.abs_path)
        {
            return Err(DomainError::SelfInclusion { path: record.path });
        }

        let cached = self.cache.contains(&record.abs_path);
        if cached
            && matches!(
                kind,
                DirectiveKind::Before | DirectiveKind::Later | DirectiveKind::InsertOnce
            )
        {
            debug!("include: {} already included, skipped", record.path);
            return Ok(String::new());
        }
        // ancestors are cached; only a repeated insert could reach one again
        if kind == DirectiveKind::Insert && self.branch.contains_path(&record.abs_path) {
            return Err(DomainError::SelfInclusion { path: record.path });
        }
        if kind == DirectiveKind::Later && self.deferred.is_pending_later(&record.abs_path) {
            debug!("include: {} already pending, skipped", record.path);
            return Ok(String::new());
        }

        self.branch.push(&record, false);
        if matches!(kind, DirectiveKind::Before | DirectiveKind::InsertOnce)
            || (kind == DirectiveKind::Insert && !cached)
        {
            self.cancel_later(&record.abs_path);
            self.cache.add(&record.abs_path);
        }

        let build = match self.load(&record, source) {
            Ok(build) => build,
            Err(e) => {
                self.branch.pop();
                return Err(wrap(&record, e));
            }
        };

        let node = self.map.add_file(&record);
        self.branch.mark_ready();

        if kind.is_deferred() {
            let owner = self.branch.non_inserted_parent_index();
            self.branch.pop();
            self.map.end_file(false)?;

            let entry = DeferredEntry {
                node,
                record,
                build,
            };
            match (kind, owner.and_then(|i| self.branch.get_mut(i))) {
                (DirectiveKind::After, Some(frame)) => frame.after.push_back(entry),
                _ => {
                    self.deferred.push_later(entry);
                }
            }
            return Ok(String::new());
        }

        self.finalize(record, build)
    }

    fn complete_record(&self, passed: &str, kind: DirectiveKind) -> DomainResult<FileRecord> {
        let current = self.branch.current();
        let joined = if is_source_rooted(passed) {
            self.project_root
                .join(&self.settings.source_dir)
                .join(passed.trim_start_matches(['/', '\\']))
        } else {
            match current {
                Some(frame) => frame.dir_path.join(passed),
                None => self.project_root.join(passed),
            }
        };

        let abs_path = joined.normalized();
        if !abs_path.is_within(&self.project_root) {
            return Err(DomainError::OutOfRoot {
                path: abs_path,
                root: self.project_root.clone(),
            });
        }

        Ok(FileRecord::new(
            passed,
            &abs_path,
            &self.project_root,
            &self.settings.source_dir,
            kind,
            current.map(|f| f.path.clone()),
        ))
    }

    fn load(&mut self, record: &FileRecord, source: Option<String>) -> DomainResult<RebuiltFile> {
        let raw = match source {
            Some(src) => src,
            None => self.read_source(&record.abs_path)?,
        };
        let src = self.run_hook("preprocess", self.options.preprocess.as_ref(), &raw, record)?;
        let src = self.replace_requires(&src);
        let src = self.run_hook("process", self.options.process.as_ref(), &src, record)?;
        self.rebuild(record, &src)
    }

    fn read_source(&self, path: &Path) -> DomainResult<String> {
        let bytes = self.fs.read(path).map_err(|source| DomainError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let (text, _, had_errors) = self.encoding.decode(&bytes);
        if had_errors {
            return Err(DomainError::Decode {
                path: path.to_path_buf(),
                encoding: self.encoding.name().to_string(),
            });
        }
        Ok(text.into_owned())
    }

    fn run_hook(
        &self,
        name: &'static str,
        hook: Option<&Hook>,
        src: &str,
        record: &FileRecord,
    ) -> DomainResult<String> {
        match hook {
            Some(hook) => hook(src, record, &self.settings).map_err(|source| DomainError::Hook {
                hook: name,
                path: record.path.clone(),
                source,
            }),
            None => Ok(src.to_string()),
        }
    }

    fn rebuild(&mut self, record: &FileRecord, src: &str) -> DomainResult<RebuiltFile> {
        let pragma = cut_pragma(src, self.settings.remove_leading_pragma);
        let split = split_leading_directives(&pragma.source);

        let separator = self.surrounder('s', record)?;
        let header = self.surrounder('h', record)?;
        let footer = self.surrounder('f', record)?;

        let source = format!(
            "{}{}{}{}",
            split.includes.concat(),
            pragma.displayed,
            split.comments.concat(),
            split.body
        );

        Ok(RebuiltFile {
            source,
            include_line_feeds: split.include_line_feeds(),
            pragma,
            header,
            separator,
            footer,
        })
    }

    /// Header (`h`), separator (`s`) or footer (`f`) of a file, template-evaluated.
    fn surrounder(&mut self, flag: char, record: &FileRecord) -> DomainResult<String> {
        if record.kind.is_insert() && !self.settings.insert_surrounder(flag) {
            return Ok(String::new());
        }

        let (configured, fallback) = match flag {
            'h' => (&self.options.header, &self.settings.header),
            's' => (&self.options.separator, &self.settings.separator),
            _ => (&self.options.footer, &self.settings.footer),
        };
        let text = match configured {
            Some(surrounder) => surrounder.resolve(record),
            None => fallback.clone(),
        };
        if text.is_empty() {
            return Ok(String::new());
        }

        self.render(&text, record).map(|(out, _)| out)
    }

    fn render(&mut self, source: &str, record: &FileRecord) -> DomainResult<(String, Option<String>)> {
        let engine = Arc::clone(&self.options.engine);
        let mut bridge = Bridge {
            includer: self,
            record,
            output: None,
        };
        let text = engine.render(source, &mut bridge)?;
        Ok((text, bridge.output))
    }

    /// Template evaluation and postprocess of a ready file.
    fn evaluate(
        &mut self,
        record: &FileRecord,
        build: &RebuiltFile,
    ) -> DomainResult<(String, Option<String>)> {
        let (text, output) = self.render(&build.source, record)?;
        self.inserted += 1;
        let text = self.run_hook("postprocess", self.options.postprocess.as_ref(), &text, record)?;
        Ok((text, output))
    }

    #[instrument(level = "debug", skip(self, build), fields(path = %record.path))]
    fn finalize(&mut self, record: FileRecord, build: RebuiltFile) -> DomainResult<String> {
        match self.branch.current_ready() {
            Some(frame) if frame.abs_path == record.abs_path => {}
            other => {
                return Err(DomainError::StackConsistency(format!(
                    "expected {} on top of the stack, found {}",
                    record.path,
                    other.map_or("nothing", |f| f.path.as_str())
                )))
            }
        }

        let evaluated = self.evaluate(&record, &build);
        let is_root_file = self.branch.is_root_file();
        let owner = self.branch.non_inserted_parent_index();

        let (body, output) = match evaluated {
            Ok(evaluated) => evaluated,
            Err(e) => {
                self.branch.pop();
                if let Err(map_err) = self.map.end_file(false) {
                    warn!("finalize: {} left the map unbalanced: {}", record.path, map_err);
                }
                return Err(wrap(&record, e));
            }
        };
        let closed = self.end_file().map_err(|e| wrap(&record, e))?;

        if let (Some(sink), Some(output)) = (&record.output_sink, output) {
            self.globals.insert(sink.clone(), output);
        }

        let before = closed.frame.before.concat();
        // nothing precedes a root document that has no before files
        let leads_document = before.is_empty() && self.map.is_root(closed.node);
        let separator = if self.inserted > 1 && !leads_document {
            build.separator.as_str()
        } else {
            ""
        };

        if !self.settings.copy_destination_dir.is_empty() {
            self.copy(&record, &build, &body).map_err(|e| wrap(&record, e))?;
        }

        let mut body = strip_leading_blank_lines(&body, build.include_line_feeds);
        if self.settings.trim_output {
            body = body.trim().to_string();
        }
        let mut assembled = format!(
            "{}{}{}{}{}",
            build.header, body, build.footer, closed.after, closed.later
        );
        if self.settings.trim_output {
            assembled = assembled.trim().to_string();
        }
        let assembled = format!("{before}{separator}{assembled}");

        self.log_finalized(&record);

        if is_root_file || record.kind != DirectiveKind::Before {
            if self.map.is_root(closed.node)
                && self.map.len() == 1
                && self.settings.force_output_pragma.applies_to(&record.path)
            {
                return Ok(format!("{FORCED_PRAGMA}\n\n{assembled}"));
            }
            return Ok(assembled);
        }

        match owner.and_then(|i| self.branch.get_mut(i)) {
            Some(frame) => {
                frame.before.push(assembled);
                Ok(String::new())
            }
            None => Ok(assembled),
        }
    }

    /// Pop the finished file, then resolve its `after` files and, for a root,
    /// the whole `later` queue.
    fn end_file(&mut self) -> DomainResult<ClosedFile> {
        let mut frame = self.branch.pop().ok_or_else(|| {
            DomainError::StackConsistency("closing a file on an empty stack".to_string())
        })?;
        let node = self.map.end_file(true)?;

        let mut after = String::new();
        for entry in take_after(&mut frame) {
            after.push_str(&self.include_later_file(entry)?);
        }

        let mut later = String::new();
        if self.map.is_root(node) {
            while let Some(entry) = self.deferred.pop_front_later() {
                later.push_str(&self.include_later_file(entry)?);
            }
        }

        Ok(ClosedFile {
            frame,
            node,
            after,
            later,
        })
    }

    fn include_later_file(&mut self, entry: DeferredEntry) -> DomainResult<String> {
        let DeferredEntry {
            node,
            record,
            build,
        } = entry;
        if self.cache.contains(&record.abs_path) {
            debug!("drain: {} already included, skipped", record.path);
            return Ok(String::new());
        }

        self.cache.add(&record.abs_path);
        self.map.reopen(node);
        self.branch.push(&record, true);
        self.finalize(record, build)
    }

    /// An eager inclusion wins over a pending `later` of the same file.
    fn cancel_later(&mut self, abs_path: &Path) {
        if let Some(entry) = self.deferred.cancel_later(abs_path) {
            debug!("include: {} pulled out of the later queue", entry.record.path);
            self.map.remove_file(entry.node);
        }
    }

    fn copy(&self, record: &FileRecord, build: &RebuiltFile, body: &str) -> DomainResult<()> {
        let pragma = if !build.pragma.original.is_empty() {
            build.pragma.original.clone()
        } else if self.settings.force_output_pragma.applies_to(&record.path) {
            if starts_with_blank_line(body) {
                FORCED_PRAGMA.to_string()
            } else {
                format!("{FORCED_PRAGMA}\n")
            }
        } else {
            String::new()
        };

        let content = self.run_hook(
            "copy_process",
            self.options.copy_process.as_ref(),
            &format!("{pragma}{body}"),
            record,
        )?;
        let target = self
            .project_root
            .join(&self.settings.copy_destination_dir)
            .join(&record.path)
            .normalized();
        let (bytes, _, _) = self.encoding.encode(&content);

        self.fs
            .ensure_parent(&target)
            .and_then(|_| self.fs.write_bytes(&target, &bytes))
            .map_err(|source| DomainError::CopyWrite {
                path: target.clone(),
                source,
            })?;
        debug!("copy: {} -> {}", record.path, target.display());
        Ok(())
    }

    fn log_finalized(&self, record: &FileRecord) {
        if self.settings.verbosity < 2 {
            return;
        }
        let parent = record.parent.as_deref().unwrap_or("the source");
        match record.kind {
            DirectiveKind::Insert => info!("Inserted: {} in {}", record.path, parent),
            DirectiveKind::InsertOnce => info!("Inserted once: {} in {}", record.path, parent),
            kind => info!("Included {}: {} in {}", kind, record.path, parent),
        }
    }
}

/// Wrap a failure once with the file it happened in; fatal errors pass unchanged.
fn wrap(record: &FileRecord, err: DomainError) -> DomainError {
    if err.is_fatal() || matches!(err, DomainError::Inclusion { .. }) {
        return err;
    }
    DomainError::Inclusion {
        path: record.path.clone(),
        parent: record.parent.clone(),
        source: Box::new(err),
    }
}

/// Leading whitespace contains a line feed.
fn starts_with_blank_line(text: &str) -> bool {
    text.chars()
        .take_while(|c| c.is_whitespace())
        .any(|c| c == '\n')
}

/// Template view of the includer while one file is rendered.
struct Bridge<'a> {
    includer: &'a mut Includer,
    record: &'a FileRecord,
    output: Option<String>,
}

impl TemplateScope for Bridge<'_> {
    fn record(&self) -> &FileRecord {
        self.record
    }

    fn inserted(&self) -> usize {
        self.includer.inserted
    }

    fn invoke(
        &mut self,
        kind: DirectiveKind,
        path: &str,
        args: Option<String>,
        sink: Option<String>,
    ) -> DomainResult<String> {
        self.includer.include(path, None, kind, args, sink)
    }

    fn global(&self, name: &str) -> Option<String> {
        self.includer.globals.get(name).cloned()
    }

    fn set_global(&mut self, name: &str, value: String) {
        self.includer.globals.insert(name.to_string(), value);
    }

    fn set_output(&mut self, value: String) {
        self.output = Some(value);
    }

    fn debug(&self, msg: &str) {
        if self.includer.settings.verbosity >= 1 {
            warn!("DEBUG [{}]: {}", self.record.path, msg);
        }
    }
}
