//! Per-occurrence file data handed to hooks and templates.

use std::path::{Path, PathBuf};

use crate::domain::directive::{DirectiveKind, Pragma};
use crate::util::path::{display_dir, relative_display, PathExt};

/// Opening token of template tags.
pub const TEMPLATE_OPEN: &str = "<%";

/// Resolved data of one directive occurrence. Never mutated after creation;
/// re-resolving the same file creates a fresh record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Literal directive argument
    pub passed_path: String,
    /// Path relative to the source root
    pub path: String,
    /// Path relative to the project root
    pub cwd_path: String,
    pub abs_path: PathBuf,
    /// Directory of `path`
    pub dir: String,
    /// Directory of `abs_path`
    pub dir_path: PathBuf,
    pub kind: DirectiveKind,
    /// `path` of the including file
    pub parent: Option<String>,
    pub template_open: &'static str,
    pub source_dir: String,
    /// Value passed by `insert(path, args)`
    pub args: Option<String>,
    /// Global receiving the inserted file's `output`
    pub output_sink: Option<String>,
}

impl FileRecord {
    pub fn new(
        passed_path: impl Into<String>,
        abs_path: &Path,
        project_root: &Path,
        source_dir: &str,
        kind: DirectiveKind,
        parent: Option<String>,
    ) -> Self {
        let abs_path = abs_path.normalized();
        let source_root = project_root.join(source_dir).normalized();
        let path = relative_display(&abs_path, &source_root);
        let dir = display_dir(&path);
        let dir_path = abs_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| project_root.to_path_buf());

        Self {
            passed_path: passed_path.into(),
            cwd_path: relative_display(&abs_path, project_root),
            path,
            dir,
            dir_path,
            abs_path,
            kind,
            parent,
            template_open: TEMPLATE_OPEN,
            source_dir: source_dir.to_string(),
            args: None,
            output_sink: None,
        }
    }

    pub fn with_args(mut self, args: Option<String>, output_sink: Option<String>) -> Self {
        self.args = args;
        self.output_sink = output_sink;
        self
    }

    /// Value of a record field as seen from templates, by its template name.
    pub fn field(&self, name: &str) -> Option<String> {
        let value = match name {
            "passedPath" => self.passed_path.clone(),
            "path" => self.path.clone(),
            "cwdPath" => self.cwd_path.clone(),
            "absPath" => self.abs_path.to_string_lossy_owned(),
            "dir" => self.dir.clone(),
            "dirPath" => self.dir_path.to_string_lossy_owned(),
            "position" => self.kind.as_str().to_string(),
            "parent" => self.parent.clone().unwrap_or_default(),
            "sourceDir" => self.source_dir.clone(),
            "tplOpen" => self.template_open.to_string(),
            "args" => self.args.clone().unwrap_or_default(),
            _ => return None,
        };
        Some(value)
    }
}

/// A file read and rebuilt, waiting for template evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuiltFile {
    /// Template text: includes + pragma + comments + body
    pub source: String,
    pub pragma: Pragma,
    pub header: String,
    pub separator: String,
    pub footer: String,
    /// Line feeds carried by the peeled leading directives
    pub include_line_feeds: usize,
}
