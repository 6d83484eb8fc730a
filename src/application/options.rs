//! Host-supplied behavior plugged into the includer.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Settings;
use crate::domain::{BoxError, DirectiveTemplate, FileRecord, TemplateEngine};

/// Source transformation run at a fixed point of the pipeline.
pub type Hook = Arc<dyn Fn(&str, &FileRecord, &Settings) -> Result<String, BoxError> + Send + Sync>;

/// Computes a surrounder from the file it surrounds.
pub type SurrounderFn = Arc<dyn Fn(&FileRecord) -> String + Send + Sync>;

/// Header, separator or footer: a fixed text or a per-file callback.
/// The result is template-evaluated in the context of the file.
#[derive(Clone)]
pub enum Surrounder {
    Text(String),
    Dynamic(SurrounderFn),
}

impl Surrounder {
    pub fn resolve(&self, record: &FileRecord) -> String {
        match self {
            Surrounder::Text(text) => text.clone(),
            Surrounder::Dynamic(f) => f(record),
        }
    }
}

impl fmt::Debug for Surrounder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Surrounder::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Surrounder::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<&str> for Surrounder {
    fn from(text: &str) -> Self {
        Surrounder::Text(text.to_string())
    }
}

/// Options that cannot live in a config file.
///
/// Surrounders left at `None` fall back to the text of [`Settings`].
#[derive(Clone)]
pub struct IncluderOptions {
    /// Runs on the raw file text, before `require` rewriting
    pub preprocess: Option<Hook>,
    /// Runs after `require` rewriting, before the leading-run split
    pub process: Option<Hook>,
    /// Runs on the evaluated body of each file
    pub postprocess: Option<Hook>,
    /// Runs on the text written to the copy destination
    pub copy_process: Option<Hook>,
    pub header: Option<Surrounder>,
    pub separator: Option<Surrounder>,
    pub footer: Option<Surrounder>,
    pub engine: Arc<dyn TemplateEngine>,
    /// Every resolved file must lie below it; defaults to the working directory
    pub project_root: Option<PathBuf>,
}

impl Default for IncluderOptions {
    fn default() -> Self {
        Self {
            preprocess: None,
            process: None,
            postprocess: None,
            copy_process: None,
            header: None,
            separator: None,
            footer: None,
            engine: Arc::new(DirectiveTemplate::new()),
            project_root: None,
        }
    }
}

impl IncluderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    pub fn with_preprocess<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &FileRecord, &Settings) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.preprocess = Some(Arc::new(f));
        self
    }

    pub fn with_process<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &FileRecord, &Settings) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.process = Some(Arc::new(f));
        self
    }

    pub fn with_postprocess<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &FileRecord, &Settings) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.postprocess = Some(Arc::new(f));
        self
    }

    pub fn with_copy_process<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &FileRecord, &Settings) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        self.copy_process = Some(Arc::new(f));
        self
    }

    pub fn with_header(mut self, header: impl Into<Surrounder>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn with_separator(mut self, separator: impl Into<Surrounder>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    pub fn with_footer(mut self, footer: impl Into<Surrounder>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    pub fn with_engine(mut self, engine: Arc<dyn TemplateEngine>) -> Self {
        self.engine = engine;
        self
    }
}

impl fmt::Debug for IncluderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncluderOptions")
            .field("preprocess", &self.preprocess.is_some())
            .field("process", &self.process.is_some())
            .field("postprocess", &self.postprocess.is_some())
            .field("copy_process", &self.copy_process.is_some())
            .field("header", &self.header)
            .field("separator", &self.separator)
            .field("footer", &self.footer)
            .field("project_root", &self.project_root)
            .finish_non_exhaustive()
    }
}
