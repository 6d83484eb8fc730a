//! Domain-level errors (no external dependencies)

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error returned by host-supplied hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Domain errors represent resolution failures.
/// These are independent of infrastructure concerns.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("the file {path} is included/inserted in itself")]
    SelfInclusion { path: String },

    #[error("cannot read a file out of the project folder: {} (root: {})", path.display(), root.display())]
    OutOfRoot { path: PathBuf, root: PathBuf },

    #[error("internal stack error: {0}")]
    StackConsistency(String),

    #[error("failed to include \"{path}\" in {}: {source}", parent.as_deref().map(|p| format!("\"{p}\"")).unwrap_or_else(|| "the source".to_string()))]
    Inclusion {
        path: String,
        parent: Option<String>,
        #[source]
        source: Box<DomainError>,
    },

    #[error("cannot read {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode {} as {encoding}", path.display())]
    Decode { path: PathBuf, encoding: String },

    #[error("[Template: {path}] {message}")]
    Template { path: String, message: String },

    #[error("{hook} hook failed on {path}: {source}")]
    Hook {
        hook: &'static str,
        path: String,
        #[source]
        source: BoxError,
    },

    #[error("cannot write copy {}: {source}", path.display())]
    CopyWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DomainError {
    /// Fatal errors abort the whole resolution and are never re-wrapped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DomainError::SelfInclusion { .. }
                | DomainError::OutOfRoot { .. }
                | DomainError::StackConsistency(_)
        )
    }

    /// Innermost error below any `Inclusion` wrappers.
    pub fn root_cause(&self) -> &DomainError {
        let mut current = self;
        while let DomainError::Inclusion { source, .. } = current {
            current = source;
        }
        current
    }

    pub fn template(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Template {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
