//! Context for bare I/O errors raised outside the file system abstraction

use std::io;
use std::path::Path;

use crate::application::{ApplicationError, ApplicationResult};

/// Turns `io::Result` into `ApplicationResult` naming the action and the path.
pub trait IoResultExt<T> {
    /// ```ignore
    /// std::fs::write(&target, text).with_path_context("write output", &target)?;
    /// ```
    fn with_path_context(self, action: &str, path: &Path) -> ApplicationResult<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn with_path_context(self, action: &str, path: &Path) -> ApplicationResult<T> {
        self.map_err(|e| ApplicationError::OperationFailed {
            context: format!("{}: {}", action, path.display()),
            source: Box::new(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_io_error_when_adding_context_then_operation_failed_names_path() {
        let result: io::Result<()> = Err(io::Error::new(io::ErrorKind::NotFound, "gone"));

        let err = result
            .with_path_context("write output", Path::new("out/a.js"))
            .unwrap_err();

        assert!(matches!(err, ApplicationError::OperationFailed { .. }));
        assert_eq!(err.to_string(), "operation failed: write output: out/a.js");
    }
}
