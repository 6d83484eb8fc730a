//! Service container for dependency injection
//!
//! Wires the includer with its settings, filesystem and host options.

use std::path::PathBuf;
use std::sync::Arc;

use crate::application::{ApplicationResult, Includer, IncluderOptions};
use crate::config::Settings;
use crate::infrastructure::traits::{FileSystem, RealFileSystem};

/// Container holding the shared dependencies of a build.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    /// Root every resolved file must stay within
    pub project_root: PathBuf,
}

impl ServiceContainer {
    /// Create a service container with the real filesystem.
    pub fn new(settings: Settings, project_root: impl Into<PathBuf>) -> Self {
        Self::with_deps(settings, project_root, Arc::new(RealFileSystem))
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(
        settings: Settings,
        project_root: impl Into<PathBuf>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            fs,
            project_root: project_root.into(),
        }
    }

    /// A fresh includer session; every build gets its own cache and map.
    pub fn includer(&self) -> ApplicationResult<Includer> {
        self.includer_with(IncluderOptions::new())
    }

    pub fn includer_with(&self, options: IncluderOptions) -> ApplicationResult<Includer> {
        let options = options.with_project_root(self.project_root.clone());
        Ok(Includer::new((*self.settings).clone(), Arc::clone(&self.fs))?.with_options(options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::traits::MemoryFileSystem;

    #[test]
    fn given_container_when_includer_created_then_rooted_at_project() {
        let fs = Arc::new(MemoryFileSystem::new().with_file("/p/a.txt", "A"));
        let container = ServiceContainer::with_deps(Settings::default(), "/p", fs);

        let mut includer = container.includer().unwrap();

        assert_eq!(includer.project_root(), std::path::Path::new("/p"));
        assert_eq!(includer.resolve("a.txt", None).unwrap(), "A");
    }
}
