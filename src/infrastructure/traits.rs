//! I/O boundary traits for testability
//!
//! The includer reads sources and writes copies only through [`FileSystem`],
//! so tests can swap in an in-memory implementation.

use std::io;
use std::path::{Path, PathBuf};

/// Filesystem abstraction for testability.
pub trait FileSystem: Send + Sync {
    /// Read raw file bytes; decoding is the caller's business.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Write already encoded bytes, replacing the file.
    fn write_bytes(&self, path: &Path, content: &[u8]) -> io::Result<()>;

    /// Create the parent directories of `path`.
    fn ensure_parent(&self, path: &Path) -> io::Result<()>;
}

/// Real filesystem implementation.
#[derive(Debug, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write_bytes(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        std::fs::write(path, content)
    }

    fn ensure_parent(&self, path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
            _ => Ok(()),
        }
    }
}

// ============================================================
// IN-MEMORY IMPLEMENTATION
// ============================================================

/// Map-backed filesystem for tests and for resolving sources that never
/// touch the disk. Directories are implicit.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: std::sync::RwLock<std::collections::BTreeMap<PathBuf, Vec<u8>>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_file(self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(path.into(), content.into());
        }
    }

    pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.read().ok()?.get(path).cloned()
    }
}

impl FileSystem for MemoryFileSystem {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.get(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such file: {}", path.display()),
            )
        })
    }

    fn write_bytes(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        self.files
            .write()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory filesystem lock poisoned"))?
            .insert(path.to_path_buf(), content.to_vec());
        Ok(())
    }

    fn ensure_parent(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_memory_fs_when_written_then_readable() {
        let fs = MemoryFileSystem::new().with_file("/p/src/a.js", "a");
        fs.ensure_parent(Path::new("/p/out/b.js")).unwrap();
        fs.write_bytes(Path::new("/p/out/b.js"), b"b").unwrap();

        assert_eq!(fs.read(Path::new("/p/src/a.js")).unwrap(), b"a".to_vec());
        assert_eq!(fs.get(Path::new("/p/out/b.js")).unwrap(), b"b".to_vec());
        assert_eq!(
            fs.read(Path::new("/p/missing.js")).unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }
}
