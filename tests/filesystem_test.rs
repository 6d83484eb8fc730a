//! Tests for the real FileSystem implementation

use std::fs;
use std::path::Path;

use sniff::infrastructure::traits::{FileSystem, RealFileSystem};
use tempfile::TempDir;

// ============================================================
// read tests
// ============================================================

#[test]
fn given_latin1_bytes_when_read_then_returns_raw_bytes() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("a.js");
    fs::write(&file, [b'c', b'a', b'f', 0xE9]).unwrap();

    // Act
    let bytes = RealFileSystem.read(&file).unwrap();

    // Assert
    assert_eq!(bytes, vec![b'c', b'a', b'f', 0xE9]);
}

#[test]
fn given_missing_file_when_read_then_not_found() {
    // Arrange
    let temp = TempDir::new().unwrap();

    // Act
    let err = RealFileSystem.read(&temp.path().join("missing.js")).unwrap_err();

    // Assert
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
}

// ============================================================
// write_bytes / ensure_parent tests
// ============================================================

#[test]
fn given_nested_target_when_ensure_parent_then_write_succeeds() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("out/lib/deep/b.js");
    let fs_impl = RealFileSystem;

    // Act
    fs_impl.ensure_parent(&target).unwrap();
    fs_impl.write_bytes(&target, b"B").unwrap();

    // Assert
    assert!(temp.path().join("out/lib/deep").is_dir());
    assert_eq!(fs::read_to_string(&target).unwrap(), "B");
}

#[test]
fn given_existing_parent_when_ensure_parent_then_noop() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("a.js");

    // Act / Assert
    assert!(RealFileSystem.ensure_parent(&target).is_ok());
    assert!(RealFileSystem.ensure_parent(Path::new("a.js")).is_ok());
}

#[test]
fn given_bytes_when_write_bytes_then_overwrites() {
    // Arrange
    let temp = TempDir::new().unwrap();
    let target = temp.path().join("a.js");
    fs::write(&target, "old content").unwrap();

    // Act
    RealFileSystem.write_bytes(&target, b"new").unwrap();

    // Assert
    assert_eq!(fs::read(&target).unwrap(), b"new");
}

#[test]
fn given_missing_parent_when_write_bytes_without_ensure_then_error() {
    // Arrange
    let temp = TempDir::new().unwrap();

    // Act
    let result = RealFileSystem.write_bytes(&temp.path().join("nope/a.js"), b"A");

    // Assert
    assert!(result.is_err());
}
