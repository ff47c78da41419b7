//! Source provider abstraction for filesystem-independent compilation.
//!
//! The [`SourceProvider`] trait abstracts file I/O so the compiler can
//! resolve scenario files, route maps, includes and the structure/station/
//! signal lists without touching `std::fs` directly. Tests use
//! [`InMemoryProvider`] to compile routes from string fixtures.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Trait that abstracts file I/O for the compile pipeline.
pub trait SourceProvider {
    /// Read the text of a source file.
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error>;

    /// Resolve a relative reference (include, object list, ...) against a
    /// base directory.
    fn resolve(&self, base: &Path, reference: &str) -> PathBuf;

    /// Whether the given path names an existing file.
    fn exists(&self, path: &Path) -> bool;
}

/// Default filesystem-backed source provider.
pub struct FileSystemProvider;

impl SourceProvider for FileSystemProvider {
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error> {
        std::fs::read_to_string(path)
    }

    fn resolve(&self, base: &Path, reference: &str) -> PathBuf {
        // route files written on Windows routinely use backslash separators
        let normalized = reference.replace('\\', "/");
        base.join(normalized)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// In-memory source provider for tests.
///
/// Maps paths to source text. Resolution normalizes `.` and `..` components
/// without touching the filesystem.
pub struct InMemoryProvider {
    files: HashMap<PathBuf, String>,
}

impl InMemoryProvider {
    pub fn new(files: HashMap<PathBuf, String>) -> Self {
        Self { files }
    }

    /// Convenience constructor from `(path, text)` pairs.
    pub fn from_pairs<P: Into<PathBuf>, S: Into<String>>(
        pairs: impl IntoIterator<Item = (P, S)>,
    ) -> Self {
        Self {
            files: pairs
                .into_iter()
                .map(|(p, s)| (p.into(), s.into()))
                .collect(),
        }
    }

    fn normalize_path(path: &Path) -> PathBuf {
        let mut components = Vec::new();
        for component in path.components() {
            match component {
                std::path::Component::CurDir => {}
                std::path::Component::ParentDir => {
                    if !components.is_empty() {
                        components.pop();
                    }
                }
                other => components.push(other),
            }
        }
        components.iter().collect()
    }
}

impl SourceProvider for InMemoryProvider {
    fn read_source(&self, path: &Path) -> Result<String, std::io::Error> {
        let normalized = Self::normalize_path(path);
        self.files.get(&normalized).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file not found in memory: {}", normalized.display()),
            )
        })
    }

    fn resolve(&self, base: &Path, reference: &str) -> PathBuf {
        let normalized = reference.replace('\\', "/");
        Self::normalize_path(&base.join(normalized))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(&Self::normalize_path(path))
    }
}
