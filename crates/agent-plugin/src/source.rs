//! Where plugin content comes from.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// Looks up plugin content by source reference.
pub trait SourceStore {
    fn read(&self, reference: &str) -> std::io::Result<Vec<u8>>;
}

/// Source files laid out under a single directory (the bundle's `files/`).
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, reference: &str) -> std::io::Result<PathBuf> {
        let rel = Path::new(reference);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if reference.is_empty() || escapes {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("source reference '{reference}' must be relative to {}", self.root.display()),
            ));
        }
        Ok(self.root.join(rel))
    }
}

impl SourceStore for DirectorySource {
    fn read(&self, reference: &str) -> std::io::Result<Vec<u8>> {
        let path = self.locate(reference)?;
        std::fs::read(path)
    }
}

/// In-memory sources, keyed by reference.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.files.insert(reference.into(), content.into());
    }
}

impl SourceStore for MemorySource {
    fn read(&self, reference: &str) -> std::io::Result<Vec<u8>> {
        self.files.get(reference).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no source named '{reference}'"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_source_reads_relative_files() {
        let tmp = tempfile::tempdir().expect("tmp");
        std::fs::create_dir_all(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub/net.rb"), b"plugin").unwrap();
        let src = DirectorySource::new(tmp.path());
        assert_eq!(src.read("sub/net.rb").unwrap(), b"plugin".to_vec());
        assert_eq!(
            src.read("missing.rb").unwrap_err().kind(),
            std::io::ErrorKind::NotFound
        );
    }

    #[test]
    fn directory_source_refuses_escaping_references() {
        let tmp = tempfile::tempdir().expect("tmp");
        let src = DirectorySource::new(tmp.path());
        for bad in ["../etc/passwd", "/etc/passwd", ""] {
            assert_eq!(
                src.read(bad).unwrap_err().kind(),
                std::io::ErrorKind::InvalidInput,
                "{bad}"
            );
        }
    }

    #[test]
    fn memory_source_lookup() {
        let mut src = MemorySource::new();
        src.insert("a.rb", "A");
        assert_eq!(src.read("a.rb").unwrap(), b"A".to_vec());
        assert!(src.read("b.rb").is_err());
    }
}
