use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::AssetError;

/// Byte source for named assets (`backgrounds/tile1.png`, ...).
pub trait AssetSource {
    fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>, AssetError>;
}

/// Reads assets from a directory tree.
#[derive(Debug, Clone)]
pub struct FsAssetSource {
    root: PathBuf,
}

impl FsAssetSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetSource for FsAssetSource {
    fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>, AssetError> {
        let full = self.root.join(path);
        log::debug!("fetching asset {}", full.display());
        std::fs::read(&full).map_err(|source| match source.kind() {
            ErrorKind::NotFound => AssetError::NotFound { path: full },
            _ => AssetError::Io { path: full, source },
        })
    }
}

/// In-memory asset table, for tests and embedded content.
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetSource {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.entries.insert(path.into(), bytes.into());
    }

    pub fn with(mut self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }
}

impl AssetSource for MemoryAssetSource {
    fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>, AssetError> {
        self.entries
            .get(path)
            .cloned()
            .ok_or_else(|| AssetError::NotFound { path: PathBuf::from(path) })
    }
}
