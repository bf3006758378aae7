//! Asset bundles: named byte members such as the lexicon and glyph images.

use crate::error::BundleError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;
use zip::result::ZipError;

#[async_trait]
pub trait AssetBundle: Send + Sync {
    /// Bytes of the member at `path`. A leading `/` is ignored.
    async fn member(&self, path: &str) -> Result<Vec<u8>, BundleError>;
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// An `assets.zip` blob held in memory.
pub struct ZipBundle {
    archive: Mutex<ZipArchive<Cursor<Vec<u8>>>>,
}

impl ZipBundle {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, BundleError> {
        let archive = ZipArchive::new(Cursor::new(bytes))?;
        Ok(Self {
            archive: Mutex::new(archive),
        })
    }

    pub async fn open(path: impl AsRef<Path>) -> Result<Self, BundleError> {
        let bytes = tokio::fs::read(path).await?;
        Self::from_bytes(bytes)
    }

    pub fn member_names(&self) -> Vec<String> {
        self.archive
            .lock()
            .file_names()
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl AssetBundle for ZipBundle {
    async fn member(&self, path: &str) -> Result<Vec<u8>, BundleError> {
        let name = normalize(path);
        let mut archive = self.archive.lock();
        let mut file = match archive.by_name(name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Err(BundleError::MemberNotFound(name.to_string())),
            Err(err) => return Err(err.into()),
        };
        let mut bytes = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// An already unpacked bundle on disk.
#[derive(Debug, Clone)]
pub struct DirBundle {
    root: PathBuf,
}

impl DirBundle {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(normalize(path));
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl AssetBundle for DirBundle {
    async fn member(&self, path: &str) -> Result<Vec<u8>, BundleError> {
        let full = self
            .resolve(path)
            .ok_or_else(|| BundleError::MemberNotFound(path.to_string()))?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(BundleError::MemberNotFound(normalize(path).to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryBundle {
    members: HashMap<String, Vec<u8>>,
}

impl MemoryBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_member(mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.members
            .insert(normalize(path).to_string(), bytes.into());
        self
    }
}

#[async_trait]
impl AssetBundle for MemoryBundle {
    async fn member(&self, path: &str) -> Result<Vec<u8>, BundleError> {
        let name = normalize(path);
        self.members
            .get(name)
            .cloned()
            .ok_or_else(|| BundleError::MemberNotFound(name.to_string()))
    }
}
