//! Node store persisted as a single JSON document.
//!
//! Every mutation loads the document, applies the change in memory and
//! replaces the file atomically (temp file + rename), so a failed batch never
//! reaches disk. There is no cross-process locking; concurrent writers race.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::store::{DocumentBackend, StoreDocument};

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an empty store file if none exists yet.
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        save_document(&self.path, &StoreDocument::default())
    }
}

impl DocumentBackend for FileStore {
    fn read<T>(&self, f: impl FnOnce(&StoreDocument) -> T) -> Result<T> {
        let doc = load_document(&self.path)?;
        Ok(f(&doc))
    }

    fn write<T>(&self, f: impl FnOnce(&mut StoreDocument) -> Result<T>) -> Result<T> {
        let mut doc = load_document(&self.path)?;
        let out = f(&mut doc)?;
        save_document(&self.path, &doc)?;
        Ok(out)
    }
}

/// Load the store document. A missing file is an empty store.
fn load_document(path: &Path) -> Result<StoreDocument> {
    if !path.exists() {
        return Ok(StoreDocument::default());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read store {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse store {}", path.display()))
}

fn save_document(path: &Path, doc: &StoreDocument) -> Result<()> {
    debug!(path = %path.display(), "writing store");
    let mut buf = serde_json::to_string_pretty(doc).context("serialize store")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("store path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp store {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace store {}", path.display()))?;
    Ok(())
}
