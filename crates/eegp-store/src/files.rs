//! Physical storage of record tables.

use crate::error::Result;
use eegp_lib::io::Table;
use log::{debug, warn};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Tables addressed by paths relative to the store root.
pub trait FileStore: Send + Sync {
    fn read_table(&self, path: &str) -> Result<Table>;
    fn write_table(&self, path: &str, table: &Table) -> Result<()>;
    fn copy(&self, from: &str, to: &str) -> Result<()>;
    /// Removing a missing file succeeds.
    fn remove(&self, path: &str) -> Result<()>;
    fn exists(&self, path: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct DiskFileStore {
    root: PathBuf,
}

impl DiskFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl FileStore for DiskFileStore {
    fn read_table(&self, path: &str) -> Result<Table> {
        let full = self.resolve(path);
        if !full.exists() {
            return Err(eegp_lib::Error::not_found(format!("file {}", path)).into());
        }
        Ok(Table::read(&full)?)
    }

    fn write_table(&self, path: &str, table: &Table) -> Result<()> {
        table.write(&self.resolve(path))?;
        debug!("wrote {} rows to {}", table.n_rows(), path);
        Ok(())
    }

    fn copy(&self, from: &str, to: &str) -> Result<()> {
        let target = self.resolve(to);
        Self::ensure_parent(&target)?;
        fs::copy(self.resolve(from), target)?;
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<()> {
        match fs::remove_file(self.resolve(path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("file {} was already gone", path);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }
}
