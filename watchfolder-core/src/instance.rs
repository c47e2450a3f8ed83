//! Watch instances: one concrete monitored folder, `<root>/<id>`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::definition::WatchDefinition;
use crate::error::{io_err, ConfigError, StoreError};
use crate::types::InstanceId;

/// Teardown refuses paths shorter than this many bytes.
pub const MIN_TEARDOWN_PATH_LEN: usize = 6;

#[derive(Debug, Clone)]
pub struct WatchInstance {
    id: InstanceId,
    definition: Arc<WatchDefinition>,
}

impl WatchInstance {
    pub fn new(id: InstanceId, definition: Arc<WatchDefinition>) -> Self {
        Self { id, definition }
    }

    pub fn id(&self) -> &InstanceId {
        &self.id
    }

    pub fn definition(&self) -> &WatchDefinition {
        &self.definition
    }

    pub fn root(&self) -> Result<&Path, ConfigError> {
        self.definition
            .root()
            .ok_or_else(|| ConfigError::NoRoot {
                definition: self.definition.name().to_string(),
            })
    }

    /// `<root>/<id>`
    pub fn path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.root()?.join(self.id.as_str()))
    }

    /// All non-directory entries below the instance folder, sorted.
    ///
    /// An instance whose folder does not exist has no files.
    pub fn list_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let path = self.path()?;
        if !path.exists() {
            return Ok(vec![]);
        }
        let mut files = Vec::new();
        for entry in WalkDir::new(&path).min_depth(1) {
            let entry = entry.map_err(|e| {
                let at = e.path().map(Path::to_path_buf).unwrap_or_else(|| path.clone());
                io_err(at, e.into())
            })?;
            if !entry.file_type().is_dir() {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Provision the instance folder and every configured subfolder.
    pub fn on_create(&self) -> Result<(), StoreError> {
        let path = self.path()?;
        fs::create_dir_all(&path).map_err(|e| io_err(&path, e))?;
        for folder in self.definition.folders() {
            let dir = path.join(folder);
            fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        }
        tracing::debug!(instance = %self.id, path = %path.display(), "provisioned watch folder");
        Ok(())
    }

    /// Recursively remove the instance folder.
    ///
    /// Fails with [`ConfigError::PathTooShort`] and deletes nothing when the
    /// resolved path is shorter than [`MIN_TEARDOWN_PATH_LEN`].
    pub fn on_destroy(&self) -> Result<(), StoreError> {
        let path = self.path()?;
        if path.as_os_str().len() < MIN_TEARDOWN_PATH_LEN {
            return Err(ConfigError::PathTooShort { path }.into());
        }
        if path.exists() {
            fs::remove_dir_all(&path).map_err(|e| io_err(&path, e))?;
            tracing::debug!(instance = %self.id, path = %path.display(), "removed watch folder");
        }
        Ok(())
    }

    /// `path` relative to the instance folder, if it lies inside it.
    pub fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        let base = self.path().ok()?;
        path.strip_prefix(base).ok()
    }

    /// Whether `path` lies strictly below `<instance path>/<folder>/`.
    pub fn contains_in_folder(&self, path: &Path, folder: &str) -> bool {
        let Ok(base) = self.path() else {
            return false;
        };
        path.strip_prefix(base.join(folder))
            .map(|rest| rest.components().next().is_some())
            .unwrap_or(false)
    }
}
