//! Instance store: persisted instance records and their lifecycle hooks.
//!
//! # Storage layout
//!
//! ```text
//! <home>/.watchfolder/
//!   instances/
//!     <instance id>.yaml     (one record per instance, mode 0600)
//! ```
//!
//! Creating an instance persists its record and then provisions its folder;
//! destroying one tears the folder down first and only then deletes the
//! record, so a refused teardown leaves the instance intact.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::WatchSetup;
use crate::error::{io_err, StoreError};
use crate::instance::WatchInstance;
use crate::types::InstanceId;

/// Lookup and lifecycle operations over persisted instances.
pub trait InstanceStore: Send + Sync {
    /// Fails with [`StoreError::InstanceNotFound`] for unknown ids.
    fn find_instance_by_id(&self, id: &InstanceId) -> Result<WatchInstance, StoreError>;

    /// Persist a new instance of `definition` and provision its folder.
    /// A fresh id is generated when `id` is `None`.
    fn create(&self, definition: &str, id: Option<InstanceId>) -> Result<WatchInstance, StoreError>;

    /// Tear down the instance folder, then delete the record.
    fn destroy(&self, id: &InstanceId) -> Result<(), StoreError>;

    /// Every persisted record, sorted by id.
    fn list(&self) -> Result<Vec<InstanceRecord>, StoreError>;
}

/// On-disk instance record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub definition: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.watchfolder`
pub fn state_dir_at(home: &Path) -> PathBuf {
    home.join(".watchfolder")
}

/// `<home>/.watchfolder/instances`
pub fn instances_dir_at(home: &Path) -> PathBuf {
    state_dir_at(home).join("instances")
}

/// `<home>/.watchfolder/instances/<id>.yaml`: pure, no I/O.
pub fn record_path_at(home: &Path, id: &InstanceId) -> PathBuf {
    instances_dir_at(home).join(format!("{id}.yaml"))
}

// ---------------------------------------------------------------------------
// YAML-backed store
// ---------------------------------------------------------------------------

/// Stores one YAML record per instance below `<home>/.watchfolder/`.
#[derive(Debug, Clone)]
pub struct YamlInstanceStore {
    home: PathBuf,
    setup: Arc<WatchSetup>,
}

impl YamlInstanceStore {
    pub fn new(home: impl Into<PathBuf>, setup: Arc<WatchSetup>) -> Self {
        Self {
            home: home.into(),
            setup,
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    fn load_record(&self, id: &InstanceId) -> Result<InstanceRecord, StoreError> {
        let path = record_path_at(&self.home, id);
        if !path.exists() {
            return Err(StoreError::InstanceNotFound { id: id.to_string() });
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        serde_yaml::from_str(&contents).map_err(|source| StoreError::Parse { path, source })
    }

    /// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
    fn save_record(&self, record: &InstanceRecord) -> Result<(), StoreError> {
        let dir = instances_dir_at(&self.home);
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
            set_dir_permissions(&dir)?;
        }
        let path = record_path_at(&self.home, &record.id);
        let tmp = path.with_file_name(format!("{}.yaml.tmp", record.id));

        let yaml = serde_yaml::to_string(record)?;
        std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
        set_file_permissions(&tmp)?;
        std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    fn instance_for(&self, record: &InstanceRecord) -> Result<WatchInstance, StoreError> {
        let definition = self.setup.definition(&record.definition)?;
        Ok(WatchInstance::new(record.id.clone(), Arc::clone(definition)))
    }
}

impl InstanceStore for YamlInstanceStore {
    fn find_instance_by_id(&self, id: &InstanceId) -> Result<WatchInstance, StoreError> {
        let record = self.load_record(id)?;
        self.instance_for(&record)
    }

    fn create(&self, definition: &str, id: Option<InstanceId>) -> Result<WatchInstance, StoreError> {
        // Resolve first so an unknown definition leaves no record behind.
        self.setup.definition(definition)?;

        let id = id.unwrap_or_else(InstanceId::generate);
        if record_path_at(&self.home, &id).exists() {
            return Err(StoreError::AlreadyExists { id: id.to_string() });
        }
        let record = InstanceRecord {
            id,
            definition: definition.to_string(),
            created_at: Utc::now(),
        };
        self.save_record(&record)?;

        let instance = self.instance_for(&record)?;
        instance.on_create()?;
        tracing::info!(instance = %record.id, definition, "created watch folder instance");
        Ok(instance)
    }

    fn destroy(&self, id: &InstanceId) -> Result<(), StoreError> {
        let instance = self.find_instance_by_id(id)?;
        instance.on_destroy()?;

        let path = record_path_at(&self.home, id);
        std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
        tracing::info!(instance = %id, "destroyed watch folder instance");
        Ok(())
    }

    fn list(&self) -> Result<Vec<InstanceRecord>, StoreError> {
        let dir = instances_dir_at(&self.home);
        if !dir.exists() {
            return Ok(vec![]);
        }
        let mut entries: Vec<_> = std::fs::read_dir(&dir)
            .map_err(|e| io_err(&dir, e))?
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .map(|name| name.ends_with(".yaml"))
                    .unwrap_or(false)
            })
            .collect();
        entries.sort_by_key(|e| e.file_name());

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let path = entry.path();
            let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
            let record: InstanceRecord = serde_yaml::from_str(&contents)
                .map_err(|source| StoreError::Parse { path, source })?;
            records.push(record);
        }
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::WatchDefinition;
    use tempfile::TempDir;

    fn store_with_definition(home: &TempDir, root: &TempDir) -> YamlInstanceStore {
        let mut setup = WatchSetup::new();
        let mut def = WatchDefinition::new("uploads");
        def.set_root(root.path(), setup.registry_mut()).expect("root");
        def.set_folders(["in"]).expect("folders");
        setup.add_definition(def).expect("definition");
        YamlInstanceStore::new(home.path(), Arc::new(setup))
    }

    #[test]
    fn record_path_is_correct() {
        let home = TempDir::new().expect("home");
        let id = InstanceId::parse("abc").unwrap();
        assert!(record_path_at(home.path(), &id).ends_with(".watchfolder/instances/abc.yaml"));
    }

    #[test]
    fn create_persists_and_provisions() {
        let home = TempDir::new().expect("home");
        let root = TempDir::new().expect("root");
        let store = store_with_definition(&home, &root);

        let instance = store
            .create("uploads", Some(InstanceId::parse("abc").unwrap()))
            .expect("create");
        assert!(instance.path().unwrap().join("in").is_dir());

        let found = store.find_instance_by_id(instance.id()).expect("find");
        assert_eq!(found.definition().name(), "uploads");

        let tmp = record_path_at(home.path(), instance.id()).with_file_name("abc.yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn create_generates_id_when_missing() {
        let home = TempDir::new().expect("home");
        let root = TempDir::new().expect("root");
        let store = store_with_definition(&home, &root);
        let instance = store.create("uploads", None).expect("create");
        assert_eq!(instance.id().as_str().len(), 32);
    }

    #[test]
    fn create_rejects_duplicates_and_unknown_definitions() {
        let home = TempDir::new().expect("home");
        let root = TempDir::new().expect("root");
        let store = store_with_definition(&home, &root);
        let id = InstanceId::parse("abc").unwrap();
        store.create("uploads", Some(id.clone())).expect("create");

        assert!(matches!(
            store.create("uploads", Some(id)),
            Err(StoreError::AlreadyExists { .. })
        ));
        assert!(matches!(
            store.create("nope", None),
            Err(StoreError::Config(_))
        ));
        assert_eq!(store.list().expect("list").len(), 1);
    }

    #[test]
    fn find_missing_instance_is_not_found() {
        let home = TempDir::new().expect("home");
        let root = TempDir::new().expect("root");
        let store = store_with_definition(&home, &root);
        let err = store
            .find_instance_by_id(&InstanceId::parse("ghost").unwrap())
            .unwrap_err();
        assert!(matches!(err, StoreError::InstanceNotFound { .. }));
    }

    #[test]
    fn destroy_removes_folder_and_record() {
        let home = TempDir::new().expect("home");
        let root = TempDir::new().expect("root");
        let store = store_with_definition(&home, &root);
        let instance = store.create("uploads", None).expect("create");
        let path = instance.path().unwrap();

        store.destroy(instance.id()).expect("destroy");
        assert!(!path.exists());
        assert!(store.list().expect("list").is_empty());
    }
}
