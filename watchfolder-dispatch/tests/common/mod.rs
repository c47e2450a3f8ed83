//! Shared fixture: one `uploads` definition with a recording action, a YAML
//! instance store in a temp home, and an in-memory queue.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use watchfolder_core::{
    ActionError, ActionHandle, CallbackOptions, EventKind, InstanceId, InstanceStore,
    WatchDefinition, WatchInstance, WatchSetup, YamlInstanceStore,
};
use watchfolder_dispatch::{Engine, MemoryQueue};

pub type Calls = Arc<Mutex<Vec<(EventKind, PathBuf)>>>;

pub struct Fixture {
    pub root: TempDir,
    pub home: TempDir,
    pub calls: Calls,
    pub queue: Arc<MemoryQueue>,
    pub store: Arc<YamlInstanceStore>,
    pub engine: Engine,
}

pub fn recorder(name: &str, calls: &Calls) -> ActionHandle {
    let calls = Arc::clone(calls);
    ActionHandle::new(
        name,
        Arc::new(move |kind: EventKind, path: &Path| -> Result<(), ActionError> {
            calls.lock().unwrap().push((kind, path.to_path_buf()));
            Ok(())
        }),
    )
}

pub fn failing(name: &str) -> ActionHandle {
    ActionHandle::new(
        name,
        Arc::new(|_: EventKind, path: &Path| -> Result<(), ActionError> {
            Err(ActionError::Failed(format!("cannot process {}", path.display())))
        }),
    )
}

impl Fixture {
    /// Build a fixture whose definition carries the callbacks added by
    /// `configure`.
    pub fn new(configure: impl FnOnce(&mut WatchDefinition, &Calls)) -> Self {
        let root = TempDir::new().expect("root");
        let home = TempDir::new().expect("home");
        let calls = Calls::default();

        let mut setup = WatchSetup::new();
        let mut def = WatchDefinition::new("uploads");
        def.set_root(root.path(), setup.registry_mut()).expect("set_root");
        def.set_folders(["in", "out"]).expect("folders");
        configure(&mut def, &calls);
        setup.add_definition(def).expect("definition");

        let setup = Arc::new(setup);
        let queue = Arc::new(MemoryQueue::new());
        let store = Arc::new(YamlInstanceStore::new(home.path(), Arc::clone(&setup)));
        let engine = Engine::new(setup, store.clone(), queue.clone());
        Self {
            root,
            home,
            calls,
            queue,
            store,
            engine,
        }
    }

    /// Fixture with a single recording callback.
    pub fn with_callback(options: CallbackOptions) -> Self {
        Self::new(|def, calls| {
            def.add_callback(recorder("record", calls), options)
                .expect("callback");
        })
    }

    pub fn create(&self, id: &str) -> WatchInstance {
        self.store
            .create("uploads", Some(InstanceId::parse(id).expect("id")))
            .expect("create instance")
    }

    /// Write `contents` to `<root>/<id>/<relative>`, creating parents.
    pub fn drop_file(&self, id: &str, relative: &str, contents: &[u8]) -> PathBuf {
        let path = self.root_path().join(id).join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, contents).expect("write");
        path
    }

    /// Registered (expanded) root path.
    pub fn root_path(&self) -> PathBuf {
        self.engine.setup().registry().roots()[0].clone()
    }

    pub fn calls(&self) -> Vec<(EventKind, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}
