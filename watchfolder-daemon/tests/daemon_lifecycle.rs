//! End-to-end daemon run: real watcher, real socket, in-memory queue.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::{sleep, timeout, Instant};
use watchfolder_core::{
    ActionError, ActionHandle, CallbackOptions, EventKind, InstanceId, InstanceStore, WatchDefinition,
    WatchSetup, YamlInstanceStore,
};
use watchfolder_daemon::{request_status, request_stop, run};
use watchfolder_dispatch::MemoryQueue;

type Calls = Arc<Mutex<Vec<(EventKind, PathBuf)>>>;

fn setup_with_recorder(root: &Path, calls: &Calls) -> Arc<WatchSetup> {
    let calls = Arc::clone(calls);
    let mut setup = WatchSetup::new();
    setup.set_latency(Duration::from_millis(50));
    let mut def = WatchDefinition::new("uploads");
    def.set_root(root, setup.registry_mut()).expect("root");
    def.set_folders(["in"]).expect("folders");
    def.add_callback(
        ActionHandle::new(
            "record",
            Arc::new(move |kind: EventKind, path: &Path| -> Result<(), ActionError> {
                calls.lock().unwrap().push((kind, path.to_path_buf()));
                Ok(())
            }),
        ),
        CallbackOptions::new().folders(["in"]).when(["added", "modified"]),
    )
    .expect("callback");
    setup.add_definition(def).expect("definition");
    Arc::new(setup)
}

async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_file_reaches_the_action_and_daemon_stops_on_request() {
    let home = TempDir::new().expect("home");
    let root = TempDir::new().expect("root");
    let calls = Calls::default();

    let setup = setup_with_recorder(root.path(), &calls);
    let store = Arc::new(YamlInstanceStore::new(home.path(), Arc::clone(&setup)));
    let instance = store
        .create("uploads", Some(InstanceId::parse("abc").expect("id")))
        .expect("create");

    let daemon = tokio::spawn(run(
        home.path().to_path_buf(),
        setup,
        store,
        Arc::new(MemoryQueue::new()),
    ));

    let home_path = home.path().to_path_buf();
    let status = tokio::task::spawn_blocking(move || request_status(&home_path))
        .await
        .expect("join")
        .expect("status");
    assert_eq!(status["running"], serde_json::json!(true));
    assert_eq!(status["roots"].as_array().map(Vec::len), Some(1));

    // The socket can come up before the watcher has registered the root.
    sleep(Duration::from_millis(500)).await;
    let file = instance.path().expect("path").join("in").join("x.bin");
    fs::write(&file, b"payload").expect("write");

    let fired = wait_until(Duration::from_secs(10), || {
        calls.lock().unwrap().iter().any(|(_, p)| p.ends_with("in/x.bin"))
    })
    .await;
    assert!(fired, "action did not fire for the dropped file");

    let home_path = home.path().to_path_buf();
    tokio::task::spawn_blocking(move || request_stop(&home_path))
        .await
        .expect("join")
        .expect("stop");

    timeout(Duration::from_secs(5), daemon)
        .await
        .expect("daemon stops in time")
        .expect("join")
        .expect("daemon result");
    assert!(!watchfolder_daemon::paths::socket_path(home.path()).exists());
}
