//! Batch dispatch: routing misses and per-path failure isolation.

mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use watchfolder_core::{CallbackOptions, Checksum, EventKind, InstanceId};
use watchfolder_dispatch::{
    ChangeBatch, DebounceTask, DispatchReport, Engine, MemoryQueue, PathOutcome, QueueError,
    TaskHandle, TaskQueue,
};

use common::{failing, recorder, Fixture};

#[test]
fn paths_outside_every_root_are_unrouted() {
    let fx = Fixture::with_callback(CallbackOptions::new());
    let outcome = fx
        .engine
        .dispatch_path(EventKind::Added, &PathBuf::from("/elsewhere/abc/in/x.bin"))
        .expect("dispatch");
    assert_eq!(outcome, PathOutcome::Unrouted);
}

#[test]
fn unknown_instance_is_logged_and_skipped() {
    let fx = Fixture::with_callback(CallbackOptions::new());
    let orphan = fx.drop_file("ghost", "in/x.bin", b"data");
    let known = {
        fx.create("abc");
        fx.drop_file("abc", "in/x.bin", b"data")
    };

    let report = fx.engine.dispatch(EventKind::Added, &[orphan, known]);
    assert_eq!(report.missing, 1);
    assert_eq!(report.handled, 1);
    assert_eq!(report.failed, 0);
}

#[test]
fn failing_action_only_affects_its_own_task() {
    let fx = Fixture::new(|def, calls| {
        def.add_callback(failing("broken"), CallbackOptions::new().folders(["out"]))
            .expect("broken");
        def.add_callback(recorder("record", calls), CallbackOptions::new().folders(["in"]))
            .expect("record");
    });
    let inst = fx.create("abc");
    let bad = fx.drop_file("abc", "out/a.bin", b"a");
    let good = fx.drop_file("abc", "in/b.bin", b"b");

    // Rechecks with stale snapshots fire undelayed rules immediately.
    let stale = Checksum::from("stale");
    let tasks: Vec<DebounceTask> = [&bad, &good]
        .into_iter()
        .map(|path| DebounceTask {
            instance_id: inst.id().clone(),
            kind: EventKind::Added,
            path: path.clone(),
            checksum: stale.clone(),
            delay: None,
        })
        .collect();

    assert!(tasks[0].execute(&fx.engine).is_err());
    assert!(tasks[1].execute(&fx.engine).is_ok());
    assert_eq!(fx.calls(), vec![(EventKind::Added, good)]);
}

#[test]
fn batch_dispatch_counts_every_kind() {
    let fx = Fixture::with_callback(CallbackOptions::new().delay(3));
    fx.create("abc");
    let added = fx.drop_file("abc", "in/new.bin", b"new");
    let modified = fx.drop_file("abc", "in/old.bin", b"changed");
    let removed = fx.root_path().join("abc").join("in").join("gone.bin");

    let mut batch = ChangeBatch::new();
    batch.push(EventKind::Added, &added);
    batch.push(EventKind::Modified, &modified);
    batch.push(EventKind::Removed, &removed);
    batch.push(EventKind::Added, "/elsewhere/x");

    let report = fx.engine.dispatch_batch(&batch);
    assert_eq!(
        report,
        DispatchReport {
            handled: 3,
            unrouted: 1,
            scheduled: 3,
            ..DispatchReport::default()
        }
    );
    assert_eq!(fx.queue.pending().expect("pending"), 3);
}

#[test]
fn store_failures_are_isolated_per_path() {
    let fx = Fixture::with_callback(CallbackOptions::new());
    fx.create("abc");
    fx.create("def");
    let first = fx.drop_file("abc", "in/x.bin", b"x");
    let second = fx.drop_file("def", "in/y.bin", b"y");

    // Corrupt one record so its lookup fails with a parse error.
    let record = fx
        .home
        .path()
        .join(".watchfolder")
        .join("instances")
        .join("abc.yaml");
    std::fs::write(&record, b"- not: [a record").expect("corrupt");

    let report = fx.engine.dispatch(EventKind::Added, &[first, second]);
    assert_eq!(report.failed, 1);
    assert_eq!(report.handled, 1);
}

/// Queue that blows up while scheduling files named `crash*`.
struct CrashingQueue(MemoryQueue);

impl TaskQueue for CrashingQueue {
    fn schedule(
        &self,
        task: DebounceTask,
        run_at: Option<DateTime<Utc>>,
    ) -> Result<TaskHandle, QueueError> {
        let name = task.path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.starts_with("crash") {
            panic!("cannot schedule {}", task.path.display());
        }
        self.0.schedule(task, run_at)
    }

    fn delete_all(
        &self,
        instance_id: &InstanceId,
        kind: EventKind,
        path: &Path,
    ) -> Result<usize, QueueError> {
        self.0.delete_all(instance_id, kind, path)
    }
}

#[test]
fn panic_while_handling_one_path_does_not_stop_the_batch() {
    let fx = Fixture::with_callback(CallbackOptions::new().delay(2));
    fx.create("abc");
    let crash = fx.drop_file("abc", "in/crash.bin", b"boom");
    let after = fx.drop_file("abc", "in/after.bin", b"fine");
    let modified = fx.drop_file("abc", "in/later.bin", b"fine too");

    let queue = Arc::new(CrashingQueue(MemoryQueue::new()));
    let engine = Engine::new(
        Arc::new(fx.engine.setup().clone()),
        fx.store.clone(),
        queue.clone(),
    );

    let mut batch = ChangeBatch::new();
    batch.push(EventKind::Added, &crash);
    batch.push(EventKind::Added, &after);
    batch.push(EventKind::Modified, &modified);

    let report = engine.dispatch_batch(&batch);
    assert_eq!(report.failed, 1);
    assert_eq!(report.handled, 2);
    assert_eq!(report.scheduled, 2);

    let pending: Vec<PathBuf> = queue
        .0
        .snapshot()
        .expect("snapshot")
        .into_iter()
        .map(|p| p.task.path)
        .collect();
    assert_eq!(pending, vec![after, modified]);
}
