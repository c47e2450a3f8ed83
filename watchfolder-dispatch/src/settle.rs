//! Debounce / settle algorithm.
//!
//! [`handle`] decides, for every rule matching one `(kind, path)` event on an
//! instance, whether to fire the rule's action now or to schedule a recheck:
//!
//! ```text
//! last_checksum == current            -> fire
//! last_checksum present, no delay     -> fire
//! otherwise                           -> schedule task(current, delay)
//! ```
//!
//! A delayed rule keeps rescheduling itself while the content changes and
//! fires once a full delay window passes without a change. An undelayed rule
//! fires after exactly one deferred hop.

use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;

use watchfolder_core::{
    file_checksum, CallbackRule, Checksum, EventKind, FolderScope, StoreError, WatchInstance,
};

use crate::error::DispatchError;
use crate::task::{enqueue, DebounceTask, TaskHandle, TaskQueue};

/// What happened to one matching rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RuleOutcome {
    Fired {
        action: String,
    },
    Scheduled {
        action: String,
        handle: TaskHandle,
        checksum: Checksum,
        delay: Option<u64>,
    },
}

impl RuleOutcome {
    pub fn is_fired(&self) -> bool {
        matches!(self, RuleOutcome::Fired { .. })
    }
}

/// Run the settle algorithm for one event on `instance`.
///
/// `last_checksum` is `None` for fresh notifications and carries the
/// snapshot captured at scheduling time when a task re-enters.
pub fn handle(
    instance: &WatchInstance,
    kind: EventKind,
    path: &Path,
    last_checksum: Option<&Checksum>,
    queue: &dyn TaskQueue,
) -> Result<Vec<RuleOutcome>, DispatchError> {
    if !is_actionable(kind, path) {
        tracing::debug!(%kind, path = %path.display(), "path state does not match event, skipping");
        return Ok(vec![]);
    }

    if kind == EventKind::Removed && last_checksum.is_none() {
        cancel_superseded(instance, path, queue)?;
    }

    let relative = instance.relative(path).unwrap_or(path);
    let mut current: Option<Checksum> = None;
    let mut outcomes = Vec::new();

    for (scope, rules) in instance.definition().scopes() {
        if let FolderScope::Folder(folder) = scope {
            if !instance.contains_in_folder(path, folder) {
                continue;
            }
        }

        for rule in rules.iter().filter(|r| selects(r, kind, relative)) {
            let checksum = match current.clone() {
                Some(checksum) => checksum,
                None => match current_checksum(kind, path)? {
                    Some(checksum) => {
                        current = Some(checksum.clone());
                        checksum
                    }
                    // Vanished between the existence check and hashing.
                    None => return Ok(outcomes),
                },
            };
            outcomes.push(settle_rule(
                instance,
                rule,
                kind,
                path,
                last_checksum,
                checksum,
                queue,
            )?);
        }
    }
    Ok(outcomes)
}

/// Removals need the path gone; everything else needs an existing
/// non-directory.
fn is_actionable(kind: EventKind, path: &Path) -> bool {
    match kind {
        EventKind::Removed => fs::symlink_metadata(path).is_err(),
        EventKind::Added | EventKind::Modified => fs::metadata(path)
            .map(|meta| !meta.is_dir())
            .unwrap_or(false),
    }
}

fn selects(rule: &CallbackRule, kind: EventKind, relative: &Path) -> bool {
    rule.reacts_to(kind) && !rule.ignores(relative)
}

fn current_checksum(kind: EventKind, path: &Path) -> Result<Option<Checksum>, DispatchError> {
    if kind == EventKind::Removed {
        return Ok(Some(Checksum::absent()));
    }
    match file_checksum(path) {
        Ok(checksum) => Ok(Some(checksum)),
        Err(StoreError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(%kind, path = %path.display(), "file vanished before hashing");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn cancel_superseded(
    instance: &WatchInstance,
    path: &Path,
    queue: &dyn TaskQueue,
) -> Result<(), DispatchError> {
    for kind in [EventKind::Added, EventKind::Modified] {
        let cancelled = queue.delete_all(instance.id(), kind, path)?;
        if cancelled > 0 {
            tracing::debug!(
                instance = %instance.id(),
                %kind,
                path = %path.display(),
                cancelled,
                "removal cancelled pending rechecks"
            );
        }
    }
    Ok(())
}

fn settle_rule(
    instance: &WatchInstance,
    rule: &CallbackRule,
    kind: EventKind,
    path: &Path,
    last_checksum: Option<&Checksum>,
    current: Checksum,
    queue: &dyn TaskQueue,
) -> Result<RuleOutcome, DispatchError> {
    let action = rule.action().name().to_string();
    let settled = match last_checksum {
        Some(last) => *last == current || rule.delay().is_none(),
        None => false,
    };

    if settled {
        tracing::info!(
            instance = %instance.id(),
            %kind,
            path = %path.display(),
            action = %action,
            "firing action"
        );
        rule.action()
            .invoke(kind, path)
            .map_err(|source| DispatchError::Action {
                action: action.clone(),
                source,
            })?;
        return Ok(RuleOutcome::Fired { action });
    }

    let delay = rule.delay().map(|d| d.as_secs());
    let task = DebounceTask {
        instance_id: instance.id().clone(),
        kind,
        path: path.to_path_buf(),
        checksum: current.clone(),
        delay,
    };
    let handle = enqueue(queue, task)?;
    tracing::debug!(
        instance = %instance.id(),
        %kind,
        path = %path.display(),
        action = %action,
        checksum = %current,
        delay_secs = ?delay,
        %handle,
        "content not settled, recheck scheduled"
    );
    Ok(RuleOutcome::Scheduled {
        action,
        handle,
        checksum: current,
        delay,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tempfile::TempDir;
    use watchfolder_core::{
        ActionError, ActionHandle, CallbackOptions, InstanceId, RootRegistry, WatchDefinition,
    };

    use super::*;
    use crate::queue::MemoryQueue;

    type Calls = Arc<Mutex<Vec<(EventKind, String)>>>;

    fn recorder(calls: &Calls) -> ActionHandle {
        let calls = Arc::clone(calls);
        ActionHandle::new(
            "record",
            Arc::new(move |kind: EventKind, path: &Path| -> Result<(), ActionError> {
                calls
                    .lock()
                    .unwrap()
                    .push((kind, path.display().to_string()));
                Ok(())
            }),
        )
    }

    fn instance(root: &TempDir, options: CallbackOptions, calls: &Calls) -> WatchInstance {
        let mut registry = RootRegistry::new();
        let mut def = WatchDefinition::new("uploads");
        def.set_root(root.path(), &mut registry).unwrap();
        def.set_folders(["in", "out"]).unwrap();
        def.add_callback(recorder(calls), options).unwrap();
        let instance = WatchInstance::new(InstanceId::parse("abc").unwrap(), Arc::new(def));
        instance.on_create().unwrap();
        instance
    }

    #[test]
    fn directories_are_never_actionable() {
        let root = TempDir::new().unwrap();
        let calls = Calls::default();
        let inst = instance(&root, CallbackOptions::new(), &calls);
        let queue = MemoryQueue::new();

        let dir = inst.path().unwrap().join("in");
        let outcomes = handle(&inst, EventKind::Added, &dir, None, &queue).unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(queue.pending().unwrap(), 0);
    }

    #[test]
    fn ignored_paths_skip_the_rule() {
        let root = TempDir::new().unwrap();
        let calls = Calls::default();
        let inst = instance(&root, CallbackOptions::new().ignore("*.part"), &calls);
        let queue = MemoryQueue::new();

        let file = inst.path().unwrap().join("in").join("movie.part");
        fs::write(&file, b"partial").unwrap();
        assert!(handle(&inst, EventKind::Added, &file, None, &queue)
            .unwrap()
            .is_empty());
        assert_eq!(queue.pending().unwrap(), 0);
    }

    #[test]
    fn checksum_is_shared_across_rules() {
        let root = TempDir::new().unwrap();
        let calls = Calls::default();
        let mut registry = RootRegistry::new();
        let mut def = WatchDefinition::new("uploads");
        def.set_root(root.path(), &mut registry).unwrap();
        def.set_folders(["in"]).unwrap();
        def.add_callback(recorder(&calls), CallbackOptions::new().delay(3))
            .unwrap();
        def.add_callback(recorder(&calls), CallbackOptions::new().folders(["in"]))
            .unwrap();
        let inst = WatchInstance::new(InstanceId::parse("abc").unwrap(), Arc::new(def));
        inst.on_create().unwrap();
        let queue = MemoryQueue::new();

        let file = inst.path().unwrap().join("in").join("x.bin");
        fs::write(&file, b"payload").unwrap();
        let outcomes = handle(&inst, EventKind::Added, &file, None, &queue).unwrap();

        assert_eq!(outcomes.len(), 2);
        let checksums: Vec<_> = queue
            .snapshot()
            .unwrap()
            .into_iter()
            .map(|p| p.task.checksum)
            .collect();
        assert_eq!(checksums, vec![Checksum::of_bytes(b"payload"); 2]);
    }

    #[test]
    fn removal_requires_absence_and_cancels_pending_rechecks() {
        let root = TempDir::new().unwrap();
        let calls = Calls::default();
        let inst = instance(&root, CallbackOptions::new().delay(5), &calls);
        let queue = MemoryQueue::new();

        let file = inst.path().unwrap().join("in").join("x.bin");
        fs::write(&file, b"v1").unwrap();
        handle(&inst, EventKind::Added, &file, None, &queue).unwrap();
        assert_eq!(queue.pending().unwrap(), 1);

        // Still present: a removal report is stale.
        assert!(handle(&inst, EventKind::Removed, &file, None, &queue)
            .unwrap()
            .is_empty());

        fs::remove_file(&file).unwrap();
        let outcomes = handle(&inst, EventKind::Removed, &file, None, &queue).unwrap();
        assert_eq!(outcomes.len(), 1);

        let pending = queue.snapshot().unwrap();
        assert_eq!(pending.len(), 1, "the added recheck is cancelled");
        assert_eq!(pending[0].task.kind, EventKind::Removed);
        assert!(pending[0].task.checksum.is_absent());

        let absent = Checksum::absent();
        let fired = handle(&inst, EventKind::Removed, &file, Some(&absent), &queue).unwrap();
        assert_eq!(fired, vec![RuleOutcome::Fired { action: "record".into() }]);
        assert_eq!(calls.lock().unwrap()[0].0, EventKind::Removed);
    }

    #[test]
    fn failing_action_surfaces_as_dispatch_error() {
        let root = TempDir::new().unwrap();
        let mut registry = RootRegistry::new();
        let mut def = WatchDefinition::new("uploads");
        def.set_root(root.path(), &mut registry).unwrap();
        def.set_folders(["in"]).unwrap();
        def.add_callback(
            ActionHandle::new(
                "broken",
                Arc::new(|_: EventKind, _: &Path| -> Result<(), ActionError> {
                    Err(ActionError::Failed("disk full".into()))
                }),
            ),
            CallbackOptions::new(),
        )
        .unwrap();
        let inst = WatchInstance::new(InstanceId::parse("abc").unwrap(), Arc::new(def));
        inst.on_create().unwrap();
        let queue = MemoryQueue::new();

        let file = inst.path().unwrap().join("in").join("x.bin");
        fs::write(&file, b"x").unwrap();
        let stale = Checksum::from("stale");
        let err = handle(&inst, EventKind::Added, &file, Some(&stale), &queue).unwrap_err();
        assert!(matches!(err, DispatchError::Action { ref action, .. } if action == "broken"));
    }
}
