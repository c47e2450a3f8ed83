//! Dispatch engine: routes changed paths to their owning instance.
//!
//! The engine processes one [`ChangeBatch`] at a time, sequentially, one path
//! after another. Every path is isolated: an error or panic while handling
//! one path is logged and counted, and the rest of the batch carries on.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use watchfolder_core::{
    Checksum, EventKind, InstanceStore, StoreError, WatchInstance, WatchSetup,
};

use crate::error::{error_chain, DispatchError};
use crate::settle::{self, RuleOutcome};
use crate::task::{DebounceTask, TaskQueue};

/// Changed absolute paths, grouped by event kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeBatch {
    pub added: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path` under `kind`, folded into the path's net change.
    ///
    /// Each path appears under at most one kind:
    ///
    /// ```text
    /// added    + modified -> added
    /// added    + removed  -> (dropped)
    /// removed  + added    -> modified
    /// modified + removed  -> removed
    /// ```
    pub fn push(&mut self, kind: EventKind, path: impl Into<PathBuf>) {
        use EventKind::{Added, Modified, Removed};

        let path = path.into();
        let net = match (self.take(&path), kind) {
            (None, kind) => Some(kind),
            (Some(Added), Added | Modified) => Some(Added),
            (Some(Added), Removed) => None,
            (Some(Removed), Removed) => Some(Removed),
            (Some(Removed), Added | Modified) => Some(Modified),
            (Some(Modified), Removed) => Some(Removed),
            (Some(Modified), Added | Modified) => Some(Modified),
        };
        if let Some(kind) = net {
            self.paths_mut(kind).push(path);
        }
    }

    /// Remove `path` from whichever list holds it.
    fn take(&mut self, path: &Path) -> Option<EventKind> {
        EventKind::ALL.into_iter().find(|&kind| {
            let paths = self.paths_mut(kind);
            match paths.iter().position(|p| p == path) {
                Some(index) => {
                    paths.remove(index);
                    true
                }
                None => false,
            }
        })
    }

    pub fn paths(&self, kind: EventKind) -> &[PathBuf] {
        match kind {
            EventKind::Added => &self.added,
            EventKind::Modified => &self.modified,
            EventKind::Removed => &self.removed,
        }
    }

    fn paths_mut(&mut self, kind: EventKind) -> &mut Vec<PathBuf> {
        match kind {
            EventKind::Added => &mut self.added,
            EventKind::Modified => &mut self.modified,
            EventKind::Removed => &mut self.removed,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

/// How one path was routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathOutcome {
    /// No registered root owns the path.
    Unrouted,
    /// The path names an instance id the store does not know.
    MissingInstance,
    Handled(Vec<RuleOutcome>),
}

/// Per-batch counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub handled: usize,
    pub unrouted: usize,
    pub missing: usize,
    pub failed: usize,
    pub fired: usize,
    pub scheduled: usize,
}

impl DispatchReport {
    fn record(&mut self, outcome: &PathOutcome) {
        match outcome {
            PathOutcome::Unrouted => self.unrouted += 1,
            PathOutcome::MissingInstance => self.missing += 1,
            PathOutcome::Handled(rules) => {
                self.handled += 1;
                let fired = rules.iter().filter(|r| r.is_fired()).count();
                self.fired += fired;
                self.scheduled += rules.len() - fired;
            }
        }
    }
}

/// Routes changes and executes recheck tasks.
///
/// The setup is read-only after construction, so one engine can be shared
/// across threads; concurrent calls for independent paths take no lock here.
#[derive(Clone)]
pub struct Engine {
    setup: Arc<WatchSetup>,
    store: Arc<dyn InstanceStore>,
    queue: Arc<dyn TaskQueue>,
}

impl Engine {
    pub fn new(
        setup: Arc<WatchSetup>,
        store: Arc<dyn InstanceStore>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self {
            setup,
            store,
            queue,
        }
    }

    pub fn setup(&self) -> &WatchSetup {
        &self.setup
    }

    pub fn queue(&self) -> &dyn TaskQueue {
        self.queue.as_ref()
    }

    /// Dispatch a whole batch: added, then modified, then removed paths.
    pub fn dispatch_batch(&self, batch: &ChangeBatch) -> DispatchReport {
        let mut report = DispatchReport::default();
        for kind in EventKind::ALL {
            self.dispatch_into(kind, batch.paths(kind), &mut report);
        }
        tracing::debug!(?report, "batch dispatched");
        report
    }

    /// Dispatch `paths` that all changed the same way.
    pub fn dispatch<P: AsRef<Path>>(&self, kind: EventKind, paths: &[P]) -> DispatchReport {
        let mut report = DispatchReport::default();
        self.dispatch_into(kind, paths, &mut report);
        report
    }

    fn dispatch_into<P: AsRef<Path>>(
        &self,
        kind: EventKind,
        paths: &[P],
        report: &mut DispatchReport,
    ) {
        for path in paths {
            let path = path.as_ref();
            let result = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch_path(kind, path)));
            match result {
                Ok(Ok(outcome)) => report.record(&outcome),
                Ok(Err(e)) => {
                    report.failed += 1;
                    tracing::error!(
                        %kind,
                        path = %path.display(),
                        error = %error_chain(&e),
                        "failed to handle change"
                    );
                }
                Err(payload) => {
                    report.failed += 1;
                    tracing::error!(
                        %kind,
                        path = %path.display(),
                        error = %panic_message(payload.as_ref()),
                        "panicked while handling change"
                    );
                }
            }
        }
    }

    /// Route one path to its instance and run the settle algorithm.
    ///
    /// The path is respelled under the registered root first, so folder
    /// scopes and ignore globs see the instance's own spelling.
    pub fn dispatch_path(&self, kind: EventKind, path: &Path) -> Result<PathOutcome, DispatchError> {
        let Some((id, local)) = self.setup.registry().localize(path) else {
            tracing::trace!(%kind, path = %path.display(), "no root owns path");
            return Ok(PathOutcome::Unrouted);
        };
        let instance = match self.store.find_instance_by_id(&id) {
            Ok(instance) => instance,
            Err(StoreError::InstanceNotFound { .. }) => {
                tracing::warn!(instance = %id, %kind, path = %path.display(), "no instance found for path");
                return Ok(PathOutcome::MissingInstance);
            }
            Err(e) => return Err(e.into()),
        };
        let outcomes = self.handle(&instance, kind, &local, None)?;
        Ok(PathOutcome::Handled(outcomes))
    }

    /// Settle one event on a known instance.
    pub fn handle(
        &self,
        instance: &WatchInstance,
        kind: EventKind,
        path: &Path,
        last_checksum: Option<&Checksum>,
    ) -> Result<Vec<RuleOutcome>, DispatchError> {
        settle::handle(instance, kind, path, last_checksum, self.queue.as_ref())
    }

    /// Run a recheck task: re-enter the settle logic with the task's
    /// captured checksum. An instance deleted in the meantime is not an error.
    pub fn execute(&self, task: &DebounceTask) -> Result<Vec<RuleOutcome>, DispatchError> {
        let instance = match self.store.find_instance_by_id(&task.instance_id) {
            Ok(instance) => instance,
            Err(StoreError::InstanceNotFound { .. }) => {
                tracing::debug!(instance = %task.instance_id, "instance gone, dropping task");
                return Ok(vec![]);
            }
            Err(e) => return Err(e.into()),
        };
        self.handle(&instance, task.kind, &task.path, Some(&task.checksum))
    }
}

impl DebounceTask {
    /// Execute this task against `engine`.
    pub fn execute(&self, engine: &Engine) -> Result<Vec<RuleOutcome>, DispatchError> {
        engine.execute(self)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
