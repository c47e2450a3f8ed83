//! In-process task queue.
//!
//! [`MemoryQueue`] keeps pending tasks in memory, ordered by due time. It is
//! what the daemon drains on every runner tick; it is not durable, so tasks
//! scheduled before a restart are lost.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use watchfolder_core::{EventKind, InstanceId};

use crate::error::QueueError;
use crate::task::{DebounceTask, TaskHandle, TaskQueue};

/// A scheduled task as seen by [`MemoryQueue::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingTask {
    pub handle: TaskHandle,
    /// `None` means "as soon as possible".
    pub run_at: Option<DateTime<Utc>>,
    pub task: DebounceTask,
}

impl PendingTask {
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.run_at.map_or(true, |at| at <= now)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    next_handle: u64,
    pending: Vec<PendingTask>,
}

#[derive(Debug, Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>, QueueError> {
        self.state.lock().map_err(|_| QueueError::Poisoned)
    }

    /// Remove and return every task due at `now`, earliest first.
    ///
    /// Immediate tasks sort before timed ones; ties keep scheduling order.
    pub fn take_due(&self, now: DateTime<Utc>) -> Result<Vec<DebounceTask>, QueueError> {
        let mut state = self.lock()?;
        let (mut due, rest): (Vec<_>, Vec<_>) =
            state.pending.drain(..).partition(|entry| entry.is_due(now));
        state.pending = rest;
        due.sort_by_key(|entry| (entry.run_at, entry.handle));
        Ok(due.into_iter().map(|entry| entry.task).collect())
    }

    /// Number of tasks not yet taken.
    pub fn pending(&self) -> Result<usize, QueueError> {
        Ok(self.lock()?.pending.len())
    }

    /// Copy of every pending task, ordered by due time.
    pub fn snapshot(&self) -> Result<Vec<PendingTask>, QueueError> {
        let mut entries = self.lock()?.pending.clone();
        entries.sort_by_key(|entry| (entry.run_at, entry.handle));
        Ok(entries)
    }
}

impl TaskQueue for MemoryQueue {
    fn schedule(
        &self,
        task: DebounceTask,
        run_at: Option<DateTime<Utc>>,
    ) -> Result<TaskHandle, QueueError> {
        task.validate()?;
        let mut state = self.lock()?;
        state.next_handle += 1;
        let handle = TaskHandle(state.next_handle);
        tracing::debug!(
            %handle,
            instance = %task.instance_id,
            kind = %task.kind,
            path = %task.path.display(),
            run_at = ?run_at,
            "scheduled task"
        );
        state.pending.push(PendingTask {
            handle,
            run_at,
            task,
        });
        Ok(handle)
    }

    fn delete_all(
        &self,
        instance_id: &InstanceId,
        kind: EventKind,
        path: &Path,
    ) -> Result<usize, QueueError> {
        let mut state = self.lock()?;
        let before = state.pending.len();
        state
            .pending
            .retain(|entry| !entry.task.matches(instance_id, kind, path));
        Ok(before - state.pending.len())
    }
}
