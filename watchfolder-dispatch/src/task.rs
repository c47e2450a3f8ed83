//! Debounce tasks and the task queue contract.
//!
//! A [`DebounceTask`] is a "recheck me after the delay" request. The queue
//! runs it at least once; running it re-enters the settle logic with the
//! checksum captured when the task was scheduled.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use watchfolder_core::{Checksum, EventKind, InstanceId};

use crate::error::QueueError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceTask {
    pub instance_id: InstanceId,
    pub kind: EventKind,
    pub path: PathBuf,
    pub checksum: Checksum,
    /// Stability delay in seconds; `None` runs the task as soon as possible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
}

impl DebounceTask {
    pub fn validate(&self) -> Result<(), QueueError> {
        if self.instance_id.as_str().is_empty()
            || self.path.as_os_str().is_empty()
            || self.checksum.as_str().is_empty()
        {
            return Err(QueueError::InvalidTask);
        }
        Ok(())
    }

    /// When the task should run, relative to `now`. `None` means now.
    pub fn run_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.delay {
            Some(secs) if secs > 0 => {
                let secs = i64::try_from(secs).unwrap_or(i64::MAX);
                Some(now + chrono::Duration::seconds(secs))
            }
            _ => None,
        }
    }

    pub fn matches(&self, instance_id: &InstanceId, kind: EventKind, path: &Path) -> bool {
        self.instance_id == *instance_id && self.kind == kind && self.path == path
    }
}

/// Opaque identifier returned by [`TaskQueue::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskHandle(pub u64);

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Deferred execution substrate.
///
/// Implementations execute each task at least once, at or after `run_at`,
/// possibly concurrently with other tasks.
pub trait TaskQueue: Send + Sync {
    fn schedule(
        &self,
        task: DebounceTask,
        run_at: Option<DateTime<Utc>>,
    ) -> Result<TaskHandle, QueueError>;

    /// Drop every pending task for `(instance_id, kind, path)`; returns how
    /// many were removed.
    fn delete_all(
        &self,
        instance_id: &InstanceId,
        kind: EventKind,
        path: &Path,
    ) -> Result<usize, QueueError>;
}

/// Validate `task` and schedule it after its own delay.
pub fn enqueue(queue: &dyn TaskQueue, task: DebounceTask) -> Result<TaskHandle, QueueError> {
    task.validate()?;
    let run_at = task.run_at(Utc::now());
    queue.schedule(task, run_at)
}
