//! # watchfolder-dispatch
//!
//! Event routing and checksum-debounce dispatch.
//!
//! [`Engine::dispatch_batch`] routes each changed path to its owning
//! instance and runs [`settle::handle`] on it; unsettled files become
//! [`DebounceTask`]s on a [`TaskQueue`], which re-enter the engine through
//! [`Engine::execute`].

pub mod engine;
pub mod error;
pub mod queue;
pub mod settle;
pub mod task;

pub use engine::{ChangeBatch, DispatchReport, Engine, PathOutcome};
pub use error::{error_chain, DispatchError, QueueError};
pub use queue::{MemoryQueue, PendingTask};
pub use settle::RuleOutcome;
pub use task::{enqueue, DebounceTask, TaskHandle, TaskQueue};
