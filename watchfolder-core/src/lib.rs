//! watchfolder core library: watch definitions, instances, roots, checksums.
//!
//! Public API surface:
//! - [`types`]: ids, event kinds, folder scopes
//! - [`error`]: [`ConfigError`], [`StoreError`], [`ActionError`]
//! - [`directory`]: root validation
//! - [`roots`]: [`RootRegistry`] and path-to-instance resolution
//! - [`definition`] / [`instance`]: configuration template and folders
//! - [`action`]: typed action registry
//! - [`config`]: [`WatchSetup`] and the YAML configuration file
//! - [`store`]: instance records and lifecycle hooks
//! - [`checksum`]: SHA-256 content digests

pub mod action;
pub mod checksum;
pub mod config;
pub mod definition;
pub mod directory;
pub mod error;
pub mod instance;
pub mod roots;
pub mod store;
pub mod types;

pub use action::{Action, ActionHandle, ActionRegistry, CommandAction, LogAction};
pub use checksum::{file_checksum, Checksum};
pub use config::WatchSetup;
pub use definition::{CallbackOptions, CallbackRule, WatchDefinition};
pub use error::{ActionError, ConfigError, StoreError};
pub use instance::WatchInstance;
pub use roots::{PathRewrite, RootRegistry};
pub use store::{InstanceRecord, InstanceStore, YamlInstanceStore};
pub use types::{EventKind, FolderScope, InstanceId};
