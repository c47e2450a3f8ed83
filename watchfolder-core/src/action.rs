//! Callback actions and the registry that resolves them by name.
//!
//! Rules hold an [`ActionHandle`] resolved when the definition is built, so
//! dispatch never looks an action up by name.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use crate::error::{ActionError, ConfigError};
use crate::types::EventKind;

/// A reaction to a settled file event.
pub trait Action: Send + Sync {
    fn call(&self, kind: EventKind, path: &Path) -> Result<(), ActionError>;
}

impl<F> Action for F
where
    F: Fn(EventKind, &Path) -> Result<(), ActionError> + Send + Sync,
{
    fn call(&self, kind: EventKind, path: &Path) -> Result<(), ActionError> {
        self(kind, path)
    }
}

/// A named, resolved action.
#[derive(Clone)]
pub struct ActionHandle {
    name: String,
    action: Arc<dyn Action>,
}

impl ActionHandle {
    pub fn new(name: impl Into<String>, action: Arc<dyn Action>) -> Self {
        Self {
            name: name.into(),
            action,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, kind: EventKind, path: &Path) -> Result<(), ActionError> {
        self.action.call(kind, path)
    }
}

impl fmt::Debug for ActionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Maps action names to implementations.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        action: impl Action + 'static,
    ) -> Result<(), ConfigError> {
        self.register_arc(name, Arc::new(action))
    }

    pub fn register_arc(
        &mut self,
        name: impl Into<String>,
        action: Arc<dyn Action>,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        if self.actions.contains_key(&name) {
            return Err(ConfigError::DuplicateAction { name });
        }
        self.actions.insert(name, action);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<ActionHandle, ConfigError> {
        self.actions
            .get(name)
            .map(|action| ActionHandle::new(name, Arc::clone(action)))
            .ok_or_else(|| ConfigError::UnknownAction {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.actions.keys()).finish()
    }
}

// ---------------------------------------------------------------------------
// Built-in actions
// ---------------------------------------------------------------------------

/// Runs an external program with the changed file path as its last argument.
///
/// The child also receives `WATCHFOLDER_EVENT` and `WATCHFOLDER_PATH`.
#[derive(Debug, Clone)]
pub struct CommandAction {
    program: String,
    args: Vec<String>,
}

impl CommandAction {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from an argv list; `None` when the list is empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

impl Action for CommandAction {
    fn call(&self, kind: EventKind, path: &Path) -> Result<(), ActionError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .env("WATCHFOLDER_EVENT", kind.as_str())
            .env("WATCHFOLDER_PATH", path)
            .status()
            .map_err(|source| ActionError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(ActionError::Exit {
                program: self.program.clone(),
                status: status.to_string(),
            })
        }
    }
}

/// Emits a structured log line for each settled event.
#[derive(Debug, Clone, Default)]
pub struct LogAction;

impl Action for LogAction {
    fn call(&self, kind: EventKind, path: &Path) -> Result<(), ActionError> {
        tracing::info!(kind = %kind, path = %path.display(), "watch folder event settled");
        Ok(())
    }
}
