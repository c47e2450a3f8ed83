//! Process-wide watch setup and its YAML configuration file.
//!
//! # File layout
//!
//! ```yaml
//! latency_ms: 100
//! path_mapping:
//!   - pattern: "/releases/[0-9]+/"
//!     replacement: "/shared/"
//! actions:
//!   transcode:
//!     command: ["/usr/local/bin/transcode", "--fast"]
//!   note:
//!     log: {}
//! definitions:
//!   uploads:
//!     root: /data/w
//!     folders: [in, out]
//!     callbacks:
//!       - action: transcode
//!         when: [added]
//!         delay: 5
//!         folders: [in]
//!         ignore: "*.part"
//! ```
//!
//! Loading runs every definition through the same builder calls a
//! programmatic caller would use, so a bad file fails with the same
//! [`ConfigError`]s.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::action::{ActionRegistry, CommandAction, LogAction};
use crate::definition::{CallbackOptions, WatchDefinition};
use crate::error::ConfigError;
use crate::roots::{PathRewrite, RootRegistry};

/// Default notification batching window.
pub const DEFAULT_LATENCY: Duration = Duration::from_millis(100);

/// Default configuration file name, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "watchfolder.yaml";

// ---------------------------------------------------------------------------
// Runtime setup
// ---------------------------------------------------------------------------

/// Roots, rewrite rules and definitions, built once at startup and then
/// shared read-only.
#[derive(Debug, Clone)]
pub struct WatchSetup {
    registry: RootRegistry,
    definitions: BTreeMap<String, Arc<WatchDefinition>>,
    latency: Duration,
}

impl Default for WatchSetup {
    fn default() -> Self {
        Self {
            registry: RootRegistry::new(),
            definitions: BTreeMap::new(),
            latency: DEFAULT_LATENCY,
        }
    }
}

impl WatchSetup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &RootRegistry {
        &self.registry
    }

    /// Mutable access for the configuration phase (`set_root`, rewrites).
    pub fn registry_mut(&mut self) -> &mut RootRegistry {
        &mut self.registry
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn set_latency(&mut self, latency: Duration) {
        self.latency = latency;
    }

    pub fn add_definition(&mut self, definition: WatchDefinition) -> Result<(), ConfigError> {
        let name = definition.name().to_string();
        if self.definitions.contains_key(&name) {
            return Err(ConfigError::DuplicateDefinition { name });
        }
        self.definitions.insert(name, Arc::new(definition));
        Ok(())
    }

    pub fn definition(&self, name: &str) -> Result<&Arc<WatchDefinition>, ConfigError> {
        self.definitions
            .get(name)
            .ok_or_else(|| ConfigError::UnknownDefinition {
                name: name.to_string(),
            })
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Arc<WatchDefinition>> {
        self.definitions.values()
    }

    /// Load `path`, resolving action names against `actions` plus the
    /// actions declared in the file itself.
    pub fn load(path: &Path, actions: ActionRegistry) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        file.build(actions)
    }

    /// Parse configuration from a YAML string; `origin` labels parse errors.
    pub fn from_yaml_str(
        yaml: &str,
        origin: &Path,
        actions: ActionRegistry,
    ) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        file.build(actions)
    }
}

// ---------------------------------------------------------------------------
// File schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    latency_ms: Option<u64>,
    #[serde(default)]
    path_mapping: Vec<PathMappingSpec>,
    #[serde(default)]
    actions: BTreeMap<String, ActionSpec>,
    #[serde(default)]
    definitions: BTreeMap<String, DefinitionSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PathMappingSpec {
    pattern: String,
    replacement: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ActionSpec {
    Command(Vec<String>),
    Log {},
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DefinitionSpec {
    root: PathBuf,
    #[serde(default)]
    folders: Option<Vec<String>>,
    #[serde(default)]
    callbacks: Vec<CallbackSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CallbackSpec {
    action: String,
    #[serde(default)]
    when: Vec<String>,
    #[serde(default)]
    delay: Option<serde_yaml::Value>,
    #[serde(default)]
    folders: Vec<String>,
    #[serde(default)]
    ignore: Option<String>,
}

impl ConfigFile {
    fn build(self, mut actions: ActionRegistry) -> Result<WatchSetup, ConfigError> {
        let mut setup = WatchSetup::new();
        if let Some(ms) = self.latency_ms {
            setup.set_latency(Duration::from_millis(ms));
        }

        for mapping in &self.path_mapping {
            setup
                .registry_mut()
                .add_rewrite(PathRewrite::new(&mapping.pattern, mapping.replacement.clone())?);
        }

        for (name, entry) in self.actions {
            match entry {
                ActionSpec::Command(argv) => {
                    let action = CommandAction::from_argv(&argv)
                        .ok_or_else(|| ConfigError::EmptyCommand { name: name.clone() })?;
                    actions.register(name, action)?;
                }
                ActionSpec::Log {} => actions.register(name, LogAction)?,
            }
        }

        for (name, entry) in self.definitions {
            let mut definition = WatchDefinition::new(name);
            definition.set_root(&entry.root, setup.registry_mut())?;
            if let Some(folders) = entry.folders {
                definition.set_folders(folders)?;
            }
            for callback in entry.callbacks {
                let handle = actions.resolve(&callback.action)?;
                let mut options = CallbackOptions::new()
                    .when(callback.when)
                    .folders(callback.folders);
                if let Some(delay) = callback.delay {
                    options = options.delay(delay_seconds(&delay)?);
                }
                if let Some(ignore) = callback.ignore {
                    options = options.ignore(ignore);
                }
                definition.add_callback(handle, options)?;
            }
            setup.add_definition(definition)?;
        }

        Ok(setup)
    }
}

fn delay_seconds(value: &serde_yaml::Value) -> Result<i64, ConfigError> {
    value.as_i64().ok_or_else(|| ConfigError::InvalidDelay {
        value: serde_yaml::to_string(value)
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| format!("{value:?}")),
    })
}
