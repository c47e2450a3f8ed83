//! Watch definitions: the configuration template shared by every instance
//! of one kind of watch folder.
//!
//! ```text
//! <root>/
//!   <instance id>/
//!     <folder>/...        (auto-created for each configured folder)
//! ```
//!
//! A definition is built once through [`WatchDefinition::set_root`],
//! [`WatchDefinition::set_folders`] and [`WatchDefinition::add_callback`],
//! then frozen behind an `Arc` and shared by all of its instances.

use std::path::{Path, PathBuf};
use std::time::Duration;

use glob::{MatchOptions, Pattern};

use crate::action::ActionHandle;
use crate::error::ConfigError;
use crate::roots::RootRegistry;
use crate::types::{EventKind, FolderScope};

// ---------------------------------------------------------------------------
// Callback options (configuration surface)
// ---------------------------------------------------------------------------

/// Unvalidated options for [`WatchDefinition::add_callback`].
///
/// Values are kept in their configured form so that validation, and its
/// errors, happen in one place.
#[derive(Debug, Clone, Default)]
pub struct CallbackOptions {
    when: Vec<String>,
    delay: Option<i64>,
    folders: Vec<String>,
    ignore: Option<String>,
}

impl CallbackOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Event kinds to react to. Empty means all of them.
    pub fn when<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.when = events.into_iter().map(Into::into).collect();
        self
    }

    /// Stability delay in seconds.
    pub fn delay(mut self, seconds: i64) -> Self {
        self.delay = Some(seconds);
        self
    }

    /// Folder scopes. Empty means the rule applies to any folder.
    pub fn folders<I, S>(mut self, folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.folders = folders.into_iter().map(Into::into).collect();
        self
    }

    /// Glob of paths this rule skips.
    pub fn ignore(mut self, pattern: impl Into<String>) -> Self {
        self.ignore = Some(pattern.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Callback rule
// ---------------------------------------------------------------------------

/// A validated reaction: action, event kinds, optional delay and ignore glob.
#[derive(Debug, Clone)]
pub struct CallbackRule {
    action: ActionHandle,
    events: Vec<EventKind>,
    delay: Option<Duration>,
    ignore: Option<Pattern>,
}

impl CallbackRule {
    pub fn action(&self) -> &ActionHandle {
        &self.action
    }

    pub fn events(&self) -> &[EventKind] {
        &self.events
    }

    pub fn reacts_to(&self, kind: EventKind) -> bool {
        self.events.contains(&kind)
    }

    /// `None` means no debounce: the action runs after one deferred hop.
    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    pub fn ignore_pattern(&self) -> Option<&str> {
        self.ignore.as_ref().map(Pattern::as_str)
    }

    /// Whether the ignore glob matches `relative` (path below the instance
    /// folder) or just its file name.
    pub fn ignores(&self, relative: &Path) -> bool {
        let Some(pattern) = &self.ignore else {
            return false;
        };
        let options = MatchOptions {
            require_literal_separator: false,
            ..MatchOptions::new()
        };
        pattern.matches_path_with(relative, options)
            || relative
                .file_name()
                .map(|name| pattern.matches_path_with(Path::new(name), options))
                .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Watch definition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WatchDefinition {
    name: String,
    root: Option<PathBuf>,
    folders: Vec<String>,
    callbacks: Vec<(FolderScope, Vec<CallbackRule>)>,
}

impl WatchDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: None,
            folders: Vec::new(),
            callbacks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validate `path`, register it as a watched root and make it this
    /// definition's root.
    pub fn set_root(
        &mut self,
        path: impl AsRef<Path>,
        registry: &mut RootRegistry,
    ) -> Result<&Path, ConfigError> {
        let root = registry.register(path)?;
        Ok(self.root.insert(root).as_path())
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    #[cfg(test)]
    pub(crate) fn set_root_unchecked(&mut self, root: impl Into<PathBuf>) {
        self.root = Some(root.into());
    }

    /// Subfolders provisioned inside every new instance.
    pub fn set_folders<I, S>(&mut self, names: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        let names: Vec<String> = names.into_iter().map(|n| n.to_string()).collect();
        if names.is_empty() {
            return Err(ConfigError::NoFolders);
        }
        self.folders = names;
        Ok(())
    }

    pub fn folders(&self) -> &[String] {
        &self.folders
    }

    /// Validate `options` and append one rule per folder scope.
    pub fn add_callback(
        &mut self,
        action: ActionHandle,
        options: CallbackOptions,
    ) -> Result<(), ConfigError> {
        let events = parse_events(&options.when)?;
        let delay = parse_delay(options.delay)?;
        let ignore = options
            .ignore
            .as_deref()
            .map(|pattern| {
                Pattern::new(pattern).map_err(|source| ConfigError::InvalidIgnore {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .transpose()?;

        let scopes = if options.folders.is_empty() {
            vec![FolderScope::Any]
        } else {
            options
                .folders
                .into_iter()
                .map(FolderScope::Folder)
                .collect()
        };

        let rule = CallbackRule {
            action,
            events,
            delay,
            ignore,
        };
        for scope in scopes {
            match self.callbacks.iter_mut().find(|(s, _)| *s == scope) {
                Some((_, rules)) => rules.push(rule.clone()),
                None => self.callbacks.push((scope, vec![rule.clone()])),
            }
        }
        Ok(())
    }

    /// Scopes and their rules, in the order the scopes were first used.
    pub fn scopes(&self) -> impl Iterator<Item = (&FolderScope, &[CallbackRule])> {
        self.callbacks
            .iter()
            .map(|(scope, rules)| (scope, rules.as_slice()))
    }

    pub fn rules_for(&self, scope: &FolderScope) -> &[CallbackRule] {
        self.callbacks
            .iter()
            .find(|(s, _)| s == scope)
            .map(|(_, rules)| rules.as_slice())
            .unwrap_or(&[])
    }
}

fn parse_events(names: &[String]) -> Result<Vec<EventKind>, ConfigError> {
    if names.is_empty() {
        return Ok(EventKind::ALL.to_vec());
    }
    let mut events = Vec::with_capacity(names.len());
    for name in names {
        let kind: EventKind = name.parse()?;
        if !events.contains(&kind) {
            events.push(kind);
        }
    }
    Ok(events)
}

fn parse_delay(seconds: Option<i64>) -> Result<Option<Duration>, ConfigError> {
    match seconds {
        None => Ok(None),
        Some(s) if s > 0 => Ok(Some(Duration::from_secs(s.unsigned_abs()))),
        Some(s) => Err(ConfigError::InvalidDelay {
            value: s.to_string(),
        }),
    }
}
