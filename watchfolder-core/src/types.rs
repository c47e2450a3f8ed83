//! Domain types shared by every watchfolder crate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque, URL-safe identifier of a watch instance.
///
/// The instance directory is named after it: `<root>/<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// A fresh random id (UUID v4, 32 lowercase hex characters).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Validate a caller-supplied id.
    ///
    /// Ids become directory names, so only `[A-Za-z0-9_-]` is accepted.
    pub fn parse(id: impl Into<String>) -> Result<Self, ConfigError> {
        let id = id.into();
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(id))
        } else {
            Err(ConfigError::InvalidInstanceId { id })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for InstanceId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Kind of filesystem change reported by the notification source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Added,
    Modified,
    Removed,
}

impl EventKind {
    /// Every supported kind, in dispatch order.
    pub const ALL: [EventKind; 3] = [EventKind::Added, EventKind::Modified, EventKind::Removed];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Added => "added",
            EventKind::Modified => "modified",
            EventKind::Removed => "removed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(EventKind::Added),
            "modified" => Ok(EventKind::Modified),
            "removed" => Ok(EventKind::Removed),
            other => Err(ConfigError::UnsupportedEvent {
                event: other.to_string(),
            }),
        }
    }
}

/// Folder scope a callback rule is registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FolderScope {
    /// Applies to every file of the instance, whatever its subfolder.
    Any,
    /// Applies only below `<instance path>/<name>/`.
    Folder(String),
}

impl fmt::Display for FolderScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FolderScope::Any => f.write_str("any"),
            FolderScope::Folder(name) => f.write_str(name),
        }
    }
}
