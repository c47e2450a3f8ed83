//! Root registry: the set of watched root folders and path-to-instance
//! resolution.
//!
//! Every changed path reported by the notification source is expected to
//! look like `<root>/<instance id>/<anything>`. Deployments that reach the
//! same folder through different absolute paths (a symlinked `shared/`
//! directory, a per-release checkout) register [`PathRewrite`] rules; each
//! rule is applied to both the registered roots and the incoming path before
//! they are compared, so both sides end up in the same normal form.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::directory;
use crate::error::ConfigError;
use crate::types::InstanceId;

/// A `(pattern, replacement)` pair that normalises absolute paths.
///
/// The replacement follows `regex` expansion rules (`$1`, `${name}`).
#[derive(Debug, Clone)]
pub struct PathRewrite {
    pattern: Regex,
    replacement: String,
}

impl PathRewrite {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, ConfigError> {
        let compiled = Regex::new(pattern).map_err(|source| ConfigError::InvalidPathMapping {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            pattern: compiled,
            replacement: replacement.into(),
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    fn apply(&self, input: &str) -> String {
        self.pattern
            .replace_all(input, self.replacement.as_str())
            .into_owned()
    }
}

/// Process-wide set of watched roots, built once at startup.
///
/// After configuration the registry is shared read-only (behind an `Arc`)
/// by the dispatch engine and the daemon.
#[derive(Debug, Clone, Default)]
pub struct RootRegistry {
    roots: Vec<PathBuf>,
    rewrites: Vec<PathRewrite>,
}

impl RootRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` as a watched root.
    ///
    /// The path is expanded to an absolute path first. Registering the same
    /// root twice keeps a single entry. Returns the expanded path.
    pub fn register(&mut self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
        let path = directory::expand(path.as_ref())?;
        if !directory::is_valid(&path) {
            return Err(ConfigError::InvalidRoot { path });
        }
        if !self.roots.contains(&path) {
            tracing::debug!(root = %path.display(), "registered watch root");
            self.roots.push(path.clone());
        }
        Ok(path)
    }

    /// Append a rewrite rule; rules run in insertion order.
    pub fn add_rewrite(&mut self, rewrite: PathRewrite) {
        self.rewrites.push(rewrite);
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn rewrites(&self) -> &[PathRewrite] {
        &self.rewrites
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Resolve the id of the instance owning `path`.
    ///
    /// Returns `None` when no root contains the path, or when nothing
    /// follows the id segment (the instance folder itself is not routable).
    /// When roots are nested the longest match wins.
    pub fn resolve_instance_id(&self, path: &Path) -> Option<InstanceId> {
        self.localize(path).map(|(id, _)| id)
    }

    /// Resolve the owning instance id and respell `path` below the root as
    /// it was registered.
    ///
    /// A path reported through an alternate spelling (reconciled by the
    /// rewrite rules) comes back joined onto the registered root, so it can
    /// be compared with the instance folder.
    pub fn localize(&self, path: &Path) -> Option<(InstanceId, PathBuf)> {
        let candidate = self.rewrite(&path.to_string_lossy());

        let mut best: Option<(usize, &PathBuf, &str, &str)> = None;
        for registered in &self.roots {
            let rewritten = self.rewrite(&registered.to_string_lossy());
            let root = rewritten.trim_end_matches('/');
            let Some(rest) = candidate.strip_prefix(root) else {
                continue;
            };
            let Some(rest) = rest.strip_prefix('/') else {
                continue;
            };
            let Some((id, tail)) = rest.split_once('/') else {
                continue;
            };
            if id.is_empty() || tail.is_empty() {
                continue;
            }
            if best.map_or(true, |(len, ..)| root.len() > len) {
                best = Some((root.len(), registered, id, rest));
            }
        }

        let (_, registered, id, rest) = best?;
        let id = InstanceId::parse(id).ok()?;
        Some((id, registered.join(rest)))
    }

    fn rewrite(&self, input: &str) -> String {
        self.rewrites
            .iter()
            .fold(input.to_string(), |acc, rule| rule.apply(&acc))
    }
}
