pub mod daemon;
pub mod inspect;
pub mod instance;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use watchfolder_core::config::DEFAULT_CONFIG_FILE;
use watchfolder_core::{ActionRegistry, WatchSetup, YamlInstanceStore};

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Load the configuration file, `./watchfolder.yaml` unless overridden.
pub fn load_setup(config: Option<&Path>) -> Result<Arc<WatchSetup>> {
    let path = config.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let setup = WatchSetup::load(path, ActionRegistry::new())
        .with_context(|| format!("failed to load configuration {}", path.display()))?;
    Ok(Arc::new(setup))
}

pub fn open_store(config: Option<&Path>) -> Result<YamlInstanceStore> {
    let setup = load_setup(config)?;
    Ok(YamlInstanceStore::new(home_dir()?, setup))
}
