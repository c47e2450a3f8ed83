//! `watchfolder resolve <path>` and `watchfolder checksum <file>`

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;

use watchfolder_core::{directory, file_checksum};

use super::load_setup;

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Changed file path; relative paths are taken from the working directory.
    pub path: PathBuf,
}

impl ResolveArgs {
    pub fn run(self, config: Option<&Path>) -> Result<()> {
        let setup = load_setup(config)?;
        let path = directory::expand(&self.path)
            .with_context(|| format!("failed to expand {}", self.path.display()))?;
        match setup.registry().resolve_instance_id(&path) {
            Some(id) => println!("{id}"),
            None => bail!("no watched root owns {}", path.display()),
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct ChecksumArgs {
    pub file: PathBuf,
}

impl ChecksumArgs {
    pub fn run(self) -> Result<()> {
        let checksum = file_checksum(&self.file)
            .with_context(|| format!("failed to checksum {}", self.file.display()))?;
        println!("{checksum}");
        Ok(())
    }
}
