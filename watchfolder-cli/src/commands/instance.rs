//! `watchfolder instance create|destroy|list|files`

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use watchfolder_core::{InstanceId, InstanceStore};

use super::open_store;

#[derive(Subcommand, Debug)]
pub enum InstanceCommand {
    /// Persist a new instance and provision its folders.
    Create(CreateArgs),

    /// Remove an instance's folder tree and its record.
    Destroy {
        /// Instance id.
        id: String,
    },

    /// List every instance with its definition and folder.
    List,

    /// List the files currently inside an instance folder.
    Files {
        /// Instance id.
        id: String,
    },
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Watch definition name from the configuration file.
    pub definition: String,

    /// Instance id; a random one is generated when omitted.
    #[arg(long)]
    pub id: Option<String>,
}

pub fn run(command: InstanceCommand, config: Option<&Path>) -> Result<()> {
    let store = open_store(config)?;
    match command {
        InstanceCommand::Create(args) => {
            let id = args.id.map(InstanceId::parse).transpose()?;
            let instance = store
                .create(&args.definition, id)
                .with_context(|| format!("failed to create '{}' instance", args.definition))?;
            println!("{}\t{}", instance.id(), instance.path()?.display());
        }
        InstanceCommand::Destroy { id } => {
            let id = InstanceId::parse(id)?;
            store
                .destroy(&id)
                .with_context(|| format!("failed to destroy instance {id}"))?;
            println!("destroyed {id}");
        }
        InstanceCommand::List => {
            let records = store.list().context("failed to list instances")?;
            if records.is_empty() {
                println!("No instances.");
                return Ok(());
            }
            for record in records {
                let path = store
                    .find_instance_by_id(&record.id)
                    .and_then(|instance| Ok(instance.path()?))
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|err| format!("<{err}>"));
                println!("{}\t{}\t{}", record.id, record.definition, path);
            }
        }
        InstanceCommand::Files { id } => {
            let id = InstanceId::parse(id)?;
            let instance = store
                .find_instance_by_id(&id)
                .with_context(|| format!("failed to load instance {id}"))?;
            for file in instance.list_files()? {
                println!("{}", file.display());
            }
        }
    }
    Ok(())
}
