//! Record commands
//!
//! Usage: rollup records import --type <TYPE> <PATH> | count

use std::path::PathBuf;

use clap::{Args, Subcommand};

use super::context::{CliResult, GlobalArgs, Workspace};

#[derive(Debug, Args)]
pub struct RecordsArgs {
    #[command(subcommand)]
    pub command: RecordsCommand,
}

#[derive(Debug, Subcommand)]
pub enum RecordsCommand {
    /// Upsert records from a JSON array of flat objects
    Import(ImportArgs),
    /// Record counts per object type
    Count,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Object type of every record in the file
    #[arg(long = "type")]
    pub object_type: String,

    pub path: PathBuf,
}

pub fn execute(global: &GlobalArgs, args: RecordsArgs) -> CliResult {
    let mut ws = Workspace::open(global)?;
    match args.command {
        RecordsCommand::Import(import) => {
            if ws.schema.get(&import.object_type).is_none() {
                tracing::warn!(object_type = %import.object_type, "object type not in schema; values kept as given");
            }
            let json = std::fs::read_to_string(&import.path)?;
            let n = ws.host.import_records_json(&import.object_type, &json, &ws.schema)?;
            println!("Imported {} {} record(s)", n, import.object_type);
        }
        RecordsCommand::Count => {
            for (object_type, n) in ws.host.record_counts()? {
                println!("{}\t{}", object_type, n);
            }
        }
    }
    Ok(())
}
