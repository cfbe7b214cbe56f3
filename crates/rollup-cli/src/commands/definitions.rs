//! Definition commands
//!
//! Usage: rollup definitions import <PATH> | list [--json] | delete <ID>

use std::path::PathBuf;

use clap::{Args, Subcommand};
use rollup_core::metadata::MetadataResolver;
use rollup_engine::commands::engine_query::{apply_engine_query, EngineQuery, EngineQueryResult};

use super::context::{print_json, CliResult, GlobalArgs, Workspace};

#[derive(Debug, Args)]
pub struct DefinitionsArgs {
    #[command(subcommand)]
    pub command: DefinitionsCommand,
}

#[derive(Debug, Subcommand)]
pub enum DefinitionsCommand {
    /// Validate and store definitions from a JSON payload file
    Import(ImportArgs),
    /// List stored definitions
    List(ListArgs),
    /// Delete a stored definition by id
    Delete { id: String },
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// JSON array of definitions (or an object with a `definitions` array)
    pub path: PathBuf,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Print active definitions grouped by calculation item type as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(global: &GlobalArgs, args: DefinitionsArgs) -> CliResult {
    let mut ws = Workspace::open(global)?;
    match args.command {
        DefinitionsCommand::Import(import) => execute_import(&mut ws, import),
        DefinitionsCommand::List(list) => execute_list(&mut ws, list),
        DefinitionsCommand::Delete { id } => {
            if !ws.host.delete_definition(&id)? {
                return Err(format!("definition not found: {}", id).into());
            }
            println!("Deleted {}", id);
            Ok(())
        }
    }
}

fn execute_import(ws: &mut Workspace, args: ImportArgs) -> CliResult {
    let payload = std::fs::read_to_string(&args.path)?;
    let resolver = MetadataResolver::new(&ws.schema, &ws.config);
    let definitions = resolver.normalize_payload(&payload, None)?;
    // nothing is stored unless every definition resolves
    resolver.resolve_all(&definitions)?;

    for def in &definitions {
        let id = ws.host.save_definition(def, resolver.field_names())?;
        println!("Saved {} ({} -> {}.{})", id, def.operation.as_str(), def.parent_type, def.target_field);
    }
    println!("Imported {} definition(s) from {}", definitions.len(), args.path.display());
    Ok(())
}

fn execute_list(ws: &mut Workspace, args: ListArgs) -> CliResult {
    if args.json {
        let engine = ws.engine();
        return match apply_engine_query(EngineQuery::DefinitionsByCalcItemType, &engine)? {
            EngineQueryResult::DefinitionsByCalcItemType(by_type) => print_json(&by_type),
            other => Err(format!("unexpected query result: {:?}", other).into()),
        };
    }

    let rows = ws.host.list_definition_rows()?;
    if rows.is_empty() {
        println!("No definitions stored");
    }
    for row in rows {
        let state = if row.active { "active" } else { "inactive" };
        println!("{}\t{} -> {}\t{}", row.id, row.calc_item_type, row.parent_type, state);
    }
    Ok(())
}
