//! Recalculation commands
//!
//! Usage:
//!   rollup recalc bulk [--definition ID]... [--invocation TAG]
//!   rollup recalc parent --type TYPE --id ID [--via FIELD]
//!   rollup recalc payload <PATH> [--invocation TAG]

use std::path::PathBuf;

use clap::{Args, Subcommand};
use rollup_engine::commands::engine_command::{apply_engine_command, EngineCommand, EngineCommandResult};
use rollup_engine::commands::engine_query::{apply_engine_query, EngineQuery, EngineQueryResult};
use rollup_engine::{JobTicket, ParentRef};
use serde_json::json;

use super::context::{print_json, CliResult, GlobalArgs, Workspace};

#[derive(Debug, Args)]
pub struct RecalcArgs {
    #[command(subcommand)]
    pub command: RecalcCommand,
}

#[derive(Debug, Subcommand)]
pub enum RecalcCommand {
    /// Recalculate every parent for stored definitions
    Bulk(BulkArgs),
    /// Recalculate a single parent with every stored definition targeting it
    Parent(ParentArgs),
    /// Recalculate from a definition payload file without storing it
    Payload(PayloadArgs),
}

#[derive(Debug, Args)]
pub struct BulkArgs {
    /// Only these stored definitions (repeatable); all when omitted
    #[arg(long = "definition")]
    pub definitions: Vec<String>,

    #[arg(long)]
    pub invocation: Option<String>,
}

#[derive(Debug, Args)]
pub struct ParentArgs {
    #[arg(long = "type")]
    pub object_type: String,

    #[arg(long)]
    pub id: String,

    /// Lookup field on the record naming the parent
    #[arg(long)]
    pub via: Option<String>,

    #[arg(long)]
    pub invocation: Option<String>,
}

#[derive(Debug, Args)]
pub struct PayloadArgs {
    pub path: PathBuf,

    #[arg(long, default_value = "CLI")]
    pub invocation: String,
}

pub fn execute(global: &GlobalArgs, args: RecalcArgs) -> CliResult {
    let mut ws = Workspace::open(global)?;
    let mut engine = ws.engine();

    let cmd = match args.command {
        RecalcCommand::Bulk(bulk) => {
            let stored = match apply_engine_query(EngineQuery::StoredDefinitions, &engine)? {
                EngineQueryResult::StoredDefinitions(defs) => defs,
                other => return Err(format!("unexpected query result: {:?}", other).into()),
            };
            let definitions = if bulk.definitions.is_empty() {
                stored
            } else {
                let missing: Vec<&str> = bulk
                    .definitions
                    .iter()
                    .filter(|id| !stored.iter().any(|d| &d.key() == *id))
                    .map(String::as_str)
                    .collect();
                if !missing.is_empty() {
                    return Err(format!("definition(s) not found: {}", missing.join(", ")).into());
                }
                stored
                    .into_iter()
                    .filter(|d| bulk.definitions.contains(&d.key()))
                    .collect()
            };
            EngineCommand::RecalculateBulk {
                definitions,
                invocation: bulk.invocation,
            }
        }
        RecalcCommand::Parent(parent) => {
            let mut target = ParentRef::new(parent.object_type, parent.id);
            if let Some(via) = parent.via {
                target = target.via(via);
            }
            EngineCommand::RecalculateParent {
                target,
                invocation: parent.invocation,
            }
        }
        RecalcCommand::Payload(payload) => EngineCommand::RecalculateFromPayload {
            payload: std::fs::read_to_string(&payload.path)?,
            invocation: payload.invocation,
        },
    };

    match apply_engine_command(cmd, &mut engine)? {
        EngineCommandResult::Dispatched(ticket) => print_ticket(&ticket),
        EngineCommandResult::Recalculated(report) => print_json(&report),
        other => Err(format!("unexpected command result: {:?}", other).into()),
    }
}

fn print_ticket(ticket: &JobTicket) -> CliResult {
    print_json(&json!({
        "handle": ticket.handle_text(),
        "status": ticket.status.as_str(),
        "totalChunks": ticket.total_chunks,
        "message": ticket.message,
        "failedIds": ticket.failed_ids,
        "report": ticket.report,
    }))
}
