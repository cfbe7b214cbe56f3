//! Rollup CLI
//!
//! Command-line host for the rollup engine over a SQLite database. It also
//! acts as the worker that drains the chunk queue (`rollup jobs run`).

use clap::{Parser, Subcommand};

mod commands;

use commands::context::GlobalArgs;

#[derive(Debug, Parser)]
#[command(name = "rollup")]
#[command(about = "Rollup - metadata-driven aggregation of child records onto parents", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Import, list or delete stored rollup definitions
    Definitions(commands::definitions::DefinitionsArgs),
    /// Import records and inspect record counts
    Records(commands::records::RecordsArgs),
    /// Run recalculations
    Recalc(commands::recalc::RecalcArgs),
    /// Work the chunk queue and follow job status
    Jobs(commands::jobs::JobsArgs),
    /// Show the namespace-qualified names in use
    Namespace,
}

fn main() {
    let cli = Cli::parse();
    rollup_core::logging_facility::init(cli.global.log);

    let result = match cli.command {
        Commands::Definitions(args) => commands::definitions::execute(&cli.global, args),
        Commands::Records(args) => commands::records::execute(&cli.global, args),
        Commands::Recalc(args) => commands::recalc::execute(&cli.global, args),
        Commands::Jobs(args) => commands::jobs::execute(&cli.global, args),
        Commands::Namespace => commands::namespace::execute(&cli.global),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
