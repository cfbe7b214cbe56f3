//! Job commands
//!
//! The CLI is the worker for queued chunks: `jobs run` drains the queue and
//! `jobs watch --work` runs one chunk between status reads.

use clap::{Args, Subcommand};
use rollup_core::jobs::JobId;
use rollup_engine::commands::engine_command::{apply_engine_command, EngineCommand, EngineCommandResult};
use rollup_engine::commands::engine_query::{apply_engine_query, EngineQuery, EngineQueryResult};
use rollup_engine::JobPoller;

use super::context::{print_json, CliResult, GlobalArgs, Workspace};

#[derive(Debug, Args)]
pub struct JobsArgs {
    #[command(subcommand)]
    pub command: JobsCommand,
}

#[derive(Debug, Subcommand)]
pub enum JobsCommand {
    /// Run queued chunks
    Run {
        /// Stop after this many chunks; drains the queue when omitted
        #[arg(long)]
        max: Option<usize>,
    },
    /// Print the status of a job handle
    Status { handle: String },
    /// Queue the failed chunks of a job again
    Retry { job_id: String },
    /// Abort one chunk of a job
    Abort { job_id: String, index: u32 },
    /// Poll a job handle until it reaches a terminal status
    Watch {
        handle: String,

        /// Run one queued chunk between reads instead of sleeping
        #[arg(long)]
        work: bool,
    },
}

pub fn execute(global: &GlobalArgs, args: JobsArgs) -> CliResult {
    let mut ws = Workspace::open(global)?;
    let poll = ws.config.poll.clone();
    let mut engine = ws.engine();

    match args.command {
        JobsCommand::Run { max } => match apply_engine_command(EngineCommand::RunPending { max }, &mut engine)? {
            EngineCommandResult::ChunksRun(n) => println!("Ran {} chunk(s)", n),
            other => return Err(format!("unexpected command result: {:?}", other).into()),
        },
        JobsCommand::Status { handle } => match apply_engine_query(EngineQuery::JobStatus { handle }, &engine)? {
            EngineQueryResult::JobStatus(report) => print_json(&report)?,
            other => return Err(format!("unexpected query result: {:?}", other).into()),
        },
        JobsCommand::Retry { job_id } => {
            let job_id = parse_job_id(&job_id)?;
            match apply_engine_command(EngineCommand::RetryFailedChunks { job_id }, &mut engine)? {
                EngineCommandResult::ChunksRequeued(n) => println!("Requeued {} chunk(s)", n),
                other => return Err(format!("unexpected command result: {:?}", other).into()),
            }
        }
        JobsCommand::Abort { job_id, index } => {
            let job_id = parse_job_id(&job_id)?;
            match apply_engine_command(EngineCommand::AbortChunk { job_id, index }, &mut engine)? {
                EngineCommandResult::ChunkAborted(chunk) => print_json(&chunk)?,
                other => return Err(format!("unexpected command result: {:?}", other).into()),
            }
        }
        JobsCommand::Watch { handle, work } => {
            let outcome = if work {
                JobPoller::new(poll).with_sleep(|_| {}).poll(|| {
                    let report = engine.get_job_status(&handle)?;
                    eprintln!("{}: {}", report.handle, report.status_text);
                    if !report.is_terminal() {
                        engine.run_pending(Some(1))?;
                    }
                    Ok(report)
                })?
            } else {
                JobPoller::new(poll).poll(|| {
                    let report = engine.get_job_status(&handle)?;
                    eprintln!("{}: {}", report.handle, report.status_text);
                    Ok(report)
                })?
            };
            print_json(&outcome.report)?;
            if outcome.timed_out {
                return Err(format!(
                    "job {} still {} after {} poll(s)",
                    outcome.report.handle, outcome.report.status_text, outcome.attempts
                )
                .into());
            }
        }
    }
    Ok(())
}

fn parse_job_id(s: &str) -> CliResult<JobId> {
    JobId::parse(s).ok_or_else(|| format!("not a job id: {}", s).into())
}
