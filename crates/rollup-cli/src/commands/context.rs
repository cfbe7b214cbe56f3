//! Options shared by every command and the workspace they open

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::Args;
use rollup_core::logging_facility::Profile;
use rollup_core::{EngineConfig, SchemaRegistry};
use rollup_engine::RollupEngine;
use rollup_store::{load_engine_config, SqliteHost};
use serde::Serialize;

pub type CliResult<T = ()> = Result<T, Box<dyn Error>>;

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// SQLite database holding records, definitions and jobs
    #[arg(long, global = true, default_value = ".rollup/rollup.db")]
    pub db: PathBuf,

    /// JSON describe information for every object type
    #[arg(long, global = true, default_value = ".rollup/schema.json")]
    pub schema: PathBuf,

    /// Engine config TOML file; overrides any stored profile
    #[arg(long, global = true, conflicts_with = "profile")]
    pub config: Option<PathBuf>,

    /// Stored engine config profile (defaults to the profile marked default)
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Log output: development, production or test
    #[arg(long, global = true, default_value = "development")]
    pub log: Profile,
}

/// Database, schema and engine config for one invocation
pub struct Workspace {
    pub host: SqliteHost,
    pub schema: SchemaRegistry,
    pub config: EngineConfig,
}

impl Workspace {
    pub fn open(global: &GlobalArgs) -> CliResult<Self> {
        if let Some(dir) = global.db.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let schema = load_schema(&global.schema)?;
        let host = SqliteHost::open(&global.db)?.with_schema(schema.clone());
        let config = match &global.config {
            Some(path) => EngineConfig::from_toml_str(&std::fs::read_to_string(path)?)?,
            None => load_engine_config(host.connection(), global.profile.as_deref())?,
        };
        tracing::debug!(db = %global.db.display(), objects = schema.objects().count(), "workspace opened");
        Ok(Self { host, schema, config })
    }

    pub fn engine(&mut self) -> RollupEngine<'_, SqliteHost> {
        RollupEngine::new(&mut self.host, &self.schema, self.config.clone())
    }
}

fn load_schema(path: &Path) -> CliResult<SchemaRegistry> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read schema file {}: {}", path.display(), e))?;
    Ok(SchemaRegistry::from_json(&json)?)
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
