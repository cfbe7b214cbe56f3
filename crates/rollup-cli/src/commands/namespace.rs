//! Namespace command

use rollup_engine::commands::engine_query::{apply_engine_query, EngineQuery, EngineQueryResult};

use super::context::{print_json, CliResult, GlobalArgs, Workspace};

pub fn execute(global: &GlobalArgs) -> CliResult {
    let mut ws = Workspace::open(global)?;
    let engine = ws.engine();
    match apply_engine_query(EngineQuery::NamespaceInfo, &engine)? {
        EngineQueryResult::NamespaceInfo(info) => print_json(&info),
        other => Err(format!("unexpected query result: {:?}", other).into()),
    }
}
