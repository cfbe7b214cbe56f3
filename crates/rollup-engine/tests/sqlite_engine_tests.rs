//! The engine over the SQLite host, across connection reopen.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{config, count_def, schema, score_def};
use rollup_core::jobs::JobStatus;
use rollup_core::metadata::FieldNameMap;
use rollup_core::model::{FieldValue, Record};
use rollup_engine::{ParentRef, RollupEngine};
use rollup_store::SqliteHost;
use tempfile::TempDir;

fn setup() -> (TempDir, std::path::PathBuf, SqliteHost) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("rollup.db");
    let mut host = SqliteHost::open(&db_path).unwrap();
    for a in 0..3 {
        host.upsert_record(&Record::new("Account", format!("a{}", a))).unwrap();
        for c in 0..2 {
            host.upsert_record(
                &Record::new("Contact", format!("c{}-{}", a, c))
                    .with("AccountId", format!("a{}", a))
                    .with("Score", (c + 1) as i64),
            )
            .unwrap();
        }
    }
    (temp_dir, db_path, host)
}

fn stored(host: &SqliteHost, id: &str, field: &str) -> FieldValue {
    host.get_record("Account", id)
        .unwrap()
        .map(|r| r.get(field).clone())
        .unwrap_or(FieldValue::Null)
}

#[test]
fn test_chunked_job_survives_reopen() {
    let (_tmp, db_path, mut host) = setup();
    let schema = schema();

    let handle = {
        let mut engine = RollupEngine::new(&mut host, &schema, config(0, 2));
        let ticket = engine.recalculate_bulk(&[count_def()], Some("NIGHTLY")).unwrap();
        assert_eq!(ticket.total_chunks, 2);
        ticket.handle_text()
    };
    drop(host);

    // A separate worker process picks the queue up
    let mut worker = SqliteHost::open(&db_path).unwrap();
    assert_eq!(worker.queue_len().unwrap(), 2);
    {
        let mut engine = RollupEngine::new(&mut worker, &schema, config(0, 2));
        assert_eq!(engine.get_job_status_text(&handle).unwrap(), "Queued");
        assert_eq!(engine.run_pending(None).unwrap(), 2);
        assert_eq!(engine.get_job_status_text(&handle).unwrap(), "Completed");
    }

    assert_eq!(worker.queue_len().unwrap(), 0);
    for a in 0..3 {
        assert_eq!(stored(&worker, &format!("a{}", a), "ContactCount"), FieldValue::number(2));
    }
    let jobs = worker.recent_jobs(5).unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Completed);
    assert_eq!(jobs[0].invocation.as_deref(), Some("NIGHTLY"));
}

#[test]
fn test_stored_definitions_drive_parent_recalculation() {
    let (_tmp, _path, mut host) = setup();
    let schema = schema();
    let names = FieldNameMap::new("");
    host.save_definition(&count_def(), &names).unwrap();
    host.save_definition(&score_def(), &names).unwrap();

    let mut engine = RollupEngine::new(&mut host, &schema, config(100, 10));
    let report = engine
        .recalculate_parent(&ParentRef::new("Account", "a2"), Some("RECORD_PAGE"))
        .unwrap();
    assert_eq!(report.definitions, 2);
    drop(engine);

    assert_eq!(stored(&host, "a2", "ContactCount"), FieldValue::number(2));
    assert_eq!(stored(&host, "a2", "ScoreTotal"), FieldValue::number(3));
    assert!(stored(&host, "a0", "ScoreTotal").is_null());
}

#[test]
fn test_inline_run_is_idempotent_on_disk() {
    let (_tmp, _path, mut host) = setup();
    let schema = schema();
    let mut engine = RollupEngine::new(&mut host, &schema, config(100, 10));

    let first = engine.recalculate_bulk(&[score_def()], None).unwrap();
    assert_eq!(first.report.unwrap().write.succeeded, 3);
    let second = engine.recalculate_bulk(&[score_def()], None).unwrap();
    assert_eq!(second.report.unwrap().write.write_calls, 0);
}
