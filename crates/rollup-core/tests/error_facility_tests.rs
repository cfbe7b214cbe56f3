#![allow(clippy::unwrap_used, clippy::expect_used)]

use rollup_core::errors::{ExError, ExErrorKind, RollupError};
use rollup_core::metadata::MetadataResolver;
use rollup_core::model::{Operation, RollupDefinition};
use rollup_core::EngineConfig;

mod common;

#[test]
fn test_configuration_errors_map_to_stable_code() {
    let def = RollupDefinition::new("Contact", "AccountId", "Account", "Id", "FirstName", "TotalAmount", Operation::Sum);
    let err = MetadataResolver::new(&common::sales_schema(), &EngineConfig::default())
        .resolve(&def)
        .unwrap_err();
    assert!(matches!(err, RollupError::IncompatibleField { .. }));

    let ex: ExError = err.into();
    assert_eq!(ex.kind(), ExErrorKind::Configuration);
    assert_eq!(ex.code(), "ERR_CONFIGURATION");
    assert!(ex.kind().is_validation());
}

#[test]
fn test_unknown_object_type_is_configuration_error() {
    let def = RollupDefinition::new("Lead", "AccountId", "Account", "Id", "FirstName", "ContactNames", Operation::Concat);
    let err = MetadataResolver::new(&common::sales_schema(), &EngineConfig::default())
        .resolve(&def)
        .unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::Configuration);
}

#[test]
fn test_filter_errors_report_position() {
    let def = RollupDefinition::new("Contact", "AccountId", "Account", "Id", "FirstName", "ContactNames", Operation::Concat)
        .with_filter("Score > ");
    let err = MetadataResolver::new(&common::sales_schema(), &EngineConfig::default())
        .resolve(&def)
        .unwrap_err();
    let ex: ExError = err.into();
    assert_eq!(ex.kind(), ExErrorKind::InvalidFilter);
    assert_eq!(ex.code(), "ERR_INVALID_FILTER");
}

#[test]
fn test_partial_write_carries_failed_ids() {
    let err = RollupError::PartialWrite {
        attempted: 3,
        failed_ids: vec!["a2".to_string()],
        message: "a2: locked".to_string(),
    };
    let ex: ExError = err.into();
    assert_eq!(ex.kind(), ExErrorKind::PartialWrite);
    assert_eq!(ex.failed_ids(), Some(&["a2".to_string()][..]));
}

#[test]
fn test_builder_context_is_kept() {
    let ex = ExError::new(ExErrorKind::DataAccess)
        .with_op("fetch_children")
        .with_definition_id("def-1")
        .with_job_id("job-1")
        .with_message("host unavailable");
    assert_eq!(ex.op(), Some("fetch_children"));
    assert_eq!(ex.definition_id(), Some("def-1"));
    assert_eq!(ex.job_id(), Some("job-1"));
    assert_eq!(ex.code(), "ERR_DATA_ACCESS");
    assert!(ex.to_string().contains("host unavailable"));
}
