use rollup_core::errors::ExErrorKind;
use rollup_core::EngineConfig;
use rollup_store::profile::{list_profiles, save_profile};
use rollup_store::{load_engine_config, SqliteHost};

#[test]
fn test_missing_default_profile_falls_back_to_defaults() {
    let host = SqliteHost::open_in_memory().unwrap();
    let config = load_engine_config(host.connection(), None).unwrap();
    assert_eq!(config, EngineConfig::default());
}

#[test]
fn test_explicit_missing_profile_is_not_found() {
    let host = SqliteHost::open_in_memory().unwrap();
    let err = load_engine_config(host.connection(), Some("nightly")).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::NotFound);
}

#[test]
fn test_default_profile_is_used_when_no_ref_given() {
    let mut host = SqliteHost::open_in_memory().unwrap();
    let nightly = EngineConfig {
        sync_threshold: 50,
        chunk_size: 10,
        ..EngineConfig::default()
    };
    let interactive = EngineConfig {
        sync_threshold: 5000,
        ..EngineConfig::default()
    };
    save_profile(host.connection_mut(), "nightly", &nightly, true).unwrap();
    save_profile(host.connection_mut(), "interactive", &interactive, false).unwrap();

    assert_eq!(load_engine_config(host.connection(), None).unwrap(), nightly);
    assert_eq!(
        load_engine_config(host.connection(), Some("interactive")).unwrap(),
        interactive
    );

    save_profile(host.connection_mut(), "interactive", &interactive, true).unwrap();
    let profiles = list_profiles(host.connection()).unwrap();
    assert_eq!(
        profiles,
        vec![("interactive".to_string(), true), ("nightly".to_string(), false)]
    );
}

#[test]
fn test_invalid_profile_is_rejected_on_save() {
    let mut host = SqliteHost::open_in_memory().unwrap();
    let bad = EngineConfig {
        chunk_size: 0,
        ..EngineConfig::default()
    };
    assert!(save_profile(host.connection_mut(), "broken", &bad, false).is_err());
}
