use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use arena_tracker::config::{Config, ConfigLoader};
use arena_tracker::domain::Region;
use arena_tracker::error::ArenaError;
use arena_tracker::scanner::ScanTarget;

#[test]
fn parse_config_overrides() {
    let config: Config = serde_json::from_str(
        r#"{
            "api_base": "https://proxy.example/",
            "region": "europe",
            "staleness_hours": 1,
            "match_count": 60,
            "chunk_size": 20,
            "chunk_delay_ms": 250,
            "rolling_window": 5,
            "cache_dir": "/tmp/arena"
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.source.api_base, "https://proxy.example");
    assert_eq!(resolved.source.region, Some(Region::Europe));
    assert_eq!(resolved.policy.staleness, Duration::from_secs(3600));
    assert_eq!(resolved.policy.incremental_window, 60);
    assert_eq!(resolved.policy.initial_scan, ScanTarget::Bounded(60));
    assert_eq!(resolved.tuning.chunk_size, 20);
    assert_eq!(resolved.tuning.chunk_delay, Duration::from_millis(250));
    assert_eq!(resolved.tuning.page_delay, Duration::from_millis(300));
    assert_eq!(resolved.rolling_window, 5);
    assert_eq!(resolved.cache_dir.as_deref().map(|p| p.as_str()), Some("/tmp/arena"));
}

#[test]
fn full_history_switches_initial_scan() {
    let config = Config {
        full_history_on_first_sync: Some(true),
        ..Config::default()
    };
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.policy.initial_scan, ScanTarget::Unbounded);
    assert_eq!(resolved.policy.incremental_window, 120);
}

#[test]
fn rejects_out_of_range_values() {
    let oversized = Config {
        chunk_size: Some(21),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(oversized),
        Err(ArenaError::InvalidConfig(_))
    );

    let zero_page = Config {
        page_size: Some(0),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(zero_page),
        Err(ArenaError::InvalidConfig(_))
    );

    let zero_window = Config {
        rolling_window: Some(0),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(zero_window),
        Err(ArenaError::InvalidConfig(_))
    );

    let not_http = Config {
        api_base: Some("ftp://proxy".to_string()),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(not_http),
        Err(ArenaError::InvalidConfig(_))
    );
}

#[test]
fn explicit_path_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(missing.to_str()),
        Err(ArenaError::ConfigRead(_))
    );
}

#[test]
fn reads_file_and_reports_bad_json() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("arena-tracker.json");
    fs::write(&good, r#"{"page_more": 50}"#).unwrap();
    let resolved = ConfigLoader::resolve(good.to_str()).unwrap();
    assert_eq!(resolved.policy.load_more_count, 50);

    let bad = dir.path().join("bad.json");
    fs::write(&bad, "{ not json").unwrap();
    assert_matches!(
        ConfigLoader::resolve(bad.to_str()),
        Err(ArenaError::ConfigParse(_))
    );
}

#[test]
fn huge_staleness_saturates() {
    let config = Config {
        staleness_hours: Some(u64::MAX),
        ..Config::default()
    };
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.policy.staleness, Duration::from_secs(u64::MAX));
}
