use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn defaults_cover_every_section() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 8080);
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.database.max_connections.get(), 8);
    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.default_ttl, Duration::from_secs(120));
    assert_eq!(settings.cache.medium_ttl, Duration::from_secs(300));
    assert_eq!(settings.observer.duplicate_repetition_threshold, 3);
    assert_eq!(settings.observer.slow_query, Duration::from_millis(100));
    assert_eq!(settings.observer.query_count_warning, 50);
    assert_eq!(settings.observer.query_count_critical, 100);
    assert_eq!(settings.governor.warning_connections, 50);
    assert_eq!(settings.governor.emergency_connections, 80);
    assert_eq!(settings.governor.idle_ttl, Duration::from_secs(300));
}

#[test]
fn default_tier_lists_are_populated() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert!(settings.cache.bypass.iter().any(|p| p == "/admin/"));
    assert!(settings.cache.medium_paths.iter().any(|p| p == "-list/"));
}

#[test]
fn zero_port_is_rejected() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(0);

    let error = Settings::from_raw(raw).expect_err("invalid settings");
    assert!(matches!(error, LoadError::Invalid { key, .. } if key == "server.port"));
}

#[test]
fn zero_database_pool_is_rejected() {
    let mut raw = RawSettings::default();
    raw.database.max_connections = Some(0);

    let error = Settings::from_raw(raw).expect_err("invalid settings");
    assert!(
        matches!(error, LoadError::Invalid { key, .. } if key == "database.max_connections")
    );
}

#[test]
fn emergency_threshold_must_exceed_warning() {
    let mut raw = RawSettings::default();
    raw.governor.warning_connections = Some(80);
    raw.governor.emergency_connections = Some(80);

    let error = Settings::from_raw(raw).expect_err("invalid settings");
    assert!(
        matches!(error, LoadError::Invalid { key, .. } if key == "governor.emergency_connections")
    );
}

#[test]
fn critical_query_count_must_not_undercut_warning() {
    let mut raw = RawSettings::default();
    raw.observer.query_count_warning = Some(60);
    raw.observer.query_count_critical = Some(40);

    let error = Settings::from_raw(raw).expect_err("invalid settings");
    assert!(
        matches!(error, LoadError::Invalid { key, .. } if key == "observer.query_count_critical")
    );
}

#[test]
fn blank_database_url_reads_as_unset() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn runtime_configs_inherit_settings() {
    let mut raw = RawSettings::default();
    raw.cache.medium_ttl_seconds = Some(600);
    raw.observer.slow_query_ms = Some(250);
    raw.governor.idle_ttl_seconds = Some(120);

    let settings = Settings::from_raw(raw).expect("valid settings");

    let cache = crate::cache::CacheConfig::from(&settings.cache);
    assert_eq!(cache.medium.ttl, Duration::from_secs(600));

    let observer = crate::observer::ObserverConfig::from(&settings.observer);
    assert_eq!(observer.slow_query, Duration::from_millis(250));

    let governor = crate::governor::GovernorConfig::from(&settings.governor);
    assert_eq!(governor.idle_ttl, Duration::from_secs(120));
}
