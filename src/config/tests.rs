use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.cache.backend = Some("redis".to_string());
    raw.cache.redis_url = Some("redis://cache:6379".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        cache: CacheOverrides {
            cache_backend: Some("memory".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.cache.backend, CacheBackendKind::Memory);
}

#[test]
fn defaults_match_ttl_policy() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert!(settings.cache.enabled);
    assert_eq!(settings.cache.backend, CacheBackendKind::Memory);
    assert_eq!(settings.cache.listing_ttl_secs, 120);
    assert_eq!(settings.cache.detail_ttl_secs, 600);
    assert_eq!(settings.cache.reference_ttl_secs, 1_800);
    assert_eq!(settings.cache.cart_ttl_secs, 60);
    assert_eq!(settings.origin.query_timeout, Duration::from_secs(2));
    assert!(settings.admin.token.is_none());
    assert!(settings.catalog.seed_path.is_none());
}

#[test]
fn redis_backend_requires_url() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("redis".to_string());
    raw.cache.redis_url = Some("   ".to_string());

    let err = Settings::from_raw(raw).expect_err("missing url must be rejected");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.redis_url",
            ..
        }
    ));
}

#[test]
fn unknown_backend_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("memcached".to_string());

    let err = Settings::from_raw(raw).expect_err("unknown backend");
    assert!(err.to_string().contains("memcached"));
}

#[test]
fn key_prefix_must_not_contain_separators() {
    let mut raw = RawSettings::default();
    raw.cache.key_prefix = Some("shop:eu".to_string());

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "cache.key_prefix",
            ..
        })
    ));
}

#[test]
fn zero_rate_limit_is_rejected() {
    let mut raw = RawSettings::default();
    raw.rate_limit.auth_max_requests = Some(0);

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "rate_limit.auth_max_requests",
            ..
        })
    ));
}

#[test]
fn blank_admin_token_is_treated_as_absent() {
    let mut raw = RawSettings::default();
    raw.admin.token = Some("  ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.admin.token.is_none());
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
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["storefront"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "storefront",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--cache-backend",
        "none",
        "--catalog-seed",
        "/srv/catalog.toml",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.cache.cache_backend.as_deref(), Some("none"));
            assert_eq!(
                serve.overrides.catalog_seed.as_deref(),
                Some(std::path::Path::new("/srv/catalog.toml"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_purge_cache_namespaces() {
    let args = CliArgs::parse_from([
        "storefront",
        "purge-cache",
        "--cache-redis-url",
        "redis://localhost",
        "products",
        "category-tree",
    ]);

    match args.command.expect("purge command") {
        Command::PurgeCache(purge) => {
            assert_eq!(
                purge.targets(),
                vec![Namespace::Products, Namespace::CategoryTree]
            );
            assert_eq!(
                purge.cache.cache_redis_url.as_deref(),
                Some("redis://localhost")
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn purge_cache_all_expands_to_every_namespace() {
    let args = CliArgs::parse_from(["storefront", "purge-cache", "--all"]);
    match args.command.expect("purge command") {
        Command::PurgeCache(purge) => assert_eq!(purge.targets().len(), Namespace::ALL.len()),
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn purge_cache_rejects_unknown_namespace() {
    let result = CliArgs::try_parse_from(["storefront", "purge-cache", "orders"]);
    assert!(result.is_err());
}

#[test]
#[serial_test::serial]
fn environment_overrides_config_file() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(
        &mut file,
        b"[cache]\nlisting_ttl_secs = 45\ndetail_ttl_secs = 300\n",
    )
    .expect("write config");

    let cli = CliArgs::parse_from([
        "storefront",
        "--config-file",
        file.path().to_str().expect("utf-8 path"),
    ]);

    // SAFETY: serialized with every other test touching the environment.
    unsafe { std::env::set_var("STOREFRONT__CACHE__LISTING_TTL_SECS", "90") };
    let settings = load(&cli);
    unsafe { std::env::remove_var("STOREFRONT__CACHE__LISTING_TTL_SECS") };

    let settings = settings.expect("settings load");
    assert_eq!(settings.cache.listing_ttl_secs, 90);
    assert_eq!(settings.cache.detail_ttl_secs, 300);
}
