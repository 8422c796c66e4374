//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::NonZeroU32,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{CacheBackendKind, Namespace};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "storefront";
const ENV_PREFIX: &str = "STOREFRONT";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CACHE_KEY_PREFIX: &str = "storefront";
const DEFAULT_CACHE_MEMORY_CAPACITY: u64 = 10_000;
const DEFAULT_CACHE_OP_TIMEOUT_MS: u64 = 250;
const DEFAULT_CACHE_CONNECT_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_LISTING_TTL_SECS: u32 = 120;
const DEFAULT_DETAIL_TTL_SECS: u32 = 600;
const DEFAULT_REFERENCE_TTL_SECS: u32 = 1_800;
const DEFAULT_CART_TTL_SECS: u32 = 60;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_RATE_LIMIT_AUTH_MAX: u64 = 10;
const DEFAULT_RATE_LIMIT_CATALOG_MAX: u64 = 300;
const DEFAULT_RATE_LIMIT_MUTATION_MAX: u64 = 60;
const DEFAULT_RATE_LIMIT_CART_MAX: u64 = 120;
const DEFAULT_ORIGIN_QUERY_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_HTTP_MAX_AGE_CAP_SECS: u64 = 300;

/// Command-line arguments for the storefront binary.
#[derive(Debug, Parser)]
#[command(
    name = "storefront",
    version,
    about = "Storefront catalog API with a read-through response cache"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "STOREFRONT_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the storefront HTTP service.
    Serve(Box<ServeArgs>),
    /// Purge cached responses of the given namespaces from the configured store.
    #[command(name = "purge-cache")]
    PurgeCache(PurgeCacheArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheOverrides {
    /// Override the cache backend (memory|redis|none).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub cache_backend: Option<String>,

    /// Override the Redis connection URL.
    #[arg(long = "cache-redis-url", value_name = "URL")]
    pub cache_redis_url: Option<String>,

    /// Toggle the response cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub cache: CacheOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the rate limit window size.
    #[arg(long = "rate-limit-window-seconds", value_name = "SECONDS")]
    pub rate_limit_window_seconds: Option<u64>,

    /// Override the origin query timeout.
    #[arg(long = "origin-query-timeout-ms", value_name = "MILLIS")]
    pub origin_query_timeout_ms: Option<u64>,

    /// Seed the in-memory catalog from a TOML file.
    #[arg(long = "catalog-seed", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub catalog_seed: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct PurgeCacheArgs {
    #[command(flatten)]
    pub cache: CacheOverrides,

    /// Namespaces to purge (e.g. products, blog, category-tree).
    #[arg(value_name = "NAMESPACE", required_unless_present = "all")]
    pub namespaces: Vec<Namespace>,

    /// Purge every namespace.
    #[arg(long, action = clap::ArgAction::SetTrue, conflicts_with = "namespaces")]
    pub all: bool,
}

impl PurgeCacheArgs {
    pub fn targets(&self) -> Vec<Namespace> {
        if self.all {
            Namespace::ALL.to_vec()
        } else {
            self.namespaces.clone()
        }
    }
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    pub origin: OriginSettings,
    pub admin: AdminSettings,
    pub http: HttpSettings,
    pub catalog: CatalogSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub backend: CacheBackendKind,
    pub redis_url: Option<String>,
    pub key_prefix: String,
    pub memory_capacity: NonZeroU32,
    pub op_timeout_ms: NonZeroU32,
    pub connect_timeout_ms: NonZeroU32,
    /// Zero disables caching for the class.
    pub listing_ttl_secs: u32,
    pub detail_ttl_secs: u32,
    pub reference_ttl_secs: u32,
    pub cart_ttl_secs: u32,
}

/// Per route class request ceilings within one fixed window.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub window_seconds: NonZeroU32,
    pub auth_max_requests: NonZeroU32,
    pub catalog_max_requests: NonZeroU32,
    pub mutation_max_requests: NonZeroU32,
    pub cart_max_requests: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct OriginSettings {
    pub query_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AdminSettings {
    /// Bearer token for `/api/v1/admin`; admin routes reject every request without one.
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Upper bound for `Cache-Control: max-age`.
    pub max_age_cap: Duration,
}

#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub seed_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::PurgeCache(args)) => raw.apply_cache_overrides(&args.cache),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    rate_limit: RawRateLimitSettings,
    origin: RawOriginSettings,
    admin: RawAdminSettings,
    http: RawHttpSettings,
    catalog: RawCatalogSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(window) = overrides.rate_limit_window_seconds {
            self.rate_limit.window_seconds = Some(window);
        }
        if let Some(timeout) = overrides.origin_query_timeout_ms {
            self.origin.query_timeout_ms = Some(timeout);
        }
        if let Some(path) = overrides.catalog_seed.as_ref() {
            self.catalog.seed_path = Some(path.clone());
        }

        self.apply_cache_overrides(&overrides.cache);
    }

    fn apply_cache_overrides(&mut self, overrides: &CacheOverrides) {
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(url) = overrides.cache_redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            rate_limit,
            origin,
            admin,
            http,
            catalog,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let rate_limit = build_rate_limit_settings(rate_limit)?;
        let origin = build_origin_settings(origin)?;
        let admin = build_admin_settings(admin);
        let http = build_http_settings(http)?;
        let catalog = CatalogSettings {
            seed_path: catalog
                .seed_path
                .filter(|path| !path.as_os_str().is_empty()),
        };

        Ok(Self {
            server,
            logging,
            cache,
            rate_limit,
            origin,
            admin,
            http,
            catalog,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match cache.backend.as_deref().map(str::trim) {
        None | Some("memory") => CacheBackendKind::Memory,
        Some("redis") => CacheBackendKind::Redis,
        Some("none") => CacheBackendKind::None,
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.backend",
                format!("unknown backend `{other}` (expected memory, redis or none)"),
            ));
        }
    };

    let redis_url = cache.redis_url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });
    if backend == CacheBackendKind::Redis && redis_url.is_none() {
        return Err(LoadError::invalid(
            "cache.redis_url",
            "required when cache.backend = \"redis\"",
        ));
    }

    let key_prefix = cache
        .key_prefix
        .unwrap_or_else(|| DEFAULT_CACHE_KEY_PREFIX.to_string());
    if key_prefix.is_empty()
        || !key_prefix
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(LoadError::invalid(
            "cache.key_prefix",
            "must be non-empty and contain only [A-Za-z0-9_-]",
        ));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        backend,
        redis_url,
        key_prefix,
        memory_capacity: non_zero_u32(
            cache
                .memory_capacity
                .unwrap_or(DEFAULT_CACHE_MEMORY_CAPACITY),
            "cache.memory_capacity",
        )?,
        op_timeout_ms: non_zero_u32(
            cache.op_timeout_ms.unwrap_or(DEFAULT_CACHE_OP_TIMEOUT_MS),
            "cache.op_timeout_ms",
        )?,
        connect_timeout_ms: non_zero_u32(
            cache
                .connect_timeout_ms
                .unwrap_or(DEFAULT_CACHE_CONNECT_TIMEOUT_MS),
            "cache.connect_timeout_ms",
        )?,
        listing_ttl_secs: cache.listing_ttl_secs.unwrap_or(DEFAULT_LISTING_TTL_SECS),
        detail_ttl_secs: cache.detail_ttl_secs.unwrap_or(DEFAULT_DETAIL_TTL_SECS),
        reference_ttl_secs: cache
            .reference_ttl_secs
            .unwrap_or(DEFAULT_REFERENCE_TTL_SECS),
        cart_ttl_secs: cache.cart_ttl_secs.unwrap_or(DEFAULT_CART_TTL_SECS),
    })
}

fn build_rate_limit_settings(
    rate_limit: RawRateLimitSettings,
) -> Result<RateLimitSettings, LoadError> {
    let window_seconds = non_zero_u32(
        rate_limit
            .window_seconds
            .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        "rate_limit.window_seconds",
    )?;

    Ok(RateLimitSettings {
        window_seconds,
        auth_max_requests: non_zero_u32(
            rate_limit
                .auth_max_requests
                .unwrap_or(DEFAULT_RATE_LIMIT_AUTH_MAX),
            "rate_limit.auth_max_requests",
        )?,
        catalog_max_requests: non_zero_u32(
            rate_limit
                .catalog_max_requests
                .unwrap_or(DEFAULT_RATE_LIMIT_CATALOG_MAX),
            "rate_limit.catalog_max_requests",
        )?,
        mutation_max_requests: non_zero_u32(
            rate_limit
                .mutation_max_requests
                .unwrap_or(DEFAULT_RATE_LIMIT_MUTATION_MAX),
            "rate_limit.mutation_max_requests",
        )?,
        cart_max_requests: non_zero_u32(
            rate_limit
                .cart_max_requests
                .unwrap_or(DEFAULT_RATE_LIMIT_CART_MAX),
            "rate_limit.cart_max_requests",
        )?,
    })
}

fn build_origin_settings(origin: RawOriginSettings) -> Result<OriginSettings, LoadError> {
    let timeout_ms = origin
        .query_timeout_ms
        .unwrap_or(DEFAULT_ORIGIN_QUERY_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "origin.query_timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(OriginSettings {
        query_timeout: Duration::from_millis(timeout_ms),
    })
}

fn build_admin_settings(admin: RawAdminSettings) -> AdminSettings {
    AdminSettings {
        token: admin.token.and_then(|value| {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }),
    }
}

fn build_http_settings(http: RawHttpSettings) -> Result<HttpSettings, LoadError> {
    let cap = http
        .max_age_cap_seconds
        .unwrap_or(DEFAULT_HTTP_MAX_AGE_CAP_SECS);
    if cap == 0 {
        return Err(LoadError::invalid(
            "http.max_age_cap_seconds",
            "must be greater than zero",
        ));
    }

    Ok(HttpSettings {
        max_age_cap: Duration::from_secs(cap),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    backend: Option<String>,
    redis_url: Option<String>,
    key_prefix: Option<String>,
    memory_capacity: Option<u64>,
    op_timeout_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    listing_ttl_secs: Option<u32>,
    detail_ttl_secs: Option<u32>,
    reference_ttl_secs: Option<u32>,
    cart_ttl_secs: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRateLimitSettings {
    window_seconds: Option<u64>,
    auth_max_requests: Option<u64>,
    catalog_max_requests: Option<u64>,
    mutation_max_requests: Option<u64>,
    cart_max_requests: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOriginSettings {
    query_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAdminSettings {
    token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawHttpSettings {
    max_age_cap_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCatalogSettings {
    seed_path: Option<PathBuf>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
