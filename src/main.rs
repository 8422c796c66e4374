use std::{process, sync::Arc};

use storefront::{
    application::{
        blogs::BlogService,
        cart::CartService,
        catalog::ProductService,
        error::AppError,
        repos::{
            BlogsRepo, BlogsWriteRepo, CartRepo, ProductsRepo, ProductsWriteRepo, TaxonomyRepo,
            TaxonomyWriteRepo,
        },
        taxonomy::TaxonomyService,
    },
    cache::{self, CacheConfig, CacheState},
    config,
    infra::{
        db::InMemoryRepositories,
        http::{self, ApiState, RateGuard, RateLimits},
        seed, telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::PurgeCache(args) => run_purge_cache(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let store = cache::connect(&cache_config).await;
    let cache = CacheState::new(store, cache_config);

    let repositories = Arc::new(InMemoryRepositories::new());
    if let Some(path) = settings.catalog.seed_path.as_deref() {
        seed::load_seed_file(path, &repositories).await?;
    } else {
        warn!("No catalog seed configured; starting with an empty catalog");
    }

    let state = build_api_state(&settings, repositories, cache.clone());
    let pruner = state.rate_guard.spawn_pruner();

    let router = http::build_router(state);
    let result = http::serve(
        settings.server.addr,
        router,
        settings.server.graceful_shutdown,
    )
    .await;

    pruner.abort();
    let _ = pruner.await;
    cache.store.close().await;

    result.map_err(AppError::from)
}

async fn run_purge_cache(
    settings: config::Settings,
    args: config::PurgeCacheArgs,
) -> Result<(), AppError> {
    let targets = args.targets();
    if targets.is_empty() {
        return Err(AppError::validation(
            "name at least one namespace or pass --all",
        ));
    }

    let cache_config = CacheConfig::from(&settings.cache);
    let store = cache::connect(&cache_config).await;
    let cache = CacheState::new(store, cache_config);

    let mut incomplete = Vec::new();
    for namespace in targets {
        let report = cache.invalidator.purge_namespace(namespace).await;
        info!(
            namespace = namespace.as_str(),
            deleted = report.deleted,
            failed = report.failed.len(),
            "Namespace purged"
        );
        if !report.is_complete() {
            incomplete.push(namespace.as_str());
        }
    }
    cache.store.close().await;

    if incomplete.is_empty() {
        Ok(())
    } else {
        Err(AppError::unexpected(format!(
            "purge incomplete for namespaces: {}",
            incomplete.join(", ")
        )))
    }
}

fn build_api_state(
    settings: &config::Settings,
    repositories: Arc<InMemoryRepositories>,
    cache: CacheState,
) -> ApiState {
    let products_repo: Arc<dyn ProductsRepo> = repositories.clone();
    let products_write_repo: Arc<dyn ProductsWriteRepo> = repositories.clone();
    let blogs_repo: Arc<dyn BlogsRepo> = repositories.clone();
    let blogs_write_repo: Arc<dyn BlogsWriteRepo> = repositories.clone();
    let taxonomy_repo: Arc<dyn TaxonomyRepo> = repositories.clone();
    let taxonomy_write_repo: Arc<dyn TaxonomyWriteRepo> = repositories.clone();
    let cart_repo: Arc<dyn CartRepo> = repositories;
    let origin_timeout = settings.origin.query_timeout;

    let products = Arc::new(ProductService::new(
        products_repo.clone(),
        products_write_repo,
        blogs_repo.clone(),
        taxonomy_repo.clone(),
        cache.clone(),
        origin_timeout,
    ));
    let blogs = Arc::new(BlogService::new(
        blogs_repo.clone(),
        blogs_write_repo,
        products_repo.clone(),
        taxonomy_repo.clone(),
        cache.clone(),
        origin_timeout,
    ));
    let taxonomy = Arc::new(TaxonomyService::new(
        taxonomy_repo,
        taxonomy_write_repo,
        products_repo.clone(),
        blogs_repo,
        cache.clone(),
        origin_timeout,
    ));
    let cart = Arc::new(CartService::new(
        cart_repo,
        products_repo,
        cache.clone(),
        origin_timeout,
    ));

    ApiState {
        products,
        blogs,
        taxonomy,
        cart,
        cache,
        rate_guard: RateGuard::new(RateLimits::from(&settings.rate_limit)),
        admin_token: settings.admin.token.as_deref().map(Arc::from),
        max_age_cap: settings.http.max_age_cap,
    }
}
