use std::{process, sync::Arc};

use flagcast::{
    application::{
        admin::{AdminApplicationService, AdminFlagService, AdminTagService, BulkTagService},
        error::AppError,
        operators::OperatorService,
        repos::{
            ApplicationsRepo, ApplicationsWriteRepo, DistributionRepo, FlagTagsWriteRepo,
            FlagsRepo, FlagsWriteRepo, OperatorsRepo, TagsRepo, TagsWriteRepo,
        },
    },
    cache::{CacheConfig, DistributionCache, RefreshScheduler},
    config::{self, OperatorsCommand},
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, ApiState, HttpState, RateLimiter, RouterState, SdkState},
        telemetry,
    },
};
use tokio::sync::Notify;
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
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Operators(command) => run_operators(settings, command).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let cache_config = CacheConfig::from(&settings.cache);

    let distribution_repo: Arc<dyn DistributionRepo> = repositories.clone();
    let cache = Arc::new(DistributionCache::new(distribution_repo));

    if cache_config.warm_on_startup {
        match cache.warm_up().await {
            Ok(summary) => info!(
                target: "flagcast::cache",
                applications = summary.loaded,
                "distribution cache warmed"
            ),
            Err(err) => warn!(
                target: "flagcast::cache",
                error = %err,
                "distribution cache warm-up failed; entries will load on demand"
            ),
        }
    }

    let scheduler = RefreshScheduler::start(cache.clone(), cache_config.refresh_interval);
    let router_state = build_router_state(&settings, repositories, cache);

    let result = serve_http(&settings, router_state).await;

    scheduler.stop().await;
    result
}

async fn run_operators(
    settings: config::Settings,
    command: OperatorsCommand,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let operators_repo: Arc<dyn OperatorsRepo> = repositories;
    let operators = OperatorService::new(operators_repo);

    match command {
        OperatorsCommand::Issue(args) => {
            let issued = operators.issue(&args.email, args.role).await?;
            info!(
                target: "flagcast::operators",
                email = %issued.record.email,
                role = %issued.record.role,
                "operator token issued"
            );
            println!("{}", issued.token);
        }
        OperatorsCommand::Revoke(args) => {
            operators.revoke(&args.email).await?;
            info!(
                target: "flagcast::operators",
                email = %args.email.trim().to_ascii_lowercase(),
                "operator token revoked"
            );
        }
    }

    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::database(err.to_string()))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_router_state(
    settings: &config::Settings,
    repositories: Arc<PostgresRepositories>,
    cache: Arc<DistributionCache>,
) -> RouterState {
    let applications_repo: Arc<dyn ApplicationsRepo> = repositories.clone();
    let applications_write_repo: Arc<dyn ApplicationsWriteRepo> = repositories.clone();
    let flags_repo: Arc<dyn FlagsRepo> = repositories.clone();
    let flags_write_repo: Arc<dyn FlagsWriteRepo> = repositories.clone();
    let tags_repo: Arc<dyn TagsRepo> = repositories.clone();
    let tags_write_repo: Arc<dyn TagsWriteRepo> = repositories.clone();
    let flag_tags_repo: Arc<dyn FlagTagsWriteRepo> = repositories.clone();
    let operators_repo: Arc<dyn OperatorsRepo> = repositories.clone();

    let api = ApiState {
        operators: Arc::new(OperatorService::new(operators_repo)),
        applications: Arc::new(AdminApplicationService::new(
            applications_repo.clone(),
            applications_write_repo,
            cache.clone(),
        )),
        flags: Arc::new(AdminFlagService::new(
            applications_repo.clone(),
            flags_repo.clone(),
            flags_write_repo,
            tags_repo.clone(),
            flag_tags_repo.clone(),
            cache.clone(),
        )),
        tags: Arc::new(AdminTagService::new(
            applications_repo.clone(),
            tags_repo.clone(),
            tags_write_repo,
            cache.clone(),
        )),
        bulk_tags: Arc::new(BulkTagService::new(
            applications_repo,
            flags_repo,
            tags_repo,
            flag_tags_repo,
            cache.clone(),
        )),
        rate_limiter: Arc::new(RateLimiter::new(
            settings.api_rate_limit.window,
            settings.api_rate_limit.max_requests.get(),
        )),
    };

    let sdk = SdkState {
        cache,
        rate_limiter: Arc::new(RateLimiter::new(
            settings.sdk_rate_limit.window,
            settings.sdk_rate_limit.max_requests.get(),
        )),
    };

    RouterState {
        http: HttpState { db: repositories },
        sdk,
        api,
    }
}

async fn serve_http(settings: &config::Settings, state: RouterState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let addr = settings.server.addr;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| InfraError::Bind { addr, source })?;

    info!(target: "flagcast::http", %addr, "listening");

    let draining = Arc::new(Notify::new());
    let trigger = draining.clone();
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            trigger.notify_waiters();
        })
        .into_future();
    tokio::pin!(server);

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = &mut server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            draining.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target: "flagcast::http",
                grace_secs = grace.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(target: "flagcast::http", "shutdown signal received, draining connections");
}
