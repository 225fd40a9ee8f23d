use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use gorillionaire::adapters::{
    ChatSignalModel, HttpBlockchainClient, HttpOAuthClient, MemoryStore, PostgresStore, Store,
};
use gorillionaire::api::{create_router, AdminAuth, AppState};
use gorillionaire::config::{AppConfig, LoggingConfig};
use gorillionaire::coordination::{
    install_signal_handlers, GracefulShutdown, ShutdownSignal, ShutdownStep, ShutdownToken,
};
use gorillionaire::domain::SocialProvider;
use gorillionaire::jobs::{HolderSnapshotJob, JobScheduler, PriceUpdateJob, SignalGenerationJob};
use gorillionaire::supervisor::Supervisor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gorillionaire", version, about = "Gorillionaire backend service")]
struct Cli {
    /// Directory holding default.toml and per-environment overrides
    #[arg(long, env = "GORILLIONAIRE_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run the HTTP server and scheduled jobs (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
    /// Load and validate configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config_dir)
        .with_context(|| format!("failed to load configuration from {}", cli.config_dir.display()))?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::CheckConfig => {
            init_logging_simple();
            check_config(&config)
        }
        Command::Migrate => {
            init_logging(&config.logging);
            run_migrations(&config).await
        }
        Command::Serve => {
            init_logging(&config.logging);
            serve(config).await
        }
    }
}

pub fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},gorillionaire=debug,sqlx=warn", logging.level))
    });

    let log_dir = std::env::var("GORILLIONAIRE_LOG_DIR")
        .or_else(|_| std::env::var("LOG_DIR"))
        .unwrap_or_else(|_| "/var/log/gorillionaire".to_string());

    // `rolling::daily` panics if the first file cannot be created, so check
    // writability up front
    let file_layer = if std::fs::create_dir_all(&log_dir).is_ok() {
        let test_path = std::path::Path::new(&log_dir).join(".gorillionaire_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let file_appender = tracing_appender::rolling::daily(&log_dir, "gorillionaire.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                // The guard must outlive the process
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    } else {
        eprintln!(
            "Warning: Could not create log directory {}, file logging disabled",
            log_dir
        );
        None
    };

    let json_layer = logging
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let console_layer = (!logging.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    if file_logging_enabled {
        eprintln!("Logging to: {}/gorillionaire.log", log_dir);
    }
}

pub fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

fn check_config(config: &AppConfig) -> anyhow::Result<()> {
    match config.validate() {
        Ok(()) => {
            println!("Configuration OK");
            println!("  bind address:   {}", config.bind_addr());
            println!(
                "  store:          {}",
                if config.database.is_memory() { "memory" } else { "postgres" }
            );
            println!("  jobs enabled:   {}", config.jobs.enabled);
            println!(
                "  tracked tokens: {}",
                config.blockchain.tracked_tokens.len()
            );
            println!(
                "  oauth:          discord={} twitter={}",
                config.oauth.discord.is_some(),
                config.oauth.twitter.is_some()
            );
            Ok(())
        }
        Err(errors) => {
            for e in &errors {
                eprintln!("  - {}", e);
            }
            bail!("configuration has {} problem(s)", errors.len())
        }
    }
}

async fn run_migrations(config: &AppConfig) -> anyhow::Result<()> {
    if config.database.is_memory() {
        info!("Memory store configured, nothing to migrate");
        return Ok(());
    }

    let store = PostgresStore::new(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to PostgreSQL")?;
    store.migrate().await.context("migrations failed")?;
    store.close().await;
    Ok(())
}

async fn build_store(config: &AppConfig) -> anyhow::Result<(Arc<dyn Store>, Option<PostgresStore>)> {
    if config.database.is_memory() {
        warn!("Using in-memory store; data is lost on restart");
        return Ok((Arc::new(MemoryStore::new()), None));
    }

    let store = PostgresStore::new(&config.database.url, config.database.max_connections)
        .await
        .context("failed to connect to PostgreSQL")?;
    if config.database.run_migrations {
        store.migrate().await.context("migrations failed")?;
    }
    Ok((Arc::new(store.clone()), Some(store)))
}

fn build_state(config: &AppConfig, store: Arc<dyn Store>) -> anyhow::Result<AppState> {
    let admin = AdminAuth::from_env();
    match admin.fingerprint() {
        Some(fp) => info!("Admin token configured (sha256 {})", fp),
        None => warn!("No admin token configured; admin endpoints are locked or open per GORILLIONAIRE_API_ADMIN_AUTH_REQUIRED"),
    }

    let mut state = AppState::new(
        store,
        config.server.broadcast_capacity,
        config.oauth.state_ttl_secs,
        admin,
    );

    for (provider, client_config) in [
        (SocialProvider::Discord, &config.oauth.discord),
        (SocialProvider::Twitter, &config.oauth.twitter),
    ] {
        match client_config {
            Some(client_config) => {
                let client = HttpOAuthClient::new(provider, client_config.clone())?;
                state = state.with_oauth_provider(Arc::new(client));
                info!("{} OAuth enabled", provider);
            }
            None => info!("{} OAuth not configured", provider),
        }
    }

    Ok(state)
}

fn build_scheduler(config: &AppConfig, state: &AppState) -> anyhow::Result<JobScheduler> {
    let blockchain = Arc::new(HttpBlockchainClient::new(config.blockchain.clone())?);
    if !blockchain.is_configured() {
        warn!("Blockchain API key not set; holder and price jobs will likely fail");
    }
    let model = Arc::new(ChatSignalModel::new(config.llm.clone())?);
    if !model.is_configured() {
        warn!("LLM API key not set; signal generation will fail");
    }

    let mut scheduler = JobScheduler::new(Duration::from_secs(config.jobs.job_timeout_secs));
    scheduler
        .register(Arc::new(HolderSnapshotJob::new(
            blockchain.clone(),
            state.store.clone(),
            state.ws_tx.clone(),
            &config.blockchain,
            &config.jobs,
        )))
        .register(Arc::new(PriceUpdateJob::new(
            blockchain,
            state.store.clone(),
            state.ws_tx.clone(),
            &config.blockchain,
            &config.jobs,
        )))
        .register(Arc::new(SignalGenerationJob::new(
            model,
            state.store.clone(),
            state.ws_tx.clone(),
            state.signal_tx.clone(),
            &config.jobs,
        )));
    Ok(scheduler)
}

async fn serve_http(
    state: AppState,
    addr: String,
    cors_origins: Vec<String>,
    mut shutdown: ShutdownToken,
) -> gorillionaire::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on http://{}", addr);

    let app = create_router(state, &cors_origins);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.wait_for_shutdown().await;
        })
        .await?;

    Ok(())
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("Invalid configuration: {}", e);
        }
        bail!("configuration has {} problem(s)", errors.len());
    }

    info!("Starting Gorillionaire backend");
    let (store, postgres) = build_store(&config).await?;
    let mut state = build_state(&config, store)?;
    state.badges.seed_defaults().await?;

    let shutdown = Arc::new(GracefulShutdown::with_defaults());
    install_signal_handlers(shutdown.clone());

    let scheduler = if config.jobs.enabled {
        let mut scheduler = build_scheduler(&config, &state)?;
        state = state.with_job_stats(scheduler.stats());
        scheduler.start(shutdown.token());
        info!("Started {} scheduled jobs", scheduler.job_count());
        Some(scheduler)
    } else {
        info!("Scheduled jobs disabled");
        None
    };

    let supervisor = Supervisor::new("http-server", config.supervisor.clone());
    let factory = {
        let addr = config.bind_addr();
        let cors = config.server.cors_origins.clone();
        let token = shutdown.token();
        move || serve_http(state.clone(), addr.clone(), cors.clone(), token.clone())
    };
    let supervisor_token = shutdown.token();
    let mut supervised =
        tokio::spawn(async move { supervisor.run(supervisor_token, factory).await });

    let mut token = shutdown.token();
    let (signal, server_outcome) = tokio::select! {
        signal = token.wait_for_shutdown() => (signal, None),
        joined = &mut supervised => {
            // Server gave up or exited on its own; take the jobs down with it
            shutdown.request_shutdown(ShutdownSignal::Graceful);
            (ShutdownSignal::Graceful, Some(joined))
        }
    };

    let stop_jobs: ShutdownStep = Box::pin(async move {
        if let Some(mut scheduler) = scheduler {
            scheduler.join().await;
        }
    });
    let drain_server: ShutdownStep = if server_outcome.is_none() {
        Box::pin(async move {
            match supervised.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("HTTP server supervisor ended with error: {}", e),
                Err(e) => error!("HTTP server supervisor task failed: {}", e),
            }
        })
    } else {
        Box::pin(async {})
    };
    let close_store: ShutdownStep = Box::pin(async move {
        if let Some(postgres) = postgres {
            postgres.close().await;
        }
    });

    shutdown
        .execute(signal, stop_jobs, drain_server, close_store)
        .await;

    match server_outcome {
        Some(Ok(Err(e))) => Err(e).context("HTTP server could not be kept running"),
        Some(Err(e)) => Err(e).context("HTTP server supervisor task failed"),
        _ => Ok(()),
    }
}
