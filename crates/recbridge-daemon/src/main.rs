//! recbridged - The recbridge gateway daemon
//!
//! Serves the HTTP/WebSocket surface in front of an upstream record system:
//! - `serve` - run the gateway
//! - `check` - verify configuration and upstream reachability
//! - `config show|validate` - inspect configuration
//!
//! Exit codes: `0` success, `1` configuration error, `2` upstream
//! unreachable at startup.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use recbridge_core::config::Config;
use recbridge_core::ports::broadcast::IEventBroadcaster;
use recbridge_core::ports::cache_store::ICacheStore;
use recbridge_gateway::{Gateway, RateLimiter, TenantResolver, UpstreamSettings};
use recbridge_server::{app, AppState, FanoutManager};
use recbridge_store::{DatabasePool, SqliteCacheStore, SqliteTenantDirectory};
use recbridge_telemetry::MetricsRegistry;

/// Exit code for configuration problems
const EXIT_CONFIG: u8 = 1;

/// Exit code when the upstream is unreachable at startup
const EXIT_UPSTREAM: u8 = 2;

/// Interval between expired-cache sweeps
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "recbridged", version, about = "Multi-tenant gateway and sync bridge")]
struct Cli {
    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the gateway server
    Serve,
    /// Verify configuration and upstream reachability, then exit
    Check,
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration as YAML
    Show,
    /// Validate the configuration file
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    init_tracing(&config);

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Check => check(&config).await,
        Commands::Config(ConfigCommand::Show) => show_config(&config),
        Commands::Config(ConfigCommand::Validate) => validate_config(&config),
    }
}

fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
}

fn validate_config(config: &Config) -> ExitCode {
    let errors = config.validate();
    if errors.is_empty() {
        println!("configuration ok");
        return ExitCode::SUCCESS;
    }
    for error in &errors {
        eprintln!("config error: {error}");
    }
    ExitCode::from(EXIT_CONFIG)
}

fn show_config(config: &Config) -> ExitCode {
    // Secrets stay out of the output.
    let mut shown = config.clone();
    if !shown.auth.jwt_secret.is_empty() {
        shown.auth.jwt_secret = "<set>".into();
    }
    if !shown.auth.webhook_api_key.is_empty() {
        shown.auth.webhook_api_key = "<set>".into();
    }
    match serde_yaml::to_string(&shown) {
        Ok(yaml) => {
            println!("{yaml}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("failed to render configuration: {e}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

/// Probe the upstream base URL; any HTTP answer counts as reachable
async fn upstream_reachable(url: &str) -> bool {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(client) => client,
        Err(_) => return false,
    };
    match client.get(url).send().await {
        Ok(_) => true,
        Err(e) => {
            error!(url, error = %e, "Upstream unreachable");
            false
        }
    }
}

async fn check(config: &Config) -> ExitCode {
    let errors = config.validate();
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("config error: {error}");
        }
        return ExitCode::from(EXIT_CONFIG);
    }

    if !upstream_reachable(&config.upstream.url).await {
        eprintln!("upstream unreachable: {}", config.upstream.url);
        return ExitCode::from(EXIT_UPSTREAM);
    }

    println!("ok");
    ExitCode::SUCCESS
}

async fn serve(config: Config) -> ExitCode {
    let errors = config.validate();
    if !errors.is_empty() {
        for error in &errors {
            error!(%error, "Invalid configuration");
        }
        return ExitCode::from(EXIT_CONFIG);
    }

    if !upstream_reachable(&config.upstream.url).await {
        return ExitCode::from(EXIT_UPSTREAM);
    }

    match run_server(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server terminated with error");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let pool = Arc::new(DatabasePool::new(&config.store.path).await?);
    let cache_store = Arc::new(SqliteCacheStore::new(Arc::clone(&pool)));
    let cache: Arc<dyn ICacheStore> = Arc::clone(&cache_store) as Arc<dyn ICacheStore>;
    let directory = Arc::new(SqliteTenantDirectory::new(Arc::clone(&pool)));

    let resolver = Arc::new(TenantResolver::new(
        directory,
        UpstreamSettings::from(&config.upstream),
    ));
    let fanout = Arc::new(FanoutManager::new());
    let metrics = Arc::new(MetricsRegistry::new()?);
    let limiter = RateLimiter::new(Arc::clone(&cache), config.rate_limit.clone());

    let gateway = Arc::new(Gateway::new(
        Arc::clone(&resolver),
        Arc::clone(&cache),
        Arc::clone(&fanout) as Arc<dyn IEventBroadcaster>,
        limiter,
        Arc::clone(&metrics),
    ));

    let state = AppState::new(&config, gateway, resolver, cache, fanout, metrics);
    let router = app(state);

    let shutdown = tokio_util::sync::CancellationToken::new();
    spawn_cache_purge(cache_store, shutdown.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "recbridge listening");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await?;

    info!("recbridge stopped");
    Ok(())
}

/// Periodic sweep of expired cache rows
fn spawn_cache_purge(
    cache: Arc<SqliteCacheStore>,
    shutdown: tokio_util::sync::CancellationToken,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match cache.purge_expired().await {
                        Ok(0) => {}
                        Ok(purged) => info!(purged, "Purged expired cache entries"),
                        Err(e) => warn!(error = %e, "Cache purge failed"),
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}
