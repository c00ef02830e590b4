/// Version injected at compile time via FUNCTION_DISCOVERY_VERSION (set by
/// CI/CD), or "dev" for local builds.
pub const VERSION: &str = match option_env!("FUNCTION_DISCOVERY_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use function_discovery::aws::{AccessToken, AwsDiscovery, LambdaClient, Poller, StoreRegionUpdater};
use function_discovery::config::Config;
use function_discovery::controller::Controller;
use function_discovery::discovery::{FetcherDiscovery, Registry, SwaggerDiscovery};
use function_discovery::gcp::{GcfFetcher, GcpClient, GcpCredentials, GcpHttpClient};
use function_discovery::resolver::SpecResolver;
use function_discovery::store::{MemoryStore, UpstreamStore};
use function_discovery::TransientPolicy;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Discover the functions behind gateway upstreams
#[derive(Parser, Debug)]
#[command(name = "function-discovery", version, about, long_about = None)]
struct Args {
    /// Configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// YAML list of upstreams to seed the in-memory store with
    #[arg(short, long)]
    upstreams: Option<PathBuf>,

    /// Only watch upstreams in this namespace
    #[arg(short, long)]
    namespace: Option<String>,

    /// Number of reconciliation workers
    #[arg(long)]
    workers: Option<usize>,

    /// Requeues before an upstream is abandoned
    #[arg(long)]
    max_retries: Option<u32>,

    /// Seconds between Lambda polls
    #[arg(long)]
    poll_period: Option<u64>,

    /// Extra retries for each Swagger probe
    #[arg(long)]
    swagger_retries: Option<u32>,

    /// Swagger URI to try before the built-in ones (repeatable)
    #[arg(long = "swagger-uri")]
    swagger_uris: Vec<String>,

    /// Which network failures keep an upstream eligible for Swagger probing
    #[arg(long, value_enum)]
    transient_policy: Option<TransientPolicy>,

    #[arg(long)]
    disable_swagger: bool,

    #[arg(long)]
    disable_aws: bool,

    #[arg(long)]
    disable_gcf: bool,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(ns) = &self.namespace {
            config.namespace = Some(ns.clone());
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(period) = self.poll_period {
            config.aws.poll_period_secs = period;
        }
        if let Some(retries) = self.swagger_retries {
            config.swagger.retries = retries;
        }
        if !self.swagger_uris.is_empty() {
            config.swagger.uris = self.swagger_uris.clone();
        }
        if let Some(policy) = self.transient_policy {
            config.swagger.transient_policy = policy;
        }
        config.swagger.enabled &= !self.disable_swagger;
        config.aws.enabled &= !self.disable_aws;
        config.gcf.enabled &= !self.disable_gcf;
    }
}

fn setup_logging(
    level: LogLevel,
    log_file: Option<&PathBuf>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    // RUST_LOG wins over --log-level when set
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing_level.to_string().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false);

    let Some(log_path) = log_file else {
        builder.with_writer(std::io::stderr).init();
        return Ok(None);
    };

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    builder
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("Log file: {:?}", log_path);
    Ok(Some(guard))
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(format!("function-discovery/{}", VERSION))
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to create HTTP client")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_level, args.log_file.as_ref())?;

    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate().context("Invalid settings")?;
    tracing::info!("function-discovery {} starting", VERSION);
    tracing::debug!("Effective config: {:?}", config);

    let store = match &args.upstreams {
        Some(path) => MemoryStore::from_manifest(path).await?,
        None => MemoryStore::new(),
    };
    let store: Arc<dyn UpstreamStore> = Arc::new(store);
    let cancel = CancellationToken::new();
    let mut registry = Registry::new();
    let mut pollers = Vec::new();

    if config.swagger.enabled {
        registry.register(Arc::new(SwaggerDiscovery::new(
            http_client(config.swagger.timeout_secs)?,
            Arc::new(SpecResolver),
            config.swagger.uris.clone(),
            config.swagger.retries,
            config.swagger.transient_policy,
        )));
    }

    if config.aws.enabled {
        match AccessToken::from_env() {
            Ok(token) => {
                let client = LambdaClient::new(
                    http_client(config.aws.timeout_secs)?,
                    config.aws.endpoint.clone(),
                );
                let poller = Arc::new(Poller::new(
                    Arc::new(client),
                    Arc::new(StoreRegionUpdater::new(Arc::clone(&store))),
                ));
                pollers.push(poller.start(
                    Duration::from_secs(config.aws.poll_period_secs),
                    cancel.clone(),
                ));
                registry.register(Arc::new(AwsDiscovery::new(poller, token)));
            }
            Err(e) => tracing::warn!("AWS discovery disabled: {}", e),
        }
    }

    if config.gcf.enabled {
        match GcpCredentials::new().await {
            Ok(credentials) => {
                let http = GcpHttpClient::new(http_client(config.gcf.timeout_secs)?);
                let mut client = GcpClient::new(Arc::new(credentials), http);
                if let Some(endpoint) = &config.gcf.endpoint {
                    client = client.with_base_url(endpoint.clone());
                }
                let project = config
                    .gcf
                    .project
                    .clone()
                    .or_else(function_discovery::gcp::auth::get_default_project);
                registry.register(Arc::new(FetcherDiscovery::new(Arc::new(GcfFetcher::new(
                    client, project,
                )))));
            }
            Err(e) => tracing::warn!("GCF discovery disabled: {:#}", e),
        }
    }

    let controller = Arc::new(Controller::new(
        Arc::clone(&store),
        registry,
        config.controller_options(),
    ));
    let running = tokio::spawn(controller.run(cancel.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Received Ctrl-C, shutting down");
    cancel.cancel();

    if let Err(e) = running.await {
        tracing::warn!("Controller task failed: {}", e);
    }
    for poller in pollers {
        if let Err(e) = poller.await {
            tracing::warn!("Lambda poller task failed: {}", e);
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
