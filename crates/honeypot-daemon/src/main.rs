//! Ollama honeypot daemon
//!
//! Serves the impersonated Ollama/OpenAI API and records every request.

use anyhow::Context;
use clap::Parser;
use honeypot_api::{create_router, AppState};
use honeypot_core::HoneypotConfig;
use honeypot_engine::ResponseCorpus;
use honeypot_network::RegistryClient;
use honeypot_store::{JsonFileSnapshot, ModelRegistry};
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Timeout for upstream manifest requests
const MANIFEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Ollama honeypot - answers like an Ollama server and logs who is asking
#[derive(Parser, Debug)]
#[command(name = "ollama-honeypot")]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind the API server
    #[arg(long)]
    address: Option<String>,

    /// Port for the API server
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Directory holding tags.json, response.json and version.json
    #[arg(short, long, env = "MOCK_PATH")]
    mock_path: Option<PathBuf>,

    /// Directory receiving audit.log
    #[arg(short = 'a', long, env = "LOG_PATH")]
    log_path: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,
}

impl Args {
    /// Configuration file, then environment, then flags
    fn into_config(self) -> anyhow::Result<HoneypotConfig> {
        let mut config = match &self.config {
            Some(path) => HoneypotConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => HoneypotConfig::default(),
        };
        config.apply_env();

        if let Some(address) = self.address {
            config.server.address = address;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(path) = self.mock_path {
            config.mock.path = path;
        }
        if let Some(path) = self.log_path {
            config.audit.path = Some(path);
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        Ok(config)
    }
}

/// Read a `.env` file; variables already set in the environment win.
/// Returns whether the file existed.
fn load_env_file(path: &Path) -> anyhow::Result<bool> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

/// Console output plus, when configured, a JSON audit log of the `audit` target
fn init_tracing(config: &HoneypotConfig) -> anyhow::Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(console_filter);

    let audit = match config.audit.log_file() {
        Some(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating audit directory {}", dir.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening audit log {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(
                        Targets::new().with_target(honeypot_api::audit::AUDIT_TARGET, Level::INFO),
                    ),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(audit)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
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
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Before flag parsing, so flag env fallbacks see the file
    let env_file = load_env_file(Path::new(".env"));
    let config = Args::parse().into_config()?;
    init_tracing(&config)?;

    info!("Starting ollama-honeypot v{}", env!("CARGO_PKG_VERSION"));
    match env_file {
        Ok(true) => info!("Loaded environment from .env"),
        Ok(false) => {}
        Err(e) => warn!(error = %e, "Ignoring unreadable .env file"),
    }

    let snapshot = Arc::new(JsonFileSnapshot::new(config.mock.tags_file()));
    let registry = Arc::new(ModelRegistry::with_snapshot(snapshot));
    match registry.load().await {
        Ok(count) => info!(
            models = count,
            path = %config.mock.tags_file().display(),
            "Registry ready"
        ),
        Err(e) => error!(error = %e, "Failed to load registry snapshot, starting empty"),
    }

    let corpus = match ResponseCorpus::load(&config.mock.responses_file()) {
        Ok(corpus) => {
            info!(templates = corpus.len(), "Loaded response corpus");
            corpus
        }
        Err(e) => {
            warn!(error = %e, "Failed to load response corpus, replies will be placeholders");
            ResponseCorpus::empty()
        }
    };

    let fetcher = Arc::new(RegistryClient::new(&config.pull.registry_url, MANIFEST_TIMEOUT)?);
    let state = Arc::new(AppState::new(
        registry.clone(),
        Arc::new(corpus),
        fetcher,
        &config,
    ));
    let router = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.address, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.server.address, config.server.port
            )
        })?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, "API server listening");
    if let Some(path) = config.audit.log_file() {
        info!(path = %path.display(), "Audit log enabled");
    }

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    registry.persist().await;
    info!("Registry saved, exiting");
    Ok(())
}
