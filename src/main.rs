//! Orchestration daemon entrypoint: loads configuration and the tool
//! catalog, wires the bus, the task registry, and the four agents, and
//! serves the HTTP surface until a shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use aos_core::agents::{self, AgentDeps};
use aos_core::api::rate_limit::RateLimiter;
use aos_core::api::ApiState;
use aos_core::bus::Bus;
use aos_core::catalog::{self, Catalog};
use aos_core::config::{self, AppConfig};
use aos_core::health::ReadyState;
use aos_core::llm::{LlmProvider, OpenAiCompatibleProvider};
use aos_core::metrics::Metrics;
use aos_core::registry::TaskRegistry;
use aos_core::server;

#[derive(Parser, Debug)]
#[command(name = "aos", about = "Agent Orchestration Service daemon", version)]
struct Cli {
    /// HTTP port to listen on. Overrides the config file and `PORT` env var.
    #[arg(long)]
    port: Option<u16>,

    /// Path to a TOML config file. Defaults to `~/.aos/config.toml`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding `tools/`, `pipelines/`, and `intents/` YAML files.
    /// When absent, the service starts with an empty catalog.
    #[arg(long)]
    catalog_dir: Option<PathBuf>,
}

fn init_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_catalog(catalog_dir: Option<&PathBuf>) -> Catalog {
    match catalog_dir {
        Some(dir) => match catalog::loader::load_from_dir(dir) {
            Ok(catalog) => {
                tracing::info!(dir = %dir.display(), tools = catalog.tools.len(), pipelines = catalog.pipelines.len(), intents = catalog.intents.len(), "catalog loaded");
                catalog
            }
            Err(e) => {
                tracing::error!(dir = %dir.display(), error = %e, "failed to load catalog, starting with an empty one");
                Catalog::default()
            }
        },
        None => {
            tracing::warn!("no --catalog-dir given, starting with an empty catalog");
            Catalog::default()
        }
    }
}

fn build_llm_provider(cfg: &AppConfig, metrics: &Metrics) -> Arc<dyn LlmProvider> {
    let (base_url, model, api_key) = match (&cfg.llm.llm_base_url, &cfg.llm.llm_model) {
        (Some(base_url), Some(model)) => (base_url.clone(), model.clone(), cfg.llm.llm_api_key.clone()),
        _ => (cfg.llm.ollama_base_url.clone(), cfg.llm.ollama_model.clone(), None),
    };
    Arc::new(OpenAiCompatibleProvider::with_metrics(
        base_url,
        model,
        api_key,
        Duration::from_secs(cfg.llm.llm_timeout_secs),
        metrics.clone(),
    ))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut cfg = config::load(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("failed to load config: {e}");
        AppConfig::default()
    });
    if let Some(port) = cli.port {
        cfg.server.port = port;
    }
    let cfg = Arc::new(cfg);

    init_tracing(&cfg.log.level);
    tracing::info!("AOS starting");

    let catalog = Arc::new(load_catalog(cli.catalog_dir.as_ref()));
    let metrics = Metrics::new();
    let bus = Arc::new(Bus::new(metrics.clone()));
    let registry = Arc::new(TaskRegistry::new());
    let llm_provider = build_llm_provider(&cfg, &metrics);
    let rate_limiter = Arc::new(RateLimiter::new(cfg.server.rate_limit_per_minute));

    let deps = AgentDeps {
        bus: Arc::clone(&bus),
        registry: Arc::clone(&registry),
        catalog: Arc::clone(&catalog),
    };

    let shutdown = CancellationToken::new();

    // Each agent resubscribes to its named inbox on every (re)start, since
    // `spawn_supervised` may need to hand a fresh run() a brand new
    // receiver after a panic drops the previous one along with its task.
    let inspector_bus = Arc::clone(&bus);
    let inspector_deps = deps.clone();
    let inspector_shutdown = shutdown.clone();
    agents::spawn_supervised("inspector", shutdown.clone(), move || {
        let deps = inspector_deps.clone();
        let shutdown = inspector_shutdown.clone();
        let inbox = inspector_bus.subscribe("inspector");
        async move { agents::inspector::run(deps, inbox, shutdown).await }
    });

    let planner_bus = Arc::clone(&bus);
    let planner_deps = deps.clone();
    let planner_llm = Arc::clone(&llm_provider);
    let planner_shutdown = shutdown.clone();
    agents::spawn_supervised("planner", shutdown.clone(), move || {
        let deps = planner_deps.clone();
        let llm = Arc::clone(&planner_llm);
        let shutdown = planner_shutdown.clone();
        let inbox = planner_bus.subscribe("planner");
        async move { agents::planner::run(deps, llm, inbox, shutdown).await }
    });

    let verifier_bus = Arc::clone(&bus);
    let verifier_deps = deps.clone();
    let verifier_client = reqwest::Client::new();
    let verifier_shutdown = shutdown.clone();
    agents::spawn_supervised("verifier", shutdown.clone(), move || {
        let deps = verifier_deps.clone();
        let client = verifier_client.clone();
        let shutdown = verifier_shutdown.clone();
        let inbox = verifier_bus.subscribe("verifier");
        async move { agents::verifier::run(deps, client, inbox, shutdown).await }
    });

    let analyst_bus = Arc::clone(&bus);
    let analyst_deps = deps.clone();
    let analyst_llm = Arc::clone(&llm_provider);
    let analyst_shutdown = shutdown.clone();
    agents::spawn_supervised("analyst", shutdown.clone(), move || {
        let deps = analyst_deps.clone();
        let llm = Arc::clone(&analyst_llm);
        let shutdown = analyst_shutdown.clone();
        let inbox = analyst_bus.subscribe("analyst");
        async move { agents::analyst::run(deps, llm, inbox, shutdown).await }
    });

    let ready_state = Arc::new(ReadyState {
        catalog_loaded: !catalog.tools.is_empty() || !catalog.pipelines.is_empty(),
        llm: Arc::clone(&llm_provider),
    });

    let api_state = ApiState {
        bus: Arc::clone(&bus),
        registry: Arc::clone(&registry),
        catalog: Arc::clone(&catalog),
        metrics,
        config: Arc::clone(&cfg),
        rate_limiter,
    };

    let router = server::build_router(api_state, ready_state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], cfg.server.port));

    let server_shutdown = shutdown.clone();
    let serve_task = tokio::spawn(async move {
        if let Err(e) = server::serve(addr, router, server_shutdown).await {
            tracing::error!(error = %e, "http server exited with error");
        }
    });

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping");
    shutdown.cancel();
    let _ = serve_task.await;
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
