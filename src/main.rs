use anyhow::{Context, Result};
use dockyard::cli::{Args, ConfigDiscovery, DockyardConfig, ExecutionMode, ServeConfig, StorageBackend};
use dockyard::env;
use dockyard::runtime::RuntimeFactory;
use dockyard::storage::{FileStorage, MemoryStorage, Storage};
use dockyard::system::PlaygroundSystem;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mode = match args.mode() {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    let verbose = matches!(&mode, ExecutionMode::Serve(config) if config.verbose);
    init_tracing(verbose);

    match mode {
        ExecutionMode::Serve(config) => run_serve_mode(config).await,
        ExecutionMode::ShowConfig { config_override } => {
            ConfigDiscovery::show_discovery_info(config_override.as_deref());
            let (config, _) = ConfigDiscovery::discover_config(config_override.as_deref())?;
            println!();
            println!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "dockyard=debug"
    } else {
        env::DEFAULT_LOG_FILTER
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_serve_mode(serve: ServeConfig) -> Result<()> {
    let (mut config, source) = ConfigDiscovery::discover_config(serve.config_override.as_deref())
        .context("Failed to load configuration")?;
    if let Some(listen) = serve.listen_override {
        config.server.listen = listen;
    }
    match &source {
        Some(path) => info!("Using configuration from {:?}", path),
        None => info!("Using built-in configuration defaults"),
    }

    let storage = open_storage(&config).await?;
    let factory = runtime_factory(&config)?;
    let addr = config.server.listen;

    let system = PlaygroundSystem::new(config, factory, storage)
        .await
        .context("Failed to initialise playground system")?;

    let _event_logger = system.spawn_event_logger();
    let reaper = system.spawn_reaper();

    info!("Starting dockyard on {}", addr);
    system
        .serve(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await;

    if let Some(handle) = reaper {
        handle.abort();
    }
    info!("dockyard stopped");
    Ok(())
}

async fn open_storage(config: &DockyardConfig) -> Result<Arc<dyn Storage>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage");
            Ok(Arc::new(MemoryStorage::new()))
        }
        StorageBackend::File => {
            let storage = FileStorage::open(&config.storage.path)
                .await
                .with_context(|| format!("Failed to open state file {:?}", config.storage.path))?;
            info!("Using file storage at {:?}", storage.path());
            Ok(Arc::new(storage))
        }
    }
}

#[cfg(feature = "docker")]
fn runtime_factory(config: &DockyardConfig) -> Result<Arc<dyn RuntimeFactory>> {
    let factory_config = config.docker_factory_config();
    info!(
        "Docker daemon: {}",
        factory_config
            .daemon_url
            .as_deref()
            .unwrap_or("local defaults")
    );
    Ok(Arc::new(dockyard::runtime::DockerFactory::new(
        factory_config,
    )))
}

#[cfg(not(feature = "docker"))]
fn runtime_factory(_config: &DockyardConfig) -> Result<Arc<dyn RuntimeFactory>> {
    anyhow::bail!("dockyard was built without a container runtime; enable the `docker` feature")
}
