//! weftd: the weft control-plane daemon

use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weft_agent::{AppState, HttpServer};
use weft_core::{NodeName, WeftConfig};
use weft_queue::{QueueStore, QueueSynchronizer};
use weft_registry::NodeRegistry;
use weft_router::{HttpNodeClient, Router};

#[derive(Parser, Debug)]
#[command(name = "weftd", version, about = "Control plane for the weft inference mesh")]
struct Args {
    /// Configuration file (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bind address for the REST surface
    #[arg(short, long, value_name = "ADDRESS")]
    bind: Option<String>,

    /// Directory for the durable offline queue
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Node name this process reports as its routing origin
    #[arg(long, value_name = "NAME")]
    name: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weftd=info,weft_agent=info,weft_registry=info,weft_router=info,weft_queue=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    info!("Starting weftd");
    info!("  Bind address: {}", config.server.bind_address);
    info!("  Origin name: {}", config.server.node_name);
    info!("  Queue directory: {}", config.queue.data_dir.display());
    info!("  Sync interval: {:?}", config.queue.replay.interval);

    if let Err(e) = run(config).await {
        error!("weftd failed: {}", e);
        process::exit(1);
    }

    info!("weftd shutdown complete");
}

/// Merge the config file with command-line overrides
fn load_config(args: &Args) -> Result<WeftConfig, String> {
    let mut config = match &args.config {
        Some(path) => WeftConfig::from_file(path).map_err(|e| e.to_string())?,
        None => WeftConfig::default(),
    };

    if let Some(bind) = &args.bind {
        config = config.with_bind_address(bind);
    }
    if let Some(dir) = &args.data_dir {
        config = config.with_data_dir(dir.clone());
    }
    if let Some(name) = &args.name {
        config = config.with_node_name(name);
    }

    config.validate()?;
    Ok(config)
}

async fn run(config: WeftConfig) -> anyhow::Result<()> {
    let registry = Arc::new(NodeRegistry::with_config(config.registry.clone()));
    let queue = QueueStore::open(config.queue.data_dir.clone()).await?;
    let client = Arc::new(HttpNodeClient::new(&config.router));
    let router = Arc::new(Router::new(
        registry.clone(),
        queue.clone(),
        client,
        config.router.clone(),
        NodeName::from(config.server.node_name.as_str()),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let synchronizer = QueueSynchronizer::new(queue.clone(), router.clone(), config.queue.clone());
    let sync_handle = tokio::spawn(synchronizer.run(shutdown_rx.clone()));

    let state = AppState {
        registry,
        router,
        queue,
        config,
    };
    let server = HttpServer::new(state);

    let serve = server.serve(shutdown_rx);
    tokio::pin!(serve);

    let result = tokio::select! {
        result = &mut serve => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
            (&mut serve).await
        }
    };

    let _ = shutdown_tx.send(true);
    let _ = sync_handle.await;

    result?;
    Ok(())
}
