//! a2a-bridge server
//!
//! Serves the DingTalk robot callback and forwards one-to-one messages to A2A
//! agents.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use a2a_bridge::{
    http, logging, spawn_sweeper, A2aClientFactory, BackendFactory, Bridge, BridgeSettings, ClientPool,
    Config, DingTalkSender, SqlitePreferenceStore,
};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Bridge between DingTalk one-to-one chats and A2A agents.
#[derive(Parser, Debug)]
#[command(name = "a2a-bridge", about = "Bridge between DingTalk chats and A2A agents")]
struct Args {
    /// Path to the TOML config file (default: $A2A_BRIDGE_CONFIG, then ./config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Default A2A server URL, overriding the config file
    #[arg(long)]
    a2a_url: Option<String>,

    /// HTTP listen address, overriding the config file
    #[arg(long)]
    bind: Option<String>,

    /// Log filter used when RUST_LOG is not set (default: [logging] level, then a2a_bridge=info)
    #[arg(long, env = "A2A_BRIDGE_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = Config::discover(args.config.as_deref())?;
    let _log_guard = logging::init(&config.logging, args.log_level.as_deref())?;

    info!(log_dir = ?config.logging.dir, "a2a-bridge starting");

    if let Some(url) = args.a2a_url {
        config.set_server_url(url)?;
    }
    if let Some(bind) = args.bind {
        config.bridge.bind_addr = bind;
    }
    let addr: SocketAddr = config.bridge.bind_addr.parse()?;

    let store = Arc::new(SqlitePreferenceStore::open(&config.bridge.database_path)?);
    let sender = Arc::new(DingTalkSender::new(&config.dingtalk)?);
    let factory = Arc::new(A2aClientFactory::new(config.client_options()));

    info!(
        default_endpoint = %config.a2a.server_url,
        cleanup_interval = ?config.cleanup_interval(),
        inactive_timeout = ?config.inactive_timeout(),
        "Client pool configured"
    );

    // Startup probe only; an unavailable agent is not fatal.
    match factory.create(&config.a2a.server_url) {
        Ok(probe) => {
            if probe.check_health().await {
                info!(endpoint = %config.a2a.server_url, "A2A service is reachable");
            } else {
                warn!(endpoint = %config.a2a.server_url, "A2A service is unavailable, continuing");
            }
            probe.close().await;
        }
        Err(e) => warn!(error = %e, "Could not build health probe client"),
    }

    let pool = Arc::new(ClientPool::new(factory, store, config.a2a.server_url.clone()));
    let sweeper = spawn_sweeper(pool.clone(), config.cleanup_interval(), config.inactive_timeout());

    let bridge = Arc::new(Bridge::new(
        pool.clone(),
        sender,
        BridgeSettings::from(&config.bridge),
    ));

    let listener = TcpListener::bind(addr).await?;
    info!(
        addr = %addr,
        robot = %config.dingtalk.robot_name,
        "Listening for DingTalk callbacks"
    );

    let served = axum::serve(listener, http::create_router(bridge))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    sweeper.abort();
    pool.close_all().await;

    if let Err(e) = served {
        error!(error = %e, "HTTP server error");
        return Err(e.into());
    }

    info!("a2a-bridge stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
