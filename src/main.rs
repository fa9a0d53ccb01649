//! cleanwk-registry: service registry daemon for the cleanwk RPC framework
//!
//! Serves the registry endpoint and, optionally, announces this process to
//! another registry with a heartbeat.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use cleanwk_registry::{
    registry, Config, HeartbeatSender, HeartbeatState, Registry, StopReason, DEFAULT_TIMEOUT,
};

#[derive(Parser)]
#[command(name = "cleanwk-registry")]
#[command(about = "Heartbeat-driven service registry for the cleanwk RPC framework")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "cleanwk-registry.toml")]
    config: PathBuf,

    /// Registry listen address (overrides config file)
    #[arg(long, env = "CLEANWK_LISTEN")]
    listen: Option<SocketAddr>,

    /// Registry HTTP path (overrides config file)
    #[arg(long, env = "CLEANWK_PATH")]
    path: Option<String>,

    /// Liveness timeout in seconds, 0 disables expiry (overrides config file)
    #[arg(long, env = "CLEANWK_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Do not serve a registry from this process
    #[arg(long)]
    no_registry: bool,

    /// Registry URL to send heartbeats to; enables the heartbeat
    #[arg(long, env = "CLEANWK_REGISTRY_URL")]
    registry_url: Option<String>,

    /// Address announced in heartbeats
    #[arg(long, env = "CLEANWK_ADVERTISE")]
    advertise: Option<String>,

    /// Heartbeat interval in seconds, 0 for the default
    #[arg(long, env = "CLEANWK_INTERVAL_SECS")]
    interval_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cleanwk_registry=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    info!("Starting cleanwk-registry");
    info!("Config file: {}", cli.config.display());

    let mut config = Config::load(&cli.config)?;

    // Apply CLI overrides
    if let Some(listen) = cli.listen {
        config.registry.listen_addr = listen;
    }
    if let Some(path) = cli.path {
        config.registry.path = path;
    }
    if let Some(timeout_secs) = cli.timeout_secs {
        config.registry.timeout_secs = timeout_secs;
    }
    if cli.no_registry {
        config.registry.enabled = false;
    }
    if let Some(url) = cli.registry_url {
        config.heartbeat.enabled = true;
        config.heartbeat.registry_url = Some(url);
    }
    if let Some(address) = cli.advertise {
        config.heartbeat.address = Some(address);
    }
    if let Some(interval_secs) = cli.interval_secs {
        config.heartbeat.interval_secs = interval_secs;
    }

    config.validate()?;

    let shutdown = CancellationToken::new();
    let mut server = None;

    if config.registry.enabled {
        // The default-timeout registry is the process-wide one
        let registry = if config.registry.timeout() == DEFAULT_TIMEOUT {
            Registry::global()
        } else {
            Arc::new(Registry::new(config.registry.timeout()))
        };
        info!("Registry timeout: {:?}", registry.timeout());

        if let Some(period) = config.registry.sweep_interval() {
            registry.spawn_sweeper(period, shutdown.clone());
        }

        let listener = registry::bind(config.registry.listen_addr).await?;
        let path = config.registry.path.clone();
        let token = shutdown.clone();
        server = Some(tokio::spawn(async move {
            registry::serve(registry, listener, &path, token).await
        }));
    } else {
        info!("Registry is disabled");
    }

    let mut heartbeat = match (&config.heartbeat.registry_url, &config.heartbeat.address) {
        (Some(url), Some(address)) if config.heartbeat.enabled => Some(
            HeartbeatSender::new(url.clone(), address.clone(), config.heartbeat.interval())
                .with_request_timeout(config.heartbeat.request_timeout())
                .start(),
        ),
        _ => None,
    };

    if server.is_none() && heartbeat.is_none() {
        anyhow::bail!("nothing to do: registry and heartbeat are both disabled");
    }

    // Without a server, a stopped heartbeat leaves nothing to run
    let heartbeat_only = server.is_none();

    let server_exit = async {
        match server.as_mut() {
            Some(handle) => handle.await,
            None => std::future::pending().await,
        }
    };

    let heartbeat_exit = async {
        match heartbeat.as_mut() {
            Some(handle) if heartbeat_only => handle.wait_stopped().await,
            _ => std::future::pending().await,
        }
    };

    let early_exit = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Shutdown requested");
            None
        }
        res = server_exit => Some(res),
        state = heartbeat_exit => {
            shutdown.cancel();
            if let HeartbeatState::Stopped(StopReason::Failed(e)) = &state {
                error!(error = %e, "Heartbeat failed, nothing left to run");
                anyhow::bail!("heartbeat stopped: {e}");
            }
            info!("Heartbeat finished: {:?}", state);
            return Ok(());
        }
    };

    if let Some(heartbeat) = heartbeat {
        heartbeat.stop();
        let state = heartbeat.join().await;
        info!("Heartbeat final state: {:?}", state);
    }

    shutdown.cancel();
    let result = match (early_exit, server) {
        (Some(res), _) => res,
        (None, Some(handle)) => handle.await,
        (None, None) => return Ok(()),
    };

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(error = %e, "Registry server failed");
            return Err(e.into());
        }
        Err(e) => {
            error!(error = %e, "Registry server task panicked");
            return Err(e.into());
        }
    }

    Ok(())
}
