use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use packetscrub_control_plane::config::ScrubConfig;
use packetscrub_control_plane::control::ControlPlane;
use packetscrub_control_plane::ebpf::EbpfLoader;
use packetscrub_control_plane::scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = load_config()?;
    info!(interface = %config.interface, mode = %config.xdp_mode, "starting packetscrub");

    let loader = EbpfLoader::load_from_file(&config.bpf_object_path)?;
    let mut control_plane = ControlPlane::new(loader, config);
    control_plane.start()?;

    let control = Arc::new(Mutex::new(control_plane));
    let scheduler = Scheduler::new(control.clone());
    let (shutdown_tx, _) = broadcast::channel(1);
    let handles = scheduler.spawn(shutdown_tx.clone());

    shutdown_signal().await;
    info!("shutdown signal received, detaching xdp program");

    let _ = shutdown_tx.send(());
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "background task panicked during shutdown");
        }
    }

    control.lock().await.shutdown()?;
    info!("packetscrub stopped");
    Ok(())
}

fn load_config() -> Result<ScrubConfig, Box<dyn std::error::Error>> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name("packetscrub").required(false))
        .add_source(config::Environment::with_prefix("PACKETSCRUB"))
        .build()?;

    match ScrubConfig::from_builder(builder) {
        Ok(cfg) => Ok(cfg),
        Err(_) => Ok(ScrubConfig::default()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
