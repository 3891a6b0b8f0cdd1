//! gluster-peerd entry point.

use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
use tokio::signal;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use gluster_peerd::supervisor::{exit_code, run_prerequisite, start_daemon};
use gluster_peerd::{
    Args, Config, GlusterCli, HostRecordStore, KubeInstanceSource, Reconciler, ReconcilerOptions,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Load configuration
    let args = Args::parse();
    let cfg = Config::load(&args)?;
    let selector = cfg.selector()?;
    info!("Starting gluster-peerd with config: {:?}", cfg);
    info!(
        "Volume {} with {} replicas for service {} (not managed by this sidecar)",
        cfg.volume, cfg.replica, cfg.service
    );

    // Prerequisite, then give it time to become ready
    run_prerequisite(&cfg.prerequisite_spec()?).await;
    sleep(cfg.settle_delay()).await;

    // Storage daemon
    let mut daemon = start_daemon(&cfg.daemon_spec()?)?;

    // Reconciler
    let source = Arc::new(KubeInstanceSource::new());
    if let Err(e) = source.connect().await {
        warn!("{}; will retry on every tick", e);
    }
    let options = ReconcilerOptions {
        prune_stale: cfg.prune_stale,
        query_timeout: cfg.query_timeout(),
        local_hostname: std::env::var("HOSTNAME").ok(),
    };
    let mut reconciler = Reconciler::new(
        source,
        HostRecordStore::new(&cfg.hosts_file),
        cfg.namespace.clone(),
        selector,
        options,
    );
    if cfg.probe_peers {
        reconciler = reconciler.with_peer_control(Arc::new(GlusterCli::new(&cfg.gluster_cli)));
    }
    let reconciler = Arc::new(reconciler);

    let shutdown = CancellationToken::new();
    let reconciler_handle = {
        let reconciler = Arc::clone(&reconciler);
        let shutdown = shutdown.clone();
        let beat = cfg.beat_interval();
        tokio::spawn(async move { reconciler.run(beat, shutdown).await })
    };

    // Block on the daemon; a termination request takes it down with us
    let exited = tokio::select! {
        status = daemon.wait() => Ok(status),
        signalled = shutdown_signal() => Err(signalled),
    };
    let status = match exited {
        Ok(status) => status,
        Err(Ok(())) => {
            info!("Received shutdown signal, stopping daemon...");
            daemon.kill().await
        }
        Err(Err(err)) => {
            error!("Unable to listen for shutdown signal: {}", err);
            daemon.wait().await
        }
    };

    shutdown.cancel();
    if let Err(e) = reconciler_handle.await {
        error!("Reconciler task failed: {}", e);
    }

    let code = match status {
        Ok(status) => {
            info!("Daemon exited with {}", status);
            exit_code(status)
        }
        Err(e) => {
            error!("{}", e);
            1
        }
    };
    std::process::exit(code);
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::select! {
        res = signal::ctrl_c() => res,
        _ = term.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    signal::ctrl_c().await
}
