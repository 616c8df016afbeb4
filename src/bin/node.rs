//! `flotilla-node`: runs the reconciliation loop against one Docker-
//! compatible runtime, heartbeating a configured master.

use std::{process::ExitCode, time::Duration};

use log::{error, info};

use flotilla::{
    config::{self, NodeConfig},
    docker::DockerRuntime,
    node_client::MasterClient,
    reconciler::Reconciler,
};

/// A reconcile runs on start, then every 20s.
const NODE_TICK: Duration = Duration::from_secs(20);

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let config: NodeConfig = config::parse_or_exit();

    let node_name = match config.resolved_node_name() {
        Ok(n) => n,
        Err(e) => {
            error!("could not resolve node name: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match DockerRuntime::new(&config.docker_host) {
        Ok(r) => r,
        Err(e) => {
            error!("could not construct docker runtime client for {}: {}", config.docker_host, e);
            return ExitCode::FAILURE;
        }
    };

    let reconciler = Reconciler {
        node_name: node_name.clone(),
        node_addr: config.node_addr.clone(),
        runtime,
        master: MasterClient::new(&config.master_addr),
        hook_pre: config.hook_run_pre.clone(),
        hook_post: config.hook_run_post.clone(),
    };

    info!("node {} reconciling against master {}", node_name, config.master_addr);

    // First reconciliation happens immediately, not after the first tick.
    reconciler.tick().await;

    let mut interval = tokio::time::interval(NODE_TICK);
    interval.tick().await; // consume the immediate first tick; we already ran one above.

    loop {
        tokio::select! {
            _ = interval.tick() => {
                reconciler.tick().await;
            }
            _ = wait_for_signal() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    ExitCode::SUCCESS
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
