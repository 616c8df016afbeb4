//! `flotilla-master`: runs the allocator ticker and the heartbeat/definition
//! HTTP API against one `var.dir`.

use std::{process::ExitCode, sync::Arc, time::Duration};

use log::{error, info, warn};
use tokio::sync::Notify;

use flotilla::{
    allocator,
    config::{self, MasterConfig},
    master_api,
    serializer::Serializer,
    store::FileStore,
};

/// The allocator runs one full reconciliation every 10s.
const MASTER_TICK: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let config: MasterConfig = config::parse_or_exit();

    if config.tls_cert_file.is_some() || config.tls_key_file.is_some() {
        warn!("TLS cert/key configured but TLS termination is not implemented; falling back to plain HTTP");
    }

    let addr: std::net::SocketAddr = match config.master.parse() {
        Ok(a) => a,
        Err(e) => {
            error!("invalid --master address {}: {}", config.master, e);
            return ExitCode::FAILURE;
        }
    };

    let store = FileStore::new(&config.var_dir);
    let serializer = Arc::new(Serializer::new(store));

    let shutdown = Arc::new(Notify::new());

    let allocator_handle = tokio::spawn({
        let serializer = serializer.clone();
        let shutdown = shutdown.clone();
        async move {
            let mut rng = allocator::new_rng();
            let mut interval = tokio::time::interval(MASTER_TICK);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let serializer = serializer.clone();
                        // rng is moved into the closure and handed back so state
                        // survives across ticks without the closure borrowing it.
                        let mut owned_rng = std::mem::replace(&mut rng, allocator::new_rng());
                        let tick_result = tokio::task::spawn_blocking(move || {
                            serializer.run(move |store| {
                                allocator::tick(store, &mut owned_rng);
                                owned_rng
                            })
                        }).await;
                        rng = match tick_result {
                            Ok(Ok(r)) => r,
                            Ok(Err(e)) => {
                                error!("allocator tick failed: {}", e);
                                allocator::new_rng()
                            }
                            Err(e) => {
                                error!("allocator tick task panicked: {}", e);
                                allocator::new_rng()
                            }
                        };
                    }
                    _ = shutdown.notified() => break,
                }
            }
            info!("allocator ticker stopped");
        }
    });

    let http_handle = tokio::spawn({
        let serializer = serializer.clone();
        let shutdown = shutdown.clone();
        async move {
            let shutdown_fut = shutdown.notified();
            if let Err(e) = master_api::serve(addr, serializer, shutdown_fut).await {
                error!("master http server exited with error: {}", e);
            }
        }
    });

    wait_for_signal().await;
    info!("shutdown signal received, draining");
    shutdown.notify_waiters();

    let _ = tokio::time::timeout(master_api::SHUTDOWN_GRACE, http_handle).await;
    let _ = allocator_handle.await;

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
