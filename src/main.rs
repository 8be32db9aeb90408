// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::watcher;
use kube::{Api, Client, Config};
use meshimport::{
    admin::{self, AdminState},
    config::{Args, LogFormat},
    constants::{FIELD_MANAGER, TOKIO_WORKER_THREADS},
    context::Context,
    controller::ControllerHooks,
    crd::Link,
    errors::InformerError,
    imports::KubeServiceImportStore,
    informer::Informer,
    leader::{LeaderElector, LeadershipHooks},
    queue::EventQueue,
    reconcilers::Reconciler,
    remote::KubeConnector,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

fn main() -> Result<()> {
    let args = Args::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("meshimport")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

/// Initializes logging.
///
/// Respects `RUST_LOG` if set, otherwise defaults to INFO level.
/// Format: timestamp file:line LEVEL message, or one JSON object per line.
fn init_logging(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

/// Client for the local cluster: explicit kubeconfig, or the default chain.
async fn local_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let Some(path) = kubeconfig else {
        return Client::try_default()
            .await
            .context("failed to create Kubernetes client");
    };
    let kubeconfig = Kubeconfig::read_from(path)
        .with_context(|| format!("failed to read kubeconfig {}", path.display()))?;
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .context("failed to load kubeconfig")?;
    Client::try_from(config).context("failed to create Kubernetes client")
}

/// Resolves on SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        () = ctrl_c => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}

/// Resolves once the shutdown flag is raised.
async fn shutdown_requested(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn async_main(args: Args) -> Result<()> {
    init_logging(args.log_format);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        namespace = %args.namespace,
        "Starting meshimport controller"
    );

    let election = args.leader_election()?;
    let sync_timeout = args.cache_sync_timeout();
    let client = local_client(args.kubeconfig.as_deref()).await?;
    debug!("Kubernetes client initialized");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let admin_state = AdminState::new();
    let admin_task = tokio::spawn(admin::serve(
        args.admin_addr,
        admin_state.clone(),
        shutdown_requested(shutdown_rx.clone()),
    ));

    let links = Arc::new(Informer::spawn(
        Api::<Link>::namespaced(client.clone(), &args.namespace),
        watcher::Config::default(),
    ));

    {
        let links = links.clone();
        let admin_state = admin_state.clone();
        tokio::spawn(async move {
            loop {
                match links.wait_until_synced(sync_timeout).await {
                    Ok(()) => {
                        admin_state.set_ready(true);
                        info!(links = links.list().len(), "Link cache synced");
                        return;
                    }
                    Err(e @ InformerError::SyncTimeout { .. }) => {
                        warn!(error = %e, "Still waiting for Link cache");
                    }
                    Err(e) => {
                        error!(error = %e, "Link watch stopped before syncing");
                        return;
                    }
                }
            }
        });
    }

    let queue = EventQueue::new();
    let ctx = Arc::new(Context::new(
        queue.clone(),
        Arc::new(KubeConnector::new(client.clone(), &args.namespace)),
        Arc::new(KubeServiceImportStore::new(client.clone(), FIELD_MANAGER)),
    ));

    let reconciler = Reconciler::new(ctx.clone(), args.requeue_limit);
    let reconciler_task = tokio::spawn(async move { reconciler.run().await });

    let hooks: Arc<dyn LeadershipHooks> =
        Arc::new(ControllerHooks::new(links, ctx.clone(), sync_timeout));
    let (fatal_tx, mut fatal_rx) = mpsc::channel(1);
    let leader_task = tokio::spawn(LeaderElector::new(client, election).run(
        hooks,
        shutdown_rx,
        fatal_tx,
    ));

    let fatal = tokio::select! {
        () = shutdown_signal() => None,
        Some(e) = fatal_rx.recv() => Some(e),
    };

    if let Some(e) = fatal {
        error!(error = %e, "Leadership state is unrecoverable, exiting");
        queue.shut_down();
        let _ = shutdown_tx.send(true);
        return Err(e.into());
    }

    // Queued events are applied while the lease is still held.
    info!("Shutting down, draining event queue");
    queue.shut_down_with_drain().await;
    if let Err(e) = reconciler_task.await {
        warn!(error = %e, "Reconciler task failed");
    }
    let _ = shutdown_tx.send(true);
    if let Err(e) = leader_task.await {
        warn!(error = %e, "Leader election task failed");
    }
    match admin_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Admin server failed"),
        Err(e) => warn!(error = %e, "Admin server task failed"),
    }
    info!("Shutdown complete");
    Ok(())
}
