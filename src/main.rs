use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use rusty_broker::config;
use rusty_broker::connection;
use rusty_broker::router::Router;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "rusty-broker starting");

    let config_path = std::env::args().nth(1);
    let cfg = match config_path {
        Some(path) => config::load_config_from_path(std::path::Path::new(&path)),
        None => config::load_config(),
    };
    let cfg = match cfg {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    info!(
        address = %cfg.listen.address,
        kind = ?cfg.listen.kind,
        "config loaded"
    );

    let (router_tx, router_rx) = mpsc::channel(1024);
    let router_task = tokio::spawn(Router::new().run(router_rx));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let serve_result = connection::serve(&cfg.listen, router_tx, shutdown_rx).await;

    if let Err(e) = serve_result {
        error!(error = %e, "listener error");
        std::process::exit(1);
    }

    drop(router_task);
    info!("rusty-broker shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
