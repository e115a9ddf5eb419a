//! # moviescreen-api — Binary Entry Point
//!
//! Parses configuration, wires stores, the mail worker and the rate-limit
//! sweeper, then serves HTTP until SIGINT or SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use moviescreen_api::config::{Config, Environment};
use moviescreen_api::mailer::{self, LogMailer, MailDispatcher, Mailer, RelayMailer, RetryPolicy};
use moviescreen_api::store::Repositories;
use moviescreen_api::AppState;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// How long in-flight requests, and then queued mail, may take after a
/// shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(20);

const MAIL_QUEUE_CAPACITY: usize = 256;

fn init_tracing(environment: Environment) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if environment == Environment::Production {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(config.environment());
    config.validate().map_err(|e| {
        tracing::error!("invalid configuration: {e}");
        e
    })?;

    let repos = match moviescreen_api::db::init_pool(&config).await.map_err(|e| {
        tracing::error!("database initialization failed: {e}");
        e
    })? {
        Some(pool) => Repositories::postgres(pool),
        None => Repositories::in_memory(),
    };

    let mailer: Arc<dyn Mailer> = match config.mail_relay_url.as_deref() {
        Some(url) => Arc::new(RelayMailer::new(url, config.mail_sender.clone())?),
        None => {
            tracing::warn!("MAIL_RELAY_URL not set; outbound mail is only logged");
            Arc::new(LogMailer)
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (dispatcher, queue) = MailDispatcher::channel(MAIL_QUEUE_CAPACITY);
    let mail_worker =
        mailer::spawn_worker(queue, mailer, RetryPolicy::default(), shutdown_rx.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let environment = config.environment();
    let state = AppState::new(config, repos, dispatcher);
    let sweeper = state.limiter.spawn_sweeper(shutdown_rx.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, env = environment.as_str(), "moviescreen API listening");

    let mut server_shutdown = shutdown_rx;
    let server = axum::serve(
        listener,
        moviescreen_api::app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    });
    let mut server: JoinHandle<std::io::Result<()>> = tokio::spawn(async move { server.await });

    tokio::select! {
        () = shutdown_signal() => tracing::info!("shutdown signal received"),
        finished = &mut server => report_server_exit(finished),
    }

    let _ = shutdown_tx.send(true);

    if !server.is_finished() {
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
            Ok(finished) => report_server_exit(finished),
            Err(_) => {
                tracing::warn!("in-flight requests still running after grace period; aborting");
                server.abort();
            }
        }
    }

    if let Err(e) = sweeper.await {
        tracing::error!("rate-limit sweeper failed: {e}");
    }

    match tokio::time::timeout(SHUTDOWN_GRACE, mail_worker).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("mail worker failed: {e}"),
        Err(_) => tracing::warn!("queued mail not delivered within grace period"),
    }

    tracing::info!("stopped");
    Ok(())
}

fn report_server_exit(finished: Result<std::io::Result<()>, tokio::task::JoinError>) {
    match finished {
        Ok(Ok(())) => tracing::info!("server stopped accepting connections"),
        Ok(Err(e)) => tracing::error!("server error: {e}"),
        Err(e) => tracing::error!("server task failed: {e}"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("cannot listen for SIGINT: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
