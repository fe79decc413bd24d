use std::sync::Arc;

use anyhow::Result;
use ticktock_core::broker::{AmqpPublisher, Publisher};
use ticktock_core::clock::SystemClock;
use ticktock_core::store::SqliteJobStore;
use ticktock_core::wheel::Wheel;
use ticktock_core::{admin, Config, Scheduler};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    tracing::info!(?config, "starting ticktock");

    let store = Arc::new(SqliteJobStore::connect(&config.store_path).await?);
    let publisher = Arc::new(AmqpPublisher::connect(&config.broker_url, &config.broker_queue).await?);
    let clock = Arc::new(SystemClock);

    let wheel = Wheel::new(config.wheel_tick, config.wheel_slots, clock.clone())
        .map_err(|e| anyhow::anyhow!(e))?;
    wheel.start();

    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        publisher.clone(),
        wheel.clone(),
        clock,
        config.warmup_window,
    ));

    let scheduled = scheduler.warmup().await?;
    tracing::info!(scheduled, "warmup complete");

    let state = admin::AppState {
        store: store.clone(),
        scheduler: scheduler.clone(),
    };
    let app = admin::router(state);

    let listen_addr = normalize_listen_addr(&config.listen_addr);
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(%listen_addr, "admin surface listening");

    let shutdown = CancellationToken::new();
    let shutdown_for_serve = shutdown.clone();

    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_for_serve.cancelled().await;
    });

    tokio::select! {
        result = serve => {
            if let Err(e) = result {
                tracing::error!(error = %e, "admin server exited with error");
            }
        }
        _ = wait_for_shutdown_signal() => {
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        }
    }

    if let Err(e) = wheel.stop(std::time::Duration::from_secs(10)).await {
        tracing::error!(error = %e, "wheel did not stop cleanly");
    }
    if let Err(e) = publisher.close().await {
        tracing::error!(error = %e, "broker did not close cleanly");
    }

    Ok(())
}

fn normalize_listen_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
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
