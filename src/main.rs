use std::future::IntoFuture;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use ingestor::api::router::create_router;
use ingestor::config::AppConfig;
use ingestor::core::Core;
use ingestor::models::signal_channel;
use ingestor::{db, metrics, poller, tpsl, ws, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let addr = format!("{}:{}", config.host, config.port);

    tracing::info!("connecting to database");
    let pool = db::init_pool(&config.database_url).await?;
    tracing::info!("database connected");

    let metrics_handle = metrics::init_metrics();

    let (signal_tx, signal_rx) = signal_channel(256);
    let core = Core::new(pool.clone(), config.clone(), signal_tx);

    let cancel = CancellationToken::new();
    let mut worker_handles = Vec::new();

    if config.poller_enabled {
        let core = core.clone();
        let cancel = cancel.clone();
        worker_handles.push(tokio::spawn(
            async move { poller::run_poller(core, cancel).await },
        ));
    } else {
        tracing::warn!("poller disabled via POLLER_ENABLED=false");
    }

    if config.streamer_enabled {
        let core = core.clone();
        let cancel = cancel.clone();
        worker_handles.push(tokio::spawn(
            async move { ws::run_ws_client(core, cancel).await },
        ));
    } else {
        tracing::warn!("streamer disabled via STREAMER_ENABLED=false");
    }

    if config.tpsl_enabled {
        let core = core.clone();
        let cancel = cancel.clone();
        worker_handles.push(tokio::spawn(
            async move { tpsl::run_tpsl_monitor(core, cancel).await },
        ));
    } else {
        tracing::warn!("tpsl monitor disabled via TPSL_ENABLED=false");
    }

    worker_handles.push(tokio::spawn(drain_signals(signal_rx, cancel.clone())));

    let state = AppState {
        db: pool,
        config,
        metrics_handle,
    };
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "server listening");

    tokio::select! {
        result = axum::serve(listener, router).into_future() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "http server exited with error");
            }
        }
        _ = wait_for_shutdown_signal() => {
            tracing::info!("shutdown signal received, draining workers");
        }
    }

    cancel.cancel();
    let drain = futures_util::future::join_all(worker_handles);
    if tokio::time::timeout(Duration::from_secs(5), drain)
        .await
        .is_err()
    {
        tracing::warn!("workers did not drain within 5s, exiting anyway");
    }

    Ok(())
}

/// Consumes emitted `Signal`s (TP/SL triggers, resolutions, redeemables) and
/// logs them. The external trade-execution layer is the real consumer of
/// this channel in production; this crate's own responsibility ends at
/// reliable delivery, per the data-plane boundary in the design notes.
async fn drain_signals(
    mut rx: ingestor::models::SignalReceiver,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            signal = rx.recv() => {
                match signal {
                    Some(s) => tracing::info!(?s, "signal emitted"),
                    None => return,
                }
            }
        }
    }
}

async fn wait_for_shutdown_signal() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();
}
