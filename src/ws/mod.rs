use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use rand::Rng;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::{interval, sleep, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::core::Core;
use crate::db::{market_repo, watched_repo};
use crate::models::WsFieldUpdate;
use crate::price_router::{self, PriceChangeFrame};
use crate::subscriptions::SubscriptionManager;

const BASE_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const MAX_CONSECUTIVE_FAILURES: u32 = 5;
const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);
const SUBSCRIPTION_TOKEN_LIMIT: i64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Disconnected,
    Connecting,
    Connected,
    Streaming,
}

fn set_connection_gauge(state: ConnState) {
    let v = match state {
        ConnState::Disconnected => 0.0,
        ConnState::Connecting => 1.0,
        ConnState::Connected => 2.0,
        ConnState::Streaming => 3.0,
    };
    gauge!("ws_connection_state").set(v);
}

/// Build `base_url?apikey=...&secret=...&passphrase=...`, only attached when
/// credentials are configured. Credentials are opaque here and never logged —
/// callers must log the base URL, not this value.
fn build_url(core: &Core) -> String {
    let base = &core.config.clob_wss_url;
    if !core.config.has_clob_auth() {
        return base.clone();
    }
    format!(
        "{base}?apikey={}&secret={}&passphrase={}",
        core.config.clob_api_key.as_deref().unwrap_or_default(),
        core.config.clob_api_secret.as_deref().unwrap_or_default(),
        core.config.clob_passphrase.as_deref().unwrap_or_default(),
    )
}

fn compute_backoff(consecutive_failures: u32) -> Duration {
    let exp = BASE_BACKOFF * 2u32.saturating_pow(consecutive_failures.saturating_sub(1));
    let capped = exp.min(MAX_BACKOFF);
    let jitter_frac = rand::thread_rng().gen_range(-0.1..=0.1);
    let jittered = capped.as_secs_f64() * (1.0 + jitter_frac);
    Duration::from_secs_f64(jittered.max(0.0))
}

/// Reconnect loop: connect, stream until disconnected, back off, repeat.
/// Escalates (logs loudly) after 5 consecutive failures per the state
/// machine in §4.5, mirroring the teacher's `run_ws_listener` shape but with
/// jittered exponential backoff instead of a fixed doubling schedule.
pub async fn run_ws_client(core: Core, cancel: CancellationToken) {
    let mut consecutive_failures: u32 = 0;
    let mut manager = SubscriptionManager::with_trigger(core.subscription_manual_trigger.clone());

    loop {
        if cancel.is_cancelled() {
            tracing::info!("ws client shutting down");
            return;
        }

        set_connection_gauge(ConnState::Connecting);
        let url = build_url(&core);
        tracing::info!(url = %core.config.clob_wss_url, "connecting to ws");

        match tokio_tungstenite::connect_async(&url).await {
            Ok((stream, _resp)) => {
                set_connection_gauge(ConnState::Connected);
                consecutive_failures = 0;
                tracing::info!("ws connected");

                if let Err(e) = run_streaming(&core, stream, &mut manager, &cancel).await {
                    tracing::warn!(error = %e, "ws stream ended");
                }
                set_connection_gauge(ConnState::Disconnected);
            }
            Err(e) => {
                consecutive_failures += 1;
                counter!("ws_reconnects_total").increment(1);
                tracing::error!(error = %e, attempt = consecutive_failures, "ws connect failed");
                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    tracing::error!(consecutive_failures, "ws escalating: repeated connection failures");
                }
            }
        }

        if cancel.is_cancelled() {
            return;
        }

        let backoff = compute_backoff(consecutive_failures.max(1));
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep(backoff) => {}
        }
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn run_streaming(
    core: &Core,
    stream: WsStream,
    manager: &mut SubscriptionManager,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    set_connection_gauge(ConnState::Streaming);
    let (mut write, mut read) = stream.split();

    sync_subscriptions(core, manager, &mut write).await?;

    let mut ping_timer = interval(PING_INTERVAL);
    ping_timer.tick().await;
    let mut sync_timer = interval(Duration::from_secs(core.config.ws_subscription_sync_secs));
    sync_timer.tick().await;
    let mut awaiting_pong: Option<Instant> = None;

    loop {
        if let Some(deadline) = awaiting_pong {
            if Instant::now().duration_since(deadline) > PONG_TIMEOUT {
                anyhow::bail!("pong timeout exceeded");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        counter!("ws_frames_total").increment(1);
                        dispatch_text(core, &text).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        awaiting_pong = None;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        anyhow::bail!("server sent close frame");
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => anyhow::bail!("ws read error: {e}"),
                    None => anyhow::bail!("ws stream ended"),
                }
            }

            _ = ping_timer.tick() => {
                write.send(Message::Ping(Vec::new())).await?;
                awaiting_pong = Some(Instant::now());
            }

            _ = sync_timer.tick() => {
                sync_subscriptions(core, manager, &mut write).await?;
            }
        }

        if manager.take_manual_trigger() {
            sync_subscriptions(core, manager, &mut write).await?;
        }
    }
}

type WsWriter = futures_util::stream::SplitSink<WsStream, Message>;

/// Resync against the desired token set, sending subscribe/unsubscribe
/// deltas for whatever changed since the last sync.
async fn sync_subscriptions(
    core: &Core,
    manager: &mut SubscriptionManager,
    write: &mut WsWriter,
) -> anyhow::Result<()> {
    let desired = watched_repo::get_active_position_token_ids(&core.pool, SUBSCRIPTION_TOKEN_LIMIT).await?;
    let desired_set: std::collections::HashSet<String> = desired.into_iter().collect();
    let (to_add, to_drop) = manager.diff(&desired_set);

    if !to_add.is_empty() {
        let msg = serde_json::json!({ "type": "subscribe", "assets_ids": to_add });
        write.send(Message::Text(msg.to_string())).await?;
    }
    if !to_drop.is_empty() {
        let msg = serde_json::json!({ "type": "unsubscribe", "assets_ids": to_drop });
        write.send(Message::Text(msg.to_string())).await?;
    }
    Ok(())
}

async fn dispatch_text(core: &Core, text: &str) {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        tracing::debug!(raw = %text, "non-json ws frame, dropping");
        return;
    };

    match value {
        Value::Array(items) => {
            for item in items {
                dispatch_value(core, item).await;
            }
        }
        other => dispatch_value(core, other).await,
    }
}

/// Discriminator dispatch per §4.5: `price_change`/`price_changes` go to the
/// Price Router; `trade`/`orderbook`/`book`/`snapshot`/`delta` update
/// `markets_ws` fields directly; anything else is logged and dropped.
async fn dispatch_value(core: &Core, value: Value) {
    let is_price_change = value.get("event_type").and_then(Value::as_str) == Some("price_change")
        || value.get("price_changes").is_some();
    if is_price_change {
        match serde_json::from_value::<PriceChangeFrame>(value) {
            Ok(frame) => {
                if let Err(e) = price_router::handle_frame(&core.pool, frame).await {
                    tracing::error!(error = %e, "price router failed");
                }
            }
            Err(e) => tracing::debug!(error = %e, "malformed price_change frame"),
        }
        return;
    }

    let frame_type = value.get("type").and_then(Value::as_str).unwrap_or_default();
    match frame_type {
        "trade" => handle_trade_frame(core, value).await,
        "orderbook" | "book" | "snapshot" | "delta" => handle_book_frame(core, value).await,
        other => tracing::debug!(frame_type = other, "unknown ws frame, dropping"),
    }
}

#[derive(Debug, Deserialize)]
struct TradeFrame {
    market: String,
    #[serde(default)]
    price: Option<Decimal>,
}

async fn handle_trade_frame(core: &Core, value: Value) {
    let Ok(frame) = serde_json::from_value::<TradeFrame>(value) else {
        return;
    };
    let Some(price) = frame.price else { return };
    apply_ws_update(
        core,
        &frame.market,
        WsFieldUpdate {
            last_trade_price: Some(price),
            ..Default::default()
        },
    )
    .await;
}

#[derive(Debug, Deserialize)]
struct BookLevel {
    price: Decimal,
    #[allow(dead_code)]
    #[serde(default)]
    size: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct BookFrame {
    market: String,
    #[serde(default)]
    bids: Vec<BookLevel>,
    #[serde(default)]
    asks: Vec<BookLevel>,
}

async fn handle_book_frame(core: &Core, value: Value) {
    let Ok(frame) = serde_json::from_value::<BookFrame>(value) else {
        return;
    };
    let best_bid = frame.bids.first().map(|l| l.price);
    let best_ask = frame.asks.first().map(|l| l.price);
    let last_mid = match (best_bid, best_ask) {
        (Some(b), Some(a)) => Some((b + a) / Decimal::TWO),
        _ => None,
    };

    apply_ws_update(
        core,
        &frame.market,
        WsFieldUpdate {
            last_bb: best_bid,
            last_ba: best_ask,
            last_mid,
            ..Default::default()
        },
    )
    .await;
}

async fn apply_ws_update(core: &Core, condition_id: &str, update: WsFieldUpdate) {
    let market = match market_repo::get_market_by_condition_id(&core.pool, condition_id).await {
        Ok(Some(m)) => m,
        Ok(None) => {
            tracing::debug!(condition_id, "ws frame for unknown market, dropping");
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to resolve condition_id");
            return;
        }
    };

    if let Err(e) = market_repo::upsert_market_ws(&core.pool, &market.market_id, update).await {
        tracing::error!(error = %e, "failed to apply ws field update");
    }
}
