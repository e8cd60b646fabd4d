use metrics::counter;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::core::Core;
use crate::db::{market_repo, position_repo, tpsl_repo};
use crate::models::{Signal, TpslOrder};

/// Periodic scan of `ACTIVE` TP/SL orders against live prices: `ticker.tick()`
/// then per-order evaluation, the same shape as the teacher's
/// `run_position_monitor`, generalized to the cancellation-sweep/trigger
/// rules of §4.7 and emitting `Signal`s instead of placing orders directly.
pub async fn run_tpsl_monitor(core: Core, cancel: CancellationToken) {
    let mut ticker = interval(std::time::Duration::from_secs(core.config.tpsl_interval_secs));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("tpsl monitor shutting down");
                return;
            }
            _ = ticker.tick() => {}
        }

        let orders = match tpsl_repo::get_active_orders(&core.pool).await {
            Ok(o) => o,
            Err(e) => {
                tracing::error!(error = %e, "tpsl monitor: failed to load active orders");
                continue;
            }
        };

        for order in orders {
            if let Err(e) = evaluate_order(&core, &order).await {
                tracing::error!(error = %e, order_id = %order.id, "tpsl monitor: order evaluation failed");
            }
        }
    }
}

async fn evaluate_order(core: &Core, order: &TpslOrder) -> anyhow::Result<()> {
    let Some(current_price) = market_repo::get_current_price(&core.pool, &order.market_id, &order.outcome).await? else {
        tracing::debug!(order_id = %order.id, "tpsl monitor: market not monitored, skipping tick");
        return Ok(());
    };

    if let Some(reason) = cancellation_reason(core, order).await? {
        tpsl_repo::mark_cancelled(&core.pool, order.id, reason).await?;
        tracing::info!(order_id = %order.id, reason, "tpsl order cancelled");
        return Ok(());
    }

    if let Some(tp) = order.take_profit_price {
        if current_price >= tp {
            tpsl_repo::mark_triggered(&core.pool, order.id, "take_profit", current_price).await?;
            core.signal_tx
                .send(Signal::TpTriggered {
                    order_id: order.id,
                    execution_price: current_price,
                })
                .await
                .ok();
            counter!("tpsl_triggers_total").increment(1);
            tracing::info!(order_id = %order.id, price = %current_price, "take-profit triggered");
            return Ok(());
        }
    }

    if let Some(sl) = order.stop_loss_price {
        if current_price <= sl {
            tpsl_repo::mark_triggered(&core.pool, order.id, "stop_loss", current_price).await?;
            core.signal_tx
                .send(Signal::SlTriggered {
                    order_id: order.id,
                    execution_price: current_price,
                })
                .await
                .ok();
            counter!("tpsl_triggers_total").increment(1);
            tracing::info!(order_id = %order.id, price = %current_price, "stop-loss triggered");
        }
    }

    Ok(())
}

/// Cancellation sweep, in priority order: market lifecycle, then position
/// drift, then a dangling rule with no thresholds left.
async fn cancellation_reason(core: &Core, order: &TpslOrder) -> anyhow::Result<Option<&'static str>> {
    if let Some(market) = market_repo::get_market_by_id(&core.pool, &order.market_id).await? {
        if market.is_resolved() {
            return Ok(Some("market_resolved"));
        }
        if market.is_closed() {
            return Ok(Some("market_closed"));
        }
    }

    let position =
        position_repo::get_position(&core.pool, &order.user_id, &order.market_id, &order.outcome).await?;
    match position {
        None => return Ok(Some("position_closed")),
        Some(p) if order.monitored_tokens > p.token_count => return Ok(Some("insufficient_tokens")),
        Some(_) => {}
    }

    if order.take_profit_price.is_none() && order.stop_loss_price.is_none() {
        return Ok(Some("both_null"));
    }

    Ok(None)
}
