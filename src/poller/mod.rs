use std::time::Duration;

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use tokio::time::{interval, sleep};
use tokio_util::sync::CancellationToken;

use crate::core::Core;
use crate::db::{market_repo, poller_state_repo, watched_repo, webhook_repo};
use crate::fetcher::GammaClientError;
use crate::models::{MarketStatus, NormalizedMarket, ResolutionStatus};
use crate::normalize::normalize_market;

const EVENTS_PAGE_SIZE: u32 = 200;
const EVENTS_MAX_PAGES: u32 = 200;
const UPSERT_CHUNK_SIZE: usize = 500;
const UPSERT_CHUNK_SLEEP: Duration = Duration::from_millis(100);
const URGENT_EXPIRY_LIMIT: i64 = 50;
const HIGH_TIER_COUNT: i64 = 12;
const MEDIUM_TIER_COUNT: i64 = 3;
const SMALL_TIER_COUNT: i64 = 1;
const REEVALUATE_BULK_CHUNK: usize = 100;

/// Drives the ingestion cycle: `tokio::time::interval` + `loop { ticker.tick().await; ... }`,
/// the same shape as the teacher's `run_market_discovery`/`run_resolution_poller`,
/// generalized into a 4-pass body.
pub async fn run_poller(core: Core, cancel: CancellationToken) {
    let mut ticker = interval(Duration::from_millis(core.config.poll_interval_ms));
    let mut cycle_count: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("poller shutting down");
                return;
            }
            _ = ticker.tick() => {}
        }

        let cycle_start = std::time::Instant::now();
        tracing::info!(cycle = cycle_count, "poller cycle starting");

        let mut aborted = false;

        match pass1_events_sweep(&core).await {
            Ok(n) => tracing::info!(cycle = cycle_count, upserted = n, "pass 1 complete"),
            Err(e) => {
                tracing::error!(error = %e, "pass 1 aborted the cycle");
                aborted = true;
            }
        }

        if !aborted {
            if let Err(e) = pass2_tier_refresh(&core, cycle_count).await {
                tracing::error!(error = %e, "pass 2 failed, continuing cycle");
            }
        }

        if !aborted {
            if let Err(e) = pass3_closed_sweep(&core).await {
                tracing::error!(error = %e, "pass 3 failed, continuing cycle");
            }
        }

        if !aborted {
            if let Err(e) = pass4_reevaluate_proposed(&core).await {
                tracing::error!(error = %e, "pass 4 failed, continuing cycle");
            }
        }

        if !aborted {
            if let Err(e) = poller_state_repo::update_last_sync(&core.pool, Utc::now()).await {
                tracing::error!(error = %e, "failed to update poller last_sync");
            }
            core.existing_ids_cache.invalidate().await;
        }

        counter!("poller_cycles_total").increment(1);
        histogram!("poller_cycle_seconds").record(cycle_start.elapsed().as_secs_f64());

        cycle_count += 1;
        if cycle_count.is_multiple_of(core.config.poller_health_sweep_every) {
            health_sweep(&core).await;
        }
    }
}

async fn upsert_in_chunks(
    core: &Core,
    rows: &[NormalizedMarket],
    skip_lifecycle_filter: bool,
) -> anyhow::Result<u64> {
    let mut total = 0u64;
    for chunk in rows.chunks(UPSERT_CHUNK_SIZE) {
        total += market_repo::upsert_markets(&core.pool, chunk, skip_lifecycle_filter).await?;
        if rows.len() > UPSERT_CHUNK_SIZE {
            sleep(UPSERT_CHUNK_SLEEP).await;
        }
    }
    counter!("poller_markets_upserted_total").increment(total);
    Ok(total)
}

/// Paginate `/events` to full coverage, normalize every market, sort by
/// `(volume, updated_at)` DESC, and upsert in chunks.
async fn pass1_events_sweep(core: &Core) -> anyhow::Result<u64> {
    let now = Utc::now();
    let mut all: Vec<NormalizedMarket> = Vec::new();

    for page in 0..EVENTS_MAX_PAGES {
        let offset = page * EVENTS_PAGE_SIZE;
        let events = match core
            .gamma_client
            .get_events(offset, EVENTS_PAGE_SIZE, false)
            .await
        {
            Ok(events) => events,
            Err(GammaClientError::Aborted(n)) => {
                anyhow::bail!("gamma client aborted after {n} consecutive errors")
            }
            Err(e) => {
                tracing::warn!(error = %e, page, "events page fetch failed, stopping sweep early this cycle");
                break;
            }
        };
        if events.is_empty() {
            break;
        }
        for event in events {
            // OPT-5-adjacent: standalone markets with no outcome_prices are
            // unusable to the Normalizer and would otherwise sort to the
            // bottom anyway; drop them before they ever reach the Store.
            for market in event.markets {
                if market.outcome_prices.is_empty_ish() {
                    continue;
                }
                all.push(normalize_market(market, now));
            }
        }
    }

    all.sort_by(|a, b| b.volume.cmp(&a.volume).then_with(|| b.updated_at.cmp(&a.updated_at)));

    upsert_in_chunks(core, &all, false).await
}

/// Build the five Pass-2 tiers and refresh markets already in the Store.
async fn pass2_tier_refresh(core: &Core, cycle_count: u64) -> anyhow::Result<()> {
    let cfg = &core.config;
    let mut candidate_ids: Vec<String> = Vec::new();

    candidate_ids.extend(watched_repo::get_user_position_market_ids(&core.pool).await?);
    candidate_ids.extend(
        market_repo::get_markets_by_expiry_tier(&core.pool, cfg.tier_urgent_expiry_hours, URGENT_EXPIRY_LIMIT)
            .await?,
    );

    let high = market_repo::get_markets_by_volume_tier(
        &core.pool,
        cfg.tier_high_volume_min,
        f64::MAX,
        HIGH_TIER_COUNT,
        true,
        cycle_count,
    )
    .await?;
    let medium = market_repo::get_markets_by_volume_tier(
        &core.pool,
        cfg.tier_medium_volume_min,
        cfg.tier_high_volume_min,
        MEDIUM_TIER_COUNT,
        true,
        cycle_count,
    )
    .await?;
    candidate_ids.extend(high);
    candidate_ids.extend(medium);

    if cycle_count.is_multiple_of(cfg.tier_small_cycle_stride) {
        let small = market_repo::get_markets_by_volume_tier(
            &core.pool,
            cfg.tier_small_volume_min,
            cfg.tier_medium_volume_min,
            SMALL_TIER_COUNT,
            true,
            cycle_count,
        )
        .await?;
        candidate_ids.extend(small);
    }

    candidate_ids.sort();
    candidate_ids.dedup();
    candidate_ids.truncate(cfg.tier_limit as usize);
    if candidate_ids.is_empty() {
        return Ok(());
    }

    let preserved = market_repo::load_preservation_fields(&core.pool, &candidate_ids).await?;
    let now = Utc::now();
    let mut normalized = Vec::new();

    for chunk in candidate_ids.chunks(REEVALUATE_BULK_CHUNK) {
        let raw_markets = core.gamma_client.get_markets_bulk(chunk).await;
        for raw in raw_markets {
            let market_id = raw.market_id.clone();
            let mut m = normalize_market(raw, now);
            if let Some((events, category)) = preserved.get(&market_id) {
                if m.events.is_empty() {
                    if let Some(events) = events {
                        if let Ok(parsed) = serde_json::from_value(events.clone()) {
                            m.events = parsed;
                        }
                    }
                }
                if m.category.is_none() {
                    m.category = category.clone();
                }
            }
            normalized.push(m);
        }
    }

    upsert_in_chunks(core, &normalized, false).await?;
    Ok(())
}

/// SQL-level expire/stale sweeps, then re-upsert recently-closed markets.
async fn pass3_closed_sweep(core: &Core) -> anyhow::Result<()> {
    let affected = market_repo::mark_expired_markets_closed(&core.pool).await?;
    if affected > 0 {
        tracing::info!(affected, "pass 3: expired/stale markets closed");
    }

    let now = Utc::now();
    let mut closed_markets = Vec::new();
    for page in 0..EVENTS_MAX_PAGES {
        let offset = page * EVENTS_PAGE_SIZE;
        let markets = match core
            .gamma_client
            .get_markets(offset, EVENTS_PAGE_SIZE, true, "id", false)
            .await
        {
            Ok(markets) => markets,
            Err(GammaClientError::Aborted(n)) => {
                anyhow::bail!("gamma client aborted after {n} consecutive errors")
            }
            Err(e) => {
                tracing::warn!(error = %e, page, "closed-markets page fetch failed, stopping sweep early this cycle");
                break;
            }
        };
        if markets.is_empty() {
            break;
        }
        let page_len = markets.len();
        let cutoff = now - chrono::Duration::hours(24);
        for raw in markets {
            let recent = raw
                .updated_at
                .map(|u| u > cutoff)
                .unwrap_or(false);
            if recent {
                closed_markets.push(normalize_market(raw, now));
            }
        }
        // Pages are ordered by id, not updated_at, so a page with no
        // recently-closed markets doesn't mean later pages won't have any;
        // only a short page (the last one) ends the sweep.
        if page_len < EVENTS_PAGE_SIZE as usize {
            break;
        }
    }

    upsert_in_chunks(core, &closed_markets, true).await?;
    for m in &closed_markets {
        if m.resolution_status == ResolutionStatus::Resolved {
            webhook_repo::record_event(
                &core.pool,
                &m.market_id,
                "RESOLVED",
                serde_json::json!({ "winning_outcome": m.winning_outcome }),
            )
            .await
            .ok();
        } else if m.status == MarketStatus::Closed {
            webhook_repo::record_event(&core.pool, &m.market_id, "CLOSED", serde_json::json!({}))
                .await
                .ok();
        }
    }
    Ok(())
}

/// Promote expired PENDING rows, then re-fetch and re-classify up to 1000
/// PROPOSED rows eligible for resolution.
async fn pass4_reevaluate_proposed(core: &Core) -> anyhow::Result<()> {
    market_repo::promote_expired_pending(&core.pool).await?;

    let candidates = market_repo::get_proposed_for_reevaluation(&core.pool).await?;
    if candidates.is_empty() {
        return Ok(());
    }

    let now = Utc::now();
    for chunk in candidates.chunks(REEVALUATE_BULK_CHUNK) {
        let raw_markets = core.gamma_client.get_markets_bulk(chunk).await;
        for raw in raw_markets {
            let market_id = raw.market_id.clone();
            let normalized = normalize_market(raw, now);
            if normalized.resolution_status == ResolutionStatus::Resolved {
                if let Some(winner) = normalized.winning_outcome {
                    market_repo::mark_market_resolved(
                        &core.pool,
                        &market_id,
                        winner,
                        &normalized.outcome_prices,
                    )
                    .await?;
                    webhook_repo::record_event(
                        &core.pool,
                        &market_id,
                        "RESOLVED",
                        serde_json::json!({ "winning_outcome": winner }),
                    )
                    .await
                    .ok();
                }
            }
        }
    }
    Ok(())
}

async fn health_sweep(core: &Core) {
    let hist = match market_repo::freshness_histogram(&core.pool).await {
        Ok(h) => h,
        Err(e) => {
            tracing::error!(error = %e, "health sweep failed");
            return;
        }
    };

    tracing::info!(
        fresh_5m = hist.fresh_5m,
        fresh_1h = hist.fresh_1h,
        fresh_6h = hist.fresh_6h,
        stale_24h = hist.stale_24h,
        "poller health sweep"
    );

    gauge!("poller_markets_fresh_5m").set(hist.fresh_5m as f64);
    gauge!("poller_markets_fresh_1h").set(hist.fresh_1h as f64);
    gauge!("poller_markets_fresh_6h").set(hist.fresh_6h as f64);
    gauge!("poller_markets_stale_24h").set(hist.stale_24h as f64);
}
