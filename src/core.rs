use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db::market_repo::ExistingIdsCache;
use crate::fetcher::{ClobPricesClient, GammaClient};
use crate::models::SignalSender;

const CLOB_PRICES_BASE_URL: &str = "https://clob.polymarket.com";

/// Explicit handles shared across every worker, assembled once in `main`
/// and cloned into each `tokio::spawn`ed task — no module-level globals.
#[derive(Clone)]
pub struct Core {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub gamma_client: Arc<GammaClient>,
    pub clob_prices_client: Arc<ClobPricesClient>,
    pub existing_ids_cache: Arc<ExistingIdsCache>,
    pub signal_tx: SignalSender,
    pub subscription_manual_trigger: Arc<AtomicBool>,
}

impl Core {
    pub fn new(pool: PgPool, config: AppConfig, signal_tx: SignalSender) -> Self {
        let gamma_client = Arc::new(GammaClient::new(config.gamma_api_url.clone()));
        let clob_prices_client = Arc::new(ClobPricesClient::new(CLOB_PRICES_BASE_URL.into()));

        Self {
            pool,
            config: Arc::new(config),
            gamma_client,
            clob_prices_client,
            existing_ids_cache: Arc::new(ExistingIdsCache::new()),
            signal_tx,
            subscription_manual_trigger: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Called by the external trading layer immediately after a user's
    /// trade changes their position set, to force an out-of-band
    /// subscription sync rather than waiting for the next periodic tick.
    pub fn request_subscription_refresh(&self) {
        self.subscription_manual_trigger
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }
}
