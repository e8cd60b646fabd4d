use std::env;

const DEFAULT_GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";
const DEFAULT_CLOB_WSS_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,

    pub gamma_api_url: String,
    pub clob_wss_url: String,
    pub clob_api_key: Option<String>,
    pub clob_api_secret: Option<String>,
    pub clob_passphrase: Option<String>,

    pub poll_interval_ms: u64,
    pub poller_enabled: bool,
    pub streamer_enabled: bool,
    pub tpsl_enabled: bool,

    // Tier thresholds/cadences, §4.4.
    pub tier_urgent_expiry_hours: i64,
    pub tier_high_volume_min: f64,
    pub tier_medium_volume_min: f64,
    pub tier_small_volume_min: f64,
    pub tier_small_cycle_stride: u64,
    pub tier_limit: i64,

    pub tpsl_interval_secs: u64,
    pub ws_subscription_sync_secs: u64,
    pub poller_health_sweep_every: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT").unwrap_or_else(|_| "8080".into()).parse()?,

            gamma_api_url: env::var("GAMMA_API_URL")
                .unwrap_or_else(|_| DEFAULT_GAMMA_API_URL.into()),
            clob_wss_url: env::var("CLOB_WSS_URL").unwrap_or_else(|_| DEFAULT_CLOB_WSS_URL.into()),
            clob_api_key: env::var("CLOB_API_KEY").ok(),
            clob_api_secret: env::var("CLOB_API_SECRET").ok(),
            clob_passphrase: env::var("CLOB_PASSPHRASE").ok(),

            poll_interval_ms: env::var("POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "60000".into())
                .parse()
                .unwrap_or(60_000),
            poller_enabled: env::var("POLLER_ENABLED")
                .unwrap_or_else(|_| "true".into())
                .parse()
                .unwrap_or(true),
            streamer_enabled: env::var("STREAMER_ENABLED")
                .unwrap_or_else(|_| "true".into())
                .parse()
                .unwrap_or(true),
            tpsl_enabled: env::var("TPSL_ENABLED")
                .unwrap_or_else(|_| "true".into())
                .parse()
                .unwrap_or(true),

            tier_urgent_expiry_hours: env::var("TIER_URGENT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "2".into())
                .parse()
                .unwrap_or(2),
            tier_high_volume_min: env::var("TIER_HIGH_VOLUME_MIN")
                .unwrap_or_else(|_| "100000".into())
                .parse()
                .unwrap_or(100_000.0),
            tier_medium_volume_min: env::var("TIER_MEDIUM_VOLUME_MIN")
                .unwrap_or_else(|_| "10000".into())
                .parse()
                .unwrap_or(10_000.0),
            tier_small_volume_min: env::var("TIER_SMALL_VOLUME_MIN")
                .unwrap_or_else(|_| "1000".into())
                .parse()
                .unwrap_or(1_000.0),
            tier_small_cycle_stride: env::var("TIER_SMALL_CYCLE_STRIDE")
                .unwrap_or_else(|_| "3".into())
                .parse()
                .unwrap_or(3),
            tier_limit: env::var("TIER_LIMIT")
                .unwrap_or_else(|_| "500".into())
                .parse()
                .unwrap_or(500),

            tpsl_interval_secs: env::var("TPSL_INTERVAL_SECS")
                .unwrap_or_else(|_| "10".into())
                .parse()
                .unwrap_or(10),
            ws_subscription_sync_secs: env::var("WS_SUBSCRIPTION_SYNC_SECS")
                .unwrap_or_else(|_| "60".into())
                .parse()
                .unwrap_or(60),
            poller_health_sweep_every: env::var("POLLER_HEALTH_SWEEP_EVERY")
                .unwrap_or_else(|_| "60".into())
                .parse()
                .unwrap_or(60),
        })
    }

    /// Returns true if all CLOB credentials are configured (needed to build
    /// the authenticated WS subscription URL).
    pub fn has_clob_auth(&self) -> bool {
        self.clob_api_key.is_some() && self.clob_api_secret.is_some() && self.clob_passphrase.is_some()
    }
}
