use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus exporter and register all application metrics.
/// Returns a `PrometheusHandle` whose `render()` method produces the
/// text/plain Prometheus scrape payload.
///
/// Safe to call multiple times (e.g. in tests) — subsequent calls return a
/// new handle but silently ignore the global recorder installation error.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = match builder.install_recorder() {
        Ok(h) => h,
        Err(_) => {
            // Recorder already installed (happens in tests). Build a standalone
            // handle that still works for rendering.
            PrometheusBuilder::new().build_recorder().handle()
        }
    };

    counter!("poller_cycles_total").absolute(0);
    counter!("poller_markets_upserted_total").absolute(0);
    counter!("ws_reconnects_total").absolute(0);
    counter!("ws_frames_total").absolute(0);
    counter!("tpsl_triggers_total").absolute(0);
    counter!("redeemable_scans_total").absolute(0);

    gauge!("poller_markets_fresh_5m").set(0.0);
    gauge!("poller_markets_fresh_1h").set(0.0);
    gauge!("poller_markets_fresh_6h").set(0.0);
    gauge!("poller_markets_stale_24h").set(0.0);
    gauge!("ws_connection_state").set(0.0);

    histogram!("poller_cycle_seconds").record(0.0);

    handle
}
