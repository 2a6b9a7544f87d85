//! # Prometheus Metrics
//!
//! Operational metrics for the escrow node, scraped at `/metrics` on the
//! configured metrics port.
//!
//! Metrics live in a dedicated [`prometheus::Registry`] so they do not
//! collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles wrap `Arc` internally) so it can be
/// shared across request handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Registry that owns all metrics below.
    registry: Registry,
    /// Total escrow plans built.
    pub plans_created_total: IntCounter,
    /// Total relay plans linked off a parent leg.
    pub relays_created_total: IntCounter,
    /// Total signed envelopes submitted through the node.
    pub submissions_total: IntCounter,
    /// Total submissions the ledger rejected.
    pub rejections_total: IntCounter,
    /// Packages reported delivered.
    pub deliveries_total: IntCounter,
    /// Packages reported refunded.
    pub refunds_total: IntCounter,
    /// Packages currently in a non-terminal state.
    pub packages_open: IntGauge,
    /// Histogram of plan-construction latency in seconds.
    pub plan_build_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("caravan".into()), None)
            .expect("failed to create prometheus registry");

        fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
            let c = IntCounter::new(name, help).expect("metric creation");
            registry
                .register(Box::new(c.clone()))
                .expect("metric registration");
            c
        }

        let plans_created_total =
            counter(&registry, "plans_created_total", "Total escrow plans built");
        let relays_created_total = counter(
            &registry,
            "relays_created_total",
            "Total relay plans linked off a parent leg",
        );
        let submissions_total = counter(
            &registry,
            "submissions_total",
            "Total signed envelopes submitted to the ledger",
        );
        let rejections_total = counter(
            &registry,
            "rejections_total",
            "Total submissions rejected by the ledger",
        );
        let deliveries_total = counter(
            &registry,
            "deliveries_total",
            "Total packages reported delivered",
        );
        let refunds_total = counter(
            &registry,
            "refunds_total",
            "Total packages reported refunded",
        );

        let packages_open = IntGauge::new(
            "packages_open",
            "Packages currently in a non-terminal lifecycle state",
        )
        .expect("metric creation");
        registry
            .register(Box::new(packages_open.clone()))
            .expect("metric registration");

        let plan_build_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "plan_build_seconds",
                "Escrow plan construction latency in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(plan_build_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            plans_created_total,
            relays_created_total,
            submissions_total,
            rejections_total,
            deliveries_total,
            refunds_total,
            packages_open,
            plan_build_seconds,
        }
    }

    /// Encodes all registered metrics in the Prometheus text exposition
    /// format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler rendering `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
