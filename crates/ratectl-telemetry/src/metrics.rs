//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! Grounded on the teacher's `Metrics`/`MetricsSnapshot` shape, re-keyed to
//! this daemon's own gauges/counters.

use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus-backed metrics registry shared across the coordinator loop.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    limit_changes_total: IntCounter,
    limit_changes_by_reason_total: IntCounterVec,
    reannounces_total: IntCounter,
    active_torrents: IntGauge,
    precision_global_adjustment_permille: IntGauge,
    reconnects_total: IntCounter,
    config_reload_failures_total: IntCounter,
    tick_latency_ms: IntGauge,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Total upload-limit changes applied, by reason.
    pub limit_changes_total: u64,
    /// Total tracker re-announces fired.
    pub reannounces_total: u64,
    /// Current number of managed torrents.
    pub active_torrents: i64,
    /// Process-wide precision adjustment factor, scaled x1000.
    pub precision_global_adjustment_permille: i64,
    /// Total client reconnect attempts.
    pub reconnects_total: u64,
    /// Total configuration reload failures observed.
    pub config_reload_failures_total: u64,
    /// Latest coordinator tick latency, ms.
    pub tick_latency_ms: i64,
}

impl Metrics {
    /// Constructs a new metrics registry with the standard collectors
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let limit_changes_total = IntCounter::with_opts(Opts::new(
            "limit_changes_total",
            "Total upload limit changes applied",
        ))?;
        let limit_changes_by_reason_total = IntCounterVec::new(
            Opts::new("limit_changes_by_reason_total", "Upload limit changes applied, by reason"),
            &["reason"],
        )?;
        let reannounces_total = IntCounter::with_opts(Opts::new(
            "reannounces_total",
            "Tracker re-announces fired by the reannounce optimiser",
        ))?;
        let active_torrents =
            IntGauge::with_opts(Opts::new("active_torrents", "Number of managed torrents"))?;
        let precision_global_adjustment_permille = IntGauge::with_opts(Opts::new(
            "precision_global_adjustment_permille",
            "Process-wide precision adjustment factor, scaled x1000",
        ))?;
        let reconnects_total = IntCounter::with_opts(Opts::new(
            "reconnects_total",
            "Torrent client reconnect attempts",
        ))?;
        let config_reload_failures_total = IntCounter::with_opts(Opts::new(
            "config_reload_failures_total",
            "Configuration reloads that failed validation or parsing",
        ))?;
        let tick_latency_ms = IntGauge::with_opts(Opts::new(
            "tick_latency_ms",
            "Latency of the most recent coordinator tick, ms",
        ))?;

        registry.register(Box::new(limit_changes_total.clone()))?;
        registry.register(Box::new(limit_changes_by_reason_total.clone()))?;
        registry.register(Box::new(reannounces_total.clone()))?;
        registry.register(Box::new(active_torrents.clone()))?;
        registry.register(Box::new(precision_global_adjustment_permille.clone()))?;
        registry.register(Box::new(reconnects_total.clone()))?;
        registry.register(Box::new(config_reload_failures_total.clone()))?;
        registry.register(Box::new(tick_latency_ms.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                limit_changes_total,
                limit_changes_by_reason_total,
                reannounces_total,
                active_torrents,
                precision_global_adjustment_permille,
                reconnects_total,
                config_reload_failures_total,
                tick_latency_ms,
            }),
        })
    }

    /// Increments the limit-change counter for the given reason label.
    pub fn inc_limit_change(&self, reason: &str) {
        self.inner.limit_changes_total.inc();
        self.inner.limit_changes_by_reason_total.with_label_values(&[reason]).inc();
    }

    /// Increments the reannounce counter.
    pub fn inc_reannounce(&self) {
        self.inner.reannounces_total.inc();
    }

    /// Sets the active torrent gauge.
    pub fn set_active_torrents(&self, count: i64) {
        self.inner.active_torrents.set(count);
    }

    /// Sets the process-wide precision adjustment gauge (value x1000).
    pub fn set_precision_global_adjustment(&self, adjustment: f64) {
        self.inner
            .precision_global_adjustment_permille
            .set((adjustment * 1000.0) as i64);
    }

    /// Increments the client reconnect counter.
    pub fn inc_reconnect(&self) {
        self.inner.reconnects_total.inc();
    }

    /// Increments the configuration reload failure counter.
    pub fn inc_config_reload_failure(&self) {
        self.inner.config_reload_failures_total.inc();
    }

    /// Records the latency of the most recent coordinator tick.
    pub fn set_tick_latency_ms(&self, millis: i64) {
        self.inner.tick_latency_ms.set(millis);
    }

    /// Renders the metrics registry using the Prometheus text exposition
    /// format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid UTF-8")
    }

    /// Takes a point-in-time snapshot of the most relevant gauges and
    /// counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            limit_changes_total: self.inner.limit_changes_total.get(),
            reannounces_total: self.inner.reannounces_total.get(),
            active_torrents: self.inner.active_torrents.get(),
            precision_global_adjustment_permille: self.inner.precision_global_adjustment_permille.get(),
            reconnects_total: self.inner.reconnects_total.get(),
            config_reload_failures_total: self.inner.config_reload_failures_total.get(),
            tick_latency_ms: self.inner.tick_latency_ms.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_limit_change("steady");
        metrics.inc_reannounce();
        metrics.set_active_torrents(5);
        metrics.set_precision_global_adjustment(1.02);
        metrics.inc_reconnect();
        metrics.inc_config_reload_failure();
        metrics.set_tick_latency_ms(12);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.active_torrents, 5);
        assert_eq!(snapshot.precision_global_adjustment_permille, 1020);
        assert_eq!(snapshot.reannounces_total, 1);
        assert_eq!(snapshot.reconnects_total, 1);
        assert_eq!(snapshot.config_reload_failures_total, 1);
        assert_eq!(snapshot.tick_latency_ms, 12);

        let rendered = metrics.render()?;
        assert!(rendered.contains("limit_changes_total"));
        assert!(rendered.contains("reannounces_total"));
        Ok(())
    }
}
