//! Prometheus metrics for the protocol engine

use prometheus::{IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Per-node protocol metrics.
pub struct ProtocolMetrics {
    /// Total REQUEST messages sent
    pub requests_sent: IntCounter,

    /// Total PRIVILEGE messages sent
    pub privileges_sent: IntCounter,

    /// Total RESTART messages sent
    pub restarts_sent: IntCounter,

    /// Total ADVISE messages sent
    pub advises_sent: IntCounter,

    /// Frames discarded (recovering, malformed, or non-neighbour sender)
    pub frames_discarded: IntCounter,

    /// Critical-section entries
    pub cs_entries: IntCounter,

    /// Crashes initiated
    pub crashes: IntCounter,

    /// Recoveries completed
    pub recoveries: IntCounter,

    /// Driver calls rejected by the engine guard
    pub driver_rejections: IntCounter,

    /// Current request-queue depth
    pub queue_depth: IntGauge,

    /// Prometheus registry
    registry: Arc<Registry>,
}

impl ProtocolMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_sent = IntCounter::with_opts(
            Opts::new("mutex_requests_sent_total", "Total REQUEST messages sent")
                .namespace("treelock"),
        )
        .unwrap();
        registry.register(Box::new(requests_sent.clone())).unwrap();

        let privileges_sent = IntCounter::with_opts(
            Opts::new(
                "mutex_privileges_sent_total",
                "Total PRIVILEGE messages sent",
            )
            .namespace("treelock"),
        )
        .unwrap();
        registry.register(Box::new(privileges_sent.clone())).unwrap();

        let restarts_sent = IntCounter::with_opts(
            Opts::new("mutex_restarts_sent_total", "Total RESTART messages sent")
                .namespace("treelock"),
        )
        .unwrap();
        registry.register(Box::new(restarts_sent.clone())).unwrap();

        let advises_sent = IntCounter::with_opts(
            Opts::new("mutex_advises_sent_total", "Total ADVISE messages sent")
                .namespace("treelock"),
        )
        .unwrap();
        registry.register(Box::new(advises_sent.clone())).unwrap();

        let frames_discarded = IntCounter::with_opts(
            Opts::new("mutex_frames_discarded_total", "Frames discarded")
                .namespace("treelock"),
        )
        .unwrap();
        registry
            .register(Box::new(frames_discarded.clone()))
            .unwrap();

        let cs_entries = IntCounter::with_opts(
            Opts::new("mutex_cs_entries_total", "Critical-section entries")
                .namespace("treelock"),
        )
        .unwrap();
        registry.register(Box::new(cs_entries.clone())).unwrap();

        let crashes = IntCounter::with_opts(
            Opts::new("mutex_crashes_total", "Crashes initiated").namespace("treelock"),
        )
        .unwrap();
        registry.register(Box::new(crashes.clone())).unwrap();

        let recoveries = IntCounter::with_opts(
            Opts::new("mutex_recoveries_total", "Recoveries completed")
                .namespace("treelock"),
        )
        .unwrap();
        registry.register(Box::new(recoveries.clone())).unwrap();

        let driver_rejections = IntCounter::with_opts(
            Opts::new(
                "mutex_driver_rejections_total",
                "Driver calls rejected by the engine guard",
            )
            .namespace("treelock"),
        )
        .unwrap();
        registry
            .register(Box::new(driver_rejections.clone()))
            .unwrap();

        let queue_depth = IntGauge::with_opts(
            Opts::new("mutex_queue_depth", "Current request-queue depth")
                .namespace("treelock"),
        )
        .unwrap();
        registry.register(Box::new(queue_depth.clone())).unwrap();

        Self {
            requests_sent,
            privileges_sent,
            restarts_sent,
            advises_sent,
            frames_discarded,
            cs_entries,
            crashes,
            recoveries,
            driver_rejections,
            queue_depth,
            registry: Arc::new(registry),
        }
    }

    /// Registry backing these metrics, for exposition by the embedder.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }
}

impl Default for ProtocolMetrics {
    fn default() -> Self {
        Self::new()
    }
}
