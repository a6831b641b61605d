use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub order_events_total: IntCounterVec,
    pub dispatch_attempts_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub notifications_in_queue: IntGauge,
    pub invoices_marked_overdue_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let order_events_total = IntCounterVec::new(
            Opts::new("order_events_total", "Order audit events by type"),
            &["event_type"],
        )
        .expect("valid order_events_total metric");

        let dispatch_attempts_total = IntCounterVec::new(
            Opts::new("dispatch_attempts_total", "Dispatch attempts by outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_attempts_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "dispatch_latency_seconds",
                "Latency of the dispatch write sequence in seconds",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let notifications_in_queue = IntGauge::new(
            "notifications_in_queue",
            "Current number of notifications waiting for the worker",
        )
        .expect("valid notifications_in_queue metric");

        let invoices_marked_overdue_total = IntCounter::new(
            "invoices_marked_overdue_total",
            "Invoices moved to overdue by the sweep",
        )
        .expect("valid invoices_marked_overdue_total metric");

        registry
            .register(Box::new(order_events_total.clone()))
            .expect("register order_events_total");
        registry
            .register(Box::new(dispatch_attempts_total.clone()))
            .expect("register dispatch_attempts_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(notifications_in_queue.clone()))
            .expect("register notifications_in_queue");
        registry
            .register(Box::new(invoices_marked_overdue_total.clone()))
            .expect("register invoices_marked_overdue_total");

        Self {
            registry,
            order_events_total,
            dispatch_attempts_total,
            dispatch_latency_seconds,
            notifications_in_queue,
            invoices_marked_overdue_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
