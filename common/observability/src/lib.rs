use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};

#[derive(Clone)]
pub struct ToolServiceMetrics {
    pub registry: Registry,
    pub ws_connections: IntGauge,
    pub ws_messages_total: IntCounterVec,
    pub broadcasts_total: IntCounter,
    pub history_record_failures: IntCounter,
    pub message_handle_seconds: Histogram,
}

impl ToolServiceMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let ws_connections = IntGauge::new(
            "tool_ws_connections",
            "Currently connected WebSocket clients",
        ).unwrap();
        let ws_messages_total = IntCounterVec::new(
            prometheus::Opts::new(
                "tool_ws_messages_total",
                "Inbound WebSocket messages handled, by action"
            ),
            &["action"]
        ).unwrap();
        let broadcasts_total = IntCounter::new(
            "tool_inventory_broadcasts_total",
            "inventory_changed notifications fanned out",
        ).unwrap();
        let history_record_failures = IntCounter::new(
            "tool_history_record_failures_total",
            "Borrow/return history recording failures",
        ).unwrap();
        let message_handle_seconds = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "tool_ws_message_handle_seconds",
                "Time spent handling one inbound WebSocket message"
            ).buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0])
        ).unwrap();
        let _ = registry.register(Box::new(ws_connections.clone()));
        let _ = registry.register(Box::new(ws_messages_total.clone()));
        let _ = registry.register(Box::new(broadcasts_total.clone()));
        let _ = registry.register(Box::new(history_record_failures.clone()));
        let _ = registry.register(Box::new(message_handle_seconds.clone()));
        ToolServiceMetrics { registry, ws_connections, ws_messages_total, broadcasts_total, history_record_failures, message_handle_seconds }
    }
}

impl Default for ToolServiceMetrics {
    fn default() -> Self { Self::new() }
}
