pub mod history;
pub mod inventory;
pub mod protocol;
pub mod record_handlers;
pub mod registry;
pub mod store;
pub mod ws_handlers;

pub use crate::history::{InMemoryRecordStore, RecordStore};
pub use crate::inventory::{
    InventoryError, ToolInventory, ToolStatus, DEFAULT_THRESHOLD, DEFAULT_TOOL_NAME,
    DEFAULT_TOTAL_QUANTITY, DEFAULT_UNIT_WEIGHT,
};
pub use crate::protocol::{Command, Envelope};
pub use crate::registry::{ConnectionId, ConnectionRegistry};
pub use crate::store::InventoryStore;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use common_observability::ToolServiceMetrics;
use prometheus::{Encoder, TextEncoder};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<InventoryStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub history: Arc<dyn RecordStore>,
    pub metrics: Arc<ToolServiceMetrics>,
}

impl AppState {
    /// State with default inventory and an in-memory history store.
    pub fn with_defaults() -> Self {
        AppState {
            store: Arc::new(InventoryStore::with_defaults()),
            registry: Arc::new(ConnectionRegistry::new()),
            history: Arc::new(InMemoryRecordStore::new()),
            metrics: Arc::new(ToolServiceMetrics::new()),
        }
    }
}

async fn service_info() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "tool cabinet realtime server",
        "version": env!("CARGO_PKG_VERSION"),
        "protocols": {
            "websocket": "/ws",
            "http_api": "/api",
        },
        "timestamp": protocol::now_rfc3339(),
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": protocol::now_rfc3339(),
    }))
}

async fn metrics_endpoint(State(state): State<AppState>) -> (StatusCode, String) {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry.gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buf) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encode error: {e}"),
        );
    }
    (StatusCode::OK, String::from_utf8_lossy(&buf).to_string())
}

/// The full service surface: realtime WebSocket endpoint, history API,
/// health/info and metrics.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health))
        .route("/ws", get(ws_handlers::ws_endpoint))
        .route("/api/records", get(record_handlers::list_records))
        .route("/api/records/current", get(record_handlers::get_current_record))
        .route("/api/records/stats", get(record_handlers::get_record_stats))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
}
