use std::{env, net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use tool_service::{
    AppState, ConnectionRegistry, InMemoryRecordStore, InventoryStore, ToolInventory,
    DEFAULT_THRESHOLD, DEFAULT_TOOL_NAME, DEFAULT_TOTAL_QUANTITY, DEFAULT_UNIT_WEIGHT,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let name = env::var("TOOL_NAME").unwrap_or_else(|_| DEFAULT_TOOL_NAME.to_string());
    let total_quantity = env::var("TOOL_TOTAL_QUANTITY")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(DEFAULT_TOTAL_QUANTITY);
    let threshold = env::var("TOOL_THRESHOLD")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(DEFAULT_THRESHOLD);
    let unit_weight = env::var("TOOL_UNIT_WEIGHT")
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(DEFAULT_UNIT_WEIGHT);

    let tool = ToolInventory::new(name, total_quantity, threshold, unit_weight);
    info!(
        name = %tool.name,
        total_quantity = tool.total_quantity,
        threshold = tool.threshold,
        unit_weight = tool.unit_weight,
        "tool inventory initialised"
    );

    let state = AppState {
        store: Arc::new(InventoryStore::new(tool)),
        registry: Arc::new(ConnectionRegistry::new()),
        history: Arc::new(InMemoryRecordStore::new()),
        metrics: Arc::new(common_observability::ToolServiceMetrics::new()),
    };

    // Operator dashboards are served from anywhere on the shop network.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = tool_service::router(state).layer(cors);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8090);
    let ip: std::net::IpAddr = host.parse()?;
    let addr = SocketAddr::from((ip, port));
    info!(%addr, "starting tool-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
