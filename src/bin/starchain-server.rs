#![forbid(unsafe_code)]
//! Star registry API server

use std::net::SocketAddr;
use std::sync::Arc;
use starchain::api::{run_api_server, Node};
use starchain::config::load_config;
use starchain::node::open_registry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = load_config()?;
    let registry = open_registry(&config)?;

    let addr: SocketAddr = format!("{}:{}", config.api.host, config.api.port).parse()?;
    tracing::info!(
        "Starting star registry (window = {}s, story limit = {} bytes)",
        config.registry.validation_window_secs,
        config.registry.max_story_bytes
    );

    run_api_server(Arc::new(Node::new(Arc::new(registry))), addr).await
}
