//! Runnable chat relay
//!
//! Run with: cargo run --example relay_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example relay_server                  # binds to 127.0.0.1:1234
//!   cargo run --example relay_server 0.0.0.0:4000     # binds to 0.0.0.0:4000
//!
//! Logging is controlled with RUST_LOG, e.g. `RUST_LOG=chat_relay=debug`.

use std::net::SocketAddr;
use std::time::Duration;

use chat_relay::{BroadcastConfig, RelayServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = ServerConfig::default()
        .max_connections(1000)
        .connect_timeout(Duration::from_secs(5))
        .broadcast(BroadcastConfig::default().delivery_timeout(Duration::from_secs(30)));

    if let Some(arg) = std::env::args().nth(1) {
        let addr: SocketAddr = arg.parse()?;
        config = config.bind(addr);
    }

    let server = RelayServer::new(config);

    let stats_relay = std::sync::Arc::clone(server.relay());
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            ticker.tick().await;
            let stats = stats_relay.stats();
            let clients = stats_relay.client_count().await;
            tracing::info!(
                clients = clients,
                enqueued = stats.messages_enqueued,
                delivered = stats.deliveries_succeeded,
                failed = stats.deliveries_failed,
                evicted = stats.clients_evicted,
                "Relay stats"
            );
        }
    });

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
