//! credential-realtime tail client.
//!
//! Connects to the gateway using environment configuration, subscribes to
//! one event type (or everything) and logs each event until Ctrl-C.

use tracing_subscriber::EnvFilter;

use credential_realtime::{ClientConfig, RealtimeClient, RealtimeEvent, WILDCARD};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config = ClientConfig::from_env()?;
    let event_type = std::env::args().nth(1).unwrap_or_else(|| WILDCARD.to_string());
    tracing::info!(
        endpoint = %config.endpoint_url(),
        %event_type,
        "starting credential-realtime tail"
    );

    let client = RealtimeClient::new(config)?;

    let _events = client.subscribe(&event_type, |event: &RealtimeEvent| {
        tracing::info!(
            event_id = event.id(),
            event_type = event.event_type(),
            priority = %event.priority(),
            timestamp = event.timestamp(),
            data = %event.data(),
            "event"
        );
    });
    let _connected = client.on_connect(|| tracing::info!("connected"));
    let _disconnected = client.on_disconnect(|| tracing::warn!("disconnected; reconnecting"));
    let _reconnected = client.on_reconnect(|| tracing::info!("reconnected"));
    let _errors = client.on_error(|error| tracing::debug!(%error, "transport error"));

    client.connect();
    tokio::signal::ctrl_c().await?;

    let stats = client.connection_stats();
    tracing::info!(
        received = stats.messages_received,
        sent = stats.messages_sent,
        latency_ms = ?stats.latency,
        exhausted = client.is_reconnect_exhausted(),
        "shutting down"
    );
    client.disconnect();

    Ok(())
}
