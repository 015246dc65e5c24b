//! Diagnostic probe for the RoadCall realtime layer.
//!
//! Seeds the credential store from CLI arguments, connects with the chosen
//! role, logs every inbound event and connectivity transition, and tears
//! down on Ctrl+C.
//!
//! Run with:
//! ```not_rust
//! cargo run -- --role customer --user-id fb-123 --token dev-token
//! cargo run -- --role provider --user-id p-7 --token dev-token --subscribe job-offers
//! ```

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use roadcall_realtime::config::Settings;
use roadcall_realtime::credentials::{MemoryCredentialStore, USER_DATA_KEY, USER_TOKEN_KEY};
use roadcall_realtime::protocol::events;
use roadcall_realtime::{RealtimeClient, Role};

#[derive(Parser, Debug)]
#[command(name = "roadcall-realtime")]
#[command(about = "Probe client for the RoadCall realtime channel", long_about = None)]
struct Args {
    /// Role to connect as (customer or provider)
    #[arg(short, long, value_parser = parse_role)]
    role: Role,

    /// External user identity
    #[arg(short, long)]
    user_id: String,

    /// Session token
    #[arg(short, long)]
    token: String,

    /// Override the configured endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Channel to subscribe to after connecting
    #[arg(long)]
    subscribe: Option<String>,
}

fn parse_role(s: &str) -> Result<Role, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();

    let mut settings = Settings::new()?;
    if let Some(endpoint) = args.endpoint {
        settings.endpoint.url = endpoint;
    }
    tracing::info!(endpoint = %settings.endpoint.url, "Configuration loaded");

    let store = MemoryCredentialStore::new();
    store.set_item(USER_TOKEN_KEY, args.token);
    store.set_item(
        USER_DATA_KEY,
        serde_json::json!({ "firebaseUserId": args.user_id }).to_string(),
    );

    let client = RealtimeClient::new(&settings, Arc::new(store));

    let _events = client.on(events::WILDCARD, |envelope| {
        tracing::info!(event = %envelope["type"], data = %envelope["data"], "Event");
    });
    let _connectivity = client.on_connection_change(|connected| {
        if connected {
            tracing::info!("Connection established");
        } else {
            tracing::warn!("Connection lost; reconnecting");
        }
    });

    if !client.connect(args.role).await {
        anyhow::bail!("connect refused: credentials missing or endpoint invalid");
    }

    if let Some(channel) = args.subscribe {
        client.send(
            events::SUBSCRIBE,
            serde_json::json!({ "channel": channel }),
        );
    }

    tracing::info!("Probe running; press Ctrl+C to exit");
    signal::ctrl_c().await?;

    client.disconnect();
    tracing::info!(stats = ?client.stats(), "Probe shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
