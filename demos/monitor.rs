//! Connect to an Altitude, print its state and follow changes.
//!
//! Usage: `cargo run --example monitor -- <host> [command...]`
//!
//! Any extra arguments are sent once synced, e.g. `mute_toggle` or `volume_set -35`.

use std::time::Duration;
use trinnov_altitude::{AltitudeClient, BridgeCommand, ClientConfig, StateAdapter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trinnov_altitude=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let Some(host) = args.next().or_else(|| std::env::var("ALTITUDE_HOST").ok()) else {
        eprintln!("usage: monitor <host> [command...]");
        std::process::exit(2);
    };
    let command: Vec<String> = args.collect();

    let client = AltitudeClient::new(ClientConfig::new(host))?;
    client.register_adapter_callback(StateAdapter::new(), |snapshot, deltas, events| {
        for delta in deltas {
            println!("{}: {} -> {}", delta.field, delta.old, delta.new);
        }
        for event in events {
            println!("event {} {}", event.kind(), serde_json::Value::Object(event.payload()));
        }
        if deltas.is_empty() && events.is_empty() {
            println!("synced={}", snapshot.synced);
        }
    });

    client.start().await?;
    client.wait_synced(Some(Duration::from_secs(10))).await?;

    let state = client.state();
    println!(
        "Altitude {} (id {})",
        state.version.as_deref().unwrap_or("?"),
        state.id.as_deref().unwrap_or("?")
    );
    for (index, name) in state.preset_list() {
        println!("  preset {}: {}", index, name);
    }
    for (index, name) in state.source_list() {
        println!("  source {}: {}", index, name);
    }

    if !command.is_empty() {
        let command = BridgeCommand::parse(&command.join(" "))?;
        client.execute(&command).await?;
        println!("sent {:?}", command);
    }

    tokio::signal::ctrl_c().await?;
    client.stop().await;
    Ok(())
}
