//! Minimal console client: connects to a room server, authenticates,
//! and turns stdin lines into chat messages.
//!
//! ```text
//! console-client <ws-url> [secret]
//! ```
//!
//! Pull the network cable while it runs to watch the reconnect and
//! silent re-authentication cycle in the logs (`RUST_LOG=debug`).

use roomlink::prelude::*;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), RoomlinkError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| "ws://127.0.0.1:8080/room".to_string());
    let secret = args.next();

    let handle = RoomClientBuilder::new(&url).spawn();

    handle.on_state(|state| info!("link: {state}"))?;
    handle.on_auth(|event| match event {
        AuthEvent::Granted => info!("joined the room"),
        AuthEvent::Denied { reason } => info!("rejected: {reason}"),
        AuthEvent::Pending => info!("signing in"),
        AuthEvent::Reset => info!("session reset"),
    })?;
    handle.on_snapshot(|snapshot| println!("<< snapshot {snapshot}"))?;
    handle.on_control(|event| println!("<< event {event}"))?;
    handle.on_signal(|signal| println!("<< signal {signal}"))?;

    if let Some(secret) = secret {
        handle.authenticate(Credential::new(secret))?;
    }
    handle.connect()?;

    // Stdin lines become chat messages; `/quit` exits.
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        match line {
            "" => {}
            "/quit" => break,
            text => handle.send(json!({ "t": "chat", "text": text }))?,
        }
    }

    handle.shutdown();
    Ok(())
}
