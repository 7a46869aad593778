//! Same as `client.rs` but over `wss://`, with an extra trusted CA file.

use ws_engine::{connect_async, ClientConfig, Event};

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut config = ClientConfig::default();
    config.ca_file = Some("ca.crt".to_string());

    let mut session = match connect_async("wss://127.0.0.1:9003", config).await {
        Ok(session) => session,
        Err(err) => {
            eprintln!("connect failed: {err}");
            return;
        }
    };

    while let Some(event) = session.next_event().await {
        match event {
            Event::Ready { .. } => println!("tls handshake accepted"),
            Event::Text(text) => println!("text: {text}"),
            Event::Disconnected { reason, graceful } => {
                println!("disconnected (graceful={graceful}): {reason}");
                break;
            }
            _ => {}
        }
    }
}
