//! A minimal plain-`ws://` client: connect, print every event, send a ping
//! every few seconds, and close after the peer has said three things.

use ws_engine::{connect_async, ClientConfig, Event};

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut session = match connect_async("ws://127.0.0.1:9002", ClientConfig::default()).await {
        Ok(session) => session,
        Err(err) => {
            eprintln!("connect failed: {err}");
            return;
        }
    };

    let mut texts_seen = 0;
    while let Some(event) = session.next_event().await {
        match event {
            Event::Connecting => println!("connecting..."),
            Event::Connected => println!("tcp connected, awaiting handshake"),
            Event::Ready { protocol, extensions } => {
                println!("handshake accepted (protocol={protocol:?}, extensions={extensions:?})");
            }
            Event::Rejected(reason) => {
                eprintln!("handshake rejected: {reason}");
                break;
            }
            Event::Text(text) => {
                println!("text: {text}");
                texts_seen += 1;
                if texts_seen >= 3 {
                    session.close(1000, "done".to_string()).await.ok();
                }
            }
            Event::Binary(data) => println!("binary: {} bytes", data.len()),
            Event::Ping(payload) => println!("ping: {} bytes", payload.len()),
            Event::Pong(payload) => println!("pong: {} bytes", payload.len()),
            Event::Closing { code, reason } => println!("closing: {code:?} {reason}"),
            Event::Closed => println!("closed"),
            Event::Disconnected { reason, graceful } => {
                println!("disconnected (graceful={graceful}): {reason}");
                break;
            }
            Event::Poll => {}
            Event::BackOff { .. } | Event::Unresponsive => {}
        }
    }
}
