//! Wraps `reconnect::run` around a flaky server, logging `BackOff` events
//! between attempts instead of giving up after the first `Disconnected`.

use url::Url;
use ws_engine::config::ClientConfig;
use ws_engine::event::Event;
use ws_engine::reconnect::{self, BackoffConfig};

#[tokio::main]
async fn main() {
    env_logger::init();

    let url = Url::parse("ws://127.0.0.1:9002").unwrap();
    let mut events = reconnect::run(url, ClientConfig::default(), BackoffConfig::default()).await;

    use futures::StreamExt;
    while let Some(event) = events.next().await {
        match event {
            Event::Ready { .. } => println!("connected"),
            Event::Text(text) => println!("text: {text}"),
            Event::BackOff { attempt, delay_ms } => {
                println!("reconnecting, attempt {attempt} in {delay_ms}ms");
            }
            Event::Disconnected { reason, .. } => println!("disconnected: {reason}"),
            _ => {}
        }
    }
}
