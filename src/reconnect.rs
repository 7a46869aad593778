//! Reconnect-with-backoff wrapper around a `Session`, re-establishing the
//! connection after every `Disconnected` event with exponential backoff and
//! jitter, surfacing `Event::BackOff` before each retry sleep.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

use crate::config::ClientConfig;
use crate::event::{Event, EventStream};
use crate::session::Session;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Random jitter fraction (0.0-1.0) applied to each computed delay.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

fn next_delay(attempt: u32, backoff: &BackoffConfig) -> Duration {
    let base = backoff.initial_delay.as_millis() as f64 * backoff.multiplier.powi(attempt as i32);
    let capped = base.min(backoff.max_delay.as_millis() as f64);
    let mut rng = StdRng::from_rng(rand::thread_rng()).expect("thread_rng must be seedable");
    let jitter_factor = 1.0 + rng.random_range(-backoff.jitter..=backoff.jitter);
    Duration::from_millis((capped * jitter_factor).max(0.0) as u64)
}

/// Drives `url` through repeated `Session::connect` attempts, forwarding
/// every event from each underlying session onto `out`, plus a `BackOff`
/// event before each retry sleep. Runs until the channel's receiver is
/// dropped.
pub async fn run(url: Url, config: ClientConfig, backoff: BackoffConfig) -> EventStream {
    let (tx, rx) = mpsc::channel(256);
    tokio::spawn(async move {
        let mut attempt = 0u32;
        loop {
            let mut session = match Session::connect(url.clone(), config.clone()).await {
                Ok(session) => session,
                Err(_) => {
                    let delay = next_delay(attempt, &backoff);
                    if tx
                        .send(Event::BackOff {
                            attempt,
                            delay_ms: delay.as_millis() as u64,
                        })
                        .await
                        .is_err()
                    {
                        return;
                    }
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
            };

            attempt = 0;
            loop {
                match session.next_event().await {
                    Some(event) => {
                        let is_disconnect = matches!(event, Event::Disconnected { .. });
                        if tx.send(event).await.is_err() {
                            return;
                        }
                        if is_disconnect {
                            break;
                        }
                    }
                    None => break,
                }
            }

            let delay = next_delay(attempt, &backoff);
            if tx
                .send(Event::BackOff {
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                })
                .await
                .is_err()
            {
                return;
            }
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    });
    EventStream::new(rx)
}
