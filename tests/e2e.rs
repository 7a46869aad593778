//! End-to-end scenarios (spec.md §8, S1-S6) driven against a real loopback
//! `TcpListener` playing the server side: read the client's upgrade request,
//! reply with a literal handshake response, then push literal frame bytes
//! and observe the `Event` sequence the engine produces.

use base64::prelude::*;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Duration;

use ws_engine::{ClientConfig, Event, Session};

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Read the client's upgrade request off `stream`, returning the raw bytes
/// up to and including the terminating blank line.
async fn read_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    buf
}

fn extract_key(request: &[u8]) -> String {
    let text = String::from_utf8_lossy(request);
    for line in text.split("\r\n") {
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("sec-websocket-key") {
                return value.trim().to_string();
            }
        }
    }
    panic!("no Sec-WebSocket-Key header in request: {text}");
}

fn accept_value(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(GUID.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

/// Send a valid `101 Switching Protocols` response answering whatever key
/// the client sent.
async fn accept_handshake(stream: &mut TcpStream) {
    let request = read_request(stream).await;
    let key = extract_key(&request);
    let accept = accept_value(&key);
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\
         \r\n"
    );
    stream.write_all(response.as_bytes()).await.unwrap();
}

async fn bind_loopback() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, format!("ws://{addr}/"))
}

/// Read and unmask one client->server frame's header + payload, returning
/// (opcode, payload).
async fn read_client_frame(stream: &mut TcpStream) -> (u8, Vec<u8>) {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await.unwrap();
    let opcode = header[0] & 0x0F;
    let masked = header[1] & 0x80 != 0;
    let mut len = (header[1] & 0x7F) as u64;
    if len == 126 {
        let mut ext = [0u8; 2];
        stream.read_exact(&mut ext).await.unwrap();
        len = u16::from_be_bytes(ext) as u64;
    } else if len == 127 {
        let mut ext = [0u8; 8];
        stream.read_exact(&mut ext).await.unwrap();
        len = u64::from_be_bytes(ext);
    }
    let mut key = [0u8; 4];
    if masked {
        stream.read_exact(&mut key).await.unwrap();
    }
    let mut payload = vec![0u8; len as usize];
    if len > 0 {
        stream.read_exact(&mut payload).await.unwrap();
    }
    if masked {
        for (i, byte) in payload.iter_mut().enumerate() {
            *byte ^= key[i % 4];
        }
    }
    (opcode, payload)
}

fn fast_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.poll_interval = Duration::from_millis(50);
    config.ping_rate = None;
    config.ping_timeout = Duration::from_secs(5);
    config.close_timeout = Duration::from_millis(500);
    config
}

/// Pull events off `session`, skipping `Poll` ticks, which may interleave
/// anywhere depending on exact timing and aren't part of the scenarios below.
async fn next_non_poll(session: &mut Session) -> Option<Event> {
    loop {
        match session.next_event().await {
            Some(Event::Poll) => continue,
            other => return other,
        }
    }
}

async fn wait_for_ready(session: &mut Session) {
    match next_non_poll(session).await {
        Some(Event::Ready { .. }) => {}
        other => panic!("expected Ready, got {other:?}"),
    }
}

/// Await a spawned server task, surfacing any assertion panic inside it as
/// a test failure instead of letting it vanish silently.
async fn join_server(handle: tokio::task::JoinHandle<()>) {
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("server task did not finish in time")
        .expect("server task panicked");
}

#[tokio::test]
async fn s1_handshake_then_single_frame_text() {
    let (listener, url) = bind_loopback().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        accept_handshake(&mut stream).await;
        stream.write_all(&[0x81, 0x01, 0x41]).await.unwrap(); // fin|TEXT, len=1, "A"
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let mut session = ws_engine::connect_async(&url, fast_config()).await.unwrap();

    assert!(matches!(next_non_poll(&mut session).await, Some(Event::Connecting)));
    assert!(matches!(next_non_poll(&mut session).await, Some(Event::Connected)));
    assert!(matches!(
        next_non_poll(&mut session).await,
        Some(Event::Ready { .. })
    ));
    match next_non_poll(&mut session).await {
        Some(Event::Text(text)) => assert_eq!(text, "A"),
        other => panic!("expected Text(\"A\"), got {other:?}"),
    }
}

#[tokio::test]
async fn s2_fragmented_text_hello() {
    let (listener, url) = bind_loopback().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        accept_handshake(&mut stream).await;
        stream.write_all(&[0x01, 0x03, b'H', b'e', b'l']).await.unwrap();
        stream.write_all(&[0x80, 0x02, b'l', b'o']).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let mut session = ws_engine::connect_async(&url, fast_config()).await.unwrap();
    wait_for_ready(&mut session).await;
    match next_non_poll(&mut session).await {
        Some(Event::Text(text)) => assert_eq!(text, "Hello"),
        other => panic!("expected Text(\"Hello\"), got {other:?}"),
    }
}

#[tokio::test]
async fn s3_invalid_utf8_disconnects_ungracefully_without_close_frame() {
    let (listener, url) = bind_loopback().await;
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        accept_handshake(&mut stream).await;
        stream.write_all(&[0x81, 0x02, 0xc3, 0x28]).await.unwrap();

        // No CLOSE frame should arrive: the socket should instead observe EOF.
        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
            .await
            .expect("client should shut down promptly")
            .unwrap();
        assert_eq!(n, 0, "client must not send a CLOSE frame on critical UTF-8 error");
    });

    let mut session = ws_engine::connect_async(&url, fast_config()).await.unwrap();
    wait_for_ready(&mut session).await;
    match next_non_poll(&mut session).await {
        Some(Event::Disconnected { graceful, .. }) => assert!(!graceful),
        other => panic!("expected Disconnected(graceful=false), got {other:?}"),
    }
    join_server(server).await;
}

#[tokio::test]
async fn s4_peer_initiated_close_echoes_and_completes_gracefully() {
    let (listener, url) = bind_loopback().await;
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        accept_handshake(&mut stream).await;
        // CLOSE, code=1000, reason="bye"
        stream
            .write_all(&[0x88, 0x05, 0x03, 0xe8, b'b', b'y', b'e'])
            .await
            .unwrap();

        let (opcode, payload) = read_client_frame(&mut stream).await;
        assert_eq!(opcode, 0x8, "client must echo a CLOSE frame");
        assert_eq!(u16::from_be_bytes([payload[0], payload[1]]), 1000);
        assert_eq!(&payload[2..], b"bye");
    });

    let mut session = ws_engine::connect_async(&url, fast_config()).await.unwrap();
    wait_for_ready(&mut session).await;

    match next_non_poll(&mut session).await {
        Some(Event::Closing { code, reason }) => {
            assert_eq!(code, Some(1000));
            assert_eq!(reason, "bye");
        }
        other => panic!("expected Closing(1000, \"bye\"), got {other:?}"),
    }
    assert!(matches!(next_non_poll(&mut session).await, Some(Event::Closed)));
    match next_non_poll(&mut session).await {
        Some(Event::Disconnected { graceful, .. }) => assert!(graceful),
        other => panic!("expected Disconnected(graceful=true), got {other:?}"),
    }
    join_server(server).await;
}

#[tokio::test]
async fn s5_reserved_opcode_triggers_close_1002() {
    let (listener, url) = bind_loopback().await;
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        accept_handshake(&mut stream).await;
        stream.write_all(&[0x83, 0x00]).await.unwrap(); // fin, reserved opcode 3

        let (opcode, payload) = read_client_frame(&mut stream).await;
        assert_eq!(opcode, 0x8);
        assert_eq!(u16::from_be_bytes([payload[0], payload[1]]), 1002);
    });

    let mut session = ws_engine::connect_async(&url, fast_config()).await.unwrap();
    wait_for_ready(&mut session).await;
    assert!(matches!(
        next_non_poll(&mut session).await,
        Some(Event::Closing { code: Some(1002), .. })
    ));
    join_server(server).await;
}

#[tokio::test]
async fn s6_oversized_control_frame_triggers_close_1002() {
    let (listener, url) = bind_loopback().await;
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        accept_handshake(&mut stream).await;
        let mut frame = vec![0x89, 0x7E, 0x00, 0x7E]; // fin|PING, extended-16 len=126
        frame.extend(std::iter::repeat(b'x').take(126));
        stream.write_all(&frame).await.unwrap();

        let (opcode, payload) = read_client_frame(&mut stream).await;
        assert_eq!(opcode, 0x8);
        assert_eq!(u16::from_be_bytes([payload[0], payload[1]]), 1002);
    });

    let mut session = ws_engine::connect_async(&url, fast_config()).await.unwrap();
    wait_for_ready(&mut session).await;
    assert!(matches!(
        next_non_poll(&mut session).await,
        Some(Event::Closing { code: Some(1002), .. })
    ));
    join_server(server).await;
}

#[tokio::test]
async fn handshake_rejected_on_non_101_status() {
    let (listener, url) = bind_loopback().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_request(&mut stream).await;
        stream
            .write_all(b"HTTP/1.1 404 Not Found\r\n\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let mut session = ws_engine::connect_async(&url, fast_config()).await.unwrap();
    assert!(matches!(next_non_poll(&mut session).await, Some(Event::Connecting)));
    assert!(matches!(next_non_poll(&mut session).await, Some(Event::Connected)));
    match next_non_poll(&mut session).await {
        Some(Event::Rejected(_)) => {}
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn auto_pong_replies_with_same_payload() {
    let (listener, url) = bind_loopback().await;
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        accept_handshake(&mut stream).await;
        stream.write_all(&[0x89, 0x04, 1, 2, 3, 4]).await.unwrap(); // fin|PING

        let (opcode, payload) = read_client_frame(&mut stream).await;
        assert_eq!(opcode, 0xA, "auto_pong must reply with PONG");
        assert_eq!(payload, vec![1, 2, 3, 4]);
    });

    let mut session = ws_engine::connect_async(&url, fast_config()).await.unwrap();
    wait_for_ready(&mut session).await;
    match next_non_poll(&mut session).await {
        Some(Event::Ping(payload)) => assert_eq!(payload, vec![1, 2, 3, 4]),
        other => panic!("expected Ping event, got {other:?}"),
    }
    join_server(server).await;
}

#[tokio::test]
async fn ping_timeout_emits_unresponsive_when_peer_stays_silent() {
    let (listener, url) = bind_loopback().await;
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        accept_handshake(&mut stream).await;
        // Hold the socket open without ever answering the client's pings.
        tokio::time::sleep(Duration::from_secs(2)).await;
    });

    let mut config = fast_config();
    config.ping_rate = Some(Duration::from_millis(100));
    config.ping_timeout = Duration::from_millis(300);
    let mut session = ws_engine::connect_async(&url, config).await.unwrap();
    wait_for_ready(&mut session).await;

    assert!(matches!(
        next_non_poll(&mut session).await,
        Some(Event::Unresponsive)
    ));
    join_server(server).await;
}

#[tokio::test]
async fn close_timeout_disconnects_ungracefully_when_peer_never_echoes() {
    let (listener, url) = bind_loopback().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        accept_handshake(&mut stream).await;
        // Never answer the client's CLOSE; just hold the socket open.
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let mut config = fast_config();
    config.close_timeout = Duration::from_millis(200);
    let mut session = ws_engine::connect_async(&url, config).await.unwrap();
    wait_for_ready(&mut session).await;

    session.close(1000, "bye".to_string()).await.unwrap();
    assert!(matches!(
        next_non_poll(&mut session).await,
        Some(Event::Closing { code: Some(1000), .. })
    ));
    match next_non_poll(&mut session).await {
        Some(Event::Disconnected { graceful, .. }) => assert!(!graceful),
        other => panic!("expected Disconnected(graceful=false) after close_timeout, got {other:?}"),
    }
}
