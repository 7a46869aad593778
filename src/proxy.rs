//! HTTP CONNECT proxy tunneling and environment-variable proxy discovery,
//! grounded on `original_source/lomond/proxy.py`'s env-var handling,
//! translated to Rust and adapted to tokio's `TcpStream`.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::Error;

/// Resolve which proxy address (if any) to use for this connection, per the
/// precedence rule: an explicit override wins; otherwise the scheme-matched
/// environment variable (`HTTPS_PROXY` for `wss`, `HTTP_PROXY` for `ws`) is
/// used if set and non-empty; otherwise no proxy.
pub fn resolve_proxy(secure: bool, explicit: Option<&str>) -> Option<String> {
    if let Some(p) = explicit {
        return Some(normalize_proxy_addr(p));
    }
    let var = if secure { "HTTPS_PROXY" } else { "HTTP_PROXY" };
    std::env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .map(|v| normalize_proxy_addr(&v))
}

/// Accept both `scheme://host:port` and bare `host:port` forms.
fn normalize_proxy_addr(raw: &str) -> String {
    match raw.split_once("://") {
        Some((_scheme, rest)) => rest.trim_end_matches('/').to_string(),
        None => raw.to_string(),
    }
}

/// Establish a `TcpStream` to `proxy_addr` and issue an HTTP CONNECT for
/// `target`, returning the stream ready for the TLS handshake or plaintext
/// traffic to begin once the proxy confirms the tunnel.
pub async fn connect_via_proxy(proxy_addr: &str, target: &str) -> Result<TcpStream, Error> {
    let mut stream = TcpStream::connect(proxy_addr)
        .await
        .map_err(|e| Error::IOError { source: e })?;

    let request = format!(
        "CONNECT {target} HTTP/1.1\r\nHost: {target}\r\nProxy-Connection: Keep-Alive\r\n\r\n"
    );
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| Error::IOError { source: e })?;

    let mut reader = BufReader::new(&mut stream);
    let mut status_line = String::new();
    reader
        .read_line(&mut status_line)
        .await
        .map_err(|e| Error::IOError { source: e })?;

    if !status_line.contains(" 200") {
        return Err(Error::ProxyConnectFailed(status_line.trim().to_string()));
    }

    // Drain the rest of the header block before handing the stream back.
    loop {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(|e| Error::IOError { source: e })?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    Ok(stream)
}
