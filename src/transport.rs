//! Byte-oriented transports the `Session` drives: plain TCP or TLS, selected
//! by URL scheme. Grounded on the teacher's `SocketFlowStream` enum (an
//! enum over `TcpStream`/`TlsStream` referenced from `read.rs`/`write.rs`/
//! `server.rs`, built here for the client side instead of the server side).

use std::net::ToSocketAddrs;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use log::debug;
use tokio::io::{self, AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use url::Url;

use crate::error::Error;
use crate::proxy;

/// A connected byte stream, plain or TLS. `Session` only ever talks to this
/// through `AsyncRead`/`AsyncWrite` plus the handful of lifecycle methods
/// below (`wait_readable`, `pending`, `shutdown`) that mirror the core's
/// Transport collaborator interface.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
    #[cfg(feature = "feature-native-tls")]
    NativeTls(Box<tokio_native_tls::TlsStream<TcpStream>>),
}

impl Transport {
    /// Block until the underlying socket is readable, or `timeout` elapses.
    pub async fn wait_readable(&self, timeout: std::time::Duration) -> Result<bool, Error> {
        let socket = self.tcp_stream();
        match tokio::time::timeout(timeout, socket.readable()).await {
            Ok(Ok(())) => Ok(true),
            Ok(Err(e)) => Err(Error::IOError { source: e }),
            Err(_) => Ok(false),
        }
    }

    /// TLS record buffering beyond what one `read()` call returns. With
    /// `tokio-rustls`, `AsyncRead::poll_read` already surfaces any
    /// internally-buffered plaintext without needing the socket itself to
    /// be readable again, so there is nothing left over for a caller to
    /// separately drain; this always reports zero.
    pub fn pending(&self) -> usize {
        0
    }

    pub async fn shutdown(&mut self) -> Result<(), Error> {
        match self {
            Transport::Plain(stream) => stream.shutdown().await?,
            Transport::Tls(stream) => stream.shutdown().await?,
            #[cfg(feature = "feature-native-tls")]
            Transport::NativeTls(stream) => stream.shutdown().await?,
        }
        Ok(())
    }

    fn tcp_stream(&self) -> &TcpStream {
        match self {
            Transport::Plain(stream) => stream,
            Transport::Tls(stream) => stream.get_ref().0,
            #[cfg(feature = "feature-native-tls")]
            Transport::NativeTls(stream) => stream.get_ref().get_ref().get_ref(),
        }
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
            #[cfg(feature = "feature-native-tls")]
            Transport::NativeTls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
            #[cfg(feature = "feature-native-tls")]
            Transport::NativeTls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
            #[cfg(feature = "feature-native-tls")]
            Transport::NativeTls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
            #[cfg(feature = "feature-native-tls")]
            Transport::NativeTls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

/// A parsed `ws://`/`wss://` target.
pub struct WsUrl {
    pub secure: bool,
    pub host: String,
    pub port: u16,
    pub path: String,
}

pub fn parse_ws_url(url: &Url) -> Result<WsUrl, Error> {
    let secure = match url.scheme() {
        "ws" => false,
        "wss" => true,
        _ => return Err(Error::InvalidSchemeUrl),
    };
    let host = url.host_str().ok_or(Error::UrlNoHost)?.to_string();
    let port = url.port().unwrap_or(if secure { 443 } else { 80 });
    let mut path = url.path().to_string();
    if path.is_empty() {
        path = "/".to_string();
    }
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }
    Ok(WsUrl {
        secure,
        host,
        port,
        path,
    })
}

/// Establish the transport for `url`, resolving an HTTP CONNECT proxy first
/// when one is configured or discoverable (see `proxy.rs`).
pub async fn connect(
    ws_url: &WsUrl,
    ca_file: Option<&str>,
    proxy_override: Option<&str>,
) -> Result<Transport, Error> {
    let target = format!("{}:{}", ws_url.host, ws_url.port);

    let tcp = match proxy::resolve_proxy(ws_url.secure, proxy_override) {
        Some(proxy_addr) => {
            debug!("connecting to {} via proxy {}", target, proxy_addr);
            proxy::connect_via_proxy(&proxy_addr, &target).await?
        }
        None => {
            debug!("connecting to {} directly", target);
            let addr = target
                .to_socket_addrs()
                .map_err(|e| Error::IOError { source: e })?
                .next()
                .ok_or(Error::UrlNoHost)?;
            TcpStream::connect(addr)
                .await
                .map_err(|e| Error::IOError { source: e })?
        }
    };
    tcp.set_nodelay(true).ok();

    if !ws_url.secure {
        return Ok(Transport::Plain(tcp));
    }

    debug!("starting TLS handshake with {}", ws_url.host);
    let connector = build_tls_connector(ca_file)?;
    let server_name: pki_types::ServerName<'static> =
        pki_types::ServerName::try_from(ws_url.host.clone())?;
    let tls_stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| Error::IOError { source: e })?;
    Ok(Transport::Tls(Box::new(tls_stream)))
}

fn build_tls_connector(ca_file: Option<&str>) -> Result<TlsConnector, Error> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    if let Some(path) = ca_file {
        let mut reader = std::io::BufReader::new(
            std::fs::File::open(path).map_err(|e| Error::IOError { source: e })?,
        );
        for cert in rustls_pemfile::certs(&mut reader) {
            let cert = cert.map_err(|e| Error::IOError { source: e })?;
            roots.add(cert).map_err(|e| {
                Error::IOError {
                    source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                }
            })?;
        }
    }

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}
