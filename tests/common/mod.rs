//! Shared utilities for integration testing: an in-process server on an
//! ephemeral port and a raw HTTP/1.1 client over plain TCP or TLS.

use std::net::SocketAddr;
use std::sync::Arc;

use routify::{Router, Server, ServerOptions};
use rustls::pki_types::ServerName;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;

pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), routify::Error>>,
}

impl TestServer {
    /// Starts `router` on `127.0.0.1:0` with the given options.
    pub async fn start(router: Router, options: ServerOptions) -> Self {
        Self::with_server(Server::new(options).unwrap(), router).await
    }

    /// Runs an already built `server` on `127.0.0.1:0` instead of its
    /// configured address.
    pub async fn with_server(server: Server, router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_on(listener, router, async move {
            let _ = rx.await;
        }));

        Self { addr, shutdown: Some(tx), handle }
    }

    /// Signals shutdown and waits for the server to drain.
    pub async fn stop(mut self) -> Result<(), routify::Error> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap()
    }

    pub async fn send(&self, method: &str, target: &str, body: Option<&str>) -> RawResponse {
        send(self.addr, method, target, &[], body).await
    }
}

#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends one request on a fresh connection and reads until the server closes it.
pub async fn send(
    addr: SocketAddr,
    method: &str,
    target: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> RawResponse {
    let stream = TcpStream::connect(addr).await.unwrap();
    exchange(stream, &request(addr, method, target, headers, body)).await
}

/// Like [`send`], over TLS to a server presenting `cert` for `localhost`.
#[allow(dead_code)]
pub async fn send_tls(
    addr: SocketAddr,
    cert: &rcgen::Certificate,
    method: &str,
    target: &str,
) -> (RawResponse, Option<Vec<u8>>) {
    let mut roots = rustls::RootCertStore::empty();
    roots.add(cert.der().clone()).unwrap();
    let mut config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    let tcp = TcpStream::connect(addr).await.unwrap();
    let server_name = ServerName::try_from("localhost").unwrap();
    let stream = TlsConnector::from(Arc::new(config)).connect(server_name, tcp).await.unwrap();
    let alpn = stream.get_ref().1.alpn_protocol().map(<[u8]>::to_vec);

    (exchange(stream, &request(addr, method, target, &[], None)).await, alpn)
}

fn request(addr: SocketAddr, method: &str, target: &str, headers: &[(&str, &str)], body: Option<&str>) -> String {
    let mut request = format!("{method} {target} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n");
    for (name, value) in headers {
        request.push_str(&format!("{name}: {value}\r\n"));
    }
    if let Some(body) = body {
        request.push_str("Content-Type: application/json\r\n");
        request.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    request.push_str("\r\n");
    if let Some(body) = body {
        request.push_str(body);
    }
    request
}

async fn exchange<S>(mut stream: S, request: &str) -> RawResponse
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    if let Err(e) = stream.read_to_end(&mut raw).await {
        // A TLS peer may close without close_notify once the response is out.
        assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof, "read failed: {e}");
    }
    parse(&raw)
}

fn parse(raw: &[u8]) -> RawResponse {
    let split = raw.windows(4).position(|w| w == b"\r\n\r\n").expect("incomplete response head");
    let head = std::str::from_utf8(&raw[..split]).unwrap();
    let mut lines = head.split("\r\n");

    let status_line = lines.next().unwrap();
    let status = status_line.split_whitespace().nth(1).unwrap().parse().unwrap();
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_owned(), v.trim().to_owned()))
        .collect();

    RawResponse { status, headers, body: raw[split + 4..].to_vec() }
}
