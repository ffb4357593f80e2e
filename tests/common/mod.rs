//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Response as HandshakeResponse;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use socket_proxy::config::ProxyConfig;
use socket_proxy::http::HttpServer;
use socket_proxy::lifecycle::Shutdown;

pub type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default config pointed at `endpoint`.
pub fn proxy_config(endpoint: impl Into<String>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.backend.endpoint = endpoint.into();
    config
}

/// Start the proxy on an ephemeral port. Dropping the returned `Shutdown` leaves it running;
/// call `trigger` to stop it.
pub async fn start_proxy(config: ProxyConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).expect("proxy config is usable");
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    (addr, shutdown)
}

/// An address with nothing listening on it.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Start a raw TCP backend that records each request head and answers with `response`.
pub async fn start_mock_backend(response: &'static str) -> (SocketAddr, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let captured = requests.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let captured = captured.clone();
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        captured.lock().unwrap().push(head);
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, requests)
}

async fn read_head(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// URI and headers of every upgrade request a WebSocket backend saw.
#[derive(Clone, Default)]
pub struct Recorded(Arc<Mutex<Vec<(Uri, HeaderMap)>>>);

impl Recorded {
    pub fn last(&self) -> (Uri, HeaderMap) {
        self.0.lock().unwrap().last().cloned().expect("backend saw a request")
    }

    pub fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}

/// Start an axum WebSocket echo backend.
///
/// Supports subprotocols `b` and `v4.channel.k8s.io`. Requests whose path ends in
/// `/hangup` get a close frame right after the upgrade; paths ending in `/plain` are
/// accepted without choosing any subprotocol.
pub async fn start_ws_backend() -> (SocketAddr, Recorded) {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/", any(ws_echo))
        .route("/{*path}", any(ws_echo))
        .with_state(recorded.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (addr, recorded)
}

async fn ws_echo(
    State(recorded): State<Recorded>,
    uri: Uri,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let hang_up = uri.path().ends_with("/hangup");
    let plain = uri.path().ends_with("/plain");
    recorded.0.lock().unwrap().push((uri, headers));

    let ws = if plain { ws } else { ws.protocols(["b", "v4.channel.k8s.io"]) };
    ws.on_upgrade(move |socket| echo(socket, hang_up))
}

async fn echo(mut socket: WebSocket, hang_up: bool) {
    if hang_up {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(_) | Message::Binary(_) => {
                if socket.send(msg).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

/// Open a client WebSocket through the proxy with extra handshake headers.
pub async fn connect(
    url: &str,
    headers: &[(&str, &str)],
) -> Result<(ClientSocket, HandshakeResponse), tokio_tungstenite::tungstenite::Error> {
    let mut request = url.into_client_request()?;
    for (name, value) in headers {
        request.headers_mut().append(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    tokio_tungstenite::connect_async(request).await
}

/// Status of a failed client handshake.
pub fn rejected_status(err: &tokio_tungstenite::tungstenite::Error) -> u16 {
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => response.status().as_u16(),
        other => panic!("expected an HTTP rejection, got {:?}", other),
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
