//! End-to-end WebSocket proxying through a real listener and backend.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

mod common;

#[tokio::test]
async fn test_frames_are_relayed_both_ways() {
    let (backend, recorded) = common::start_ws_backend().await;
    let (proxy, shutdown) = common::start_proxy(common::proxy_config(format!("http://{}/base", backend))).await;

    let (mut socket, response) = common::connect(&format!("ws://{}/api/v1/exec?command=sh", proxy), &[])
        .await
        .expect("upgrade succeeds");
    assert_eq!(response.status(), 101);

    socket.send(Message::Text("hello".into())).await.unwrap();
    let reply = timeout(Duration::from_secs(5), socket.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(reply, Message::Text("hello".into()));

    socket.send(Message::Binary(vec![0u8, 1, 2, 255].into())).await.unwrap();
    let reply = timeout(Duration::from_secs(5), socket.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(reply, Message::Binary(vec![0u8, 1, 2, 255].into()));

    // Backend saw the joined path with the query intact.
    let (uri, _) = recorded.last();
    assert_eq!(uri.path(), "/base/api/v1/exec");
    assert_eq!(uri.query(), Some("command=sh"));

    socket.close(None).await.unwrap();
    shutdown.trigger();
}

#[tokio::test]
async fn test_dial_headers_are_transformed() {
    let (backend, recorded) = common::start_ws_backend().await;
    let (proxy, shutdown) = common::start_proxy(common::proxy_config(format!("http://{}", backend))).await;

    let (_socket, _) = common::connect(
        &format!("ws://{}/stream?token=abc123", proxy),
        &[
            ("X-CSRFToken", "secret"),
            ("Authorization", "Basic dXNlcjpwYXNz"),
            ("Origin", "https://console.example.com"),
            ("X-Trace", "t-1"),
        ],
    )
    .await
    .expect("upgrade succeeds");

    let (_, headers) = recorded.last();
    assert!(headers.get("x-csrftoken").is_none(), "blacklisted header reached the backend");
    assert_eq!(headers["authorization"], "Bearer abc123");
    assert_eq!(headers["origin"], "http://localhost");
    assert_eq!(headers["x-trace"], "t-1");

    shutdown.trigger();
}

#[tokio::test]
async fn test_no_token_means_no_authorization() {
    let (backend, recorded) = common::start_ws_backend().await;
    let (proxy, shutdown) = common::start_proxy(common::proxy_config(format!("http://{}", backend))).await;

    let (_socket, _) = common::connect(&format!("ws://{}/stream", proxy), &[]).await.unwrap();

    let (_, headers) = recorded.last();
    assert!(headers.get("authorization").is_none());

    shutdown.trigger();
}

#[tokio::test]
async fn test_single_subprotocol_is_negotiated() {
    let (backend, recorded) = common::start_ws_backend().await;
    let (proxy, shutdown) = common::start_proxy(common::proxy_config(format!("http://{}", backend))).await;

    let (_socket, response) = common::connect(&format!("ws://{}/", proxy), &[("Sec-WebSocket-Protocol", "a, b")])
        .await
        .expect("upgrade succeeds");

    assert_eq!(response.headers()["sec-websocket-protocol"], "b");

    let (_, headers) = recorded.last();
    let offered: Vec<_> = headers.get_all("sec-websocket-protocol").iter().collect();
    assert_eq!(offered, vec!["b"]);

    shutdown.trigger();
}

#[tokio::test]
async fn test_backend_without_subprotocol_still_relays() {
    let (backend, recorded) = common::start_ws_backend().await;
    let (proxy, shutdown) = common::start_proxy(common::proxy_config(format!("http://{}", backend))).await;

    let (mut socket, response) = common::connect(
        &format!("ws://{}/plain", proxy),
        &[("Sec-WebSocket-Protocol", "a, b")],
    )
    .await
    .expect("upgrade succeeds although the backend picked no subprotocol");
    assert_eq!(response.status(), 101);

    let (_, headers) = recorded.last();
    assert_eq!(headers["sec-websocket-protocol"], "b");

    socket.send(Message::Text("still here".into())).await.unwrap();
    let reply = timeout(Duration::from_secs(5), socket.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(reply, Message::Text("still here".into()));

    shutdown.trigger();
}

#[tokio::test]
async fn test_origin_port_is_ignored() {
    let (backend, _) = common::start_ws_backend().await;
    let mut config = common::proxy_config(format!("http://{}", backend));
    config.websocket.trusted_origin = "https://console.example.com:8443".into();
    let (proxy, shutdown) = common::start_proxy(config).await;

    let result = common::connect(
        &format!("ws://{}/", proxy),
        &[("Origin", "https://console.example.com:9999")],
    )
    .await;
    assert!(result.is_ok(), "same host on another port is accepted");

    shutdown.trigger();
}

#[tokio::test]
async fn test_foreign_origin_is_forbidden() {
    let (backend, _) = common::start_ws_backend().await;
    let mut config = common::proxy_config(format!("http://{}", backend));
    config.websocket.trusted_origin = "https://console.example.com".into();
    let (proxy, shutdown) = common::start_proxy(config).await;

    let err = common::connect(&format!("ws://{}/", proxy), &[("Origin", "https://evil.example.com")])
        .await
        .unwrap_err();
    assert_eq!(common::rejected_status(&err), 403);

    let err = common::connect(&format!("ws://{}/", proxy), &[]).await.unwrap_err();
    assert_eq!(common::rejected_status(&err), 403, "missing Origin is rejected");

    shutdown.trigger();
}

#[tokio::test]
async fn test_backend_status_is_forwarded() {
    let (backend, requests) = common::start_mock_backend(
        "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    )
    .await;
    let (proxy, shutdown) = common::start_proxy(common::proxy_config(format!("http://{}", backend))).await;

    let err = common::connect(&format!("ws://{}/", proxy), &[]).await.unwrap_err();
    assert_eq!(common::rejected_status(&err), 503);
    assert_eq!(requests.lock().unwrap().len(), 1);

    shutdown.trigger();
}

#[tokio::test]
async fn test_unreachable_backend_is_bad_gateway() {
    let backend = common::closed_port().await;
    let (proxy, shutdown) = common::start_proxy(common::proxy_config(format!("http://{}", backend))).await;

    let err = common::connect(&format!("ws://{}/", proxy), &[]).await.unwrap_err();
    assert_eq!(common::rejected_status(&err), 502);

    shutdown.trigger();
}

#[tokio::test]
async fn test_malformed_upgrade_never_dials() {
    let (backend, recorded) = common::start_ws_backend().await;
    let (proxy, shutdown) = common::start_proxy(common::proxy_config(format!("http://{}", backend))).await;

    // Upgrade header without the rest of the handshake.
    let res = common::http_client()
        .get(format!("http://{}/", proxy))
        .header("Upgrade", "websocket")
        .send()
        .await
        .expect("proxy reachable");

    assert!(res.status().is_client_error());
    assert_eq!(recorded.count(), 0);

    shutdown.trigger();
}

#[tokio::test]
async fn test_backend_hangup_closes_client() {
    let (backend, _) = common::start_ws_backend().await;
    let (proxy, shutdown) = common::start_proxy(common::proxy_config(format!("http://{}", backend))).await;

    let (mut socket, _) = common::connect(&format!("ws://{}/hangup", proxy), &[]).await.unwrap();

    // Either the forwarded close frame or the end of the stream, but promptly.
    let ended = timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "client side was not torn down");

    shutdown.trigger();
}

#[tokio::test]
async fn test_idle_session_receives_keepalive_ping() {
    let (backend, _) = common::start_ws_backend().await;
    let mut config = common::proxy_config(format!("http://{}", backend));
    config.websocket.ping_interval_secs = 1;
    let (proxy, shutdown) = common::start_proxy(config).await;

    let (mut socket, _) = common::connect(&format!("ws://{}/", proxy), &[]).await.unwrap();

    let msg = timeout(Duration::from_secs(5), socket.next()).await.unwrap().unwrap().unwrap();
    assert!(matches!(msg, Message::Ping(_)), "expected keepalive ping, got {:?}", msg);

    shutdown.trigger();
}
