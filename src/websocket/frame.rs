//! Conversion between client-side (axum) and backend-side (tungstenite) messages.
//!
//! The two crates define structurally identical but distinct message types.
//! Frame kind and payload are carried over unchanged; each side re-encodes its own
//! framing.

use axum::extract::ws::{CloseFrame as ClientCloseFrame, Message as ClientMessage};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as BackendCloseFrame;
use tokio_tungstenite::tungstenite::Message as BackendMessage;

/// Convert a message read from the client into one for the backend.
pub fn to_backend(msg: ClientMessage) -> BackendMessage {
    match msg {
        ClientMessage::Text(text) => BackendMessage::Text(text.as_str().into()),
        ClientMessage::Binary(data) => BackendMessage::Binary(data),
        ClientMessage::Ping(data) => BackendMessage::Ping(data),
        ClientMessage::Pong(data) => BackendMessage::Pong(data),
        ClientMessage::Close(frame) => BackendMessage::Close(frame.map(|f| BackendCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().into(),
        })),
    }
}

/// Convert a message read from the backend into one for the client.
///
/// Returns `None` for raw `Frame` values, which a reader never yields.
pub fn to_client(msg: BackendMessage) -> Option<ClientMessage> {
    match msg {
        BackendMessage::Text(text) => Some(ClientMessage::Text(text.as_str().into())),
        BackendMessage::Binary(data) => Some(ClientMessage::Binary(data)),
        BackendMessage::Ping(data) => Some(ClientMessage::Ping(data)),
        BackendMessage::Pong(data) => Some(ClientMessage::Pong(data)),
        BackendMessage::Close(frame) => Some(ClientMessage::Close(frame.map(|f| ClientCloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().into(),
        }))),
        BackendMessage::Frame(_) => None,
    }
}

/// Short frame kind for log fields.
pub fn kind(msg: &ClientMessage) -> &'static str {
    match msg {
        ClientMessage::Text(_) => "text",
        ClientMessage::Binary(_) => "binary",
        ClientMessage::Ping(_) => "ping",
        ClientMessage::Pong(_) => "pong",
        ClientMessage::Close(_) => "close",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    #[test]
    fn text_and_binary_keep_their_kind() {
        match to_backend(ClientMessage::Text("{\"op\":\"stdin\"}".into())) {
            BackendMessage::Text(text) => assert_eq!(text.as_str(), "{\"op\":\"stdin\"}"),
            other => panic!("expected text, got {:?}", other),
        }

        let payload = Bytes::from_static(&[0x01, 0xff, 0x00]);
        match to_client(BackendMessage::Binary(payload.clone())) {
            Some(ClientMessage::Binary(data)) => assert_eq!(data, payload),
            other => panic!("expected binary, got {:?}", other),
        }
    }

    #[test]
    fn close_frames_keep_code_and_reason() {
        let msg = BackendMessage::Close(Some(BackendCloseFrame {
            code: CloseCode::Away,
            reason: "backend restarting".into(),
        }));
        match to_client(msg) {
            Some(ClientMessage::Close(Some(frame))) => {
                assert_eq!(frame.code, 1001);
                assert_eq!(frame.reason.as_str(), "backend restarting");
            }
            other => panic!("expected close, got {:?}", other),
        }

        match to_backend(ClientMessage::Close(None)) {
            BackendMessage::Close(None) => {}
            other => panic!("expected bare close, got {:?}", other),
        }
    }

    #[test]
    fn control_frames_pass_through() {
        let data = Bytes::from_static(b"hb");
        assert!(matches!(to_backend(ClientMessage::Ping(data.clone())), BackendMessage::Ping(d) if d == data));
        assert!(matches!(to_client(BackendMessage::Pong(data.clone())), Some(ClientMessage::Pong(d)) if d == data));
        assert_eq!(kind(&ClientMessage::Pong(data)), "pong");
    }
}
