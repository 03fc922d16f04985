//! The fan-out unit handed from a publisher's read loop to every subscriber.

use axum::extract::ws::Message as WsMessage;

/// An immutable, shareable copy of one inbound publisher frame. Built once
/// per frame and shared by reference across every subscriber's coalescing
/// slot, so fan-out to N subscribers costs one allocation, not N.
pub struct RelayMessage {
    pub is_binary: bool,
    pub payload: Vec<u8>,
}

impl RelayMessage {
    pub fn from_ws(msg: &WsMessage) -> Option<Self> {
        match msg {
            WsMessage::Text(text) => Some(Self {
                is_binary: false,
                payload: text.clone().into_bytes(),
            }),
            WsMessage::Binary(bytes) => Some(Self {
                is_binary: true,
                payload: bytes.clone(),
            }),
            _ => None,
        }
    }

    pub fn to_ws(&self) -> WsMessage {
        if self.is_binary {
            WsMessage::Binary(self.payload.clone())
        } else {
            // Payload bytes always originated from a WsMessage::Text frame.
            WsMessage::Text(String::from_utf8_lossy(&self.payload).into_owned())
        }
    }
}
