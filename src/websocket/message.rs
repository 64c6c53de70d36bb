use serde::{Deserialize, Serialize};

use crate::broadcast::RoomEvent;

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    /// Join pharmacy/order rooms (wire-form keys)
    Join { rooms: Vec<String> },
    /// Leave previously joined rooms
    Leave { rooms: Vec<String> },
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "event")]
    Event {
        #[serde(flatten)]
        event: RoomEvent,
    },
    #[serde(rename = "joined")]
    Joined {
        #[serde(rename = "payload")]
        rooms: Vec<String>,
    },
    #[serde(rename = "left")]
    Left {
        #[serde(rename = "payload")]
        rooms: Vec<String>,
    },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn joined(rooms: Vec<String>) -> Self {
        Self::Joined { rooms }
    }

    pub fn left(rooms: Vec<String>) -> Self {
        Self::Left { rooms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::EventName;
    use serde_json::json;

    #[test]
    fn test_client_message_parse() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"Join","payload":{"rooms":["pharmacy:ph-1"]}}"#)
                .unwrap();
        assert!(matches!(msg, ClientMessage::Join { rooms } if rooms == vec!["pharmacy:ph-1"]));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"Ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_event_message_wire_shape() {
        let message = ServerMessage::Event {
            event: RoomEvent {
                id: uuid::Uuid::nil(),
                event: EventName::OrderUpdate,
                room: "order:ord-1".to_string(),
                timestamp: chrono::Utc::now(),
                payload: json!({"status": "READY"}),
            },
        };

        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "event");
        assert_eq!(value["event"], "order-update");
        assert_eq!(value["room"], "order:ord-1");
        assert_eq!(value["payload"]["status"], "READY");
    }
}
