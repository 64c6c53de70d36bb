//! Room and event naming for the realtime layer.
//!
//! Room keys and event names are a stable wire contract shared with the web
//! and mobile clients; the string forms here must not change.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A named broadcast group. Connections join rooms; events published to a
/// room reach every current member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomKey {
    /// All connections of one user (`user:<userId>`)
    User(String),
    /// All connections of one tenant (`tenant:<tenantId>`)
    Tenant(String),
    /// Staff watching one pharmacy (`pharmacy:<pharmacyId>`)
    Pharmacy(String),
    /// Parties watching one order (`order:<orderId>`)
    Order(String),
}

impl RoomKey {
    pub fn user(id: impl Into<String>) -> Self {
        RoomKey::User(id.into())
    }

    pub fn tenant(id: impl Into<String>) -> Self {
        RoomKey::Tenant(id.into())
    }

    pub fn pharmacy(id: impl Into<String>) -> Self {
        RoomKey::Pharmacy(id.into())
    }

    pub fn order(id: impl Into<String>) -> Self {
        RoomKey::Order(id.into())
    }

    /// Parse a wire-form room key (`user:abc`, `pharmacy:ph-1`, ...).
    pub fn parse(raw: &str) -> Option<Self> {
        let (prefix, id) = raw.split_once(':')?;
        if id.is_empty() {
            return None;
        }
        match prefix {
            "user" => Some(RoomKey::User(id.to_string())),
            "tenant" => Some(RoomKey::Tenant(id.to_string())),
            "pharmacy" => Some(RoomKey::Pharmacy(id.to_string())),
            "order" => Some(RoomKey::Order(id.to_string())),
            _ => None,
        }
    }

    /// Rooms clients may join over a live connection. `user:` and `tenant:`
    /// membership is assigned at handshake and never by request.
    pub fn is_client_joinable(&self) -> bool {
        matches!(self, RoomKey::Pharmacy(_) | RoomKey::Order(_))
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomKey::User(id) => write!(f, "user:{}", id),
            RoomKey::Tenant(id) => write!(f, "tenant:{}", id),
            RoomKey::Pharmacy(id) => write!(f, "pharmacy:{}", id),
            RoomKey::Order(id) => write!(f, "order:{}", id),
        }
    }
}

/// Event names emitted to clients. Exact strings, stable contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventName {
    #[serde(rename = "notification")]
    Notification,
    #[serde(rename = "tenant-notification")]
    TenantNotification,
    #[serde(rename = "order-update")]
    OrderUpdate,
    #[serde(rename = "delivery-location-update")]
    DeliveryLocationUpdate,
    #[serde(rename = "inventory-update")]
    InventoryUpdate,
    #[serde(rename = "user-editing-inventory")]
    UserEditingInventory,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Notification => "notification",
            EventName::TenantNotification => "tenant-notification",
            EventName::OrderUpdate => "order-update",
            EventName::DeliveryLocationUpdate => "delivery-location-update",
            EventName::InventoryUpdate => "inventory-update",
            EventName::UserEditingInventory => "user-editing-inventory",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_key_wire_format() {
        assert_eq!(RoomKey::user("u-1").to_string(), "user:u-1");
        assert_eq!(RoomKey::tenant("t-1").to_string(), "tenant:t-1");
        assert_eq!(RoomKey::pharmacy("ph-1").to_string(), "pharmacy:ph-1");
        assert_eq!(RoomKey::order("ord-1").to_string(), "order:ord-1");
    }

    #[test]
    fn test_room_key_parse_round_trip() {
        for raw in ["user:u-1", "tenant:t-1", "pharmacy:ph-1", "order:ord-1"] {
            let key = RoomKey::parse(raw).expect("should parse");
            assert_eq!(key.to_string(), raw);
        }
    }

    #[test]
    fn test_room_key_parse_rejects_unknown() {
        assert!(RoomKey::parse("warehouse:w-1").is_none());
        assert!(RoomKey::parse("user:").is_none());
        assert!(RoomKey::parse("no-separator").is_none());
    }

    #[test]
    fn test_client_joinable_rooms() {
        assert!(RoomKey::pharmacy("ph-1").is_client_joinable());
        assert!(RoomKey::order("ord-1").is_client_joinable());
        assert!(!RoomKey::user("u-1").is_client_joinable());
        assert!(!RoomKey::tenant("t-1").is_client_joinable());
    }

    #[test]
    fn test_event_name_strings() {
        assert_eq!(EventName::Notification.as_str(), "notification");
        assert_eq!(EventName::TenantNotification.as_str(), "tenant-notification");
        assert_eq!(EventName::OrderUpdate.as_str(), "order-update");
        assert_eq!(
            EventName::DeliveryLocationUpdate.as_str(),
            "delivery-location-update"
        );
        assert_eq!(EventName::InventoryUpdate.as_str(), "inventory-update");
        assert_eq!(
            EventName::UserEditingInventory.as_str(),
            "user-editing-inventory"
        );
    }

    #[test]
    fn test_event_name_serde() {
        let json = serde_json::to_string(&EventName::UserEditingInventory).unwrap();
        assert_eq!(json, "\"user-editing-inventory\"");
        let back: EventName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventName::UserEditingInventory);
    }
}
