//! Realtime layer integration tests
//!
//! Registry, broadcaster, and collaboration coordinator working together,
//! with virtual time driving the delayed editing release.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use medlink_realtime_service::auth::JwtValidator;
use medlink_realtime_service::broadcast::Broadcaster;
use medlink_realtime_service::collab::{
    CollaborationCoordinator, EditingUser, EDITING_CLEAR_DELAY,
};
use medlink_realtime_service::config::JwtConfig;
use medlink_realtime_service::registry::{ConnectionContext, ConnectionRegistry};
use medlink_realtime_service::rooms::{EventName, RoomKey};
use medlink_realtime_service::store::{MemoryInventoryStore, MemoryUserStore, StaffRole};
use medlink_realtime_service::websocket::ServerMessage;

struct TestEnvironment {
    registry: Arc<ConnectionRegistry>,
    broadcaster: Arc<Broadcaster>,
    coordinator: CollaborationCoordinator,
    inventory: Arc<MemoryInventoryStore>,
}

fn create_test_environment() -> TestEnvironment {
    let jwt_validator = Arc::new(JwtValidator::new(&JwtConfig {
        secret: "realtime-test-secret".to_string(),
        issuer: None,
        audience: None,
    }));
    let registry = Arc::new(ConnectionRegistry::new(
        jwt_validator,
        Arc::new(MemoryUserStore::new()),
    ));
    let broadcaster = Arc::new(Broadcaster::new(registry.clone()));
    let inventory = Arc::new(MemoryInventoryStore::new());
    let coordinator = CollaborationCoordinator::new(broadcaster.clone(), inventory.clone());

    TestEnvironment {
        registry,
        broadcaster,
        coordinator,
        inventory,
    }
}

fn connect(env: &TestEnvironment, user_id: &str) -> (uuid::Uuid, mpsc::Receiver<ServerMessage>) {
    let ctx = ConnectionContext {
        user_id: user_id.to_string(),
        tenant_id: "t-1".to_string(),
        role: StaffRole::Pharmacist,
    };
    let (tx, rx) = mpsc::channel(32);
    let handle = env.registry.register(&ctx, tx);
    (handle.id, rx)
}

async fn next_event(rx: &mut mpsc::Receiver<ServerMessage>) -> medlink_realtime_service::broadcast::RoomEvent {
    match rx.recv().await.expect("connection should receive a message") {
        ServerMessage::Event { event } => event,
        other => panic!("expected event, got {:?}", other),
    }
}

#[tokio::test]
async fn test_publish_to_empty_rooms_never_errors() {
    let env = create_test_environment();

    for room in [
        RoomKey::user("nobody"),
        RoomKey::tenant("no-tenant"),
        RoomKey::pharmacy("no-pharmacy"),
        RoomKey::order("no-order"),
    ] {
        let delivered = env
            .broadcaster
            .publish(&room, EventName::OrderUpdate, json!({"probe": true}))
            .await;
        assert_eq!(delivered, 0);
    }
}

#[tokio::test]
async fn test_room_key_taxonomy_on_the_wire() {
    let env = create_test_environment();
    let (conn_id, mut rx) = connect(&env, "u-1");
    env.registry.join(conn_id, &RoomKey::pharmacy("ph-9"));
    env.registry.join(conn_id, &RoomKey::order("ord-9"));

    // Regression against the exact room key literals
    let cases = [
        (RoomKey::user("u-1"), "user:u-1", EventName::Notification),
        (RoomKey::tenant("t-1"), "tenant:t-1", EventName::TenantNotification),
        (RoomKey::pharmacy("ph-9"), "pharmacy:ph-9", EventName::InventoryUpdate),
        (RoomKey::order("ord-9"), "order:ord-9", EventName::OrderUpdate),
    ];

    for (room, expected, event_name) in cases {
        env.broadcaster.publish(&room, event_name, json!({})).await;
        let event = next_event(&mut rx).await;
        assert_eq!(event.room, expected);
        assert_eq!(event.event, event_name);
    }
}

#[tokio::test]
async fn test_order_room_events() {
    let env = create_test_environment();
    let (conn_id, mut rx) = connect(&env, "u-1");
    env.registry.join(conn_id, &RoomKey::order("ord-1"));

    env.broadcaster
        .publish(
            &RoomKey::order("ord-1"),
            EventName::OrderUpdate,
            json!({"status": "READY"}),
        )
        .await;
    env.broadcaster
        .publish(
            &RoomKey::order("ord-1"),
            EventName::DeliveryLocationUpdate,
            json!({"lat": 9.03, "lng": 38.74}),
        )
        .await;

    let first = next_event(&mut rx).await;
    assert_eq!(first.event.as_str(), "order-update");
    let second = next_event(&mut rx).await;
    assert_eq!(second.event.as_str(), "delivery-location-update");
    assert_eq!(second.payload["lat"], 9.03);
}

#[tokio::test]
async fn test_disconnected_member_stops_receiving() {
    let env = create_test_environment();
    let (conn_id, mut rx) = connect(&env, "u-1");

    env.broadcaster
        .publish(&RoomKey::user("u-1"), EventName::Notification, json!({"n": 1}))
        .await;
    assert_eq!(next_event(&mut rx).await.payload["n"], 1);

    env.registry.unregister(conn_id);

    let delivered = env
        .broadcaster
        .publish(&RoomKey::user("u-1"), EventName::Notification, json!({"n": 2}))
        .await;
    assert_eq!(delivered, 0);
    assert!(rx.recv().await.is_none());
}

mod editing_presence {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_editing_sequence_for_single_writer() {
        let env = create_test_environment();
        env.inventory
            .insert_item("item-1", "ph-1", json!({"quantity": 12}));

        // A colleague watching the pharmacy
        let (conn_id, mut rx) = connect(&env, "u-watcher");
        env.registry.join(conn_id, &RoomKey::pharmacy("ph-1"));

        let editor = EditingUser {
            id: "u-editor".to_string(),
            name: "Editor".to_string(),
        };

        let update = env
            .coordinator
            .update_inventory_field("ph-1", "item-1", "quantity", json!(5), editor)
            .await
            .unwrap();

        assert_eq!(update.change.old_value, json!(12));
        assert_eq!(update.change.new_value, json!(5));

        // 1. editing announced
        let started = next_event(&mut rx).await;
        assert_eq!(started.event, EventName::UserEditingInventory);
        assert_eq!(started.payload["itemId"], "item-1");
        assert_eq!(started.payload["isEditing"], true);
        assert_eq!(started.payload["user"]["id"], "u-editor");

        // 2. field-level change broadcast
        let changed = next_event(&mut rx).await;
        assert_eq!(changed.event, EventName::InventoryUpdate);
        assert_eq!(changed.payload["type"], "INVENTORY_UPDATED");
        assert_eq!(changed.payload["field"], "quantity");
        assert_eq!(changed.payload["oldValue"], 12);
        assert_eq!(changed.payload["newValue"], 5);
        assert_eq!(changed.payload["updatedBy"], "u-editor");

        // 3. after the fixed delay, editing is released (virtual time)
        update.release.finished().await;
        let stopped = next_event(&mut rx).await;
        assert_eq!(stopped.event, EventName::UserEditingInventory);
        assert_eq!(stopped.payload["isEditing"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn test_editing_release_can_be_cancelled() {
        let env = create_test_environment();
        let (conn_id, mut rx) = connect(&env, "u-watcher");
        env.registry.join(conn_id, &RoomKey::pharmacy("ph-1"));

        let editor = EditingUser {
            id: "u-editor".to_string(),
            name: "Editor".to_string(),
        };

        let release = env
            .coordinator
            .schedule_editing_release("ph-1", "item-1", editor);
        release.cancel();

        // Let virtual time run well past the delay
        tokio::time::sleep(EDITING_CLEAR_DELAY + Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_announce_is_pure_broadcast_without_state() {
        let env = create_test_environment();
        let (conn_id, mut rx) = connect(&env, "u-watcher");
        env.registry.join(conn_id, &RoomKey::pharmacy("ph-1"));

        let editor = EditingUser {
            id: "u-editor".to_string(),
            name: "Editor".to_string(),
        };

        env.coordinator
            .announce_editing("ph-1", "item-1", &editor, true)
            .await;
        env.coordinator
            .announce_editing("ph-1", "item-1", &editor, false)
            .await;

        let on = next_event(&mut rx).await;
        assert_eq!(on.payload["isEditing"], true);
        let off = next_event(&mut rx).await;
        assert_eq!(off.payload["isEditing"], false);

        // No room-side state: the registry only tracks membership
        assert_eq!(env.registry.connection_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_against_missing_item_announces_but_fails() {
        let env = create_test_environment();
        let (conn_id, mut rx) = connect(&env, "u-watcher");
        env.registry.join(conn_id, &RoomKey::pharmacy("ph-1"));

        let editor = EditingUser {
            id: "u-editor".to_string(),
            name: "Editor".to_string(),
        };

        let result = env
            .coordinator
            .update_inventory_field("ph-1", "item-missing", "quantity", json!(1), editor)
            .await;
        assert!(result.is_err());

        // The advisory start-editing signal still went out
        let started = next_event(&mut rx).await;
        assert_eq!(started.payload["isEditing"], true);
    }
}
