//! Collaborative inventory editing.
//!
//! The coordinator gives connected clients a soft signal that another user
//! is editing an inventory item. It is a pure broadcast, not a lock: it
//! confers no mutual exclusion, and the underlying mutation stays
//! last-write-wins. The "stopped editing" signal is a second broadcast on
//! a fixed delay, scheduled as a task with a cancellation handle.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::broadcast::Broadcaster;
use crate::error::AppError;
use crate::rooms::{EventName, RoomKey};
use crate::store::{InventoryFieldChange, InventoryStore};

/// How long the editing-presence signal stays up after an update.
pub const EDITING_CLEAR_DELAY: Duration = Duration::from_secs(2);

/// The user shown as "currently editing" to other clients.
#[derive(Debug, Clone, Serialize)]
pub struct EditingUser {
    pub id: String,
    pub name: String,
}

/// Cancellation handle for a scheduled "stopped editing" broadcast.
///
/// Dropping the handle detaches the task (the release still fires);
/// `cancel` aborts it.
pub struct EditingRelease {
    handle: JoinHandle<()>,
}

impl EditingRelease {
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Await the release broadcast. Test hook; aborted tasks resolve too.
    pub async fn finished(self) {
        let _ = self.handle.await;
    }
}

/// Outcome of a collaborative field update: the applied change plus the
/// handle for the pending presence release.
pub struct CollaborativeUpdate {
    pub change: InventoryFieldChange,
    pub release: EditingRelease,
}

/// Layers the editing-presence protocol on the room broadcaster.
pub struct CollaborationCoordinator {
    broadcaster: Arc<Broadcaster>,
    inventory: Arc<dyn InventoryStore>,
}

impl CollaborationCoordinator {
    pub fn new(broadcaster: Arc<Broadcaster>, inventory: Arc<dyn InventoryStore>) -> Self {
        Self {
            broadcaster,
            inventory,
        }
    }

    /// Tell everyone watching the pharmacy that `user` started or stopped
    /// editing `item_id`. No state is stored beyond the broadcast itself.
    pub async fn announce_editing(
        &self,
        pharmacy_id: &str,
        item_id: &str,
        user: &EditingUser,
        is_editing: bool,
    ) {
        self.broadcaster
            .publish(
                &RoomKey::pharmacy(pharmacy_id),
                EventName::UserEditingInventory,
                json!({
                    "itemId": item_id,
                    "user": user,
                    "isEditing": is_editing,
                }),
            )
            .await;
    }

    /// Run the collaborative update protocol for a single-field change:
    /// announce editing, apply the mutation, broadcast the field-level
    /// change, and schedule the delayed "stopped editing" signal.
    #[tracing::instrument(
        name = "collab.update_inventory_field",
        skip(self, value, editor),
        fields(pharmacy_id = %pharmacy_id, item_id = %item_id, field = %field)
    )]
    pub async fn update_inventory_field(
        &self,
        pharmacy_id: &str,
        item_id: &str,
        field: &str,
        value: Value,
        editor: EditingUser,
    ) -> Result<CollaborativeUpdate, AppError> {
        self.announce_editing(pharmacy_id, item_id, &editor, true)
            .await;

        let change = self
            .inventory
            .update_field(item_id, field, value)
            .await?
            .ok_or_else(|| AppError::NotFound("Inventory item not found".to_string()))?;

        self.broadcaster
            .publish(
                &RoomKey::pharmacy(&change.pharmacy_id),
                EventName::InventoryUpdate,
                json!({
                    "type": "INVENTORY_UPDATED",
                    "itemId": change.item_id,
                    "field": change.field,
                    "oldValue": change.old_value,
                    "newValue": change.new_value,
                    "updatedBy": editor.id,
                    "userName": editor.name,
                }),
            )
            .await;

        let release = self.schedule_editing_release(pharmacy_id, item_id, editor);

        Ok(CollaborativeUpdate { change, release })
    }

    /// Schedule the `isEditing: false` broadcast after the fixed delay.
    pub fn schedule_editing_release(
        &self,
        pharmacy_id: &str,
        item_id: &str,
        user: EditingUser,
    ) -> EditingRelease {
        let broadcaster = self.broadcaster.clone();
        let pharmacy_id = pharmacy_id.to_string();
        let item_id = item_id.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(EDITING_CLEAR_DELAY).await;
            broadcaster
                .publish(
                    &RoomKey::pharmacy(&pharmacy_id),
                    EventName::UserEditingInventory,
                    json!({
                        "itemId": item_id,
                        "user": user,
                        "isEditing": false,
                    }),
                )
                .await;
        });

        EditingRelease { handle }
    }
}
