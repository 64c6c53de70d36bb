//! In-memory store backends using DashMap.
//!
//! These back the service in local development and drive the integration
//! tests. Contents are lost on restart.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{
    InventoryFieldChange, InventoryStore, NewNotification, NotificationRecord, NotificationStore,
    OrderStore, OrderSummary, PharmacyStore, PharmacySummary, PrescriptionStore,
    PrescriptionSummary, StaffRole, StoreError, UserProfile, UserStore,
};

pub struct MemoryUserStore {
    users: DashMap<String, UserProfile>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
        }
    }

    pub fn insert(&self, profile: UserProfile) {
        self.users.insert(profile.id.clone(), profile);
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_user_by_id(&self, id: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.users.get(id).map(|u| u.clone()))
    }

    async fn find_active_users_by_pharmacy_and_roles(
        &self,
        pharmacy_id: &str,
        roles: &[StaffRole],
    ) -> Result<Vec<UserProfile>, StoreError> {
        Ok(self
            .users
            .iter()
            .filter(|u| {
                u.is_active
                    && u.pharmacy_id.as_deref() == Some(pharmacy_id)
                    && roles.contains(&u.role)
            })
            .map(|u| u.clone())
            .collect())
    }
}

pub struct MemoryOrderStore {
    orders: DashMap<String, OrderSummary>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
        }
    }

    pub fn insert(&self, order: OrderSummary) {
        self.orders.insert(order.id.clone(), order);
    }
}

impl Default for MemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<OrderSummary>, StoreError> {
        Ok(self.orders.get(id).map(|o| o.clone()))
    }
}

pub struct MemoryPharmacyStore {
    pharmacies: DashMap<String, PharmacySummary>,
}

impl MemoryPharmacyStore {
    pub fn new() -> Self {
        Self {
            pharmacies: DashMap::new(),
        }
    }

    pub fn insert(&self, pharmacy: PharmacySummary) {
        self.pharmacies.insert(pharmacy.id.clone(), pharmacy);
    }
}

impl Default for MemoryPharmacyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PharmacyStore for MemoryPharmacyStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<PharmacySummary>, StoreError> {
        Ok(self.pharmacies.get(id).map(|p| p.clone()))
    }
}

pub struct MemoryPrescriptionStore {
    prescriptions: DashMap<String, PrescriptionSummary>,
}

impl MemoryPrescriptionStore {
    pub fn new() -> Self {
        Self {
            prescriptions: DashMap::new(),
        }
    }

    pub fn insert(&self, prescription: PrescriptionSummary) {
        self.prescriptions
            .insert(prescription.id.clone(), prescription);
    }
}

impl Default for MemoryPrescriptionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PrescriptionStore for MemoryPrescriptionStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<PrescriptionSummary>, StoreError> {
        Ok(self.prescriptions.get(id).map(|p| p.clone()))
    }
}

struct StoredItem {
    pharmacy_id: String,
    fields: serde_json::Map<String, serde_json::Value>,
}

pub struct MemoryInventoryStore {
    items: DashMap<String, StoredItem>,
}

impl MemoryInventoryStore {
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
        }
    }

    /// Seed an item. `fields` must be a JSON object.
    pub fn insert_item(&self, item_id: &str, pharmacy_id: &str, fields: serde_json::Value) {
        let fields = match fields {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        self.items.insert(
            item_id.to_string(),
            StoredItem {
                pharmacy_id: pharmacy_id.to_string(),
                fields,
            },
        );
    }
}

impl Default for MemoryInventoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn update_field(
        &self,
        item_id: &str,
        field: &str,
        value: serde_json::Value,
    ) -> Result<Option<InventoryFieldChange>, StoreError> {
        let mut item = match self.items.get_mut(item_id) {
            Some(item) => item,
            None => return Ok(None),
        };

        let old_value = item
            .fields
            .insert(field.to_string(), value.clone())
            .unwrap_or(serde_json::Value::Null);

        Ok(Some(InventoryFieldChange {
            pharmacy_id: item.pharmacy_id.clone(),
            item_id: item_id.to_string(),
            field: field.to_string(),
            old_value,
            new_value: value,
        }))
    }
}

pub struct MemoryNotificationStore {
    /// user_id -> notifications, insertion order
    by_user: DashMap<String, Vec<NotificationRecord>>,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self {
            by_user: DashMap::new(),
        }
    }
}

impl Default for MemoryNotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn create(&self, record: NewNotification) -> Result<NotificationRecord, StoreError> {
        let stored = NotificationRecord {
            id: Uuid::new_v4(),
            user_id: record.user_id.clone(),
            pharmacy_id: record.pharmacy_id,
            tenant_id: record.tenant_id,
            kind: record.kind,
            title: record.title,
            message: record.message,
            data: record.data,
            channels: record.channels,
            priority: record.priority,
            status: record.status,
            error: record.error,
            read: false,
            read_at: None,
            created_at: Utc::now(),
        };

        self.by_user
            .entry(record.user_id)
            .or_default()
            .push(stored.clone());

        Ok(stored)
    }

    async fn find_for_user(
        &self,
        user_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let page = page.max(1);
        let skip = ((page - 1) * limit) as usize;

        let mut records: Vec<NotificationRecord> = self
            .by_user
            .get(user_id)
            .map(|v| v.clone())
            .unwrap_or_default();

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(records
            .into_iter()
            .skip(skip)
            .take(limit as usize)
            .collect())
    }

    async fn count_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .by_user
            .get(user_id)
            .map(|v| v.len() as u64)
            .unwrap_or(0))
    }

    async fn count_unread_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .by_user
            .get(user_id)
            .map(|v| v.iter().filter(|n| !n.read).count() as u64)
            .unwrap_or(0))
    }

    async fn mark_read(
        &self,
        user_id: &str,
        notification_id: Uuid,
    ) -> Result<Option<NotificationRecord>, StoreError> {
        let mut records = match self.by_user.get_mut(user_id) {
            Some(records) => records,
            None => return Ok(None),
        };

        let record = match records.iter_mut().find(|n| n.id == notification_id) {
            Some(record) => record,
            None => return Ok(None),
        };

        if !record.read {
            record.read = true;
            record.read_at = Some(Utc::now());
        }

        Ok(Some(record.clone()))
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64, StoreError> {
        let mut records = match self.by_user.get_mut(user_id) {
            Some(records) => records,
            None => return Ok(0),
        };

        let now = Utc::now();
        let mut changed = 0;
        for record in records.iter_mut().filter(|n| !n.read) {
            record.read = true;
            record.read_at = Some(now);
            changed += 1;
        }

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::ChannelKind;
    use crate::notification::{NotificationStatus, Priority};
    use serde_json::json;

    fn new_notification(user_id: &str) -> NewNotification {
        NewNotification {
            user_id: user_id.to_string(),
            pharmacy_id: None,
            tenant_id: "t-1".to_string(),
            kind: "TEST".to_string(),
            title: "Test".to_string(),
            message: "hello".to_string(),
            data: json!({}),
            channels: vec![ChannelKind::Socket],
            priority: Priority::Normal,
            status: NotificationStatus::Sent,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_mark_read_preserves_first_read_at() {
        let store = MemoryNotificationStore::new();
        let created = store.create(new_notification("u-1")).await.unwrap();

        let first = store
            .mark_read("u-1", created.id)
            .await
            .unwrap()
            .expect("record should exist");
        assert!(first.read);
        let first_read_at = first.read_at.expect("read_at set on first mark");

        let second = store
            .mark_read("u-1", created.id)
            .await
            .unwrap()
            .expect("record should exist");
        assert!(second.read);
        assert_eq!(second.read_at, Some(first_read_at));
    }

    #[tokio::test]
    async fn test_mark_read_scoped_to_owner() {
        let store = MemoryNotificationStore::new();
        let created = store.create(new_notification("u-1")).await.unwrap();

        let result = store.mark_read("someone-else", created.id).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_mark_all_read_only_touches_unread() {
        let store = MemoryNotificationStore::new();
        let first = store.create(new_notification("u-1")).await.unwrap();
        store.create(new_notification("u-1")).await.unwrap();
        store.create(new_notification("u-2")).await.unwrap();

        store.mark_read("u-1", first.id).await.unwrap();

        let changed = store.mark_all_read("u-1").await.unwrap();
        assert_eq!(changed, 1);
        assert_eq!(store.count_unread_for_user("u-1").await.unwrap(), 0);
        assert_eq!(store.count_unread_for_user("u-2").await.unwrap(), 1);

        // Nothing left to mark
        assert_eq!(store.mark_all_read("u-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_find_for_user_pages_newest_first() {
        let store = MemoryNotificationStore::new();
        for _ in 0..5 {
            store.create(new_notification("u-1")).await.unwrap();
        }

        let page = store.find_for_user("u-1", 1, 3).await.unwrap();
        assert_eq!(page.len(), 3);
        let rest = store.find_for_user("u-1", 2, 3).await.unwrap();
        assert_eq!(rest.len(), 2);
        assert!(page[0].created_at >= page[1].created_at);
    }

    #[tokio::test]
    async fn test_inventory_update_field_returns_old_value() {
        let store = MemoryInventoryStore::new();
        store.insert_item("item-1", "ph-1", json!({"quantity": 10, "name": "Aspirin"}));

        let change = store
            .update_field("item-1", "quantity", json!(4))
            .await
            .unwrap()
            .expect("item exists");

        assert_eq!(change.pharmacy_id, "ph-1");
        assert_eq!(change.old_value, json!(10));
        assert_eq!(change.new_value, json!(4));

        assert!(store
            .update_field("missing", "quantity", json!(1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_user_store_role_filter() {
        let store = MemoryUserStore::new();
        let base = UserProfile {
            id: "u-1".to_string(),
            tenant_id: "t-1".to_string(),
            pharmacy_id: Some("ph-1".to_string()),
            name: "Abel".to_string(),
            email: None,
            phone: None,
            role: StaffRole::Pharmacist,
            is_active: true,
        };
        store.insert(base.clone());
        store.insert(UserProfile {
            id: "u-2".to_string(),
            role: StaffRole::Customer,
            ..base.clone()
        });
        store.insert(UserProfile {
            id: "u-3".to_string(),
            is_active: false,
            ..base.clone()
        });

        let staff = store
            .find_active_users_by_pharmacy_and_roles(
                "ph-1",
                &[StaffRole::Admin, StaffRole::Pharmacist],
            )
            .await
            .unwrap();

        assert_eq!(staff.len(), 1);
        assert_eq!(staff[0].id, "u-1");
    }
}
