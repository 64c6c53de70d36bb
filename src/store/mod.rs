//! Datastore access for the realtime service.
//!
//! The service treats persistence as a generic transactional datastore
//! behind trait objects: a user directory, read-side aggregate lookups
//! (orders, pharmacies, prescriptions), the collaborative inventory table,
//! and the durable notification log. Two backends exist: Postgres via sqlx,
//! and in-memory maps for local development and tests.

mod memory;
mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use uuid::Uuid;

use crate::channels::ChannelKind;
use crate::config::DatabaseConfig;
use crate::notification::{NotificationStatus, Priority};

pub use memory::{
    MemoryInventoryStore, MemoryNotificationStore, MemoryOrderStore, MemoryPharmacyStore,
    MemoryPrescriptionStore, MemoryUserStore,
};
pub use postgres::{
    PgInventoryStore, PgNotificationStore, PgOrderStore, PgPharmacyStore, PgPrescriptionStore,
    PgUserStore,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unsupported field: {0}")]
    UnsupportedField(String),

    #[error("Invalid value for field {field}: expected {expected}")]
    InvalidValue {
        field: String,
        expected: &'static str,
    },
}

impl From<StoreError> for crate::error::AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Database(e) => crate::error::AppError::Database(e),
            other => crate::error::AppError::Validation(other.to_string()),
        }
    }
}

/// Staff and customer roles, as stored in the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaffRole {
    Admin,
    Pharmacist,
    Worker,
    Customer,
    Driver,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Admin => "ADMIN",
            StaffRole::Pharmacist => "PHARMACIST",
            StaffRole::Worker => "WORKER",
            StaffRole::Customer => "CUSTOMER",
            StaffRole::Driver => "DRIVER",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ADMIN" => Some(StaffRole::Admin),
            "PHARMACIST" => Some(StaffRole::Pharmacist),
            "WORKER" => Some(StaffRole::Worker),
            "CUSTOMER" => Some(StaffRole::Customer),
            "DRIVER" => Some(StaffRole::Driver),
            _ => None,
        }
    }
}

/// Contact profile resolved from the user directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub tenant_id: String,
    pub pharmacy_id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: StaffRole,
    pub is_active: bool,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_id(&self, id: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Active users attached to a pharmacy whose role is in `roles`.
    async fn find_active_users_by_pharmacy_and_roles(
        &self,
        pharmacy_id: &str,
        roles: &[StaffRole],
    ) -> Result<Vec<UserProfile>, StoreError>;
}

/// Order aggregate, flattened to what notifications need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: String,
    pub tenant_id: String,
    pub pharmacy_id: String,
    pub customer_id: String,
    pub customer_name: String,
    pub pharmacy_name: String,
    pub total_amount: f64,
    pub item_count: i64,
    pub delivery_user_id: Option<String>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<OrderSummary>, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PharmacySummary {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
}

#[async_trait]
pub trait PharmacyStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<PharmacySummary>, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionSummary {
    pub id: String,
    pub tenant_id: String,
    pub pharmacy_id: String,
    pub user_id: String,
    pub patient_name: String,
    pub doctor_name: String,
    pub item_count: i64,
    pub status: String,
}

#[async_trait]
pub trait PrescriptionStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<PrescriptionSummary>, StoreError>;
}

/// Result of a single-field inventory mutation: the previous value, for the
/// field-level change broadcast. The update itself is last-write-wins.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryFieldChange {
    pub pharmacy_id: String,
    pub item_id: String,
    pub field: String,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Apply a single-field update and return the change, or `None` when
    /// the item does not exist.
    async fn update_field(
        &self,
        item_id: &str,
        field: &str,
        value: serde_json::Value,
    ) -> Result<Option<InventoryFieldChange>, StoreError>;
}

/// Durable notification record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub user_id: String,
    pub pharmacy_id: Option<String>,
    pub tenant_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub channels: Vec<ChannelKind>,
    pub priority: Priority,
    pub status: NotificationStatus,
    pub error: Option<String>,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new notification record; the store assigns id, read state
/// and creation time.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: String,
    pub pharmacy_id: Option<String>,
    pub tenant_id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: serde_json::Value,
    pub channels: Vec<ChannelKind>,
    pub priority: Priority,
    pub status: NotificationStatus,
    pub error: Option<String>,
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, record: NewNotification) -> Result<NotificationRecord, StoreError>;

    /// Page of the user's notifications, newest first.
    async fn find_for_user(
        &self,
        user_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<Vec<NotificationRecord>, StoreError>;

    async fn count_for_user(&self, user_id: &str) -> Result<u64, StoreError>;

    async fn count_unread_for_user(&self, user_id: &str) -> Result<u64, StoreError>;

    /// Mark one of the user's notifications read. Idempotent: a second call
    /// leaves `read_at` untouched. Returns the record's current state, or
    /// `None` when the id does not resolve for this user.
    async fn mark_read(
        &self,
        user_id: &str,
        notification_id: Uuid,
    ) -> Result<Option<NotificationRecord>, StoreError>;

    /// Mark every unread notification read; returns how many rows changed.
    async fn mark_all_read(&self, user_id: &str) -> Result<u64, StoreError>;
}

/// The full set of stores the service depends on.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub orders: Arc<dyn OrderStore>,
    pub pharmacies: Arc<dyn PharmacyStore>,
    pub prescriptions: Arc<dyn PrescriptionStore>,
    pub inventory: Arc<dyn InventoryStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Stores {
    /// In-memory stores, used for local development and tests.
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(MemoryUserStore::new()),
            orders: Arc::new(MemoryOrderStore::new()),
            pharmacies: Arc::new(MemoryPharmacyStore::new()),
            prescriptions: Arc::new(MemoryPrescriptionStore::new()),
            inventory: Arc::new(MemoryInventoryStore::new()),
            notifications: Arc::new(MemoryNotificationStore::new()),
        }
    }
}

/// Build the store set from configuration. An empty database URL selects
/// the in-memory backend.
pub async fn create_stores(config: &DatabaseConfig) -> Result<Stores, StoreError> {
    if config.url.is_empty() {
        tracing::warn!("No database URL configured, using in-memory stores");
        return Ok(Stores::in_memory());
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds as u64))
        .idle_timeout(Duration::from_secs(config.idle_timeout_seconds as u64))
        .connect(&config.url)
        .await?;

    tracing::info!(
        pool_size = config.pool_size,
        "PostgreSQL connection pool created"
    );

    Ok(Stores {
        users: Arc::new(PgUserStore::new(pool.clone())),
        orders: Arc::new(PgOrderStore::new(pool.clone())),
        pharmacies: Arc::new(PgPharmacyStore::new(pool.clone())),
        prescriptions: Arc::new(PgPrescriptionStore::new(pool.clone())),
        inventory: Arc::new(PgInventoryStore::new(pool.clone())),
        notifications: Arc::new(PgNotificationStore::new(pool)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staff_role_round_trip() {
        for role in [
            StaffRole::Admin,
            StaffRole::Pharmacist,
            StaffRole::Worker,
            StaffRole::Customer,
            StaffRole::Driver,
        ] {
            assert_eq!(StaffRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(StaffRole::parse("JANITOR"), None);
    }
}
