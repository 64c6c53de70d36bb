//! PostgreSQL store backends using sqlx.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::channels::ChannelKind;
use crate::notification::{NotificationStatus, Priority};

use super::{
    InventoryFieldChange, InventoryStore, NewNotification, NotificationRecord, NotificationStore,
    OrderStore, OrderSummary, PharmacyStore, PharmacySummary, PrescriptionStore,
    PrescriptionSummary, StaffRole, StoreError, UserProfile, UserStore,
};

fn channel_from_str(raw: &str) -> ChannelKind {
    match raw {
        "sms" => ChannelKind::Sms,
        "email" => ChannelKind::Email,
        _ => ChannelKind::Socket,
    }
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> UserProfile {
    let role: String = row.get("role");
    UserProfile {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        pharmacy_id: row.get("pharmacy_id"),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        role: StaffRole::parse(&role).unwrap_or(StaffRole::Customer),
        is_active: row.get("is_active"),
    }
}

fn notification_from_row(row: &sqlx::postgres::PgRow) -> NotificationRecord {
    let channels: Vec<String> = row.get("channels");
    let priority: String = row.get("priority");
    let status: String = row.get("status");

    NotificationRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        pharmacy_id: row.get("pharmacy_id"),
        tenant_id: row.get("tenant_id"),
        kind: row.get("type"),
        title: row.get("title"),
        message: row.get("message"),
        data: row.get("data"),
        channels: channels.iter().map(|c| channel_from_str(c)).collect(),
        priority: Priority::parse(&priority).unwrap_or_default(),
        status: NotificationStatus::parse(&status).unwrap_or(NotificationStatus::Sent),
        error: row.get("error"),
        read: row.get("read"),
        read_at: row.get("read_at"),
        created_at: row.get("created_at"),
    }
}

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_user_by_id(&self, id: &str) -> Result<Option<UserProfile>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, pharmacy_id, name, email, phone, role, is_active
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_active_users_by_pharmacy_and_roles(
        &self,
        pharmacy_id: &str,
        roles: &[StaffRole],
    ) -> Result<Vec<UserProfile>, StoreError> {
        let role_names: Vec<String> = roles.iter().map(|r| r.as_str().to_string()).collect();

        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, pharmacy_id, name, email, phone, role, is_active
            FROM users
            WHERE pharmacy_id = $1 AND role = ANY($2) AND is_active = TRUE
            "#,
        )
        .bind(pharmacy_id)
        .bind(&role_names)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(user_from_row).collect())
    }
}

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<OrderSummary>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT o.id, o.tenant_id, o.pharmacy_id, o.user_id AS customer_id,
                   u.name AS customer_name, p.name AS pharmacy_name,
                   o.total_amount, o.delivery_user_id,
                   (SELECT COUNT(*) FROM order_items oi WHERE oi.order_id = o.id) AS item_count
            FROM orders o
            JOIN users u ON u.id = o.user_id
            JOIN pharmacies p ON p.id = o.pharmacy_id
            WHERE o.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| OrderSummary {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            pharmacy_id: row.get("pharmacy_id"),
            customer_id: row.get("customer_id"),
            customer_name: row.get("customer_name"),
            pharmacy_name: row.get("pharmacy_name"),
            total_amount: row.get("total_amount"),
            item_count: row.get("item_count"),
            delivery_user_id: row.get("delivery_user_id"),
        }))
    }
}

pub struct PgPharmacyStore {
    pool: PgPool,
}

impl PgPharmacyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PharmacyStore for PgPharmacyStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<PharmacySummary>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, name
            FROM pharmacies
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| PharmacySummary {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            name: row.get("name"),
        }))
    }
}

pub struct PgPrescriptionStore {
    pool: PgPool,
}

impl PgPrescriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrescriptionStore for PgPrescriptionStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<PrescriptionSummary>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT pr.id, pr.tenant_id, pr.pharmacy_id, pr.user_id,
                   pr.patient_name, pr.doctor_name, pr.status,
                   (SELECT COUNT(*) FROM prescription_items pi WHERE pi.prescription_id = pr.id) AS item_count
            FROM prescriptions pr
            WHERE pr.id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| PrescriptionSummary {
            id: row.get("id"),
            tenant_id: row.get("tenant_id"),
            pharmacy_id: row.get("pharmacy_id"),
            user_id: row.get("user_id"),
            patient_name: row.get("patient_name"),
            doctor_name: row.get("doctor_name"),
            item_count: row.get("item_count"),
            status: row.get("status"),
        }))
    }
}

pub struct PgInventoryStore {
    pool: PgPool,
}

impl PgInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Columns open to collaborative single-field updates. Everything else is
/// rejected rather than interpolated into SQL.
const QUANTITY_SQL: &str = r#"
    WITH prev AS (SELECT to_jsonb(quantity) AS old_value, pharmacy_id FROM inventory WHERE id = $1)
    UPDATE inventory SET quantity = $2 FROM prev WHERE inventory.id = $1
    RETURNING prev.old_value AS old_value, prev.pharmacy_id AS pharmacy_id
"#;

const PRICE_SQL: &str = r#"
    WITH prev AS (SELECT to_jsonb(price) AS old_value, pharmacy_id FROM inventory WHERE id = $1)
    UPDATE inventory SET price = $2 FROM prev WHERE inventory.id = $1
    RETURNING prev.old_value AS old_value, prev.pharmacy_id AS pharmacy_id
"#;

const AVAILABLE_SQL: &str = r#"
    WITH prev AS (SELECT to_jsonb(is_available) AS old_value, pharmacy_id FROM inventory WHERE id = $1)
    UPDATE inventory SET is_available = $2 FROM prev WHERE inventory.id = $1
    RETURNING prev.old_value AS old_value, prev.pharmacy_id AS pharmacy_id
"#;

const NAME_SQL: &str = r#"
    WITH prev AS (SELECT to_jsonb(name) AS old_value, pharmacy_id FROM inventory WHERE id = $1)
    UPDATE inventory SET name = $2 FROM prev WHERE inventory.id = $1
    RETURNING prev.old_value AS old_value, prev.pharmacy_id AS pharmacy_id
"#;

#[async_trait]
impl InventoryStore for PgInventoryStore {
    async fn update_field(
        &self,
        item_id: &str,
        field: &str,
        value: serde_json::Value,
    ) -> Result<Option<InventoryFieldChange>, StoreError> {
        let row = match field {
            "quantity" => {
                let quantity = value.as_i64().ok_or(StoreError::InvalidValue {
                    field: field.to_string(),
                    expected: "integer",
                })?;
                sqlx::query(QUANTITY_SQL)
                    .bind(item_id)
                    .bind(quantity)
                    .fetch_optional(&self.pool)
                    .await?
            }
            "price" => {
                let price = value.as_f64().ok_or(StoreError::InvalidValue {
                    field: field.to_string(),
                    expected: "number",
                })?;
                sqlx::query(PRICE_SQL)
                    .bind(item_id)
                    .bind(price)
                    .fetch_optional(&self.pool)
                    .await?
            }
            "is_available" => {
                let available = value.as_bool().ok_or(StoreError::InvalidValue {
                    field: field.to_string(),
                    expected: "boolean",
                })?;
                sqlx::query(AVAILABLE_SQL)
                    .bind(item_id)
                    .bind(available)
                    .fetch_optional(&self.pool)
                    .await?
            }
            "name" => {
                let name = value.as_str().ok_or(StoreError::InvalidValue {
                    field: field.to_string(),
                    expected: "string",
                })?;
                sqlx::query(NAME_SQL)
                    .bind(item_id)
                    .bind(name)
                    .fetch_optional(&self.pool)
                    .await?
            }
            other => return Err(StoreError::UnsupportedField(other.to_string())),
        };

        Ok(row.map(|row| InventoryFieldChange {
            pharmacy_id: row.get("pharmacy_id"),
            item_id: item_id.to_string(),
            field: field.to_string(),
            old_value: row.get("old_value"),
            new_value: value,
        }))
    }
}

pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const NOTIFICATION_COLUMNS: &str = r#"id, user_id, pharmacy_id, tenant_id, type, title, message,
    data, channels, priority, status, error, read, read_at, created_at"#;

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn create(&self, record: NewNotification) -> Result<NotificationRecord, StoreError> {
        let channels: Vec<String> = record
            .channels
            .iter()
            .map(|c| c.as_str().to_string())
            .collect();

        let query = format!(
            r#"
            INSERT INTO notifications (
                id, user_id, pharmacy_id, tenant_id, type, title, message,
                data, channels, priority, status, error, read, created_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, FALSE, NOW()
            )
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        );

        let row = sqlx::query(&query)
            .bind(Uuid::new_v4())
            .bind(&record.user_id)
            .bind(&record.pharmacy_id)
            .bind(&record.tenant_id)
            .bind(&record.kind)
            .bind(&record.title)
            .bind(&record.message)
            .bind(&record.data)
            .bind(&channels)
            .bind(record.priority.as_str())
            .bind(record.status.as_str())
            .bind(&record.error)
            .fetch_one(&self.pool)
            .await?;

        Ok(notification_from_row(&row))
    }

    async fn find_for_user(
        &self,
        user_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<Vec<NotificationRecord>, StoreError> {
        let page = page.max(1);
        let offset = ((page - 1) * limit) as i64;

        let query = format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        );

        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(limit as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(notification_from_row).collect())
    }

    async fn count_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM notifications WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let count: i64 = row.get("count");
        Ok(count as u64)
    }

    async fn count_unread_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM notifications WHERE user_id = $1 AND read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("count");
        Ok(count as u64)
    }

    async fn mark_read(
        &self,
        user_id: &str,
        notification_id: Uuid,
    ) -> Result<Option<NotificationRecord>, StoreError> {
        // First transition sets read_at; repeat calls fall through to the
        // plain select and leave the original timestamp in place.
        let update = format!(
            r#"
            UPDATE notifications
            SET read = TRUE, read_at = NOW()
            WHERE id = $1 AND user_id = $2 AND read = FALSE
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        );

        let updated = sqlx::query(&update)
            .bind(notification_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = updated {
            return Ok(Some(notification_from_row(&row)));
        }

        let select = format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE id = $1 AND user_id = $2
            "#
        );

        let row = sqlx::query(&select)
            .bind(notification_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(notification_from_row))
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET read = TRUE, read_at = NOW()
            WHERE user_id = $1 AND read = FALSE
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
