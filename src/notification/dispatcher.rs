use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::broadcast::Broadcaster;
use crate::channels::{ChannelKind, EmailSender, SmsSender};
use crate::error::AppError;
use crate::rooms::{EventName, RoomKey};
use crate::store::{
    NewNotification, NotificationRecord, StaffRole, Stores, UserProfile,
};

use super::{
    ChannelResult, DeliveryNotificationResult, NotificationIntent, NotificationOutcome,
    NotificationPage, NotificationStatus, Pagination, PharmacistNotifyResult,
};

/// Staff roles notified about pharmacy-level events
const PHARMACIST_ROLES: [StaffRole; 2] = [StaffRole::Admin, StaffRole::Pharmacist];

/// Staff roles notified about inventory stock events
const INVENTORY_STAFF_ROLES: [StaffRole; 3] =
    [StaffRole::Admin, StaffRole::Pharmacist, StaffRole::Worker];

/// Counters for dispatched notifications
#[derive(Debug, Default)]
pub struct DispatcherStats {
    pub dispatched: AtomicU64,
    pub failed_dispatches: AtomicU64,
    pub channel_failures: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            failed_dispatches: self.failed_dispatches.load(Ordering::Relaxed),
            channel_failures: self.channel_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub dispatched: u64,
    pub failed_dispatches: u64,
    pub channel_failures: u64,
}

/// Orchestrates persistence and multi-channel delivery for logical
/// notifications.
///
/// Channels are independent failure domains: each requested channel is
/// attempted regardless of the others' outcomes, and exactly one durable
/// record is written per dispatch whether or not individual channels
/// succeeded. Broadcast and persistence are sequential best-effort steps,
/// not a transaction.
pub struct NotificationDispatcher {
    stores: Stores,
    email: Arc<dyn EmailSender>,
    sms: Arc<dyn SmsSender>,
    broadcaster: Arc<Broadcaster>,
    stats: DispatcherStats,
}

impl NotificationDispatcher {
    pub fn new(
        stores: Stores,
        email: Arc<dyn EmailSender>,
        sms: Arc<dyn SmsSender>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            stores,
            email,
            sms,
            broadcaster,
            stats: DispatcherStats::default(),
        }
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Deliver a notification across every requested channel and record the
    /// outcome once.
    ///
    /// The recipient is resolved before any channel attempt or write; an
    /// unresolvable recipient aborts with `success: false` and no record.
    /// After resolution, channel failures are isolated per-channel results
    /// and never flip the record's SENT status.
    #[tracing::instrument(
        name = "dispatch.send_notification",
        skip(self, intent),
        fields(user_id = %intent.user_id, kind = %intent.kind)
    )]
    pub async fn send_notification(&self, intent: NotificationIntent) -> NotificationOutcome {
        let user = match self.stores.users.find_user_by_id(&intent.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!(user_id = %intent.user_id, "Notification recipient not found");
                self.stats.failed_dispatches.fetch_add(1, Ordering::Relaxed);
                return NotificationOutcome::failed("User not found");
            }
            Err(e) => {
                tracing::warn!(user_id = %intent.user_id, error = %e, "Recipient lookup failed");
                self.stats.failed_dispatches.fetch_add(1, Ordering::Relaxed);
                return NotificationOutcome::failed(e.to_string());
            }
        };

        match self.attempt_channels(&intent, &user).await {
            Ok(results) => {
                let failures = results.iter().filter(|r| !r.success).count();
                self.stats
                    .channel_failures
                    .fetch_add(failures as u64, Ordering::Relaxed);
                self.stats.dispatched.fetch_add(1, Ordering::Relaxed);

                self.persist_record(&intent, NotificationStatus::Sent, None)
                    .await;

                tracing::debug!(
                    user_id = %intent.user_id,
                    kind = %intent.kind,
                    attempted = results.len(),
                    failed = failures,
                    "Notification dispatched"
                );

                NotificationOutcome::sent(results)
            }
            Err(e) => {
                // The recipient id is known here, so a FAILED record is
                // still written, best-effort.
                let error = e.to_string();
                self.stats.failed_dispatches.fetch_add(1, Ordering::Relaxed);
                self.persist_record(&intent, NotificationStatus::Failed, Some(error.clone()))
                    .await;

                tracing::warn!(
                    user_id = %intent.user_id,
                    kind = %intent.kind,
                    error = %error,
                    "Notification dispatch failed"
                );

                NotificationOutcome::failed(error)
            }
        }
    }

    /// Attempt every requested and eligible channel concurrently.
    ///
    /// SMS and email require a phone number or email address on file; an
    /// ineligible channel is skipped, not failed. Socket delivery has no
    /// transport acknowledgment and always reports success.
    async fn attempt_channels(
        &self,
        intent: &NotificationIntent,
        user: &UserProfile,
    ) -> Result<Vec<ChannelResult>, AppError> {
        let vars = channel_vars(intent, user)?;
        let socket_payload = json!({
            "type": intent.kind,
            "message": intent.message,
            "data": intent.data,
        });

        let attempts = intent.channels.iter().map(|&channel| {
            let vars = vars.clone();
            let socket_payload = socket_payload.clone();
            async move {
                match channel {
                    ChannelKind::Socket => {
                        // Fire-and-forget push to all of the user's connections
                        self.broadcaster
                            .publish(
                                &RoomKey::user(&user.id),
                                EventName::Notification,
                                socket_payload,
                            )
                            .await;
                        Some(ChannelResult {
                            channel,
                            success: true,
                        })
                    }
                    ChannelKind::Sms => {
                        let phone = user.phone.as_deref()?;
                        let success = match self.sms.send(phone, &intent.kind, &vars).await {
                            Ok(report) => report.success,
                            Err(e) => {
                                tracing::warn!(
                                    user_id = %user.id,
                                    error = %e,
                                    "SMS channel sender failed"
                                );
                                false
                            }
                        };
                        Some(ChannelResult { channel, success })
                    }
                    ChannelKind::Email => {
                        let email = user.email.as_deref()?;
                        let success = match self.email.send(email, &intent.kind, &vars).await {
                            Ok(report) => report.success,
                            Err(e) => {
                                tracing::warn!(
                                    user_id = %user.id,
                                    error = %e,
                                    "Email channel sender failed"
                                );
                                false
                            }
                        };
                        Some(ChannelResult { channel, success })
                    }
                }
            }
        });

        Ok(join_all(attempts).await.into_iter().flatten().collect())
    }

    /// Write the single durable record for this dispatch. Persistence
    /// failures are logged, never raised; the caller already holds the
    /// in-memory channel results.
    async fn persist_record(
        &self,
        intent: &NotificationIntent,
        status: NotificationStatus,
        error: Option<String>,
    ) {
        let record = NewNotification {
            user_id: intent.user_id.clone(),
            pharmacy_id: intent.pharmacy_id.clone(),
            tenant_id: intent.tenant_id.clone(),
            kind: intent.kind.clone(),
            title: intent.title.clone(),
            message: intent.message.clone(),
            data: intent.data.clone(),
            channels: intent.channels.clone(),
            priority: intent.priority,
            status,
            error,
        };

        if let Err(e) = self.stores.notifications.create(record).await {
            tracing::warn!(
                user_id = %intent.user_id,
                kind = %intent.kind,
                error = %e,
                "Failed to persist notification record"
            );
        }
    }

    /// Notify every active admin/pharmacist at a pharmacy, in parallel.
    /// Zero matching staff is an empty success, not an error.
    #[tracing::instrument(
        name = "dispatch.notify_pharmacists",
        skip(self, data),
        fields(tenant_id = %tenant_id, pharmacy_id = %pharmacy_id, kind = %kind)
    )]
    pub async fn notify_pharmacists(
        &self,
        tenant_id: &str,
        pharmacy_id: &str,
        kind: &str,
        title: &str,
        message: &str,
        data: Value,
    ) -> Result<PharmacistNotifyResult, AppError> {
        let staff = self
            .stores
            .users
            .find_active_users_by_pharmacy_and_roles(pharmacy_id, &PHARMACIST_ROLES)
            .await?
            .into_iter()
            .filter(|user| user.tenant_id == tenant_id)
            .collect::<Vec<_>>();

        let results = self
            .notify_staff(&staff, pharmacy_id, tenant_id, kind, title, message, &data)
            .await;

        Ok(PharmacistNotifyResult {
            success: true,
            results,
        })
    }

    /// Send one notification per staff member, in parallel, over socket
    /// plus email when the member has an email on file.
    async fn notify_staff(
        &self,
        staff: &[UserProfile],
        pharmacy_id: &str,
        tenant_id: &str,
        kind: &str,
        title: &str,
        message: &str,
        data: &Value,
    ) -> Vec<NotificationOutcome> {
        let sends = staff.iter().map(|user| {
            let mut channels = vec![ChannelKind::Socket];
            if user.email.is_some() {
                channels.push(ChannelKind::Email);
            }

            let intent = NotificationIntent::new(&user.id, tenant_id, kind, title, message)
                .pharmacy(pharmacy_id)
                .data(data.clone())
                .channels(channels);

            self.send_notification(intent)
        });

        join_all(sends).await
    }

    /// Notify the order's customer about an order lifecycle event.
    #[tracing::instrument(
        name = "dispatch.order_notification",
        skip(self, extra),
        fields(order_id = %order_id, stage = %stage)
    )]
    pub async fn send_order_notification(
        &self,
        order_id: &str,
        stage: &str,
        extra: Value,
    ) -> Result<NotificationOutcome, AppError> {
        let order = self
            .stores
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

        let mut data = json!({
            "orderId": order.id,
            "total": order.total_amount,
            "customer": order.customer_name,
            "pharmacy": order.pharmacy_name,
            "items": order.item_count,
        });
        merge_into(&mut data, &extra);

        let intent = NotificationIntent::new(
            &order.customer_id,
            &order.tenant_id,
            format!("ORDER_{}", stage),
            format!("Order {}", stage),
            format!("Your order is {}", stage.to_lowercase()),
        )
        .pharmacy(&order.pharmacy_id)
        .data(data)
        .channels(vec![
            ChannelKind::Socket,
            ChannelKind::Sms,
            ChannelKind::Email,
        ]);

        Ok(self.send_notification(intent).await)
    }

    /// Alert a pharmacy's staff about an inventory event (low stock,
    /// expiry, etc).
    #[tracing::instrument(
        name = "dispatch.inventory_notification",
        skip(self, item),
        fields(pharmacy_id = %pharmacy_id, stage = %stage)
    )]
    pub async fn send_inventory_notification(
        &self,
        pharmacy_id: &str,
        stage: &str,
        item: Value,
    ) -> Result<PharmacistNotifyResult, AppError> {
        let pharmacy = self
            .stores
            .pharmacies
            .find_by_id(pharmacy_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Pharmacy not found".to_string()))?;

        let staff = self
            .stores
            .users
            .find_active_users_by_pharmacy_and_roles(pharmacy_id, &INVENTORY_STAFF_ROLES)
            .await?;

        let item_name = item
            .get("itemName")
            .and_then(|n| n.as_str())
            .unwrap_or("item")
            .to_string();

        let results = self
            .notify_staff(
                &staff,
                pharmacy_id,
                &pharmacy.tenant_id,
                &format!("INVENTORY_{}", stage),
                &format!("Inventory {}", stage),
                &format!("Item {} is {}", item_name, stage.to_lowercase()),
                &item,
            )
            .await;

        Ok(PharmacistNotifyResult {
            success: true,
            results,
        })
    }

    /// Notify the prescription's owner about a prescription lifecycle event.
    #[tracing::instrument(
        name = "dispatch.prescription_notification",
        skip(self),
        fields(prescription_id = %prescription_id, stage = %stage)
    )]
    pub async fn send_prescription_notification(
        &self,
        prescription_id: &str,
        stage: &str,
    ) -> Result<NotificationOutcome, AppError> {
        let prescription = self
            .stores
            .prescriptions
            .find_by_id(prescription_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Prescription not found".to_string()))?;

        let intent = NotificationIntent::new(
            &prescription.user_id,
            &prescription.tenant_id,
            format!("PRESCRIPTION_{}", stage),
            format!("Prescription {}", stage),
            format!("Your prescription is {}", stage.to_lowercase()),
        )
        .pharmacy(&prescription.pharmacy_id)
        .data(json!({
            "prescriptionId": prescription.id,
            "patient": prescription.patient_name,
            "doctor": prescription.doctor_name,
            "items": prescription.item_count,
            "status": prescription.status,
        }))
        .channels(vec![
            ChannelKind::Socket,
            ChannelKind::Sms,
            ChannelKind::Email,
        ]);

        Ok(self.send_notification(intent).await)
    }

    /// Notify the customer (socket + SMS) and, when assigned, the delivery
    /// driver (socket only) about a delivery status change.
    #[tracing::instrument(
        name = "dispatch.delivery_notification",
        skip(self, delivery_data),
        fields(order_id = %order_id, status = %status)
    )]
    pub async fn send_delivery_notification(
        &self,
        order_id: &str,
        status: &str,
        delivery_data: Value,
    ) -> Result<DeliveryNotificationResult, AppError> {
        let order = self
            .stores
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

        let mut data = json!({ "orderId": order.id });
        merge_into(&mut data, &delivery_data);

        let customer_intent = NotificationIntent::new(
            &order.customer_id,
            &order.tenant_id,
            format!("DELIVERY_{}", status),
            format!("Delivery {}", status),
            format!("Your order is {}", status.to_lowercase()),
        )
        .pharmacy(&order.pharmacy_id)
        .data(data.clone())
        .channels(vec![ChannelKind::Socket, ChannelKind::Sms]);

        let customer = self.send_notification(customer_intent).await;

        let driver = match order.delivery_user_id {
            Some(ref driver_id) => {
                let driver_intent = NotificationIntent::new(
                    driver_id,
                    &order.tenant_id,
                    format!("DELIVERY_{}_DRIVER", status),
                    format!("Delivery {}", status),
                    "You have a delivery update",
                )
                .pharmacy(&order.pharmacy_id)
                .data(data)
                .channels(vec![ChannelKind::Socket]);

                Some(self.send_notification(driver_intent).await)
            }
            None => None,
        };

        Ok(DeliveryNotificationResult {
            success: true,
            order_id: order.id,
            customer,
            driver,
        })
    }

    /// Broadcast an announcement to every connection of a tenant.
    pub async fn broadcast_to_tenant(
        &self,
        tenant_id: &str,
        kind: &str,
        message: &str,
        data: Value,
    ) -> usize {
        self.broadcaster
            .publish(
                &RoomKey::tenant(tenant_id),
                EventName::TenantNotification,
                json!({
                    "type": kind,
                    "message": message,
                    "data": data,
                }),
            )
            .await
    }

    /// Page of the user's notifications, newest first, with unread count.
    pub async fn get_user_notifications(
        &self,
        user_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<NotificationPage, AppError> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);

        let notifications = self
            .stores
            .notifications
            .find_for_user(user_id, page, limit)
            .await?;
        let total = self.stores.notifications.count_for_user(user_id).await?;
        let unread = self
            .stores
            .notifications
            .count_unread_for_user(user_id)
            .await?;

        Ok(NotificationPage {
            success: true,
            notifications,
            pagination: Pagination {
                page,
                limit,
                total,
                pages: total.div_ceil(limit as u64),
                unread,
            },
        })
    }

    /// Mark one of the user's notifications read. Idempotent: repeating the
    /// call succeeds and leaves the original `read_at` in place.
    pub async fn mark_as_read(
        &self,
        user_id: &str,
        notification_id: Uuid,
    ) -> Result<NotificationRecord, AppError> {
        self.stores
            .notifications
            .mark_read(user_id, notification_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))
    }

    /// Mark all of the user's unread notifications read; only currently
    /// unread rows are touched.
    pub async fn mark_all_as_read(&self, user_id: &str) -> Result<u64, AppError> {
        Ok(self.stores.notifications.mark_all_read(user_id).await?)
    }
}

/// Template variables shared by the SMS and email senders.
///
/// Notification data rides along with the message line and the recipient's
/// display name. Data must be a JSON object (or absent); anything else is a
/// malformed intent and fails record construction.
fn channel_vars(intent: &NotificationIntent, user: &UserProfile) -> Result<Value, AppError> {
    let mut vars = match &intent.data {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        _ => {
            return Err(AppError::Validation(
                "Notification data must be a JSON object".to_string(),
            ))
        }
    };

    vars.insert("message".to_string(), Value::String(intent.message.clone()));
    vars.insert("title".to_string(), Value::String(intent.title.clone()));
    vars.insert("userName".to_string(), Value::String(user.name.clone()));

    Ok(Value::Object(vars))
}

/// Merge `extra`'s entries into `base` (both JSON objects); non-object
/// extras are ignored.
fn merge_into(base: &mut Value, extra: &Value) {
    if let (Value::Object(base), Value::Object(extra)) = (base, extra) {
        for (key, value) in extra {
            base.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_into() {
        let mut base = json!({"orderId": "ord-1", "total": 10.0});
        merge_into(&mut base, &json!({"eta": "15m"}));
        assert_eq!(base["eta"], "15m");
        assert_eq!(base["orderId"], "ord-1");

        // Non-object extras are ignored
        merge_into(&mut base, &json!("not-an-object"));
        assert_eq!(base["total"], 10.0);
    }

    #[test]
    fn test_channel_vars_requires_object_data() {
        let user = UserProfile {
            id: "u-1".to_string(),
            tenant_id: "t-1".to_string(),
            pharmacy_id: None,
            name: "Abel".to_string(),
            email: None,
            phone: None,
            role: StaffRole::Customer,
            is_active: true,
        };

        let intent = NotificationIntent::new("u-1", "t-1", "TEST", "Test", "hello")
            .data(json!({"k": "v"}));
        let vars = channel_vars(&intent, &user).unwrap();
        assert_eq!(vars["k"], "v");
        assert_eq!(vars["message"], "hello");
        assert_eq!(vars["userName"], "Abel");

        let bad = NotificationIntent::new("u-1", "t-1", "TEST", "Test", "hello")
            .data(json!([1, 2, 3]));
        assert!(channel_vars(&bad, &user).is_err());
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = DispatcherStats::default();
        stats.dispatched.fetch_add(7, Ordering::Relaxed);
        stats.channel_failures.fetch_add(2, Ordering::Relaxed);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.dispatched, 7);
        assert_eq!(snapshot.channel_failures, 2);
        assert_eq!(snapshot.failed_dispatches, 0);
    }
}
