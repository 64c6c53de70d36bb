//! HTTP trigger and read-state handlers.
//!
//! Every endpoint requires a bearer JWT. Trigger endpoints are called by
//! the surrounding backend services; the read-state endpoints operate on
//! the authenticated caller's own notifications.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    Json,
};
use uuid::Uuid;

use crate::auth::Claims;
use crate::collab::EditingUser;
use crate::error::{AppError, Result};
use crate::notification::{
    DeliveryNotificationResult, NotificationIntent, NotificationOutcome, NotificationPage,
    PharmacistNotifyResult,
};
use crate::rooms::{EventName, RoomKey};
use crate::server::AppState;
use crate::store::{InventoryFieldChange, NotificationRecord};

use super::models::{
    DeliveryStatusRequest, InventoryAlertRequest, InventoryUpdateRequest, MarkAllReadResponse,
    OrderStageRequest, PageQuery, PharmacistNotifyRequest, PrescriptionStageRequest,
    PublishResponse, TenantBroadcastRequest,
};

/// Resolve and validate the caller's bearer token.
fn bearer_claims(state: &AppState, headers: &HeaderMap) -> Result<Claims> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Auth("Missing bearer token".to_string()))?;

    state.jwt_validator.validate(token)
}

#[tracing::instrument(
    name = "http.send_notification",
    skip(state, headers, intent),
    fields(user_id = %intent.user_id, kind = %intent.kind)
)]
pub async fn send_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(intent): Json<NotificationIntent>,
) -> Result<Json<NotificationOutcome>> {
    bearer_claims(&state, &headers)?;

    Ok(Json(state.dispatcher.send_notification(intent).await))
}

#[tracing::instrument(
    name = "http.notify_pharmacists",
    skip(state, headers, request),
    fields(pharmacy_id = %request.pharmacy_id, kind = %request.kind)
)]
pub async fn notify_pharmacists(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PharmacistNotifyRequest>,
) -> Result<Json<PharmacistNotifyResult>> {
    bearer_claims(&state, &headers)?;

    let result = state
        .dispatcher
        .notify_pharmacists(
            &request.tenant_id,
            &request.pharmacy_id,
            &request.kind,
            &request.title,
            &request.message,
            request.data,
        )
        .await?;

    Ok(Json(result))
}

#[tracing::instrument(
    name = "http.order_notification",
    skip(state, headers, request),
    fields(order_id = %order_id, stage = %request.stage)
)]
pub async fn order_notification(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<OrderStageRequest>,
) -> Result<Json<NotificationOutcome>> {
    bearer_claims(&state, &headers)?;

    let outcome = state
        .dispatcher
        .send_order_notification(&order_id, &request.stage, request.extra)
        .await?;

    Ok(Json(outcome))
}

#[tracing::instrument(
    name = "http.inventory_notification",
    skip(state, headers, request),
    fields(pharmacy_id = %pharmacy_id, stage = %request.stage)
)]
pub async fn inventory_notification(
    State(state): State<AppState>,
    Path(pharmacy_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<InventoryAlertRequest>,
) -> Result<Json<PharmacistNotifyResult>> {
    bearer_claims(&state, &headers)?;

    let result = state
        .dispatcher
        .send_inventory_notification(&pharmacy_id, &request.stage, request.item)
        .await?;

    Ok(Json(result))
}

#[tracing::instrument(
    name = "http.prescription_notification",
    skip(state, headers, request),
    fields(prescription_id = %prescription_id, stage = %request.stage)
)]
pub async fn prescription_notification(
    State(state): State<AppState>,
    Path(prescription_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<PrescriptionStageRequest>,
) -> Result<Json<NotificationOutcome>> {
    bearer_claims(&state, &headers)?;

    let outcome = state
        .dispatcher
        .send_prescription_notification(&prescription_id, &request.stage)
        .await?;

    Ok(Json(outcome))
}

#[tracing::instrument(
    name = "http.delivery_notification",
    skip(state, headers, request),
    fields(order_id = %order_id, status = %request.status)
)]
pub async fn delivery_notification(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<DeliveryStatusRequest>,
) -> Result<Json<DeliveryNotificationResult>> {
    bearer_claims(&state, &headers)?;

    let result = state
        .dispatcher
        .send_delivery_notification(&order_id, &request.status, request.data)
        .await?;

    Ok(Json(result))
}

#[tracing::instrument(
    name = "http.tenant_broadcast",
    skip(state, headers, request),
    fields(tenant_id = %tenant_id, kind = %request.kind)
)]
pub async fn tenant_broadcast(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<TenantBroadcastRequest>,
) -> Result<Json<PublishResponse>> {
    bearer_claims(&state, &headers)?;

    let delivered = state
        .dispatcher
        .broadcast_to_tenant(&tenant_id, &request.kind, &request.message, request.data)
        .await;

    Ok(Json(PublishResponse {
        success: true,
        delivered,
    }))
}

/// Push an order status payload to everyone watching the order.
#[tracing::instrument(name = "http.order_event", skip(state, headers, data), fields(order_id = %order_id))]
pub async fn order_event(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
    Json(data): Json<serde_json::Value>,
) -> Result<Json<PublishResponse>> {
    bearer_claims(&state, &headers)?;

    let delivered = state
        .broadcaster
        .publish(&RoomKey::order(&order_id), EventName::OrderUpdate, data)
        .await;

    Ok(Json(PublishResponse {
        success: true,
        delivered,
    }))
}

/// Push a courier location update to everyone watching the order.
#[tracing::instrument(name = "http.delivery_location", skip(state, headers, data), fields(order_id = %order_id))]
pub async fn delivery_location(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
    Json(data): Json<serde_json::Value>,
) -> Result<Json<PublishResponse>> {
    bearer_claims(&state, &headers)?;

    let delivered = state
        .broadcaster
        .publish(
            &RoomKey::order(&order_id),
            EventName::DeliveryLocationUpdate,
            data,
        )
        .await;

    Ok(Json(PublishResponse {
        success: true,
        delivered,
    }))
}

/// Collaborative single-field inventory update: announces editing, applies
/// the change, broadcasts it, and schedules the delayed release.
#[tracing::instrument(
    name = "http.update_inventory",
    skip(state, headers, request),
    fields(item_id = %item_id, field = %request.field)
)]
pub async fn update_inventory(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<InventoryUpdateRequest>,
) -> Result<Json<InventoryFieldChange>> {
    let claims = bearer_claims(&state, &headers)?;

    // Display name for the presence signal; fall back to the bare id for
    // callers not present in the user directory.
    let name = state
        .stores
        .users
        .find_user_by_id(claims.user_id())
        .await?
        .map(|u| u.name)
        .unwrap_or_else(|| claims.user_id().to_string());

    let editor = EditingUser {
        id: claims.user_id().to_string(),
        name,
    };

    let update = state
        .coordinator
        .update_inventory_field(
            &request.pharmacy_id,
            &item_id,
            &request.field,
            request.value,
            editor,
        )
        .await?;

    Ok(Json(update.change))
}

#[tracing::instrument(name = "http.list_notifications", skip(state, headers, query))]
pub async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<NotificationPage>> {
    let claims = bearer_claims(&state, &headers)?;

    let page = state
        .dispatcher
        .get_user_notifications(claims.user_id(), query.page, query.limit)
        .await?;

    Ok(Json(page))
}

#[tracing::instrument(name = "http.mark_read", skip(state, headers), fields(notification_id = %id))]
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<NotificationRecord>> {
    let claims = bearer_claims(&state, &headers)?;

    let record = state.dispatcher.mark_as_read(claims.user_id(), id).await?;

    Ok(Json(record))
}

#[tracing::instrument(name = "http.mark_all_read", skip(state, headers))]
pub async fn mark_all_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MarkAllReadResponse>> {
    let claims = bearer_claims(&state, &headers)?;

    let updated = state.dispatcher.mark_all_as_read(claims.user_id()).await?;

    Ok(Json(MarkAllReadResponse {
        success: true,
        updated,
    }))
}
