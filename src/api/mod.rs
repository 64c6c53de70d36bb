mod handlers;
mod health;
mod models;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::server::AppState;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/api/notifications",
            post(handlers::send_notification).get(handlers::list_notifications),
        )
        .route("/api/notifications/read-all", post(handlers::mark_all_read))
        .route("/api/notifications/{id}/read", post(handlers::mark_read))
        .route(
            "/api/notifications/pharmacists",
            post(handlers::notify_pharmacists),
        )
        .route(
            "/api/notifications/orders/{order_id}",
            post(handlers::order_notification),
        )
        .route(
            "/api/notifications/inventory/{pharmacy_id}",
            post(handlers::inventory_notification),
        )
        .route(
            "/api/notifications/prescriptions/{prescription_id}",
            post(handlers::prescription_notification),
        )
        .route(
            "/api/notifications/deliveries/{order_id}",
            post(handlers::delivery_notification),
        )
        .route(
            "/api/tenants/{tenant_id}/broadcast",
            post(handlers::tenant_broadcast),
        )
        .route("/api/orders/{order_id}/events", post(handlers::order_event))
        .route(
            "/api/orders/{order_id}/location",
            post(handlers::delivery_location),
        )
        .route("/api/inventory/{item_id}", put(handlers::update_inventory))
}
