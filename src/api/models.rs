use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct PharmacistNotifyRequest {
    pub tenant_id: String,
    pub pharmacy_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct OrderStageRequest {
    pub stage: String,
    #[serde(default)]
    pub extra: Value,
}

#[derive(Debug, Deserialize)]
pub struct InventoryAlertRequest {
    pub stage: String,
    pub item: Value,
}

#[derive(Debug, Deserialize)]
pub struct PrescriptionStageRequest {
    pub stage: String,
}

#[derive(Debug, Deserialize)]
pub struct DeliveryStatusRequest {
    pub status: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct TenantBroadcastRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct InventoryUpdateRequest {
    pub pharmacy_id: String,
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub success: bool,
    pub delivered: usize,
}

#[derive(Debug, Serialize)]
pub struct MarkAllReadResponse {
    pub success: bool,
    pub updated: u64,
}
