mod dispatcher;
mod types;

pub use dispatcher::{DispatcherStats, DispatcherStatsSnapshot, NotificationDispatcher};
pub use types::{
    ChannelResult, DeliveryNotificationResult, NotificationIntent, NotificationOutcome,
    NotificationPage, NotificationStatus, Pagination, PharmacistNotifyResult, Priority,
};
