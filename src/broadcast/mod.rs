//! Room-scoped event broadcasting.
//!
//! The broadcaster fans an event out to every connection currently in a
//! room. Delivery is immediate and best-effort: no queueing, no retries,
//! no acknowledgment. A room with zero members is a normal case and the
//! event is simply dropped for that room.
//!
//! The broadcaster is an explicitly constructed instance owned by the
//! application state and injected into everything that publishes; there
//! is no global handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::ConnectionRegistry;
use crate::rooms::{EventName, RoomKey};
use crate::websocket::ServerMessage;

/// Deliveries within one publish run concurrently in batches of this size.
const MAX_CONCURRENT_SENDS: usize = 64;

/// Event envelope delivered to room members. Every published payload is
/// enriched with a generated id and a UTC timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomEvent {
    pub id: Uuid,
    pub event: EventName,
    pub room: String,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Counters for published events and delivery outcomes.
#[derive(Debug, Default)]
pub struct BroadcasterStats {
    pub published: AtomicU64,
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
    pub empty_rooms: AtomicU64,
}

impl BroadcasterStats {
    pub fn snapshot(&self) -> BroadcasterStatsSnapshot {
        BroadcasterStatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            empty_rooms: self.empty_rooms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcasterStatsSnapshot {
    pub published: u64,
    pub delivered: u64,
    pub failed: u64,
    pub empty_rooms: u64,
}

/// Publishes typed events to named rooms.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    stats: BroadcasterStats,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            stats: BroadcasterStats::default(),
        }
    }

    pub fn stats(&self) -> BroadcasterStatsSnapshot {
        self.stats.snapshot()
    }

    /// Publish an event to every current member of a room.
    ///
    /// Never fails: delivery problems are counted and logged, not raised.
    /// Events published to the same room from the same caller are delivered
    /// in publish order to each member that stays connected. Returns the
    /// number of connections the event was handed to.
    #[tracing::instrument(
        name = "broadcast.publish",
        skip(self, payload),
        fields(room = %room, event = %event)
    )]
    pub async fn publish(
        &self,
        room: &RoomKey,
        event: EventName,
        payload: serde_json::Value,
    ) -> usize {
        self.stats.published.fetch_add(1, Ordering::Relaxed);

        let members = self.registry.members(room);
        if members.is_empty() {
            self.stats.empty_rooms.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(room = %room, event = %event, "No members in room, event dropped");
            return 0;
        }

        let room_event = RoomEvent {
            id: Uuid::new_v4(),
            event,
            room: room.to_string(),
            timestamp: Utc::now(),
            payload,
        };
        let message = ServerMessage::Event {
            event: room_event,
        };

        let mut delivered = 0;
        let mut failed = 0;

        // Small rooms are the common case; send sequentially. Larger rooms
        // fan out in bounded batches.
        if members.len() <= 4 {
            for conn in &members {
                match conn.send(message.clone()).await {
                    Ok(_) => delivered += 1,
                    Err(_) => failed += 1,
                }
            }
        } else {
            for batch in members.chunks(MAX_CONCURRENT_SENDS) {
                let sends = batch.iter().map(|conn| {
                    let conn = conn.clone();
                    let message = message.clone();
                    async move { conn.send(message).await.is_ok() }
                });

                for ok in join_all(sends).await {
                    if ok {
                        delivered += 1;
                    } else {
                        failed += 1;
                    }
                }
            }
        }

        self.stats.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats.failed.fetch_add(failed as u64, Ordering::Relaxed);

        tracing::debug!(
            room = %room,
            event = %event,
            delivered = delivered,
            failed = failed,
            "Event published"
        );

        delivered
    }
}
