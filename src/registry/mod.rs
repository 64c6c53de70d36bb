//! Connection registry: handshake authentication and room membership.
//!
//! A connection is authenticated exactly once, at handshake, before any
//! event flows. On success it is bound to `{user_id, tenant_id, role}` and
//! joined to its `user:` and `tenant:` rooms; on failure it is never
//! admitted into any room. Membership lives only here and only for the
//! lifetime of the connection.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::JwtValidator;
use crate::error::AppError;
use crate::rooms::RoomKey;
use crate::store::{StaffRole, UserStore};
use crate::websocket::ServerMessage;

/// Scope resolved for an authenticated connection.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub user_id: String,
    pub tenant_id: String,
    pub role: StaffRole,
}

/// Handle for a single live connection.
pub struct ConnectionHandle {
    pub id: Uuid,
    pub user_id: String,
    pub tenant_id: String,
    pub role: StaffRole,
    pub sender: mpsc::Sender<ServerMessage>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    fn new(ctx: &ConnectionContext, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: ctx.user_id.clone(),
            tenant_id: ctx.tenant_id.clone(),
            role: ctx.role,
            sender,
            connected_at: Utc::now(),
        }
    }

    pub async fn send(
        &self,
        message: ServerMessage,
    ) -> Result<(), mpsc::error::SendError<ServerMessage>> {
        self.sender.send(message).await
    }
}

/// Tracks live connections and which rooms each belongs to.
pub struct ConnectionRegistry {
    jwt_validator: Arc<JwtValidator>,
    users: Arc<dyn UserStore>,
    /// connection_id -> handle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
    /// room key (wire form) -> member connection ids
    rooms: DashMap<String, HashSet<Uuid>>,
}

impl ConnectionRegistry {
    pub fn new(jwt_validator: Arc<JwtValidator>, users: Arc<dyn UserStore>) -> Self {
        Self {
            jwt_validator,
            users,
            connections: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    /// Authenticate a handshake token and resolve its connection scope.
    ///
    /// Runs once per connection lifetime. Verifies the token signature and
    /// expiry, then requires the subject to be a known, active user.
    pub async fn authenticate(&self, raw_token: &str) -> Result<ConnectionContext, AppError> {
        let claims = self.jwt_validator.validate(raw_token)?;

        let user = self
            .users
            .find_user_by_id(claims.user_id())
            .await
            .map_err(|e| AppError::Internal(format!("User lookup failed: {}", e)))?;

        let user = match user {
            Some(user) if user.is_active => user,
            _ => return Err(AppError::Auth("User not found or inactive".to_string())),
        };

        Ok(ConnectionContext {
            user_id: user.id,
            tenant_id: user.tenant_id,
            role: user.role,
        })
    }

    /// Register an authenticated connection. The connection is joined to
    /// exactly its `user:` and `tenant:` rooms.
    pub fn register(
        &self,
        ctx: &ConnectionContext,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(ctx, sender));
        let conn_id = handle.id;

        self.connections.insert(conn_id, handle.clone());
        self.join(conn_id, &RoomKey::user(&ctx.user_id));
        self.join(conn_id, &RoomKey::tenant(&ctx.tenant_id));

        tracing::info!(
            connection_id = %conn_id,
            user_id = %handle.user_id,
            tenant_id = %handle.tenant_id,
            "Connection registered"
        );

        handle
    }

    /// Unregister a connection and remove it from every room.
    pub fn unregister(&self, connection_id: Uuid) {
        if let Some((_, handle)) = self.connections.remove(&connection_id) {
            for mut entry in self.rooms.iter_mut() {
                entry.value_mut().remove(&connection_id);
            }
            self.rooms.retain(|_, members| !members.is_empty());

            tracing::info!(
                connection_id = %connection_id,
                user_id = %handle.user_id,
                "Connection unregistered"
            );
        }
    }

    /// Join a connection to a room.
    pub fn join(&self, connection_id: Uuid, room: &RoomKey) {
        if !self.connections.contains_key(&connection_id) {
            return;
        }

        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(connection_id);

        tracing::debug!(connection_id = %connection_id, room = %room, "Joined room");
    }

    /// Remove a connection from a room.
    pub fn leave(&self, connection_id: Uuid, room: &RoomKey) {
        let key = room.to_string();
        if let Some(mut members) = self.rooms.get_mut(&key) {
            members.remove(&connection_id);
            if members.is_empty() {
                drop(members);
                self.rooms.remove(&key);
            }
        }

        tracing::debug!(connection_id = %connection_id, room = %room, "Left room");
    }

    /// Current members of a room. An unknown room is simply empty.
    pub fn members(&self, room: &RoomKey) -> Vec<Arc<ConnectionHandle>> {
        self.rooms
            .get(&room.to_string())
            .map(|member_ids| {
                member_ids
                    .iter()
                    .filter_map(|id| self.connections.get(id).map(|h| h.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
