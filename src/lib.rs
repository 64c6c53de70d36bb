// Infrastructure layer (shared components)
pub mod auth;
pub mod config;
pub mod error;
pub mod store;

// Domain layer (realtime + notification logic)
pub mod broadcast;
pub mod channels;
pub mod collab;
pub mod notification;
pub mod registry;
pub mod rooms;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;
