use std::sync::Arc;

use crate::auth::JwtValidator;
use crate::broadcast::Broadcaster;
use crate::channels::{create_email_sender, create_sms_sender};
use crate::collab::CollaborationCoordinator;
use crate::config::Settings;
use crate::notification::NotificationDispatcher;
use crate::registry::ConnectionRegistry;
use crate::store::Stores;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub jwt_validator: Arc<JwtValidator>,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub coordinator: Arc<CollaborationCoordinator>,
    pub stores: Stores,
}

impl AppState {
    /// Wire the component graph: registry -> broadcaster -> dispatcher and
    /// coordinator. The broadcaster is constructed here and injected
    /// everywhere it is needed; nothing holds a global handle.
    pub fn new(settings: Settings, stores: Stores) -> Self {
        let jwt_validator = Arc::new(JwtValidator::new(&settings.jwt));
        let registry = Arc::new(ConnectionRegistry::new(
            jwt_validator.clone(),
            stores.users.clone(),
        ));
        let broadcaster = Arc::new(Broadcaster::new(registry.clone()));

        let email = create_email_sender(&settings.email);
        let sms = create_sms_sender(&settings.sms);

        let dispatcher = Arc::new(NotificationDispatcher::new(
            stores.clone(),
            email,
            sms,
            broadcaster.clone(),
        ));
        let coordinator = Arc::new(CollaborationCoordinator::new(
            broadcaster.clone(),
            stores.inventory.clone(),
        ));

        Self {
            settings: Arc::new(settings),
            jwt_validator,
            registry,
            broadcaster,
            dispatcher,
            coordinator,
            stores,
        }
    }
}
