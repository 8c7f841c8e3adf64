pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod identity;
pub mod notifications;
pub mod presence;
pub mod registry;
pub mod store;

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::dispatcher::Dispatcher;
use crate::identity::Identity;
use crate::notifications::NotificationCenter;
use crate::presence::PresenceTracker;
use crate::registry::ConnectionRegistry;
use crate::store::ChatStore;

/// Shared state of the realtime core. Cheap to clone; every clone sees the
/// same registry.
#[derive(Clone)]
pub struct Gateway {
    pub config: GatewayConfig,
    pub store: Arc<dyn ChatStore>,
    pub identity: Arc<dyn Identity>,
    pub registry: ConnectionRegistry,
    pub dispatcher: Dispatcher,
    pub presence: PresenceTracker,
    pub notifications: NotificationCenter,
}

impl Gateway {
    pub fn new(store: Arc<dyn ChatStore>, identity: Arc<dyn Identity>, config: GatewayConfig) -> Self {
        let registry = ConnectionRegistry::new();
        Self {
            dispatcher: Dispatcher::new(registry.clone(), config.send_timeout),
            presence: PresenceTracker::new(store.clone(), config.presence_threshold),
            notifications: NotificationCenter::new(store.clone()),
            registry,
            store,
            identity,
            config,
        }
    }
}
