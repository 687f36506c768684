//! Assembly-time configuration for the protocol handler.

use crate::push::{HttpPushNotificationSender, PushNotificationSender};
use crate::runtime::AgentRuntime;
use crate::store::TaskStore;
use a2a_types::AgentCapabilities;
use std::sync::Arc;

/// Everything a [`crate::handler::ProtocolHandler`] needs: the storage
/// backend, the agent runtime, the push delivery channel, and the
/// capability switches that gate optional protocol surface.
#[derive(Clone)]
pub struct HandlerConfig {
    pub store: Arc<dyn TaskStore>,
    pub runtime: Arc<dyn AgentRuntime>,
    pub push_sender: Arc<dyn PushNotificationSender>,
    pub capabilities: AgentCapabilities,
}

impl HandlerConfig {
    /// Creates a configuration with HTTP push delivery and every
    /// capability enabled.
    #[must_use]
    pub fn new(store: Arc<dyn TaskStore>, runtime: Arc<dyn AgentRuntime>) -> Self {
        Self {
            store,
            runtime,
            push_sender: Arc::new(HttpPushNotificationSender::new()),
            capabilities: AgentCapabilities::default(),
        }
    }

    /// Replaces the push delivery channel.
    #[must_use]
    pub fn with_push_sender(mut self, push_sender: Arc<dyn PushNotificationSender>) -> Self {
        self.push_sender = push_sender;
        self
    }

    /// Replaces the advertised capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: AgentCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}
