//! Webhook delivery of task events.
//!
//! Before a push notification config is accepted, the target URL must
//! prove ownership: the sender issues a challenge request carrying a
//! random token and the endpoint must echo it back. Delivery itself is
//! fire-and-forget relative to the task state change that triggered it;
//! failures are logged and never roll back the transition.

use crate::errors::A2AResult;
use a2a_types::{PushNotificationConfig, TaskEvent};
use std::time::Duration;
use tracing::debug;

/// Contract for verifying and delivering webhook notifications.
#[async_trait::async_trait]
pub trait PushNotificationSender: Send + Sync {
    /// Best-effort liveness/ownership check for a webhook URL. A config
    /// whose URL fails verification must not be persisted.
    async fn verify_url(&self, url: &str) -> bool;

    /// Posts the event payload to the configured webhook, attaching the
    /// configured credential as a bearer token.
    async fn send(&self, config: &PushNotificationConfig, event: &TaskEvent) -> A2AResult<()>;
}

/// HTTP implementation of [`PushNotificationSender`] built on `reqwest`.
pub struct HttpPushNotificationSender {
    client: reqwest::Client,
}

impl HttpPushNotificationSender {
    /// Creates a sender with a bounded request timeout so a slow webhook
    /// cannot stall event distribution.
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Creates a sender over an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn bearer_credential(config: &PushNotificationConfig) -> Option<&str> {
        if let Some(auth) = &config.authentication {
            let supports_bearer = auth
                .schemes
                .iter()
                .any(|scheme| scheme.eq_ignore_ascii_case("bearer"));
            if supports_bearer {
                if let Some(credentials) = auth.credentials.as_deref() {
                    return Some(credentials);
                }
            }
        }
        config.token.as_deref()
    }
}

impl Default for HttpPushNotificationSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PushNotificationSender for HttpPushNotificationSender {
    async fn verify_url(&self, url: &str) -> bool {
        let challenge = uuid::Uuid::new_v4().to_string();
        let response = self
            .client
            .get(url)
            .query(&[("validationToken", challenge.as_str())])
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => body.trim() == challenge,
                Err(error) => {
                    debug!(%url, %error, "push notification challenge body unreadable");
                    false
                }
            },
            Ok(response) => {
                debug!(%url, status = %response.status(), "push notification challenge rejected");
                false
            }
            Err(error) => {
                debug!(%url, %error, "push notification challenge request failed");
                false
            }
        }
    }

    async fn send(&self, config: &PushNotificationConfig, event: &TaskEvent) -> A2AResult<()> {
        let mut request = self.client.post(&config.url).json(event);
        if let Some(credential) = Self::bearer_credential(config) {
            request = request.bearer_auth(credential);
        }

        request.send().await?.error_for_status()?;
        Ok(())
    }
}
