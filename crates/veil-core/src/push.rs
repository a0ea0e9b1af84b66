//! Push-notification relay registration.
//!
//! Registers the device's push token with the notification relay, keeps
//! closed-group subscriptions in step, and unregisters. Every request travels
//! over the anonymizing path and is retried on transport failure.
//!
//! Registration outcomes are reported as a [`RegistrationStatus`] rather than
//! an error: callers fire and forget, and failures are logged here.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::PushConfig;
use crate::errors::NetworkError;
use crate::network::{OnionRequestSender, RelayRequest};
use crate::retry::retry_if_needed;
use crate::store::{ClosedGroupKeyStore, PushPreferences};

/// Attempts made for each relay request.
pub const MAX_RETRY_COUNT: u32 = 4;

/// Age after which an unchanged token is registered again.
pub const TOKEN_EXPIRATION_INTERVAL: Duration = Duration::from_secs(12 * 60 * 60);

/// Closed-group subscription change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedGroupOperation {
    Subscribe,
    Unsubscribe,
}

impl ClosedGroupOperation {
    /// Relay endpoint for this operation.
    pub const fn raw_value(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe_closed_group",
            Self::Unsubscribe => "unsubscribe_closed_group",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    /// Nothing was sent
    Skipped,
    Succeeded,
    Failed,
}

/// Relay reply. Success is exactly `code == 0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RelayResponse {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RelayResponse {
    /// Interpret a reply body. Anything that is not an object with an
    /// integer `code` reads as a response without a code.
    pub fn from_json(value: &Value) -> Self {
        Self {
            code: value.get("code").and_then(Value::as_i64),
            message: value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    fn message_or_null(&self) -> &str {
        self.message.as_deref().unwrap_or("null")
    }
}

/// Client for the push-notification relay.
pub struct PushNotificationManager {
    sender: Arc<dyn OnionRequestSender>,
    preferences: Arc<dyn PushPreferences>,
    groups: Arc<dyn ClosedGroupKeyStore>,
    config: PushConfig,
}

impl PushNotificationManager {
    pub fn new(
        sender: Arc<dyn OnionRequestSender>,
        preferences: Arc<dyn PushPreferences>,
        groups: Arc<dyn ClosedGroupKeyStore>,
        config: PushConfig,
    ) -> Self {
        Self {
            sender,
            preferences,
            groups,
            config,
        }
    }

    /// Register `token` for `public_key`, then subscribe to every closed group.
    ///
    /// Skipped when not forced, the token is unchanged and the last upload is
    /// younger than the token expiration interval.
    pub async fn register(&self, token: &str, public_key: &str, force: bool) -> RegistrationStatus {
        let now = Utc::now().timestamp_millis();
        let last_upload = self.preferences.last_push_upload_ms();
        let expiration_ms = self.config.token_expiration().as_millis() as i64;
        let token_unchanged = self.preferences.push_token().as_deref() == Some(token);

        if !force && token_unchanged && now.saturating_sub(last_upload) < expiration_ms {
            debug!("Push token is fresh, skipping registration");
            return RegistrationStatus::Skipped;
        }

        let body = json!({ "token": token, "pubKey": public_key });
        let status = match self.send("register", body).await {
            Ok(response) if response.is_success() => {
                self.preferences.set_is_using_push(true);
                self.preferences.set_push_token(token);
                self.preferences.set_last_push_upload_ms(now);
                info!("Registered for push notifications");
                RegistrationStatus::Succeeded
            }
            Ok(response) => {
                warn!(
                    code = ?response.code,
                    "Couldn't register for push notifications due to error: {}",
                    response.message_or_null()
                );
                RegistrationStatus::Failed
            }
            Err(e) => {
                warn!(error = %e, "Couldn't register for push notifications");
                RegistrationStatus::Failed
            }
        };

        for group_public_key in self.groups.all_closed_group_public_keys() {
            self.set_group_subscription(ClosedGroupOperation::Subscribe, &group_public_key, public_key)
                .await;
        }

        status
    }

    /// Unsubscribe from every closed group, then unregister `token`.
    pub async fn unregister(&self, token: &str) -> RegistrationStatus {
        // Subscriptions go first; they are skipped once push is disabled
        match self.preferences.local_session_id() {
            Some(local_session_id) => {
                for group_public_key in self.groups.all_closed_group_public_keys() {
                    self.set_group_subscription(
                        ClosedGroupOperation::Unsubscribe,
                        &group_public_key,
                        &local_session_id,
                    )
                    .await;
                }
            }
            None => debug!("No local session id, skipping closed group unsubscribes"),
        }

        match self.send("unregister", json!({ "token": token })).await {
            Ok(response) if response.is_success() => {
                self.preferences.set_is_using_push(false);
                info!("Unregistered from push notifications");
                RegistrationStatus::Succeeded
            }
            Ok(response) => {
                warn!(
                    code = ?response.code,
                    "Couldn't unregister from push notifications due to error: {}",
                    response.message_or_null()
                );
                RegistrationStatus::Failed
            }
            Err(e) => {
                warn!(error = %e, "Couldn't unregister from push notifications");
                RegistrationStatus::Failed
            }
        }
    }

    /// Subscribe or unsubscribe `public_key` for a closed group's
    /// notifications. A no-op unless push is enabled.
    pub async fn set_group_subscription(
        &self,
        operation: ClosedGroupOperation,
        group_public_key: &str,
        public_key: &str,
    ) -> RegistrationStatus {
        if !self.preferences.is_using_push() {
            return RegistrationStatus::Skipped;
        }

        let body = json!({ "closedGroupPublicKey": group_public_key, "pubKey": public_key });
        match self.send(operation.raw_value(), body).await {
            Ok(response) if response.is_success() => RegistrationStatus::Succeeded,
            Ok(response) => {
                warn!(
                    operation = operation.raw_value(),
                    code = ?response.code,
                    "Couldn't subscribe/unsubscribe closed group: {}",
                    response.message_or_null()
                );
                RegistrationStatus::Failed
            }
            Err(e) => {
                warn!(operation = operation.raw_value(), error = %e, "Couldn't subscribe/unsubscribe closed group");
                RegistrationStatus::Failed
            }
        }
    }

    async fn send(&self, path: &str, body: Value) -> Result<RelayResponse, NetworkError> {
        let url = format!("{}/{}", self.config.server_url.trim_end_matches('/'), path);
        let response = retry_if_needed(self.config.max_retry_count, || {
            let request = RelayRequest::post_json(url.clone(), body.clone());
            self.sender.send_onion_request(
                request,
                &self.config.server_url,
                &self.config.server_public_key,
            )
        })
        .await?;
        Ok(RelayResponse::from_json(&response))
    }
}
