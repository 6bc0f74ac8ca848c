//! Twilio SMS sender.
//!
//! One `POST {api_base}/2010-04-01/Accounts/{sid}/Messages.json` per attempt,
//! form encoded, HTTP basic auth with the account SID and auth token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use herald_common::config::AppConfig;
use herald_common::error::DeliveryError;
use herald_common::notification::Notification;
use herald_engine::ports::NotificationSender;

use crate::message::MessageRenderer;

/// Provider body kept on a rejection, in characters.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    pub api_base_url: String,
    pub timeout: Duration,
}

impl TwilioConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            account_sid: config.twilio_account_sid.clone(),
            auth_token: config.twilio_auth_token.clone(),
            from_number: config.twilio_phone_number.clone(),
            api_base_url: config.twilio_api_base_url.clone(),
            timeout: Duration::from_secs(config.sms_timeout_secs),
        }
    }

    pub fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base_url.trim_end_matches('/'),
            self.account_sid
        )
    }
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: Option<String>,
    status: Option<String>,
}

pub struct TwilioSender {
    client: reqwest::Client,
    config: TwilioConfig,
    renderer: Arc<dyn MessageRenderer>,
}

impl TwilioSender {
    pub fn new(config: TwilioConfig, renderer: Arc<dyn MessageRenderer>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config,
            renderer,
        })
    }

    /// Form fields for one outbound message.
    pub fn form_params(&self, notification: &Notification) -> [(&'static str, String); 3] {
        [
            ("To", notification.recipient().phone_number().to_string()),
            ("From", self.config.from_number.clone()),
            ("Body", self.renderer.render(notification)),
        ]
    }
}

#[async_trait]
impl NotificationSender for TwilioSender {
    async fn send(&self, notification: &Notification) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.config.messages_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&self.form_params(notification))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    notification_id = %notification.id(),
                    error = %e,
                    "SMS request failed"
                );
                DeliveryError::Network(e.to_string())
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            tracing::error!(
                notification_id = %notification.id(),
                status = status.as_u16(),
                "SMS provider rejected message"
            );
            return Err(DeliveryError::Provider {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let resource: Option<MessageResource> = serde_json::from_str(&body).ok();
        let (sid, provider_status) = resource
            .map(|r| (r.sid, r.status))
            .unwrap_or((None, None));
        tracing::info!(
            notification_id = %notification.id(),
            message_sid = sid.as_deref().unwrap_or("unknown"),
            provider_status = provider_status.as_deref().unwrap_or("unknown"),
            "SMS sent"
        );
        Ok(())
    }
}
