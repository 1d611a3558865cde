//! WhatsApp Business Cloud API transport
//!
//! Talks to the official WhatsApp Business Platform (Cloud API).
//! Requires an access token and a Phone Number ID from Meta Business Suite.
//! Delivery acknowledgements arrive out of band through the webhook
//! endpoint, not through this client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use zapflow_storage::models::ImageAttachment;

use super::{Transport, TransportError};

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v18.0";

/// Cloud API transport configuration
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Graph API access token
    pub access_token: String,
    /// WhatsApp Phone Number ID
    pub phone_number_id: String,
    /// API base URL override (tests point this at a local server)
    pub api_base: Option<String>,
}

/// WhatsApp Business Cloud API transport
pub struct CloudApiTransport {
    config: CloudConfig,
    client: reqwest::Client,
    connected: AtomicBool,
}

impl CloudApiTransport {
    pub fn new(config: CloudConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            config,
            client,
            connected: AtomicBool::new(false),
        }
    }

    fn api_base(&self) -> &str {
        self.config.api_base.as_deref().unwrap_or(GRAPH_API_BASE)
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.api_base(), self.config.phone_number_id)
    }

    async fn post_message(
        &self,
        body: serde_json::Value,
    ) -> Result<String, TransportError> {
        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(TransportError::AuthFailed(text));
            }
            return Err(TransportError::Rejected(format!("{}: {}", status, text)));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TransportError::Rejected(format!("invalid response: {}", e)))?;

        result["messages"][0]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TransportError::Rejected("response carried no message id".to_string()))
    }
}

#[async_trait]
impl Transport for CloudApiTransport {
    /// Verify the credentials by reading the phone number resource
    async fn connect(&self) -> Result<(), TransportError> {
        if self.config.access_token.is_empty() || self.config.phone_number_id.is_empty() {
            return Err(TransportError::AuthFailed(
                "access token or phone number id not configured".to_string(),
            ));
        }

        let url = format!("{}/{}", self.api_base(), self.config.phone_number_id);
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        if response.status().is_success() {
            self.connected.store(true, Ordering::SeqCst);
            info!(phone_id = %self.config.phone_number_id, "Cloud API transport connected");
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(TransportError::AuthFailed(text))
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Send image attachments in order, then the text body.
    /// The id of the last message sent identifies the send for
    /// acknowledgement correlation.
    async fn send_message(
        &self,
        phone: &str,
        text: &str,
        images: &[ImageAttachment],
    ) -> Result<String, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let mut last_id = None;

        for image in images {
            let body = serde_json::json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": phone,
                "type": "image",
                "image": {
                    "link": image.path,
                    "caption": image.caption.clone().unwrap_or_default(),
                }
            });
            last_id = Some(self.post_message(body).await?);
        }

        if !text.is_empty() {
            let body = serde_json::json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": phone,
                "type": "text",
                "text": {
                    "preview_url": false,
                    "body": text,
                }
            });
            last_id = Some(self.post_message(body).await?);
        }

        let id = last_id
            .ok_or_else(|| TransportError::Rejected("message had no content".to_string()))?;
        debug!(provider_id = %id, to = %phone, "Message handed to provider");
        Ok(id)
    }
}
