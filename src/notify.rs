//! Outbound notification capability. One email goes out per submission,
//! to the fixed awards address, with the evidence files attached. The
//! shipped implementation talks to the Postmark HTTP API.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::json;

use crate::error::{AwardsError, Result};

#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &Notification) -> Result<()>;
}

const POSTMARK_ENDPOINT: &str = "https://api.postmarkapp.com/email";

pub struct PostmarkNotifier {
    client: reqwest::Client,
    server_token: String,
}

impl PostmarkNotifier {
    pub fn new(server_token: &str) -> Self {
        PostmarkNotifier {
            client: reqwest::Client::new(),
            server_token: server_token.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for PostmarkNotifier {
    async fn send(&self, message: &Notification) -> Result<()> {
        let attachments: Vec<serde_json::Value> = message
            .attachments
            .iter()
            .map(|a| {
                json!({
                    "Name": a.file_name,
                    "Content": BASE64.encode(&a.bytes),
                    "ContentType": a.content_type,
                })
            })
            .collect();

        let payload = json!({
            "From": message.sender,
            "To": message.recipient,
            "Subject": message.subject,
            "TextBody": message.body,
            "Attachments": attachments,
        });

        let response = self
            .client
            .post(POSTMARK_ENDPOINT)
            .header("Accept", "application/json")
            .header("X-Postmark-Server-Token", self.server_token.as_str())
            .json(&payload)
            .send()
            .await
            .map_err(|e| AwardsError::Notify(format!("postmark request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(AwardsError::Notify(format!(
                "postmark rejected the message ({status}): {detail}"
            )));
        }
        Ok(())
    }
}
