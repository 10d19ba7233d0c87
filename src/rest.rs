//! REST boundary - conversation/message history, media upload, user search.
//!
//! Opaque request/response collaborator; failures surface as
//! [`Error::Request`] notices and never touch the realtime components.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::models::{Conversation, Message, MessageType, UserRef};
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;

/// Upload cap for image and voice attachments.
const MAX_MEDIA_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    #[allow(dead_code)]
    success: bool,
    data: T,
}

pub struct RestClient {
    http: Client,
    base_url: String,
    token: Mutex<Option<String>>,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: config.http_url(),
            token: Mutex::new(None),
        })
    }

    pub fn set_token(&self, token: &str) {
        *self.token.lock() = Some(token.to_string());
    }

    fn auth_header(&self) -> Option<String> {
        self.token.lock().as_ref().map(|t| format!("Bearer {}", t))
    }

    pub async fn fetch_conversations(&self) -> Result<Vec<Conversation>> {
        let mut req = self
            .http
            .get(format!("{}/api/conversations", self.base_url));
        if let Some(auth) = self.auth_header() {
            req = req.header("Authorization", auth);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(Error::Request(format!(
                "conversation list fetch failed: {}",
                resp.status()
            )));
        }

        let body: Envelope<Vec<Conversation>> = resp.json().await?;
        Ok(body.data)
    }

    pub async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let mut req = self
            .http
            .get(format!("{}/api/messages/{}", self.base_url, conversation_id));
        if let Some(auth) = self.auth_header() {
            req = req.header("Authorization", auth);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(Error::Request(format!(
                "message history fetch failed: {}",
                resp.status()
            )));
        }

        let body: Envelope<Vec<Message>> = resp.json().await?;
        Ok(body.data)
    }

    /// Upload an image or voice attachment as a new message. The realtime
    /// broadcast delivers the created message back to every participant.
    pub async fn send_media_message(
        &self,
        conversation_id: &str,
        data: Vec<u8>,
        file_name: &str,
        mime_type: &str,
        message_type: MessageType,
        duration_ms: Option<i64>,
        reply_to: Option<String>,
    ) -> Result<Message> {
        if data.len() > MAX_MEDIA_BYTES {
            return Err(Error::Request(format!(
                "media too large: {} bytes (limit {})",
                data.len(),
                MAX_MEDIA_BYTES
            )));
        }

        let part = reqwest::multipart::Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;

        let mut form = reqwest::multipart::Form::new()
            .part("media", part)
            .text("conversationId", conversation_id.to_string())
            .text("messageType", message_type.as_str().to_string());
        if let Some(duration) = duration_ms {
            form = form.text("duration", duration.to_string());
        }
        if let Some(reply_to) = reply_to {
            form = form.text("replyTo", reply_to);
        }

        let mut req = self
            .http
            .post(format!("{}/api/messages", self.base_url))
            .multipart(form);
        if let Some(auth) = self.auth_header() {
            req = req.header("Authorization", auth);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(Error::Request(format!(
                "media upload failed: {}",
                resp.status()
            )));
        }

        let body: Envelope<Message> = resp.json().await?;
        Ok(body.data)
    }

    /// Mark every message in a conversation read by the current user.
    pub async fn mark_read(&self, conversation_id: &str) -> Result<()> {
        let mut req = self.http.put(format!(
            "{}/api/messages/read/{}",
            self.base_url, conversation_id
        ));
        if let Some(auth) = self.auth_header() {
            req = req.header("Authorization", auth);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(Error::Request(format!(
                "read receipt update failed: {}",
                resp.status()
            )));
        }
        Ok(())
    }

    pub async fn search_users(&self, query: &str) -> Result<Vec<UserRef>> {
        let mut req = self
            .http
            .get(format!("{}/api/users/search", self.base_url))
            .query(&[("q", query)]);
        if let Some(auth) = self.auth_header() {
            req = req.header("Authorization", auth);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            return Err(Error::Request(format!(
                "user search failed: {}",
                resp.status()
            )));
        }

        let body: Envelope<Vec<UserRef>> = resp.json().await?;
        Ok(body.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_oversized_media_is_rejected_locally() {
        let config = ClientConfig::new("localhost", 5000, false);
        let rest = RestClient::new(&config).unwrap();

        let oversized = vec![0u8; MAX_MEDIA_BYTES + 1];
        let result = rest
            .send_media_message("c1", oversized, "big.png", "image/png", MessageType::Image, None, None)
            .await;

        assert!(matches!(result, Err(Error::Request(_))));
    }
}
