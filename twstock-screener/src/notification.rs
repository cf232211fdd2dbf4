//! Message delivery through the LINE Messaging API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use twstock_common::config::LineConfig;
use twstock_common::util::{chunk_by_chars, sanitize_for_log};

use crate::error::CollaboratorError;

/// The push endpoint accepts at most this many messages per request.
pub const MAX_MESSAGES_PER_PUSH: usize = 5;

/// One outgoing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// LINE user, group or room ID
    pub recipient: String,
    pub text: String,
    /// Local files produced for this notification (e.g. charts)
    pub attachments: Vec<PathBuf>,
}

impl Notification {
    pub fn text(recipient: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            text: text.into(),
            attachments: Vec::new(),
        }
    }
}

/// Delivers notifications to a user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), CollaboratorError>;
}

// ============================================================================
// LINE push client
// ============================================================================

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: Vec<TextMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
}

/// Push-message client for the LINE Messaging API.
pub struct LineNotifier {
    api_base: String,
    access_token: String,
    max_message_chars: usize,
    client: reqwest::Client,
}

impl LineNotifier {
    pub fn new(config: &LineConfig, access_token: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            max_message_chars: config.max_message_chars,
            client,
        }
    }

    /// Text messages for a notification, in delivery order.
    ///
    /// The Messaging API only accepts hosted JPEG/PNG images, so local
    /// attachments are listed by file name in a trailing message.
    pub fn messages_for(&self, notification: &Notification) -> Vec<String> {
        let mut messages = chunk_by_chars(&notification.text, self.max_message_chars);

        if !notification.attachments.is_empty() {
            let mut trailer = String::from("📎 圖表檔案:");
            for path in &notification.attachments {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                trailer.push_str("\n- ");
                trailer.push_str(&name);
            }
            messages.extend(chunk_by_chars(&trailer, self.max_message_chars));
        }

        messages
    }

    async fn push(&self, to: &str, batch: &[String]) -> Result<(), CollaboratorError> {
        let url = format!("{}/v2/bot/message/push", self.api_base);
        let body = PushRequest {
            to,
            messages: batch
                .iter()
                .map(|text| TextMessage { kind: "text", text })
                .collect(),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&text)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or(text);
            return Err(CollaboratorError::from_status(
                status.as_u16(),
                &sanitize_for_log(&detail),
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for LineNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), CollaboratorError> {
        if notification.recipient.trim().is_empty() {
            return Err(CollaboratorError::Request("recipient is empty".into()));
        }

        let messages = self.messages_for(notification);
        if messages.is_empty() {
            tracing::debug!("Empty notification, nothing to send");
            return Ok(());
        }

        for batch in messages.chunks(MAX_MESSAGES_PER_PUSH) {
            self.push(&notification.recipient, batch).await?;
        }

        tracing::info!(
            messages = messages.len(),
            requests = messages.len().div_ceil(MAX_MESSAGES_PER_PUSH),
            "LINE notification sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier(max_chars: usize) -> LineNotifier {
        let config = LineConfig {
            max_message_chars: max_chars,
            ..LineConfig::default()
        };
        LineNotifier::new(&config, "token")
    }

    #[test]
    fn test_messages_chunked() {
        let n = notifier(10);
        let messages = n.messages_for(&Notification::text("U1", "a".repeat(25)));
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|m| m.chars().count() <= 10));
    }

    #[test]
    fn test_attachments_listed_by_file_name() {
        let n = notifier(2000);
        let notification = Notification {
            recipient: "U1".into(),
            text: "hello".into(),
            attachments: vec![
                PathBuf::from("/tmp/charts/2330_20240517_price_ma.svg"),
                PathBuf::from("/tmp/charts/2330_20240517_macd.svg"),
            ],
        };
        let messages = n.messages_for(&notification);
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[1],
            "📎 圖表檔案:\n- 2330_20240517_price_ma.svg\n- 2330_20240517_macd.svg"
        );
    }

    #[tokio::test]
    async fn test_empty_recipient_rejected() {
        let err = notifier(2000)
            .send(&Notification::text(" ", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Request(_)));
    }
}
