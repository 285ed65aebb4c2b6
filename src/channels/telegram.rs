//! Telegram channel: long-polls the Bot API for updates.
//!
//! Text replies go through `sendMessage`; generated documents are uploaded
//! with a multipart `sendDocument` call.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Pause before polling again after a failed or rejected `getUpdates`.
const POLL_BACKOFF: std::time::Duration = std::time::Duration::from_secs(5);

/// Telegram channel: connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.bot_token.expose_secret()
        )
    }

    /// Send a text message, splitting it if it exceeds Telegram's limit.
    async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH) {
            self.send_message_chunk(chat_id, &chunk).await?;
        }
        Ok(())
    }

    /// Send a single message chunk, Markdown-first with plain-text fallback.
    async fn send_message_chunk(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let markdown_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let markdown_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&markdown_body)
            .send()
            .await
            .map_err(send_failed)?;

        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(send_failed)?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (markdown: {}, plain: {})",
                    markdown_status, plain_err
                ),
            });
        }

        Ok(())
    }

    /// Send a document from bytes (in-memory).
    pub async fn send_document_bytes(
        &self,
        chat_id: &str,
        file_bytes: Vec<u8>,
        file_name: &str,
        caption: Option<&str>,
    ) -> anyhow::Result<()> {
        let part = Part::bytes(file_bytes)
            .file_name(file_name.to_string())
            .mime_str("application/pdf")?;

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);

        if let Some(cap) = caption {
            form = form.text("caption", cap.to_string());
        }

        let resp = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        if !resp.status().is_success() {
            let err = resp.text().await?;
            anyhow::bail!("Telegram sendDocument failed: {err}");
        }

        tracing::info!("Telegram document sent to {chat_id}: {file_name}");
        Ok(())
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let updates_url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message"]
                });

                let resp = match client.post(&updates_url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {}", e.without_url());
                        tokio::time::sleep(POLL_BACKOFF).await;
                        continue;
                    }
                };

                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {}", e.without_url());
                        tokio::time::sleep(POLL_BACKOFF).await;
                        continue;
                    }
                };

                let results = match classify_poll(&data) {
                    PollOutcome::Updates(results) => results,
                    PollOutcome::Rejected { description } => {
                        tracing::warn!("Telegram getUpdates rejected: {description}");
                        tokio::time::sleep(POLL_BACKOFF).await;
                        continue;
                    }
                };

                for update in results {
                    if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64)
                    {
                        offset = uid + 1;
                    }

                    let Some(incoming) = parse_update(update, &allowed_users) else {
                        continue;
                    };

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chat_id = msg
            .metadata
            .get("chat_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: "No chat_id in message metadata".into(),
            })?;

        match response.attachment {
            Some(attachment) => {
                let caption = (!response.content.is_empty()).then_some(response.content.as_str());
                self.send_document_bytes(chat_id, attachment.bytes, &attachment.file_name, caption)
                    .await
                    .map_err(|e| ChannelError::SendFailed {
                        name: "telegram".into(),
                        reason: e.to_string(),
                    })
            }
            None => self.send_message(chat_id, &response.content).await,
        }
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.without_url().to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn send_failed(e: reqwest::Error) -> ChannelError {
    // The request URL embeds the bot token.
    ChannelError::SendFailed {
        name: "telegram".into(),
        reason: e.without_url().to_string(),
    }
}

/// What a `getUpdates` response body amounts to.
#[derive(Debug, PartialEq)]
enum PollOutcome<'a> {
    Updates(&'a [serde_json::Value]),
    /// No update list: an API error (bad token, conflict, rate limit) or a
    /// malformed body. The poller backs off before trying again.
    Rejected { description: String },
}

fn classify_poll(data: &serde_json::Value) -> PollOutcome<'_> {
    if let Some(results) = data.get("result").and_then(serde_json::Value::as_array) {
        return PollOutcome::Updates(results);
    }
    let description = data
        .get("description")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("response has no update list");
    let description = match data.get("error_code").and_then(serde_json::Value::as_i64) {
        Some(code) => format!("{code}: {description}"),
        None => description.to_string(),
    };
    PollOutcome::Rejected { description }
}

/// Turn one `getUpdates` entry into an incoming message. Returns `None`
/// for non-text updates, for senders without a numeric id, and for
/// senders outside the allowlist.
fn parse_update(update: &serde_json::Value, allowed_users: &[String]) -> Option<IncomingMessage> {
    let message = update.get("message")?;
    let text = message.get("text").and_then(serde_json::Value::as_str)?;

    let from = message.get("from");
    let username = from
        .and_then(|f| f.get("username"))
        .and_then(|u| u.as_str());
    // Usernames can change hands, so only the numeric id keys profiles.
    let Some(user_id) = from
        .and_then(|f| f.get("id"))
        .and_then(serde_json::Value::as_i64)
        .map(|id| id.to_string())
    else {
        tracing::warn!(
            "Telegram: ignoring message without a sender id: username={}",
            username.unwrap_or("unknown")
        );
        return None;
    };

    let mut identities = vec![user_id.as_str()];
    identities.extend(username);
    if !check_user_allowed(allowed_users, identities) {
        tracing::warn!(
            "Telegram: ignoring message from unauthorized user: username={}, user_id={user_id}",
            username.unwrap_or("unknown")
        );
        return None;
    }

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(serde_json::Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_default();

    let first_name = from
        .and_then(|f| f.get("first_name"))
        .and_then(|n| n.as_str());

    let incoming = IncomingMessage::new("telegram", &user_id, text)
        .with_metadata(serde_json::json!({
            "chat_id": chat_id,
            "username": username,
        }))
        .with_user_name(first_name.or(username).unwrap_or(&user_id));
    Some(incoming)
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut boundary = max_len;
        while !remaining.is_char_boundary(boundary) {
            boundary -= 1;
        }
        let chunk = &remaining[..boundary];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .filter(|&at| at > 0)
            .unwrap_or(boundary);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(allowed: &[&str]) -> TelegramChannel {
        TelegramChannel::new(
            SecretString::from("123:ABC".to_string()),
            allowed.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn update(text: &str, user_id: i64, username: &str) -> serde_json::Value {
        serde_json::json!({
            "update_id": 10,
            "message": {
                "text": text,
                "from": {"id": user_id, "username": username, "first_name": "Alice"},
                "chat": {"id": 555}
            }
        })
    }

    #[test]
    fn telegram_channel_name() {
        assert_eq!(channel(&["*"]).name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        assert_eq!(
            channel(&[]).api_url("sendDocument"),
            "https://api.telegram.org/bot123:ABC/sendDocument"
        );
    }

    fn allowed(list: &[&str], identities: &[&str]) -> bool {
        let list: Vec<String> = list.iter().map(|s| s.to_string()).collect();
        check_user_allowed(&list, identities.iter().copied())
    }

    #[test]
    fn allowlist_wildcard_admits_everyone() {
        assert!(allowed(&["*"], &["anyone"]));
    }

    #[test]
    fn allowlist_matches_listed_names_exactly() {
        assert!(allowed(&["alice", "bob"], &["alice"]));
        assert!(!allowed(&["alice", "bob"], &["eve"]));
        assert!(!allowed(&["alice"], &["alice_bot"]));
        assert!(!allowed(&["alice"], &["malice"]));
    }

    #[test]
    fn empty_allowlist_admits_nobody() {
        assert!(!allowed(&[], &["anyone"]));
    }

    #[test]
    fn allowlist_matches_numeric_id() {
        assert!(allowed(&["123456789"], &["unknown", "123456789"]));
        assert!(!allowed(&["123456789"], &["unknown", "987"]));
    }

    #[test]
    fn parse_update_uses_numeric_id_and_chat() {
        let msg = parse_update(&update("/start", 42, "alice"), &["*".to_string()]).unwrap();
        assert_eq!(msg.channel, "telegram");
        assert_eq!(msg.user_id, "42");
        assert_eq!(msg.content, "/start");
        assert_eq!(msg.user_name.as_deref(), Some("Alice"));
        assert_eq!(msg.metadata["chat_id"], "555");
    }

    #[test]
    fn parse_update_rejects_unlisted_user() {
        assert!(parse_update(&update("hi", 42, "mallory"), &["alice".to_string()]).is_none());
    }

    #[test]
    fn parse_update_skips_non_text() {
        let sticker = serde_json::json!({
            "update_id": 11,
            "message": {"sticker": {}, "from": {"id": 1}, "chat": {"id": 1}}
        });
        assert!(parse_update(&sticker, &["*".to_string()]).is_none());
    }

    #[test]
    fn parse_update_rejects_sender_without_id() {
        let anonymous = serde_json::json!({
            "update_id": 12,
            "message": {"text": "/start", "from": {"username": "alice"}, "chat": {"id": 555}}
        });
        assert!(parse_update(&anonymous, &["*".to_string()]).is_none());
        assert!(parse_update(&anonymous, &["alice".to_string()]).is_none());

        let no_sender = serde_json::json!({
            "update_id": 13,
            "message": {"text": "/start", "chat": {"id": 555}}
        });
        assert!(parse_update(&no_sender, &["*".to_string()]).is_none());
    }

    #[test]
    fn parse_update_allows_by_username_but_keys_by_id() {
        let msg = parse_update(&update("hi", 42, "alice"), &["alice".to_string()]).unwrap();
        assert_eq!(msg.user_id, "42");
        assert_eq!(msg.metadata["username"], "alice");
    }

    #[test]
    fn poll_with_result_yields_updates() {
        let data = serde_json::json!({"ok": true, "result": [update("hi", 1, "a")]});
        match classify_poll(&data) {
            PollOutcome::Updates(updates) => assert_eq!(updates.len(), 1),
            other => panic!("expected updates, got {other:?}"),
        }

        let empty = serde_json::json!({"ok": true, "result": []});
        assert_eq!(classify_poll(&empty), PollOutcome::Updates(&[]));
    }

    #[test]
    fn poll_error_is_rejected_with_description() {
        let data = serde_json::json!({"ok": false, "error_code": 401, "description": "Unauthorized"});
        assert_eq!(
            classify_poll(&data),
            PollOutcome::Rejected {
                description: "401: Unauthorized".into()
            }
        );
    }

    #[test]
    fn poll_without_update_list_is_rejected() {
        for data in [
            serde_json::json!({"ok": true}),
            serde_json::json!({"ok": true, "result": {"update_id": 1}}),
            serde_json::json!("not an object"),
        ] {
            assert_eq!(
                classify_poll(&data),
                PollOutcome::Rejected {
                    description: "response has no update list".into()
                }
            );
        }
    }

    #[tokio::test]
    async fn respond_without_chat_id_fails() {
        let msg = IncomingMessage::new("telegram", "user123", "hello");
        let err = channel(&["*"])
            .respond(&msg, OutgoingResponse::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed { .. }));
    }

    #[test]
    fn split_message_short() {
        assert_eq!(split_message("Hello", 4096), vec!["Hello"]);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks, vec!["a".repeat(2000), "b".repeat(3000)]);
    }

    #[test]
    fn split_message_no_good_split_point() {
        let chunks = split_message(&"a".repeat(5000), 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_respects_char_boundaries() {
        let msg = "₹".repeat(2000); // 3 bytes each
        let chunks = split_message(&msg, 4096);
        assert!(chunks.iter().all(|c| c.len() <= 4096));
        assert_eq!(chunks.concat(), msg);
    }
}
