//! Gmail API client with retry logic

use async_trait::async_trait;
use google_gmail1::api::{Message, MessagePart, ModifyMessageRequest};
use mime::Mime;
use once_cell::sync::Lazy;
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::GmailHub;
use crate::error::{AutoReplyError, Result};
use crate::models::InboundMessage;

/// MIME type used when uploading raw RFC 822 payloads
static RFC822_MIME: Lazy<Mime> = Lazy::new(|| "message/rfc822".parse().unwrap());

/// Trait defining mail provider operations for easier testing
#[async_trait]
pub trait MailClient: Send + Sync {
    /// List IDs of messages carrying all of the given labels
    async fn list_unread(&self, labels: &[String]) -> Result<Vec<String>>;

    /// Fetch a full message (headers and body)
    async fn get_message(&self, id: &str) -> Result<InboundMessage>;

    /// Send a raw RFC 822 reply into an existing thread
    async fn send_reply(&self, raw: Vec<u8>, thread_id: &str) -> Result<()>;

    /// Clear the UNREAD label from a message
    async fn mark_read(&self, id: &str) -> Result<()>;
}

/// Production Gmail client
///
/// Wraps the authenticated hub and maps API responses into the crate's
/// message model. Transient failures (rate limits, 5xx, network) are
/// retried with exponential backoff; sends are the exception, since a
/// lost response would make a retry deliver the reply twice.
pub struct GmailMailClient {
    hub: GmailHub,
    scopes: Vec<String>,
}

impl GmailMailClient {
    /// Create a new Gmail client
    ///
    /// # Arguments
    /// * `hub` - Authenticated Gmail API hub
    /// * `scopes` - OAuth scopes to attach to each call
    pub fn new(hub: GmailHub, scopes: &[String]) -> Self {
        Self {
            hub,
            scopes: scopes.to_vec(),
        }
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(
        operation_name: &str,
        max_retries: u32,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && attempts <= max_retries => {
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempts,
                        max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl MailClient for GmailMailClient {
    async fn list_unread(&self, labels: &[String]) -> Result<Vec<String>> {
        let labels = labels.to_vec();
        Self::with_retry("list_unread", 3, || async {
            let mut all_ids = Vec::new();
            let mut page_token: Option<String> = None;

            loop {
                let mut call = self.hub.users().messages_list("me").max_results(100);

                for label in &labels {
                    call = call.add_label_ids(label);
                }
                if let Some(token) = page_token.as_ref() {
                    call = call.page_token(token);
                }
                for scope in &self.scopes {
                    call = call.add_scope(scope);
                }

                let (_, response) = call.doit().await?;

                if let Some(messages) = response.messages {
                    for msg_ref in messages {
                        if let Some(id) = msg_ref.id {
                            all_ids.push(id);
                        }
                    }
                }

                page_token = response.next_page_token;
                if page_token.is_none() {
                    break;
                }
            }

            debug!("Listed {} unread messages", all_ids.len());
            Ok(all_ids)
        })
        .await
    }

    async fn get_message(&self, id: &str) -> Result<InboundMessage> {
        let id = id.to_string();
        let message = Self::with_retry("get_message", 3, || async {
            let mut call = self.hub.users().messages_get("me", &id).format("full");
            for scope in &self.scopes {
                call = call.add_scope(scope);
            }

            let (_, msg) = call.doit().await?;
            Ok(msg)
        })
        .await?;

        parse_inbound_message(message)
    }

    async fn send_reply(&self, raw: Vec<u8>, thread_id: &str) -> Result<()> {
        // Sends are not idempotent, so failures are left for the next
        // poll cycle rather than retried here
        let message = Message {
            thread_id: Some(thread_id.to_string()),
            ..Default::default()
        };

        let mut call = self.hub.users().messages_send(message, "me");
        for scope in &self.scopes {
            call = call.add_scope(scope);
        }

        let (_, sent) = call.upload(Cursor::new(raw), RFC822_MIME.clone()).await?;

        debug!(
            "Sent reply {} in thread {}",
            sent.id.as_deref().unwrap_or("?"),
            thread_id
        );
        Ok(())
    }

    async fn mark_read(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        Self::with_retry("mark_read", 3, || async {
            let modify_request = ModifyMessageRequest {
                add_label_ids: None,
                remove_label_ids: Some(vec!["UNREAD".to_string()]),
            };

            let mut call = self
                .hub
                .users()
                .messages_modify(modify_request, "me", &id);
            for scope in &self.scopes {
                call = call.add_scope(scope);
            }

            call.doit().await?;
            Ok(())
        })
        .await
    }
}

/// Parse a Gmail API Message into our InboundMessage structure
///
/// Only the id and thread id are required. Missing or malformed headers
/// become absent fields so a badly formed message still flows through
/// classification instead of failing the cycle.
pub fn parse_inbound_message(msg: Message) -> Result<InboundMessage> {
    let id = msg
        .id
        .ok_or_else(|| AutoReplyError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let thread_id = msg
        .thread_id
        .ok_or_else(|| AutoReplyError::InvalidMessageFormat("Missing thread ID".to_string()))?;

    let mut sender = None;
    let mut recipient = None;
    let mut subject = None;
    let mut date = None;
    let mut message_id = None;

    if let Some(headers) = msg.payload.as_ref().and_then(|p| p.headers.as_ref()) {
        for header in headers {
            if let (Some(name), Some(value)) = (&header.name, &header.value) {
                match name.to_lowercase().as_str() {
                    "from" => sender = Some(value.clone()),
                    "to" => recipient = Some(value.clone()),
                    "subject" => subject = Some(value.clone()),
                    "date" => date = Some(value.clone()),
                    "message-id" => message_id = Some(value.clone()),
                    _ => {}
                }
            }
        }
    }

    let body = msg
        .payload
        .as_ref()
        .map(extract_plain_text_body)
        .unwrap_or_default();

    Ok(InboundMessage {
        id,
        thread_id,
        sender,
        recipient,
        subject,
        date,
        message_id,
        body,
    })
}

/// Extract the plain-text body from a message payload
///
/// Prefers a top-level text/plain body; otherwise scans the first-level
/// parts for the first text/plain part with data. Returns empty text
/// when neither exists.
fn extract_plain_text_body(payload: &MessagePart) -> String {
    if is_plain_text(payload.mime_type.as_deref()) {
        if let Some(data) = payload.body.as_ref().and_then(|b| b.data.as_ref()) {
            return String::from_utf8_lossy(data).into_owned();
        }
    }

    if let Some(parts) = payload.parts.as_ref() {
        for part in parts {
            if is_plain_text(part.mime_type.as_deref()) {
                if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_ref()) {
                    return String::from_utf8_lossy(data).into_owned();
                }
            }
        }
    }

    String::new()
}

fn is_plain_text(mime_type: Option<&str>) -> bool {
    mime_type.is_some_and(|m| m.eq_ignore_ascii_case("text/plain"))
}
