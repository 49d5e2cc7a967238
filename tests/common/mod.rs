//! Common test utilities and fixtures

use gmail_autoreply::client::MailClient;
use gmail_autoreply::composer::{CompletionClient, ReplyComposer};
use gmail_autoreply::config::ReplyPolicy;
use gmail_autoreply::engine::MailCycleEngine;
use gmail_autoreply::error::Result;
use gmail_autoreply::models::InboundMessage;
use gmail_autoreply::poller::ServicePaths;
use mockall::mock;
use tempfile::TempDir;

/// Reply text used by the template policy fixture
pub const TEMPLATE_REPLY: &str = "Thanks for reaching out. We will get back to you shortly.";

/// Create a test message addressed to me@example.com
pub fn inbound_message(id: &str, sender: &str, subject: Option<&str>) -> InboundMessage {
    InboundMessage {
        id: id.to_string(),
        thread_id: format!("thread_{}", id),
        sender: Some(sender.to_string()),
        recipient: Some("me@example.com".to_string()),
        subject: subject.map(String::from),
        date: Some("Mon, 24 Nov 2025 10:30:00 +0000".to_string()),
        message_id: Some(format!("<{}@mail.example.com>", id)),
        body: "Hello, could you have a look at this?".to_string(),
    }
}

/// A template-only reply policy matching "invoice" and "order" subjects
pub fn template_policy() -> ReplyPolicy {
    ReplyPolicy {
        keywords: vec!["invoice".to_string(), "order".to_string()],
        template: TEMPLATE_REPLY.to_string(),
        use_ai: false,
    }
}

/// Service file locations under a test directory
pub fn service_paths(dir: &TempDir) -> ServicePaths {
    ServicePaths {
        data_file: dir.path().join("data.json"),
        status_file: dir.path().join("status.json"),
        edits_file: dir.path().join("policy_edits.json"),
    }
}

/// Wrap a mock client in an engine with a template-only composer
///
/// The completion mock has no expectations; any call to it fails the
/// test, which is what a template-only policy should guarantee.
pub fn engine_from(client: MockMailClient) -> MailCycleEngine {
    MailCycleEngine::new(
        Box::new(client),
        ReplyComposer::new(Box::new(MockCompletionClient::new())),
        &["UNREAD".to_string()],
    )
}

// Mock implementation of MailClient for testing
mock! {
    pub MailClient {}

    #[async_trait::async_trait]
    impl MailClient for MailClient {
        async fn list_unread(&self, labels: &[String]) -> Result<Vec<String>>;
        async fn get_message(&self, id: &str) -> Result<InboundMessage>;
        async fn send_reply(&self, raw: Vec<u8>, thread_id: &str) -> Result<()>;
        async fn mark_read(&self, id: &str) -> Result<()>;
    }
}

// Mock implementation of CompletionClient for testing
mock! {
    pub CompletionClient {}

    #[async_trait::async_trait]
    impl CompletionClient for CompletionClient {
        async fn complete(&self, body: &str) -> Result<String>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_builder() {
        let msg = inbound_message("m1", "alice@example.com", Some("Invoice overdue"));
        assert_eq!(msg.id, "m1");
        assert_eq!(msg.thread_id, "thread_m1");
        assert_eq!(msg.sender.as_deref(), Some("alice@example.com"));
        assert_eq!(msg.recipient.as_deref(), Some("me@example.com"));
        assert_eq!(msg.subject.as_deref(), Some("Invoice overdue"));
    }

    #[test]
    fn test_inbound_message_without_subject() {
        let msg = inbound_message("m2", "bob@example.com", None);
        assert!(msg.subject.is_none());
    }

    #[test]
    fn test_template_policy_keywords() {
        let policy = template_policy();
        assert_eq!(policy.keywords, vec!["invoice", "order"]);
        assert_eq!(policy.template, TEMPLATE_REPLY);
        assert!(!policy.use_ai);
    }
}
