//! Poll-classify-reply cycle over unread mail

use tracing::{info, warn};

use crate::classifier;
use crate::client::MailClient;
use crate::composer::{build_reply_mime, ReplyComposer};
use crate::config::ReplyPolicy;
use crate::error::Result;
use crate::models::{IgnoredRecord, RepliedRecord};

/// Records produced by one poll cycle, in message order
#[derive(Debug, Default)]
pub struct CycleOutcome {
    pub replied: Vec<RepliedRecord>,
    pub ignored: Vec<IgnoredRecord>,
}

/// Runs the reply pipeline over unread messages
///
/// Each cycle lists unread mail, classifies every message by subject,
/// replies to the eligible ones and records the rest as ignored.
pub struct MailCycleEngine {
    client: Box<dyn MailClient>,
    composer: ReplyComposer,
    labels: Vec<String>,
}

impl MailCycleEngine {
    /// Create a new engine
    ///
    /// # Arguments
    /// * `client` - Mail provider client
    /// * `composer` - Reply composer
    /// * `labels` - Labels restricting which unread messages are polled
    pub fn new(client: Box<dyn MailClient>, composer: ReplyComposer, labels: &[String]) -> Self {
        Self {
            client,
            composer,
            labels: labels.to_vec(),
        }
    }

    /// Run one poll cycle
    ///
    /// Provider errors end the cycle early but never escape it: whatever
    /// records were accumulated before the failure are returned, so a
    /// listing failure yields two empty sequences and the loop carries on.
    pub async fn run_cycle(&self, policy: &ReplyPolicy) -> CycleOutcome {
        let mut outcome = CycleOutcome::default();

        if let Err(e) = self.process_unread(policy, &mut outcome).await {
            warn!("An error occurred during the poll cycle: {}", e);
        }

        outcome
    }

    async fn process_unread(&self, policy: &ReplyPolicy, outcome: &mut CycleOutcome) -> Result<()> {
        info!("Parsing unread mails");
        let ids = self.client.list_unread(&self.labels).await?;

        if ids.is_empty() {
            info!("No unread messages");
            return Ok(());
        }
        info!("Found {} unread messages", ids.len());

        for id in &ids {
            let message = self.client.get_message(id).await?;

            let subject = message.subject.as_deref();
            let category = classifier::categorize(subject, &policy.keywords);

            if !classifier::is_reply_candidate(subject, &policy.keywords) {
                outcome.ignored.push(IgnoredRecord {
                    sender: message.sender.clone(),
                    subject: message.subject.clone(),
                    date: message.date.clone(),
                    category,
                });
                continue;
            }

            // Candidacy guarantees a non-empty subject
            let subject = message.subject.clone().unwrap_or_default();

            let Some(recipient) = message.recipient.as_deref() else {
                warn!(
                    "Could not find receiver for message with subject: {}. Skipping reply.",
                    subject
                );
                outcome.ignored.push(IgnoredRecord {
                    sender: message.sender.clone(),
                    subject: message.subject.clone(),
                    date: message.date.clone(),
                    category,
                });
                continue;
            };

            info!("Mail with keywords found: {}", subject);
            let reply = self.composer.compose(&message.body, policy).await;
            let raw = build_reply_mime(&reply, recipient, &subject, message.message_id.as_deref());

            match self
                .client
                .send_reply(raw.into_bytes(), &message.thread_id)
                .await
            {
                Ok(()) => {
                    info!(
                        "The automated reply was sent to: {}, in a mail thread: {}",
                        recipient, message.thread_id
                    );
                    outcome.replied.push(RepliedRecord {
                        recipient: recipient.to_string(),
                        subject,
                        reply,
                        date: message.date.clone(),
                        category,
                    });
                    // Only messages we actually replied to leave the
                    // unread pool; a failed send stays unread for the
                    // next cycle
                    self.client.mark_read(&message.id).await?;
                }
                Err(e) => {
                    warn!(
                        "An error occurred during sending reply: {}. Message stays unread.",
                        e
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composer::CompletionClient;
    use crate::error::AutoReplyError;
    use crate::models::InboundMessage;
    use async_trait::async_trait;
    use mockall::predicate::eq;

    mockall::mock! {
        pub Client {}

        #[async_trait]
        impl MailClient for Client {
            async fn list_unread(&self, labels: &[String]) -> Result<Vec<String>>;
            async fn get_message(&self, id: &str) -> Result<InboundMessage>;
            async fn send_reply(&self, raw: Vec<u8>, thread_id: &str) -> Result<()>;
            async fn mark_read(&self, id: &str) -> Result<()>;
        }
    }

    mockall::mock! {
        pub Completion {}

        #[async_trait]
        impl CompletionClient for Completion {
            async fn complete(&self, body: &str) -> Result<String>;
        }
    }

    fn policy() -> ReplyPolicy {
        ReplyPolicy {
            keywords: vec!["invoice".to_string(), "order".to_string()],
            template: "Thanks, we got your email.".to_string(),
            use_ai: false,
        }
    }

    fn labels() -> Vec<String> {
        vec!["UNREAD".to_string(), "CATEGORY_PERSONAL".to_string()]
    }

    fn message(id: &str, subject: Option<&str>, recipient: Option<&str>) -> InboundMessage {
        InboundMessage {
            id: id.to_string(),
            thread_id: format!("thread-{}", id),
            sender: Some("alice@example.com".to_string()),
            recipient: recipient.map(String::from),
            subject: subject.map(String::from),
            date: Some("Mon, 24 Nov 2025 10:30:00 +0000".to_string()),
            message_id: Some(format!("<{}@mail.example.com>", id)),
            body: "Hello, I have a question.".to_string(),
        }
    }

    fn engine(client: MockClient) -> MailCycleEngine {
        MailCycleEngine::new(
            Box::new(client),
            ReplyComposer::new(Box::new(MockCompletion::new())),
            &labels(),
        )
    }

    #[tokio::test]
    async fn test_eligible_message_gets_reply() {
        let mut client = MockClient::new();
        client
            .expect_list_unread()
            .times(1)
            .returning(|_| Ok(vec!["m1".to_string()]));
        client
            .expect_get_message()
            .with(eq("m1"))
            .returning(|_| Ok(message("m1", Some("Invoice overdue"), Some("me@example.com"))));
        client
            .expect_send_reply()
            .withf(|raw, thread_id| {
                let text = String::from_utf8_lossy(raw);
                thread_id == "thread-m1"
                    && text.contains("To: me@example.com\r\n")
                    && text.contains("Subject: Re: Invoice overdue\r\n")
                    && text.contains("In-Reply-To: <m1@mail.example.com>\r\n")
            })
            .times(1)
            .returning(|_, _| Ok(()));
        client
            .expect_mark_read()
            .with(eq("m1"))
            .times(1)
            .returning(|_| Ok(()));

        let outcome = engine(client).run_cycle(&policy()).await;

        assert_eq!(outcome.replied.len(), 1);
        assert!(outcome.ignored.is_empty());
        let record = &outcome.replied[0];
        assert_eq!(record.recipient, "me@example.com");
        assert_eq!(record.subject, "Invoice overdue");
        assert_eq!(record.reply, "Thanks, we got your email.");
        assert_eq!(record.category, "Invoice");
    }

    #[tokio::test]
    async fn test_eligible_without_recipient_is_ignored() {
        let mut client = MockClient::new();
        client
            .expect_list_unread()
            .returning(|_| Ok(vec!["m1".to_string()]));
        client
            .expect_get_message()
            .returning(|_| Ok(message("m1", Some("Invoice overdue"), None)));
        client.expect_send_reply().times(0);
        client.expect_mark_read().times(0);

        let outcome = engine(client).run_cycle(&policy()).await;

        assert!(outcome.replied.is_empty());
        assert_eq!(outcome.ignored.len(), 1);
        assert_eq!(outcome.ignored[0].subject.as_deref(), Some("Invoice overdue"));
        assert_eq!(outcome.ignored[0].category, "Invoice");
    }

    #[tokio::test]
    async fn test_unmatched_subject_is_ignored_as_other() {
        let mut client = MockClient::new();
        client
            .expect_list_unread()
            .returning(|_| Ok(vec!["m1".to_string()]));
        client
            .expect_get_message()
            .returning(|_| Ok(message("m1", Some("Weekly newsletter"), Some("me@example.com"))));
        client.expect_send_reply().times(0);
        client.expect_mark_read().times(0);

        let outcome = engine(client).run_cycle(&policy()).await;

        assert!(outcome.replied.is_empty());
        assert_eq!(outcome.ignored.len(), 1);
        assert_eq!(outcome.ignored[0].category, "Other");
        assert_eq!(outcome.ignored[0].sender.as_deref(), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn test_missing_subject_is_ignored() {
        let mut client = MockClient::new();
        client
            .expect_list_unread()
            .returning(|_| Ok(vec!["m1".to_string()]));
        client
            .expect_get_message()
            .returning(|_| Ok(message("m1", None, Some("me@example.com"))));
        client.expect_send_reply().times(0);

        let outcome = engine(client).run_cycle(&policy()).await;

        assert!(outcome.replied.is_empty());
        assert_eq!(outcome.ignored.len(), 1);
        assert!(outcome.ignored[0].subject.is_none());
        assert_eq!(outcome.ignored[0].category, "Other");
    }

    #[tokio::test]
    async fn test_listing_failure_yields_empty_outcome() {
        let mut client = MockClient::new();
        client
            .expect_list_unread()
            .returning(|_| Err(AutoReplyError::NetworkError("down".to_string())));
        client.expect_get_message().times(0);

        let outcome = engine(client).run_cycle(&policy()).await;

        assert!(outcome.replied.is_empty());
        assert!(outcome.ignored.is_empty());
    }

    #[tokio::test]
    async fn test_no_unread_messages() {
        let mut client = MockClient::new();
        client.expect_list_unread().returning(|_| Ok(vec![]));
        client.expect_get_message().times(0);

        let outcome = engine(client).run_cycle(&policy()).await;

        assert!(outcome.replied.is_empty());
        assert!(outcome.ignored.is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_leaves_message_unread() {
        let mut client = MockClient::new();
        client
            .expect_list_unread()
            .returning(|_| Ok(vec!["m1".to_string(), "m2".to_string()]));
        client
            .expect_get_message()
            .with(eq("m1"))
            .returning(|_| Ok(message("m1", Some("Invoice overdue"), Some("me@example.com"))));
        client
            .expect_get_message()
            .with(eq("m2"))
            .returning(|_| Ok(message("m2", Some("Order status"), Some("me@example.com"))));
        client
            .expect_send_reply()
            .withf(|_, thread_id| thread_id == "thread-m1")
            .returning(|_, _| Err(AutoReplyError::ServerError {
                status: 503,
                message: "unavailable".to_string(),
            }));
        client
            .expect_send_reply()
            .withf(|_, thread_id| thread_id == "thread-m2")
            .returning(|_, _| Ok(()));
        // Only the delivered reply clears UNREAD
        client
            .expect_mark_read()
            .with(eq("m2"))
            .times(1)
            .returning(|_| Ok(()));

        let outcome = engine(client).run_cycle(&policy()).await;

        assert_eq!(outcome.replied.len(), 1);
        assert_eq!(outcome.replied[0].subject, "Order status");
        assert!(outcome.ignored.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_earlier_records() {
        let mut client = MockClient::new();
        client
            .expect_list_unread()
            .returning(|_| Ok(vec!["m1".to_string(), "m2".to_string(), "m3".to_string()]));
        client
            .expect_get_message()
            .with(eq("m1"))
            .returning(|_| Ok(message("m1", Some("hello"), Some("me@example.com"))));
        client
            .expect_get_message()
            .with(eq("m2"))
            .returning(|_| Err(AutoReplyError::NetworkError("reset".to_string())));
        client.expect_get_message().with(eq("m3")).times(0);
        client.expect_send_reply().times(0);

        let outcome = engine(client).run_cycle(&policy()).await;

        // m1 was recorded before the failure, m3 was never reached
        assert!(outcome.replied.is_empty());
        assert_eq!(outcome.ignored.len(), 1);
        assert_eq!(outcome.ignored[0].subject.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_record_order_follows_message_order() {
        let mut client = MockClient::new();
        client.expect_list_unread().returning(|_| {
            Ok(vec!["m1".to_string(), "m2".to_string(), "m3".to_string(), "m4".to_string()])
        });
        client
            .expect_get_message()
            .with(eq("m1"))
            .returning(|_| Ok(message("m1", Some("Invoice A"), Some("me@example.com"))));
        client
            .expect_get_message()
            .with(eq("m2"))
            .returning(|_| Ok(message("m2", Some("spam"), Some("me@example.com"))));
        client
            .expect_get_message()
            .with(eq("m3"))
            .returning(|_| Ok(message("m3", Some("Order B"), Some("me@example.com"))));
        client
            .expect_get_message()
            .with(eq("m4"))
            .returning(|_| Ok(message("m4", None, None)));
        client.expect_send_reply().returning(|_, _| Ok(()));
        client.expect_mark_read().returning(|_| Ok(()));

        let outcome = engine(client).run_cycle(&policy()).await;

        let replied: Vec<&str> = outcome.replied.iter().map(|r| r.subject.as_str()).collect();
        assert_eq!(replied, vec!["Invoice A", "Order B"]);
        let ignored: Vec<Option<&str>> =
            outcome.ignored.iter().map(|r| r.subject.as_deref()).collect();
        assert_eq!(ignored, vec![Some("spam"), None]);
    }

    #[tokio::test]
    async fn test_ai_reply_flows_into_record() {
        let mut client = MockClient::new();
        client
            .expect_list_unread()
            .returning(|_| Ok(vec!["m1".to_string()]));
        client
            .expect_get_message()
            .returning(|_| Ok(message("m1", Some("Invoice overdue"), Some("me@example.com"))));
        client
            .expect_send_reply()
            .withf(|raw, _| String::from_utf8_lossy(raw).contains("Here is the invoice."))
            .returning(|_, _| Ok(()));
        client.expect_mark_read().returning(|_| Ok(()));

        let mut completion = MockCompletion::new();
        completion
            .expect_complete()
            .times(1)
            .returning(|_| Ok("Here is the invoice.".to_string()));

        let engine = MailCycleEngine::new(
            Box::new(client),
            ReplyComposer::new(Box::new(completion)),
            &labels(),
        );

        let mut ai_policy = policy();
        ai_policy.use_ai = true;

        let outcome = engine.run_cycle(&ai_policy).await;
        assert_eq!(outcome.replied[0].reply, "Here is the invoice.");
    }

    #[tokio::test]
    async fn test_ai_failure_still_replies_with_template() {
        let mut client = MockClient::new();
        client
            .expect_list_unread()
            .returning(|_| Ok(vec!["m1".to_string()]));
        client
            .expect_get_message()
            .returning(|_| Ok(message("m1", Some("Invoice overdue"), Some("me@example.com"))));
        client.expect_send_reply().returning(|_, _| Ok(()));
        client.expect_mark_read().returning(|_| Ok(()));

        let mut completion = MockCompletion::new();
        completion
            .expect_complete()
            .returning(|_| Err(AutoReplyError::CompletionError("quota".to_string())));

        let engine = MailCycleEngine::new(
            Box::new(client),
            ReplyComposer::new(Box::new(completion)),
            &labels(),
        );

        let mut ai_policy = policy();
        ai_policy.use_ai = true;

        let outcome = engine.run_cycle(&ai_policy).await;
        assert_eq!(outcome.replied.len(), 1);
        assert_eq!(outcome.replied[0].reply, "Thanks, we got your email.");
    }

    #[tokio::test]
    async fn test_mark_read_uses_message_id_not_thread_id() {
        let mut client = MockClient::new();
        client
            .expect_list_unread()
            .returning(|_| Ok(vec!["m1".to_string()]));
        client
            .expect_get_message()
            .returning(|_| Ok(message("m1", Some("Invoice overdue"), Some("me@example.com"))));
        client.expect_send_reply().returning(|_, _| Ok(()));
        client
            .expect_mark_read()
            .with(eq("m1"))
            .times(1)
            .returning(|_| Ok(()));

        let outcome = engine(client).run_cycle(&policy()).await;
        assert_eq!(outcome.replied.len(), 1);
    }
}
