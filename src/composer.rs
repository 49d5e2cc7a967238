//! Reply composition with AI generation and template fallback

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{AiConfig, ReplyPolicy};
use crate::error::{AutoReplyError, Result};

const SYSTEM_PROMPT: &str = "You are a professional and helpful assistant.";

/// Trait defining the AI text-generation boundary for easier testing
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Generate reply text for the given email body
    async fn complete(&self, body: &str) -> Result<String>;
}

/// OpenAI-backed completion client
pub struct OpenAiCompletionClient {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u16,
    temperature: f32,
}

impl OpenAiCompletionClient {
    /// Create a client from the AI section of the configuration
    ///
    /// When no API key is configured, the OPENAI_API_KEY environment
    /// variable is used instead.
    pub fn from_config(ai: &AiConfig) -> Self {
        let client = match ai.api_key.as_deref() {
            Some(key) => Client::with_config(OpenAIConfig::new().with_api_key(key)),
            None => Client::new(),
        };

        Self {
            client,
            model: ai.model.clone(),
            max_tokens: ai.max_tokens,
            temperature: ai.temperature,
        }
    }
}

fn build_user_prompt(body: &str) -> String {
    format!(
        "Based on the following email, write a professional and helpful reply:\n\n{}\n\nReply:",
        body
    )
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(&self, body: &str) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(SYSTEM_PROMPT)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(build_user_prompt(body))
                    .build()?
                    .into(),
            ])
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .build()?;

        let response = self.client.chat().create(request).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AutoReplyError::CompletionError("Response contained no choices".to_string())
            })?;

        Ok(content.trim().to_string())
    }
}

/// Produces reply text for inbound messages
///
/// Composition never fails: when AI generation is disabled, errors, or
/// returns empty text, the configured template is used instead.
pub struct ReplyComposer {
    completion: Box<dyn CompletionClient>,
}

impl ReplyComposer {
    /// Create a composer backed by the given completion client
    pub fn new(completion: Box<dyn CompletionClient>) -> Self {
        Self { completion }
    }

    /// Compose reply text for a message body under the given policy
    pub async fn compose(&self, body: &str, policy: &ReplyPolicy) -> String {
        if !policy.use_ai {
            return policy.template.clone();
        }

        match self.completion.complete(body).await {
            Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
            Ok(_) => {
                debug!("AI reply was empty, using template");
                policy.template.clone()
            }
            Err(e) => {
                warn!("AI reply generation failed: {}. Using template.", e);
                policy.template.clone()
            }
        }
    }
}

/// Build the raw RFC 822 reply message
///
/// The subject gains a "Re: " prefix unless it already has one. When the
/// original message carried an RFC Message-ID, In-Reply-To and References
/// headers are added so mail clients thread the reply correctly.
pub fn build_reply_mime(
    reply: &str,
    recipient: &str,
    subject: &str,
    message_id: Option<&str>,
) -> String {
    let subject_line = if subject.to_lowercase().starts_with("re:") {
        subject.to_string()
    } else {
        format!("Re: {}", subject)
    };

    let mut mime = String::new();
    mime.push_str(&format!("To: {}\r\n", recipient));
    mime.push_str("From: me\r\n");
    mime.push_str(&format!("Subject: {}\r\n", subject_line));
    if let Some(id) = message_id {
        mime.push_str(&format!("In-Reply-To: {}\r\n", id));
        mime.push_str(&format!("References: {}\r\n", id));
    }
    mime.push_str("MIME-Version: 1.0\r\n");
    mime.push_str("Content-Type: text/plain; charset=\"utf-8\"\r\n");
    mime.push_str("\r\n");
    mime.push_str(reply);
    mime
}
