use serde::{Deserialize, Serialize};

/// A fully fetched inbound message, reduced to the fields the reply
/// decision needs. Headers are optional; a missing header is absent data,
/// not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub thread_id: String,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub date: Option<String>,
    /// RFC 2822 Message-ID header, used to thread the reply.
    pub message_id: Option<String>,
    /// Plain-text body; empty when the message carried none.
    pub body: String,
}

/// Log entry for a message that was answered and marked read.
///
/// Field names mirror the persisted log file (`to`, not `recipient`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepliedRecord {
    #[serde(rename = "to")]
    pub recipient: String,
    pub subject: String,
    pub reply: String,
    pub date: Option<String>,
    pub category: String,
}

/// Log entry for a message that was classified but not answered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IgnoredRecord {
    #[serde(rename = "from")]
    pub sender: Option<String>,
    pub subject: Option<String>,
    pub date: Option<String>,
    pub category: String,
}
