//! Gmail Auto-Reply Service
//!
//! An automated service that polls a Gmail inbox for unread mail, classifies
//! each message by subject keywords, and sends an automated reply in the
//! same thread before marking the message read.
//!
//! # Overview
//!
//! This library provides a complete solution for automated replies:
//! - **Authentication**: OAuth2 authentication with token caching
//! - **Polling**: A supervised background loop over unread messages
//! - **Classification**: Keyword-based categorization of subjects
//! - **Composition**: Template or AI-generated reply text
//! - **Persistence**: Append-only JSON log of replied and ignored mail
//! - **Dashboard**: A JSON HTTP API over the log with start/stop control
//!
//! # Example Usage
//!
//! ```no_run
//! use gmail_autoreply::{auth, client::GmailMailClient, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load configuration
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     // Authenticate
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".gmail-autoreply/token.json".as_ref(),
//!         &config.auth.scopes,
//!     ).await?;
//!
//!     // Create the Gmail client
//!     let client = GmailMailClient::new(hub, &config.auth.scopes);
//!
//!     // Use client to interact with Gmail API
//!     // ...
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`classifier`] - Keyword classification of message subjects
//! - [`cli`] - Command-line interface and service orchestration
//! - [`client`] - Gmail API client with retry logic
//! - [`composer`] - Reply composition (template or AI) and MIME assembly
//! - [`config`] - Configuration and runtime policy edits
//! - [`dashboard`] - JSON dashboard server with poller control
//! - [`engine`] - The poll-classify-reply cycle
//! - [`error`] - Error types and result aliases
//! - [`models`] - Core data structures
//! - [`poller`] - Supervised background polling loop
//! - [`state`] - Reply log and run status persistence

pub mod auth;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod composer;
pub mod config;
pub mod dashboard;
pub mod engine;
pub mod error;
pub mod models;
pub mod poller;
pub mod state;

// Re-export commonly used types for convenience
pub use error::{AutoReplyError, Result};

// Core data models
pub use models::{IgnoredRecord, InboundMessage, RepliedRecord};

// Classifier functions
pub use classifier::{categorize, is_reply_candidate, FALLBACK_CATEGORY};

// Config types
pub use config::{Config, PolicyEdit, ReplyPolicy};

// Client traits
pub use client::{GmailMailClient, MailClient};

// Composition
pub use composer::{build_reply_mime, CompletionClient, ReplyComposer};

// Cycle engine
pub use engine::{CycleOutcome, MailCycleEngine};

// Polling loop
pub use poller::{PollerHandle, ServicePaths};

// State persistence
pub use state::{ReplyLog, RunStatus};

// CLI types (for binary usage)
pub use cli::{Cli, Commands};
