use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AutoReplyError, Result};
use crate::state;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub reply: ReplyConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyConfig {
    /// Keywords scanned in order against incoming subjects; the first match
    /// also names the record category.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    /// Fallback reply text, sent verbatim when AI replies are disabled.
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default)]
    pub use_ai: bool,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            template: default_template(),
            use_ai: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Label ids the unread listing is restricted to.
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            labels: default_labels(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            scopes: default_scopes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u16,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Falls back to the OPENAI_API_KEY environment variable when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            api_key: None,
        }
    }
}

fn default_keywords() -> Vec<String> {
    vec![
        "invoice".to_string(),
        "order".to_string(),
        "support".to_string(),
    ]
}

fn default_template() -> String {
    "Thank you for reaching out. We have received your email and will get back to you shortly."
        .to_string()
}

fn default_interval_secs() -> u64 {
    60
}

fn default_labels() -> Vec<String> {
    vec!["UNREAD".to_string(), "CATEGORY_PERSONAL".to_string()]
}

fn default_scopes() -> Vec<String> {
    crate::auth::DEFAULT_SCOPES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> u16 {
    150
}

fn default_temperature() -> f32 {
    0.7
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            AutoReplyError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            AutoReplyError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        // Validate the loaded config
        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AutoReplyError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            AutoReplyError::ConfigError(format!("Failed to serialize config: {}", e))
        })?;

        tokio::fs::write(path, content).await.map_err(|e| {
            AutoReplyError::ConfigError(format!("Failed to write config file: {}", e))
        })?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.reply.template.trim().is_empty() {
            return Err(AutoReplyError::ConfigError(
                "reply.template cannot be empty (it is the universal fallback reply)".to_string(),
            ));
        }

        for keyword in &self.reply.keywords {
            if keyword.trim().is_empty() {
                return Err(AutoReplyError::ConfigError(
                    "reply.keywords cannot contain blank entries".to_string(),
                ));
            }
        }

        if self.poll.interval_secs == 0 {
            return Err(AutoReplyError::ConfigError(
                "poll.interval_secs must be at least 1".to_string(),
            ));
        }
        if self.poll.interval_secs > 86_400 {
            return Err(AutoReplyError::ConfigError(
                "poll.interval_secs cannot exceed 86400 (1 day)".to_string(),
            ));
        }

        if self.poll.labels.is_empty() {
            return Err(AutoReplyError::ConfigError(
                "poll.labels must name at least one label id".to_string(),
            ));
        }
        for label in &self.poll.labels {
            if label.trim().is_empty() {
                return Err(AutoReplyError::ConfigError(
                    "poll.labels cannot contain blank entries".to_string(),
                ));
            }
        }

        if self.auth.scopes.is_empty() {
            return Err(AutoReplyError::ConfigError(
                "auth.scopes must name at least one OAuth scope".to_string(),
            ));
        }

        if self.ai.max_tokens == 0 {
            return Err(AutoReplyError::ConfigError(
                "ai.max_tokens must be at least 1".to_string(),
            ));
        }
        if self.ai.max_tokens > 4096 {
            return Err(AutoReplyError::ConfigError(
                "ai.max_tokens cannot exceed 4096".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.ai.temperature) {
            return Err(AutoReplyError::ConfigError(
                "ai.temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }

    /// Snapshot the runtime-mutable reply policy from this config.
    pub fn reply_policy(&self) -> ReplyPolicy {
        ReplyPolicy {
            keywords: self.reply.keywords.clone(),
            template: self.reply.template.clone(),
            use_ai: self.reply.use_ai,
        }
    }
}

/// The runtime-mutable subset of configuration the cycle engine consumes.
/// The poll loop snapshots one of these at each cycle boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyPolicy {
    pub keywords: Vec<String>,
    pub template: String,
    pub use_ai: bool,
}

/// A versioned reply-policy override written by the dashboard and picked up
/// by the poll loop at the next cycle boundary. The configuration file
/// itself is never rewritten at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyEdit {
    pub version: u64,
    pub keywords: Vec<String>,
    pub reply_template: String,
    pub use_ai: bool,
}

impl PolicyEdit {
    /// Build the next edit in the version sequence after `previous`.
    pub fn next(previous: Option<&PolicyEdit>, policy: ReplyPolicy) -> Self {
        let version = previous.map(|e| e.version + 1).unwrap_or(1);
        Self {
            version,
            keywords: policy.keywords,
            reply_template: policy.template,
            use_ai: policy.use_ai,
        }
    }

    pub fn to_policy(&self) -> ReplyPolicy {
        ReplyPolicy {
            keywords: self.keywords.clone(),
            template: self.reply_template.clone(),
            use_ai: self.use_ai,
        }
    }

    /// Load the pending edit, if any has ever been written.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            AutoReplyError::ConfigError(format!("Failed to read policy edits: {}", e))
        })?;

        let edit: Self = serde_json::from_str(&content).map_err(|e| {
            AutoReplyError::ConfigError(format!("Failed to parse policy edits: {}", e))
        })?;

        Ok(Some(edit))
    }

    /// Persist the edit atomically so the loop never reads a partial record.
    pub async fn store(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        state::write_atomic(path, &content).await?;
        tracing::info!(version = self.version, "Stored pending policy edit");
        Ok(())
    }
}

/// Split a comma-joined keyword string from the dashboard form into the
/// stored list, trimming whitespace and dropping empty entries.
pub fn parse_keyword_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.reply.keywords, vec!["invoice", "order", "support"]);
        assert!(!config.reply.template.is_empty());
        assert!(!config.reply.use_ai);

        assert_eq!(config.poll.interval_secs, 60);
        assert_eq!(config.poll.labels, vec!["UNREAD", "CATEGORY_PERSONAL"]);

        assert_eq!(
            config.auth.scopes,
            vec!["https://www.googleapis.com/auth/gmail.modify"]
        );

        assert_eq!(config.ai.model, "gpt-3.5-turbo");
        assert_eq!(config.ai.max_tokens, 150);
        assert!((config.ai.temperature - 0.7).abs() < f32::EPSILON);
        assert!(config.ai.api_key.is_none());
    }

    #[test]
    fn test_config_validation_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_template() {
        let mut config = Config::default();
        config.reply.template = "   ".to_string();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("template cannot be empty"));
    }

    #[test]
    fn test_config_validation_blank_keyword() {
        let mut config = Config::default();
        config.reply.keywords.push("  ".to_string());
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("blank entries"));
    }

    #[test]
    fn test_config_validation_empty_keyword_list_allowed() {
        // An empty keyword list is legal: every message classifies as Other
        // and nothing is eligible for a reply.
        let mut config = Config::default();
        config.reply.keywords.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_interval_zero() {
        let mut config = Config::default();
        config.poll.interval_secs = 0;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("at least 1"));
    }

    #[test]
    fn test_config_validation_interval_too_high() {
        let mut config = Config::default();
        config.poll.interval_secs = 86_401;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cannot exceed 86400"));
    }

    #[test]
    fn test_config_validation_interval_boundaries() {
        let mut config = Config::default();

        config.poll.interval_secs = 1;
        assert!(config.validate().is_ok());

        config.poll.interval_secs = 86_400;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_labels() {
        let mut config = Config::default();
        config.poll.labels.clear();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("at least one label"));
    }

    #[test]
    fn test_config_validation_empty_scopes() {
        let mut config = Config::default();
        config.auth.scopes.clear();
        let result = config.validate();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("at least one OAuth scope"));
    }

    #[test]
    fn test_config_validation_max_tokens_range() {
        let mut config = Config::default();

        config.ai.max_tokens = 0;
        assert!(config.validate().is_err());

        config.ai.max_tokens = 4097;
        assert!(config.validate().is_err());

        config.ai.max_tokens = 4096;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_temperature_range() {
        let mut config = Config::default();

        config.ai.temperature = -0.1;
        assert!(config.validate().is_err());

        config.ai.temperature = 2.1;
        assert!(config.validate().is_err());

        config.ai.temperature = 0.0;
        assert!(config.validate().is_ok());

        config.ai.temperature = 2.0;
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_config_load_save_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let config = Config::default();
        config.save(path).await.unwrap();

        let loaded = Config::load(path).await.unwrap();

        assert_eq!(config.reply.keywords, loaded.reply.keywords);
        assert_eq!(config.reply.template, loaded.reply.template);
        assert_eq!(config.poll.interval_secs, loaded.poll.interval_secs);
        assert_eq!(config.ai.model, loaded.ai.model);
    }

    #[tokio::test]
    async fn test_config_load_nonexistent_returns_default() {
        let path = Path::new("/tmp/nonexistent-autoreply-config-83151.toml");

        let config = Config::load(path).await.unwrap();

        assert_eq!(config.poll.interval_secs, 60);
        assert_eq!(config.reply.keywords, vec!["invoice", "order", "support"]);
    }

    #[tokio::test]
    async fn test_config_load_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        tokio::fs::write(path, "this is not valid toml {[}]")
            .await
            .unwrap();

        let result = Config::load(path).await;
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[tokio::test]
    async fn test_config_partial_with_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        // Only override some values; the rest come from defaults
        let partial_config = r#"
[reply]
keywords = ["billing"]
use_ai = true

[poll]
interval_secs = 120
"#;
        tokio::fs::write(path, partial_config).await.unwrap();

        let config = Config::load(path).await.unwrap();

        assert_eq!(config.reply.keywords, vec!["billing"]);
        assert!(config.reply.use_ai);
        assert_eq!(config.poll.interval_secs, 120);

        // Defaults still present
        assert!(!config.reply.template.is_empty());
        assert_eq!(config.poll.labels, vec!["UNREAD", "CATEGORY_PERSONAL"]);
        assert_eq!(config.ai.model, "gpt-3.5-turbo");
    }

    #[tokio::test]
    async fn test_config_create_example() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        Config::create_example(path).await.unwrap();

        assert!(path.exists());

        let config = Config::load(path).await.unwrap();
        assert_eq!(config.poll.interval_secs, 60);
    }

    #[test]
    fn test_reply_policy_snapshot() {
        let config = Config::default();
        let policy = config.reply_policy();

        assert_eq!(policy.keywords, config.reply.keywords);
        assert_eq!(policy.template, config.reply.template);
        assert_eq!(policy.use_ai, config.reply.use_ai);
    }

    #[test]
    fn test_policy_edit_versioning() {
        let policy = Config::default().reply_policy();

        let first = PolicyEdit::next(None, policy.clone());
        assert_eq!(first.version, 1);

        let second = PolicyEdit::next(Some(&first), policy);
        assert_eq!(second.version, 2);
    }

    #[test]
    fn test_policy_edit_to_policy() {
        let edit = PolicyEdit {
            version: 3,
            keywords: vec!["refund".to_string()],
            reply_template: "We are looking into it.".to_string(),
            use_ai: true,
        };

        let policy = edit.to_policy();
        assert_eq!(policy.keywords, vec!["refund"]);
        assert_eq!(policy.template, "We are looking into it.");
        assert!(policy.use_ai);
    }

    #[tokio::test]
    async fn test_policy_edit_store_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy_edits.json");

        assert!(PolicyEdit::load(&path).await.unwrap().is_none());

        let edit = PolicyEdit {
            version: 1,
            keywords: vec!["invoice".to_string(), "refund".to_string()],
            reply_template: "On it.".to_string(),
            use_ai: false,
        };
        edit.store(&path).await.unwrap();

        let loaded = PolicyEdit::load(&path).await.unwrap().unwrap();
        assert_eq!(loaded, edit);
    }

    #[tokio::test]
    async fn test_policy_edit_load_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy_edits.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let result = PolicyEdit::load(&path).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_keyword_list() {
        assert_eq!(
            parse_keyword_list("invoice, order,  support"),
            vec!["invoice", "order", "support"]
        );
        assert_eq!(parse_keyword_list("single"), vec!["single"]);
        assert_eq!(parse_keyword_list(" , ,"), Vec::<String>::new());
        assert_eq!(parse_keyword_list(""), Vec::<String>::new());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_interval_secs(), 60);
        assert_eq!(default_labels(), vec!["UNREAD", "CATEGORY_PERSONAL"]);
        assert_eq!(default_model(), "gpt-3.5-turbo");
        assert_eq!(default_max_tokens(), 150);
        assert!((default_temperature() - 0.7).abs() < f32::EPSILON);
    }
}
