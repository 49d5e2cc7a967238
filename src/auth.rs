//! OAuth2 authentication management for the Gmail API

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use yup_oauth2::ApplicationSecret;

use crate::error::{AutoReplyError, Result};

/// Default scope when the configuration does not override it.
///
/// gmail.modify covers everything the reply loop needs: reading unread
/// mail, sending replies, and clearing the UNREAD label (no permanent
/// deletion).
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.modify"];

/// Environment variable that may carry the OAuth client secret JSON
/// inline, for deployments that avoid a credentials file on disk.
pub const CREDENTIALS_ENV: &str = "GMAIL_CREDENTIALS_JSON";

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub =
    Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Load the OAuth2 client secret.
///
/// Prefers the `GMAIL_CREDENTIALS_JSON` environment variable (the secret
/// JSON inline); otherwise reads the credentials file at `credentials_path`.
pub async fn load_secret(credentials_path: &Path) -> Result<ApplicationSecret> {
    if let Ok(inline) = env::var(CREDENTIALS_ENV) {
        if !inline.trim().is_empty() {
            tracing::debug!("Loading OAuth client secret from {}", CREDENTIALS_ENV);
            return yup_oauth2::parse_application_secret(&inline).map_err(|e| {
                AutoReplyError::AuthError(format!("Failed to parse {}: {}", CREDENTIALS_ENV, e))
            });
        }
    }

    yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| AutoReplyError::AuthError(format!("Failed to read credentials: {}", e)))
}

/// Initialize the Gmail API hub with OAuth2 authentication
///
/// This sets up the complete Gmail API client with:
/// - OAuth2 authentication using InstalledFlow (desktop app flow)
/// - Token persistence to disk for automatic refresh
/// - HTTP/1 client with TLS support
///
/// The token is pre-fetched once so interactive authorization (browser
/// redirect) happens here, before the first poll cycle.
///
/// # Arguments
/// * `credentials_path` - Path to the OAuth2 credentials JSON file
/// * `token_cache_path` - Path where access tokens will be cached
/// * `scopes` - OAuth scopes from configuration
///
/// # Returns
/// A configured Gmail hub ready for API calls
pub async fn initialize_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
    scopes: &[String],
) -> Result<GmailHub> {
    let secret = load_secret(credentials_path).await?;

    // The token cache lives under the data directory by default; make sure
    // it exists before yup-oauth2 tries to persist into it
    if let Some(parent) = token_cache_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    // Build authenticator with token persistence
    // HTTPRedirect opens a browser for user authorization
    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| AutoReplyError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Pre-authenticate so the cached token carries the configured scopes
    let _token = auth
        .token(scopes)
        .await
        .map_err(|e| AutoReplyError::AuthError(format!("Failed to obtain token: {}", e)))?;

    if token_cache_path.exists() {
        secure_token_file(token_cache_path).await?;
    }

    // Configure HTTP client with TLS
    // Use HTTP/1 for compatibility (HTTP/2 is default but HTTP/1 works better with google-gmail1)
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| {
                    AutoReplyError::AuthError(format!("Failed to load TLS roots: {}", e))
                })?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Delete the cached token, forcing a fresh interactive authorization on
/// the next hub initialization. Returns whether a cache file existed.
pub async fn clear_token_cache(token_cache_path: &Path) -> Result<bool> {
    if token_cache_path.exists() {
        tokio::fs::remove_file(token_cache_path).await?;
        tracing::info!("Removed cached token at {:?}", token_cache_path);
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Credential structure matching Google's OAuth2 credentials JSON format
#[derive(Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub installed: InstalledApp,
}

/// Installed application credentials (desktop/CLI app)
#[derive(Debug, Serialize, Deserialize)]
pub struct InstalledApp {
    pub client_id: String,
    pub project_id: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub client_secret: String,
    pub redirect_uris: Vec<String>,
}

/// Load OAuth2 credentials from a JSON file
///
/// Used by the `auth` command to report which Google Cloud project the
/// credentials belong to before running the flow.
pub async fn load_credentials(path: &Path) -> Result<Credentials> {
    let content = tokio::fs::read_to_string(path).await?;
    let creds = serde_json::from_str(&content)?;
    Ok(creds)
}

/// Secure token file permissions on Unix systems
///
/// Sets file permissions to 0600 (read/write for owner only)
/// to prevent unauthorized access to OAuth2 tokens
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600); // Read/write for owner only
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Secure token file on Windows (stub implementation)
///
/// Windows uses ACLs instead of Unix permissions
/// In production, should use win32 APIs to set appropriate ACLs
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    // Windows uses ACLs, file permissions are different
    // In production, use win32 APIs to set appropriate ACLs
    Ok(())
}
