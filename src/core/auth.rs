use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::error::UsageError;

const PROVIDER_KEY: &str = "openai";
const OAUTH_MARKER: &str = "oauth";

// --- Auth file ---

#[derive(Deserialize)]
struct AuthEntry {
    #[serde(rename = "type")]
    kind: Option<String>,
    access: Option<String>,
    #[serde(rename = "accountId", alias = "account_id")]
    account_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodexCredentials {
    pub access_token: String,
    pub account_id: String,
}

/// Default auth file location: `$XDG_DATA_HOME/opencode/auth.json`.
pub fn default_auth_path() -> PathBuf {
    if let Ok(path) = std::env::var("CODEX_STATUS_AUTH") {
        return PathBuf::from(path);
    }
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join(".local")
                .join("share")
        })
        .join("opencode")
        .join("auth.json")
}

fn non_blank(value: Option<String>) -> Option<String> {
    let trimmed = value?.trim().to_string();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Parse auth file contents into OAuth credentials.
///
/// Every way the file can fall short maps to `CredentialsMissing`.
pub fn parse_credentials(content: &str) -> Result<CodexCredentials, UsageError> {
    let mut entries: HashMap<String, serde_json::Value> = serde_json::from_str(content)
        .map_err(|e| UsageError::CredentialsMissing(format!("unreadable auth file: {}", e)))?;
    let raw = entries
        .remove(PROVIDER_KEY)
        .ok_or_else(|| UsageError::CredentialsMissing(format!("no '{}' entry", PROVIDER_KEY)))?;
    let entry: AuthEntry = serde_json::from_value(raw).map_err(|e| {
        UsageError::CredentialsMissing(format!("malformed '{}' entry: {}", PROVIDER_KEY, e))
    })?;

    if entry.kind.as_deref() != Some(OAUTH_MARKER) {
        return Err(UsageError::CredentialsMissing(format!(
            "'{}' entry is not an OAuth login",
            PROVIDER_KEY
        )));
    }
    let access_token = non_blank(entry.access)
        .ok_or_else(|| UsageError::CredentialsMissing("empty access token".into()))?;
    let account_id = non_blank(entry.account_id)
        .ok_or_else(|| UsageError::CredentialsMissing("empty account id".into()))?;

    Ok(CodexCredentials {
        access_token,
        account_id,
    })
}

/// Read OAuth credentials from the auth file at `path`.
pub async fn read_credentials(path: &Path) -> Result<CodexCredentials, UsageError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        UsageError::CredentialsMissing(format!("failed to read {}: {}", path.display(), e))
    })?;
    parse_credentials(&content)
}
